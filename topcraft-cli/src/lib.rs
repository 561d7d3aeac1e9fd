#![warn(missing_docs)]
//! topcraft CLI Library
//!
//! Measures the peak memory of external commands. Each trial spawns the
//! command as a child of this process and samples the whole process tree.
//!
//! ```text
//! topcraft run --repeat 10 -- python -c "x = bytearray(50 * 2**20)"
//! topcraft trend --points 1..6 -- ./alloc {}
//! topcraft init > topcraft.toml
//! ```

mod config;
mod formatting;
mod report;

pub use config::*;
pub use formatting::{format_human_output, generate_csv_report};
pub use report::{
    LabelResult, Report, ReportMeta, SystemInfo, TrendReport, TrendSeries, generate_json_report,
};

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use std::process::Command;
use topcraft_core::{MemTrend, Memit, MemitConfig, MemoryUnit};
use tracing_subscriber::EnvFilter;

/// topcraft CLI arguments
#[derive(Parser, Debug)]
#[command(name = "topcraft")]
#[command(author, version, about = "Peak memory benchmarks for commands")]
pub struct Cli {
    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file (default: discover topcraft.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output: debug logging and per-trial values
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Benchmark the peak memory of a command
    Run(MeasureArgs),
    /// Benchmark a command over a range of values substituted for `{}`
    Trend {
        /// Points as `A..B[:STEP]` or a comma-separated list
        #[arg(long)]
        points: String,

        /// Measurement options
        #[command(flatten)]
        args: MeasureArgs,
    },
    /// Print the default configuration
    Init,
}

/// Options shared by `run` and `trend`
#[derive(Args, Debug)]
pub struct MeasureArgs {
    /// Recorded trials, not counting the warm-up
    #[arg(long, short = 'n')]
    pub repeat: Option<usize>,

    /// Display unit: b, kb, mb, gb
    #[arg(long)]
    pub unit: Option<String>,

    /// Label for results
    #[arg(long)]
    pub label: Option<String>,

    /// Wait between two memory samples (e.g., "1ms")
    #[arg(long)]
    pub poll_interval: Option<String>,

    /// Output format: human, json, csv
    #[arg(long)]
    pub format: Option<String>,

    /// Output file (stdout if not specified)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Command to measure
    #[arg(last = true, required = true)]
    pub command: Vec<String>,
}

/// Output format selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable terminal output
    Human,
    /// JSON with metadata
    Json,
    /// CSV for spreadsheets
    Csv,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "human" | "text" => Ok(OutputFormat::Human),
            "json" => Ok(OutputFormat::Json),
            "csv" => Ok(OutputFormat::Csv),
            other => Err(format!("Unknown output format: {}", other)),
        }
    }
}

/// Run the topcraft CLI with process arguments
pub fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    run_with_cli(cli)
}

/// Run the topcraft CLI with pre-parsed arguments
pub fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    init_logging(cli.verbose);

    let config = match &cli.config {
        Some(path) => {
            let context = || format!("failed to load {}", path.display());
            TopConfig::load(path).with_context(context)?
        }
        None => TopConfig::discover().unwrap_or_default(),
    };

    match cli.command {
        Commands::Run(args) => run_benchmark(&args, &config, cli.verbose),
        Commands::Trend { points, args } => run_trend(&points, &args, &config, cli.verbose),
        Commands::Init => {
            print!("{}", TopConfig::default_toml());
            Ok(())
        }
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose {
        "topcraft_core=debug,topcraft_cli=debug"
    } else {
        "topcraft_core=info,topcraft_cli=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Layer configuration: topcraft.toml, then CLI flags
fn build_memit_config(
    args: &MeasureArgs,
    config: &TopConfig,
    verbose: bool,
) -> anyhow::Result<MemitConfig> {
    let mut memit = config.memit_config()?;
    if let Some(repeat) = args.repeat {
        memit.repeat = repeat;
    }
    if let Some(unit) = &args.unit {
        memit.session.unit = MemoryUnit::from_name_lossy(unit);
    }
    if let Some(label) = &args.label {
        memit.session.label = label.clone();
    }
    if let Some(interval) = &args.poll_interval {
        memit.session.poll_interval = TopConfig::parse_duration(interval)?;
    }
    memit.session.verbose |= verbose;
    Ok(memit)
}

fn run_benchmark(args: &MeasureArgs, config: &TopConfig, verbose: bool) -> anyhow::Result<()> {
    let memit_config = build_memit_config(args, config, verbose)?;
    tracing::info!(
        repeat = memit_config.repeat,
        command = %args.command.join(" "),
        "measuring"
    );

    let mut memit = Memit::with_config(memit_config);
    for trial in &mut memit {
        trial?;
        execute(&args.command)?;
    }

    let report = Report::from_memit(&memit, &args.command);
    emit(&report, args, config)
}

fn run_trend(
    points: &str,
    args: &MeasureArgs,
    config: &TopConfig,
    verbose: bool,
) -> anyhow::Result<()> {
    let points = parse_points(points)?;
    let memit_config = build_memit_config(args, config, verbose)?;
    let repeat = memit_config.repeat;
    let unit = memit_config.session.unit;

    let mut trend = MemTrend::with_config(points, repeat, memit_config.session);
    for item in &mut trend {
        let (point, _trial) = item?;
        execute(&substitute(&args.command, point))?;
    }

    let report = Report::from_trend(&trend, repeat, unit, &args.command);
    emit(&report, args, config)
}

/// Spawn a command and wait for it; a failing command aborts the run
fn execute(command: &[String]) -> anyhow::Result<()> {
    let (program, rest) = command
        .split_first()
        .ok_or_else(|| anyhow::anyhow!("No command given"))?;

    let status = Command::new(program)
        .args(rest)
        .status()
        .with_context(|| format!("failed to spawn {}", program))?;

    if !status.success() {
        let command = command.join(" ");
        return Err(anyhow::anyhow!("Command `{command}` exited with {status}"));
    }
    Ok(())
}

/// Replace every `{}` in the arguments with the trend point
fn substitute(command: &[String], point: i64) -> Vec<String> {
    let value = point.to_string();
    command.iter().map(|arg| arg.replace("{}", &value)).collect()
}

/// Parse `A..B`, `A..B:STEP` or `a,b,c` into trend points
pub fn parse_points(input: &str) -> anyhow::Result<Vec<i64>> {
    let input = input.trim();

    if let Some((start, rest)) = input.split_once("..") {
        let (end, step) = match rest.split_once(':') {
            Some((end, step)) => (end, step),
            None => (rest, "1"),
        };
        let start: i64 = start
            .trim()
            .parse()
            .with_context(|| format!("Invalid range start: {}", start))?;
        let end: i64 = end
            .trim()
            .parse()
            .with_context(|| format!("Invalid range end: {}", end))?;
        let step: usize = step
            .trim()
            .parse()
            .with_context(|| format!("Invalid range step: {}", step))?;
        if step == 0 {
            return Err(anyhow::anyhow!("Range step must be positive"));
        }
        return Ok((start..end).step_by(step).collect());
    }

    input
        .split(',')
        .map(|p| {
            p.trim()
                .parse::<i64>()
                .with_context(|| format!("Invalid trend point: {}", p))
        })
        .collect()
}

fn emit(report: &Report, args: &MeasureArgs, config: &TopConfig) -> anyhow::Result<()> {
    let format: OutputFormat = args
        .format
        .as_deref()
        .unwrap_or(config.output.format.as_str())
        .parse()
        .unwrap_or(OutputFormat::Human);

    let output = match format {
        OutputFormat::Human => format_human_output(report),
        OutputFormat::Json => generate_json_report(report)?,
        OutputFormat::Csv => generate_csv_report(report),
    };

    if let Some(ref path) = args.output {
        let mut file = std::fs::File::create(path)
            .with_context(|| format!("failed to create {}", path.display()))?;
        file.write_all(output.as_bytes())?;
        println!("Report written to: {}", path.display());
    } else {
        print!("{}", output);
    }
    Ok(())
}
