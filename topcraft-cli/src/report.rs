//! Report Data Structures
//!
//! A report captures one `run` or `trend` invocation: what was measured,
//! on which machine, and the per-label results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use topcraft_core::{MemTrend, Memit, MemoryUnit};
use topcraft_stats::compute_percentiles;

/// Complete measurement report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub meta: ReportMeta,
    pub results: Vec<LabelResult>,
    /// Present for trend runs
    pub trend: Option<TrendReport>,
}

/// Report metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMeta {
    pub version: String,
    pub timestamp: DateTime<Utc>,
    /// Measured command line
    pub command: Vec<String>,
    pub repeat: usize,
    /// Display unit suffix of every value in the report
    pub unit: String,
    pub system: SystemInfo,
}

/// Host information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemInfo {
    pub os: String,
    pub arch: String,
    pub memory_gb: f64,
}

/// Statistics for one label
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelResult {
    pub label: String,
    /// Worst (maximum) value, the headline number
    pub worst: f64,
    pub mean: f64,
    pub median: f64,
    pub std_dev: f64,
    pub min: f64,
    pub p90: f64,
    pub samples: usize,
    pub values: Vec<f64>,
}

/// Worst value per label and trend point
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendReport {
    pub points: Vec<i64>,
    pub series: Vec<TrendSeries>,
}

/// One label's values across the trend points
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendSeries {
    pub label: String,
    /// One slot per point, `None` where the label was not measured
    pub values: Vec<Option<f64>>,
}

impl Report {
    /// Report for a finished repeated-trial run
    pub fn from_memit(memit: &Memit, command: &[String]) -> Self {
        let config = memit.config();
        let results = memit
            .values()
            .iter()
            .zip(memit.summaries())
            .map(|((label, values), (_, stats))| LabelResult {
                label: label.to_string(),
                worst: stats.max,
                mean: stats.mean,
                median: stats.median,
                std_dev: stats.std_dev,
                min: stats.min,
                p90: compute_percentiles(values).p90,
                samples: stats.sample_count,
                values: values.clone(),
            })
            .collect();

        Self {
            meta: build_report_meta(command, config.repeat, config.session.unit),
            results,
            trend: None,
        }
    }

    /// Report for a finished trend run
    pub fn from_trend(
        trend: &MemTrend,
        repeat: usize,
        unit: MemoryUnit,
        command: &[String],
    ) -> Self {
        let series = trend
            .series()
            .iter()
            .map(|(label, values)| TrendSeries {
                label: label.to_string(),
                values: values.clone(),
            })
            .collect();

        Self {
            meta: build_report_meta(command, repeat, unit),
            results: Vec::new(),
            trend: Some(TrendReport {
                points: trend.points().to_vec(),
                series,
            }),
        }
    }
}

/// Generate a prettified JSON report
pub fn generate_json_report(report: &Report) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(report)
}

fn build_report_meta(command: &[String], repeat: usize, unit: MemoryUnit) -> ReportMeta {
    ReportMeta {
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now(),
        command: command.to_vec(),
        repeat,
        unit: unit.suffix().to_string(),
        system: SystemInfo {
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            memory_gb: get_memory_gb().unwrap_or(0.0),
        },
    }
}

/// Total system memory in GB (Linux only)
fn get_memory_gb() -> Option<f64> {
    #[cfg(target_os = "linux")]
    {
        std::fs::read_to_string("/proc/meminfo")
            .ok()
            .and_then(|content| {
                content
                    .lines()
                    .find(|l| l.starts_with("MemTotal"))
                    .and_then(|l| {
                        l.split_whitespace()
                            .nth(1)
                            .and_then(|s| s.parse::<u64>().ok())
                    })
                    .map(|kb| kb as f64 / 1024.0 / 1024.0)
            })
    }
    #[cfg(not(target_os = "linux"))]
    {
        None
    }
}
