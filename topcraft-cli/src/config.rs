//! Configuration loading from topcraft.toml
//!
//! Configuration is read from a `topcraft.toml` file, discovered by walking up
//! from the current directory. Command-line flags override file values.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use topcraft_core::{MemitConfig, MemoryBackend, MemoryUnit, ReportMode, SessionConfig};

/// Name of the configuration file
pub const CONFIG_FILE: &str = "topcraft.toml";

/// topcraft configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TopConfig {
    /// Sampler settings
    #[serde(default)]
    pub memory: MemoryConfig,
    /// Repeated-trial settings
    #[serde(default)]
    pub runner: RunnerConfig,
    /// Output configuration
    #[serde(default)]
    pub output: OutputConfig,
}

/// Memory backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum BackendChoice {
    /// Unique set size when available, resident set size otherwise
    #[default]
    Auto,
    /// Unique set size
    Uss,
    /// Resident set size
    Rss,
}

impl BackendChoice {
    /// Backend to force, if any
    pub fn backend(self) -> Option<MemoryBackend> {
        match self {
            BackendChoice::Auto => None,
            BackendChoice::Uss => Some(MemoryBackend::Uss),
            BackendChoice::Rss => Some(MemoryBackend::Rss),
        }
    }
}

/// Sampler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Display unit: "b", "kb", "mb" or "gb"
    #[serde(default = "default_unit")]
    pub unit: String,
    /// Wait between two samples (e.g., "1ms")
    #[serde(default = "default_poll_interval")]
    pub poll_interval: String,
    /// Longest wait for any sampler reply (e.g., "60s")
    #[serde(default = "default_reply_timeout")]
    pub reply_timeout: String,
    /// Count child processes
    #[serde(default = "default_include_children")]
    pub include_children: bool,
    /// Backend: "auto", "uss" or "rss"
    #[serde(default)]
    pub backend: BackendChoice,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            unit: default_unit(),
            poll_interval: default_poll_interval(),
            reply_timeout: default_reply_timeout(),
            include_children: default_include_children(),
            backend: BackendChoice::default(),
        }
    }
}

fn default_unit() -> String {
    "mb".to_string()
}
fn default_poll_interval() -> String {
    "1ms".to_string()
}
fn default_reply_timeout() -> String {
    "60s".to_string()
}
fn default_include_children() -> bool {
    true
}

/// Runner configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Recorded trials, not counting the warm-up
    #[serde(default = "default_repeat")]
    pub repeat: usize,
    /// Label for results
    #[serde(default = "default_label")]
    pub label: String,
    /// Log every trial
    #[serde(default)]
    pub verbose: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            repeat: default_repeat(),
            label: default_label(),
            verbose: false,
        }
    }
}

fn default_repeat() -> usize {
    5
}
fn default_label() -> String {
    topcraft_core::DEFAULT_LABEL.to_string()
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Default output format: "human", "json", "csv"
    #[serde(default = "default_format")]
    pub format: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: default_format(),
        }
    }
}

fn default_format() -> String {
    "human".to_string()
}

impl TopConfig {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Try to discover and load configuration by walking up from current directory
    pub fn discover() -> Option<Self> {
        let dir = std::env::current_dir().ok()?;
        Self::discover_from(&dir)
    }

    /// Walk up from `start` looking for `topcraft.toml`
    pub fn discover_from(start: &Path) -> Option<Self> {
        let mut dir = start.to_path_buf();
        loop {
            let config_path = dir.join(CONFIG_FILE);
            if config_path.exists() {
                return match Self::load(&config_path) {
                    Ok(config) => Some(config),
                    Err(e) => {
                        tracing::warn!(
                            path = %config_path.display(),
                            error = %e,
                            "ignoring unreadable configuration"
                        );
                        None
                    }
                };
            }
            if !dir.pop() {
                break;
            }
        }
        None
    }

    /// Resolve the memory section into session settings
    pub fn session_config(&self) -> anyhow::Result<SessionConfig> {
        Ok(SessionConfig {
            unit: MemoryUnit::from_name_lossy(&self.memory.unit),
            label: self.runner.label.clone(),
            verbose: self.runner.verbose,
            poll_interval: Self::parse_duration(&self.memory.poll_interval)?,
            include_children: self.memory.include_children,
            target_pid: None,
            reply_timeout: Self::parse_duration(&self.memory.reply_timeout)?,
            backend: self.memory.backend.backend(),
        })
    }

    /// Resolve into repeated-trial settings
    pub fn memit_config(&self) -> anyhow::Result<MemitConfig> {
        Ok(MemitConfig {
            repeat: self.runner.repeat,
            session: self.session_config()?,
            mode: ReportMode::Record,
        })
    }

    /// Generate a default configuration as TOML string
    pub fn default_toml() -> String {
        r#"# topcraft configuration

[memory]
# Display unit: b, kb, mb, gb
unit = "mb"
# Wait between two memory samples
poll_interval = "1ms"
# Give up when the sampler does not answer within this time
reply_timeout = "60s"
# Count the memory of child processes
include_children = true
# Memory backend: auto, uss, rss
backend = "auto"

[runner]
# Recorded trials (one extra warm-up trial always runs first)
repeat = 5
# Label for results
label = "memory"
# Log every trial
verbose = false

[output]
# Default output format: human, json, csv
format = "human"
"#
        .to_string()
    }

    /// Parse duration string (e.g., "3s", "500ms", "2m")
    pub fn parse_duration(s: &str) -> anyhow::Result<Duration> {
        let s = s.trim();
        if s.is_empty() {
            return Err(anyhow::anyhow!("Empty duration string"));
        }

        let (num_part, unit_part) = s
            .char_indices()
            .find(|(_, c)| c.is_alphabetic() || *c == 'µ')
            .map(|(i, _)| s.split_at(i))
            .unwrap_or((s, "s"));

        let value: f64 = num_part
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("Invalid duration number: {}", num_part))?;
        if !value.is_finite() || value < 0.0 {
            return Err(anyhow::anyhow!("Invalid duration: {}", s));
        }

        let seconds_per_unit = match unit_part.to_lowercase().as_str() {
            "ns" => 1e-9,
            "us" | "µs" => 1e-6,
            "ms" => 1e-3,
            "s" | "" => 1.0,
            "m" | "min" => 60.0,
            _ => return Err(anyhow::anyhow!("Unknown duration unit: {}", unit_part)),
        };

        Duration::try_from_secs_f64(value * seconds_per_unit)
            .map_err(|_| anyhow::anyhow!("Duration out of range: {}", s))
    }
}
