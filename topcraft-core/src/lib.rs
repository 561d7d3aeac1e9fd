#![warn(missing_docs)]
//! TOPCraft Core - Memory Measurement Runtime
//!
//! This crate provides the sampling-based memory measurement subsystem:
//! - `MemoryProbe` reading a process's unique or resident memory from procfs
//! - A background sampler thread tracking delta-from-baseline peaks
//! - `MemorySession` with start/split/stop, scoped guards and call wrapping
//! - `Memit` repeated trials and `MemTrend` parameter sweeps

mod collector;
mod error;
mod memit;
mod probe;
mod sampler;
mod session;
mod sink;
mod trend;
mod unit;
mod values;

pub use collector::{CollectorGuard, CollectorToggle, collect, collector_enabled};
pub use error::{ProbeError, SamplerError, SessionError};
pub use memit::{Memit, MemitConfig, ReportMode, Trials};
pub use probe::{MemoryBackend, MemoryProbe};
pub use sampler::{DEFAULT_REPLY_TIMEOUT, SamplerConfig, SamplerHandle};
pub use session::{MemorySession, SessionConfig, SessionGuard, TrialGuard, TrialSession};
pub use sink::Sink;
pub use trend::{MemTrend, TrendPoints};
pub use unit::MemoryUnit;
pub use values::ValueMap;

/// Default label used when none is given
pub const DEFAULT_LABEL: &str = "memory";
