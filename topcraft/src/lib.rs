#![warn(missing_docs)]
//! # topcraft
//!
//! Micro-benchmarking toolkit for peak memory.
//!
//! A background sampler thread polls the process's unique (or resident)
//! memory and reports the peak growth of each measurement window:
//! - **Sessions**: `start` / `split` / `stop`, scoped guards and call wrapping
//! - **Repeated trials**: `memit(n)` runs code `n + 1` times and drops the warm-up
//! - **Trends**: `mem_trend(points, n)` repeats a benchmark per parameter value
//! - **Collector control**: hand freed memory back to the OS between windows,
//!   or suspend that for a scope
//!
//! ## Quick Start
//!
//! ```no_run
//! use topcraft::prelude::*;
//!
//! let mut session = mem();
//! session.start()?;
//! let table: Vec<u64> = (0..1_000_000).collect();
//! session.split()?;
//! drop(table);
//! session.stop()?;
//!
//! let mut bench = memit(10);
//! for trial in &mut bench {
//!     let _trial = trial?;
//!     let _buffer = vec![1u8; 4 << 20];
//! }
//! # Ok::<(), topcraft::SessionError>(())
//! ```

pub use topcraft_core::{
    CollectorGuard, CollectorToggle, DEFAULT_LABEL, DEFAULT_REPLY_TIMEOUT, MemTrend, Memit,
    MemitConfig, MemoryBackend, MemoryProbe, MemorySession, MemoryUnit, ProbeError, ReportMode,
    SamplerConfig, SamplerError, SamplerHandle, SessionConfig, SessionError, SessionGuard, Sink,
    TrendPoints, TrialGuard, TrialSession, Trials, ValueMap, collect, collector_enabled,
};

pub use topcraft_stats::{Percentiles, SummaryStatistics, compute_percentiles, compute_summary};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        CollectorToggle, MemTrend, Memit, MemitConfig, MemorySession, MemoryUnit, SessionConfig,
        SessionError, TrialSession, mem, mem_trend, memit,
    };
}

/// Logging session with default settings
pub fn mem() -> MemorySession {
    MemorySession::default()
}

/// Repeated-trial benchmark logging its summary when done
pub fn memit(repeat: usize) -> Memit {
    Memit::new(repeat)
}

/// Trend over `points`, each measured with `repeat` trials
pub fn mem_trend(points: impl IntoIterator<Item = i64>, repeat: usize) -> MemTrend {
    MemTrend::new(points, repeat)
}

/// Run the topcraft CLI.
///
/// ```ignore
/// fn main() {
///     topcraft::run().unwrap();
/// }
/// ```
pub use topcraft_cli::run;
