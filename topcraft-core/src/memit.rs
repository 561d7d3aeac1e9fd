//! Repeated-Trial Driver
//!
//! `Memit` runs a piece of code `repeat + 1` times. The first pass is a
//! warm-up whose results are dropped. Every pass runs inside a background
//! session, and also hands the caller a foreground [`TrialSession`] for
//! explicit splits: when the caller recorded anything through it, those
//! labels are kept; otherwise the background window is.
//!
//! ```no_run
//! use topcraft_core::Memit;
//!
//! let mut memit = Memit::new(10);
//! for trial in &mut memit {
//!     let trial = trial?;
//!     trial.start()?;
//!     let data = vec![0u8; 1 << 20];
//!     trial.split()?;
//!     drop(data);
//!     trial.stop()?;
//! }
//! # Ok::<(), topcraft_core::SessionError>(())
//! ```

use crate::collector::collect;
use crate::error::SessionError;
use crate::session::{MemorySession, SessionConfig, TrialSession};
use crate::unit::MemoryUnit;
use crate::values::ValueMap;
use topcraft_stats::{SummaryStatistics, compute_summary};

/// What happens with aggregated results once all trials ran
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportMode {
    /// Log a summary line per label
    #[default]
    Log,
    /// Only keep the per-label maxima in [`Memit::results`] (logged when verbose)
    Record,
}

/// Repeated-trial configuration
#[derive(Debug, Clone)]
pub struct MemitConfig {
    /// Number of recorded trials, not counting the warm-up
    pub repeat: usize,
    /// Settings shared by both sessions. `verbose` controls per-loop logging;
    /// the sessions themselves never log.
    pub session: SessionConfig,
    pub mode: ReportMode,
}

impl Default for MemitConfig {
    fn default() -> Self {
        Self {
            repeat: 1,
            session: SessionConfig::default().verbose(false),
            mode: ReportMode::Log,
        }
    }
}

/// Repeated-trial memory benchmark
#[derive(Debug)]
pub struct Memit {
    config: MemitConfig,
    values: ValueMap<Vec<f64>>,
    results: ValueMap<f64>,
}

impl Memit {
    /// Benchmark with default settings
    pub fn new(repeat: usize) -> Self {
        Self::with_config(MemitConfig {
            repeat,
            ..Default::default()
        })
    }

    pub fn with_config(config: MemitConfig) -> Self {
        Self {
            config,
            values: ValueMap::new(),
            results: ValueMap::new(),
        }
    }

    pub fn config(&self) -> &MemitConfig {
        &self.config
    }

    /// Iterate over the trials
    pub fn trials(&mut self) -> Trials<'_> {
        let state = self.begin();
        Trials { memit: self, state }
    }

    /// Every recorded value per label, warm-up excluded
    pub fn values(&self) -> &ValueMap<Vec<f64>> {
        &self.values
    }

    /// Worst (maximum) value per label
    pub fn results(&self) -> &ValueMap<f64> {
        &self.results
    }

    /// Summary statistics per label
    pub fn summaries(&self) -> ValueMap<SummaryStatistics> {
        let mut out = ValueMap::new();
        for (label, values) in &self.values {
            out.insert(label, compute_summary(values));
        }
        out
    }

    /// Forget all recorded values
    pub fn reset(&mut self) {
        self.values.clear();
        self.results.clear();
    }

    pub(crate) fn begin(&self) -> TrialState {
        if !self.values.is_empty() {
            tracing::warn!("values is not empty, consider calling reset between benchmarks");
        }

        let session = SessionConfig {
            verbose: false,
            ..self.config.session.clone()
        };
        TrialState {
            background: MemorySession::recording(session.clone()),
            foreground: TrialSession::new(MemorySession::recording(session)),
            index: 0,
            in_flight: false,
            done: false,
        }
    }

    /// Drive `state` to its next trial, finishing the previous one first
    pub(crate) fn advance(
        &mut self,
        state: &mut TrialState,
    ) -> Option<Result<TrialSession, SessionError>> {
        if state.done {
            return None;
        }

        if state.in_flight {
            if let Err(e) = self.finish_trial(state) {
                state.done = true;
                return Some(Err(e));
            }
        }

        if state.index > self.config.repeat {
            state.done = true;
            self.process_results();
            return None;
        }

        if let Err(e) = state.background.start() {
            state.done = true;
            return Some(Err(e));
        }
        state.in_flight = true;
        Some(Ok(state.foreground.clone()))
    }

    fn finish_trial(&mut self, state: &mut TrialState) -> Result<(), SessionError> {
        state.in_flight = false;
        let index = state.index;
        state.index += 1;

        let label = self.config.session.label.as_str();
        let background = state.background.stop();
        let background_records = state.background.take_records();
        let foreground_records = state.foreground.with_session(|session| {
            let records = session.take_records();
            session.reset().map(|_| records)
        });
        let background = background?;
        let foreground_records = foreground_records?;

        if index == 0 {
            collect();
            return Ok(());
        }

        if foreground_records.is_empty() {
            let value = background_records.get(label).copied().unwrap_or(background);
            self.values.push(label, value);
        } else {
            for (name, value) in foreground_records {
                self.values.push(&name, value);
            }
        }

        if self.config.session.verbose {
            let unit = self.config.session.unit;
            tracing::info!("Loop {index}: {background:.3}{unit}");
        }

        collect();
        Ok(())
    }

    fn process_results(&mut self) {
        self.results.clear();
        for (label, values) in &self.values {
            let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            self.results.insert(label, max);
        }

        let log = match self.config.mode {
            ReportMode::Log => true,
            ReportMode::Record => self.config.session.verbose,
        };
        if log {
            for line in summary_lines(&self.values, self.config.repeat, self.config.session.unit) {
                tracing::info!("{}", line);
            }
        }
    }
}

/// One summary line per label: worst value, plus mean and deviation for
/// repeated runs. Nothing when no trial completed.
fn summary_lines(values: &ValueMap<Vec<f64>>, repeat: usize, unit: MemoryUnit) -> Vec<String> {
    let width = values.labels().map(str::len).max().unwrap_or(0) + 1;
    values
        .iter()
        .filter(|(_, series)| !series.is_empty())
        .map(|(label, series)| {
            let name = format!("{}:", label);
            let stats = compute_summary(series);
            if repeat > 1 {
                format!(
                    "{name:<width$} worst {:.3}{unit} [mean {:.3} ± {:.3}{unit}]",
                    stats.max, stats.mean, stats.std_dev,
                )
            } else {
                format!("{name:<width$} worst {:.3}{unit}", stats.max)
            }
        })
        .collect()
}

/// Sessions and position of a running set of trials
#[derive(Debug)]
pub(crate) struct TrialState {
    background: MemorySession,
    foreground: TrialSession,
    index: usize,
    in_flight: bool,
    done: bool,
}

impl TrialState {
    fn abandon(&mut self) {
        if let Err(e) = self.background.reset() {
            tracing::warn!(error = %e, "failed to reset background session");
        }
        if let Err(e) = self.foreground.reset() {
            tracing::warn!(error = %e, "failed to reset trial session");
        }
    }
}

impl Drop for TrialState {
    fn drop(&mut self) {
        if self.in_flight {
            self.abandon();
        }
    }
}

/// Iterator over the trials of a [`Memit`]
#[derive(Debug)]
pub struct Trials<'a> {
    memit: &'a mut Memit,
    state: TrialState,
}

impl Iterator for Trials<'_> {
    type Item = Result<TrialSession, SessionError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.memit.advance(&mut self.state)
    }
}

impl<'a> IntoIterator for &'a mut Memit {
    type Item = Result<TrialSession, SessionError>;
    type IntoIter = Trials<'a>;

    fn into_iter(self) -> Trials<'a> {
        self.trials()
    }
}
