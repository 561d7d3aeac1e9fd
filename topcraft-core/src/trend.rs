//! Trend Driver
//!
//! Runs a full [`Memit`] benchmark for every point of a parameter range and
//! collects the worst value per label and point, to see how memory grows
//! with the parameter.

use crate::error::SessionError;
use crate::memit::{Memit, MemitConfig, ReportMode, TrialState};
use crate::session::{SessionConfig, TrialSession};
use crate::values::ValueMap;

/// Memory trend over a range of parameter values
///
/// ```no_run
/// use topcraft_core::MemTrend;
///
/// let mut trend = MemTrend::new((10..=100).step_by(10), 3);
/// for item in &mut trend {
///     let (n, trial) = item?;
///     trial.start()?;
///     let data = vec![0u8; n as usize * 1024];
///     trial.stop()?;
///     drop(data);
/// }
/// # Ok::<(), topcraft_core::SessionError>(())
/// ```
#[derive(Debug)]
pub struct MemTrend {
    points: Vec<i64>,
    memit: MemitConfig,
    verbose: bool,
    values: ValueMap<Vec<f64>>,
    series: ValueMap<Vec<Option<f64>>>,
    finished: usize,
}

impl MemTrend {
    /// Trend over explicit points
    pub fn new(points: impl IntoIterator<Item = i64>, repeat: usize) -> Self {
        Self::with_config(points, repeat, SessionConfig::default().verbose(false))
    }

    /// Trend over `0..count`
    pub fn with_count(count: i64, repeat: usize) -> Self {
        Self::new(0..count, repeat)
    }

    /// Trend with explicit session settings
    pub fn with_config(
        points: impl IntoIterator<Item = i64>,
        repeat: usize,
        session: SessionConfig,
    ) -> Self {
        Self {
            points: points.into_iter().collect(),
            memit: MemitConfig {
                repeat,
                session,
                mode: ReportMode::Record,
            },
            verbose: true,
            values: ValueMap::new(),
            series: ValueMap::new(),
            finished: 0,
        }
    }

    /// Log one line per finished point
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn points(&self) -> &[i64] {
        &self.points
    }

    /// Worst value per label, one entry per finished point
    pub fn values(&self) -> &ValueMap<Vec<f64>> {
        &self.values
    }

    /// Worst value per label aligned with the finished points
    ///
    /// Every row has one slot per finished point; `None` marks a point where
    /// the label was not measured.
    pub fn series(&self) -> &ValueMap<Vec<Option<f64>>> {
        &self.series
    }

    pub fn reset(&mut self) {
        self.values.clear();
        self.series.clear();
        self.finished = 0;
    }

    /// Iterate over `(point, trial)` pairs
    pub fn iter(&mut self) -> TrendPoints<'_> {
        if !self.values.is_empty() {
            tracing::warn!("values is not empty, consider calling reset between benchmarks");
        }
        TrendPoints {
            memit: Memit::with_config(self.memit.clone()),
            trend: self,
            position: 0,
            state: None,
        }
    }

    fn record_point(&mut self, point: i64, results: &ValueMap<f64>) {
        let slot = self.finished;
        self.finished += 1;
        for (label, value) in results {
            self.values.push(label, *value);
            let row = self.series.entry_or_default(label);
            row.resize(slot, None);
            row.push(Some(*value));
        }
        for row in self.series.values_mut() {
            row.resize(self.finished, None);
        }

        if self.verbose {
            let width = self
                .points
                .iter()
                .map(|p| p.to_string().len())
                .max()
                .unwrap_or(1);
            let unit = self.memit.session.unit;
            let line = results
                .iter()
                .map(|(label, value)| format!("{label}: {value:.3}{unit}"))
                .collect::<Vec<_>>()
                .join(", ");
            tracing::info!("Trend {point:>width$}: {line}");
        }
    }
}

/// Iterator over the points of a [`MemTrend`]
#[derive(Debug)]
pub struct TrendPoints<'a> {
    trend: &'a mut MemTrend,
    memit: Memit,
    position: usize,
    state: Option<TrialState>,
}

impl Iterator for TrendPoints<'_> {
    type Item = Result<(i64, TrialSession), SessionError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let point = *self.trend.points.get(self.position)?;
            let state = self.state.get_or_insert_with(|| self.memit.begin());

            match self.memit.advance(state) {
                Some(Ok(trial)) => return Some(Ok((point, trial))),
                Some(Err(e)) => {
                    self.state = None;
                    self.position = self.trend.points.len();
                    return Some(Err(e));
                }
                None => {
                    self.state = None;
                    self.trend.record_point(point, self.memit.results());
                    self.memit.reset();
                    self.position += 1;
                }
            }
        }
    }
}

impl<'a> IntoIterator for &'a mut MemTrend {
    type Item = Result<(i64, TrialSession), SessionError>;
    type IntoIter = TrendPoints<'a>;

    fn into_iter(self) -> TrendPoints<'a> {
        self.iter()
    }
}
