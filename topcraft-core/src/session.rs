//! Memory Session
//!
//! A session owns at most one sampler at a time. `start` opens a measurement
//! window, `split` closes it and opens the next without a gap, `stop` closes
//! the last window and joins the sampler.
//!
//! Sessions can also bracket a scope ([`MemorySession::enter`],
//! [`MemorySession::scope`]) or a single call ([`MemorySession::call`]).

use crate::DEFAULT_LABEL;
use crate::collector::collect;
use crate::error::SessionError;
use crate::probe::MemoryBackend;
use crate::sampler::{DEFAULT_REPLY_TIMEOUT, SamplerConfig, SamplerHandle};
use crate::sink::Sink;
use crate::unit::MemoryUnit;
use crate::values::ValueMap;
use std::cell::RefCell;
use std::ops::{Deref, DerefMut};
use std::rc::Rc;
use std::time::Duration;

/// Session configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Display unit for reported values
    pub unit: MemoryUnit,
    /// Label used for reports
    pub label: String,
    /// Log every reported value
    pub verbose: bool,
    /// Longest wait for a control code between two samples
    pub poll_interval: Duration,
    /// Count descendants of the target
    pub include_children: bool,
    /// Process to observe (`None` = this process)
    pub target_pid: Option<u32>,
    /// Upper bound on every wait for the sampler
    pub reply_timeout: Duration,
    /// Force a memory backend instead of auto-detecting
    pub backend: Option<MemoryBackend>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            unit: MemoryUnit::MiB,
            label: DEFAULT_LABEL.to_string(),
            verbose: true,
            poll_interval: Duration::ZERO,
            include_children: true,
            target_pid: None,
            reply_timeout: DEFAULT_REPLY_TIMEOUT,
            backend: None,
        }
    }
}

impl SessionConfig {
    /// Set the unit from a loose name; unknown names fall back to MiB
    pub fn unit_name(mut self, name: &str) -> Self {
        self.unit = MemoryUnit::from_name_lossy(name);
        self
    }

    /// Set the report label
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Enable or disable logging of reported values
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Set the sampler's poll interval
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    fn sampler_config(&self) -> SamplerConfig {
        SamplerConfig {
            target_pid: self.target_pid.unwrap_or_else(std::process::id),
            poll_interval: self.poll_interval,
            include_children: self.include_children,
            backend: self.backend,
        }
    }
}

/// Start/split/stop memory measurement around arbitrary code.
///
/// ```no_run
/// use topcraft_core::{MemorySession, SessionConfig};
///
/// let mut mem = MemorySession::new(SessionConfig::default());
/// mem.start()?;
/// let buffer = vec![1u8; 16 << 20];
/// mem.split()?;
/// drop(buffer);
/// mem.stop()?;
/// # Ok::<(), topcraft_core::SessionError>(())
/// ```
#[derive(Debug)]
pub struct MemorySession {
    config: SessionConfig,
    sink: Sink,
    sampler: Option<SamplerHandle>,
    value: Option<f64>,
    splits: usize,
}

impl Default for MemorySession {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}

impl MemorySession {
    /// Session that logs its values
    pub fn new(config: SessionConfig) -> Self {
        Self::with_sink(config, Sink::Log)
    }

    /// Session that records its values under their labels
    pub fn recording(config: SessionConfig) -> Self {
        Self::with_sink(config, Sink::recording())
    }

    /// Session reporting to an explicit sink
    pub fn with_sink(config: SessionConfig, sink: Sink) -> Self {
        Self {
            config,
            sink,
            sampler: None,
            value: None,
            splits: 0,
        }
    }

    /// Open a measurement window, closing any previous one unrecorded
    pub fn start(&mut self) -> Result<(), SessionError> {
        self.reset()?;
        let handle =
            SamplerHandle::spawn(&self.config.sampler_config(), self.config.reply_timeout)?;
        self.sampler = Some(handle);
        Ok(())
    }

    /// Close the current window and open the next one
    pub fn split(&mut self) -> Result<f64, SessionError> {
        let sampler = self.sampler.as_mut().ok_or(SessionError::NotStarted)?;
        collect();

        let raw = match sampler.split() {
            Ok(raw) => raw,
            Err(e) => {
                self.sampler = None;
                return Err(e);
            }
        };

        self.splits += 1;
        let value = self.config.unit.from_mebibytes(raw);
        let label = format!("{} {}", self.config.label, self.splits);
        self.sink
            .report(&label, value, self.config.unit, self.config.verbose);
        Ok(value)
    }

    /// Close the last window and shut the sampler down
    pub fn stop(&mut self) -> Result<f64, SessionError> {
        let sampler = self.sampler.take().ok_or(SessionError::NotStarted)?;
        collect();

        let value = self.config.unit.from_mebibytes(sampler.stop()?);
        self.value = Some(value);

        let label = if self.splits == 0 {
            self.config.label.clone()
        } else {
            format!("{} {}", self.config.label, self.splits + 1)
        };
        self.sink
            .report(&label, value, self.config.unit, self.config.verbose);
        Ok(value)
    }

    /// Drop any open window without reporting and clear state.
    ///
    /// Calling this on an idle session only clears state.
    pub fn reset(&mut self) -> Result<(), SessionError> {
        self.value = None;
        self.splits = 0;
        match self.sampler.take() {
            Some(sampler) => sampler.stop().map(|_| ()),
            None => Ok(()),
        }
    }

    /// Open a window that closes when the guard is dropped
    pub fn enter(&mut self) -> Result<SessionGuard<'_>, SessionError> {
        self.start()?;
        Ok(SessionGuard { session: self })
    }

    /// Measure `f`. The window is closed even if `f` panics.
    pub fn scope<T>(
        &mut self,
        f: impl FnOnce(&mut MemorySession) -> T,
    ) -> Result<T, SessionError> {
        let mut guard = self.enter()?;
        let out = f(&mut *guard);
        guard.finish()?;
        Ok(out)
    }

    /// Measure one call of `f`, labelled with its name and always logged
    pub fn call<T, F: FnOnce() -> T>(&mut self, f: F) -> Result<T, SessionError> {
        let name = short_type_name::<F>();
        self.call_labeled(name, f)
    }

    /// Measure one call of `f` under an explicit label, always logged.
    /// The previous label and verbosity come back even if `f` panics.
    pub fn call_labeled<T>(
        &mut self,
        name: &str,
        f: impl FnOnce() -> T,
    ) -> Result<T, SessionError> {
        let mut relabeled = Relabeled::new(self, name);
        relabeled.session.scope(|_| f())
    }

    /// Value of the last completed window
    pub fn value(&self) -> Option<f64> {
        self.value
    }

    /// Splits taken in the current window
    pub fn splits(&self) -> usize {
        self.splits
    }

    pub fn unit(&self) -> MemoryUnit {
        self.config.unit
    }

    /// Multiplier from MiB to the display unit
    pub fn unit_factor(&self) -> f64 {
        self.config.unit.factor()
    }

    pub fn label(&self) -> &str {
        &self.config.label
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Recorded values, for recording sessions
    pub fn records(&self) -> Option<&ValueMap<f64>> {
        self.sink.records()
    }

    /// Take the recorded values, leaving the session recording into an empty map
    pub fn take_records(&mut self) -> ValueMap<f64> {
        self.sink.take_records()
    }

    /// Whether a window is open
    pub fn is_running(&self) -> bool {
        self.sampler.is_some()
    }
}

impl Drop for MemorySession {
    fn drop(&mut self) {
        if let Err(e) = self.reset() {
            tracing::warn!(error = %e, "failed to reset memory session on drop");
        }
    }
}

/// Last path segment of a type name, skipping closure markers and generics
fn short_type_name<T>() -> &'static str {
    let full = std::any::type_name::<T>();
    let path = full.split('<').next().unwrap_or(full);
    path.rsplit("::")
        .find(|segment| !segment.is_empty() && !segment.starts_with('{'))
        .unwrap_or(path)
}

/// Temporary label and forced logging; the old settings return on drop
struct Relabeled<'a> {
    session: &'a mut MemorySession,
    label: String,
    verbose: bool,
}

impl<'a> Relabeled<'a> {
    fn new(session: &'a mut MemorySession, name: &str) -> Self {
        let label = std::mem::replace(&mut session.config.label, name.to_string());
        let verbose = std::mem::replace(&mut session.config.verbose, true);
        Self {
            session,
            label,
            verbose,
        }
    }
}

impl Drop for Relabeled<'_> {
    fn drop(&mut self) {
        self.session.config.label = std::mem::take(&mut self.label);
        self.session.config.verbose = self.verbose;
    }
}

/// Open window on a borrowed session; dropping it stops the window
pub struct SessionGuard<'a> {
    session: &'a mut MemorySession,
}

impl SessionGuard<'_> {
    /// Stop the window and return its value
    pub fn finish(self) -> Result<f64, SessionError> {
        self.session.stop()
    }
}

impl Deref for SessionGuard<'_> {
    type Target = MemorySession;

    fn deref(&self) -> &MemorySession {
        self.session
    }
}

impl DerefMut for SessionGuard<'_> {
    fn deref_mut(&mut self) -> &mut MemorySession {
        self.session
    }
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        if self.session.is_running() {
            if let Err(e) = self.session.stop() {
                tracing::warn!(error = %e, "failed to stop memory session");
            }
        }
    }
}

/// Shared handle to the foreground session of a trial.
///
/// Handles are cheap to clone; all of them drive the same session.
#[derive(Debug, Clone)]
pub struct TrialSession {
    inner: Rc<RefCell<MemorySession>>,
}

impl TrialSession {
    pub(crate) fn new(session: MemorySession) -> Self {
        Self {
            inner: Rc::new(RefCell::new(session)),
        }
    }

    pub(crate) fn with_session<T>(&self, f: impl FnOnce(&mut MemorySession) -> T) -> T {
        f(&mut self.inner.borrow_mut())
    }

    pub fn start(&self) -> Result<(), SessionError> {
        self.inner.borrow_mut().start()
    }

    pub fn split(&self) -> Result<f64, SessionError> {
        self.inner.borrow_mut().split()
    }

    pub fn stop(&self) -> Result<f64, SessionError> {
        self.inner.borrow_mut().stop()
    }

    pub fn reset(&self) -> Result<(), SessionError> {
        self.inner.borrow_mut().reset()
    }

    /// Open a window that closes when the guard is dropped
    pub fn enter(&self) -> Result<TrialGuard, SessionError> {
        self.start()?;
        Ok(TrialGuard {
            session: self.clone(),
        })
    }

    /// Measure `f` in its own window; `f` may split through the handle
    pub fn scope<T>(&self, f: impl FnOnce(&TrialSession) -> T) -> Result<T, SessionError> {
        let guard = self.enter()?;
        let out = f(self);
        guard.finish()?;
        Ok(out)
    }

    pub fn value(&self) -> Option<f64> {
        self.inner.borrow().value()
    }

    pub fn splits(&self) -> usize {
        self.inner.borrow().splits()
    }

    pub fn unit(&self) -> MemoryUnit {
        self.inner.borrow().unit()
    }

    pub fn label(&self) -> String {
        self.inner.borrow().label().to_string()
    }

    pub fn is_running(&self) -> bool {
        self.inner.borrow().is_running()
    }
}

/// Open window on a trial session; dropping it stops the window
#[derive(Debug)]
pub struct TrialGuard {
    session: TrialSession,
}

impl TrialGuard {
    pub fn split(&self) -> Result<f64, SessionError> {
        self.session.split()
    }

    /// Stop the window and return its value
    pub fn finish(self) -> Result<f64, SessionError> {
        self.session.stop()
    }
}

impl Drop for TrialGuard {
    fn drop(&mut self) {
        let Ok(mut session) = self.session.inner.try_borrow_mut() else {
            return;
        };
        if session.is_running() {
            if let Err(e) = session.stop() {
                tracing::warn!(error = %e, "failed to stop trial session");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiet() -> SessionConfig {
        SessionConfig::default()
            .verbose(false)
            .poll_interval(Duration::from_millis(1))
    }

    fn named_function() -> u32 {
        7
    }

    #[test]
    fn test_short_type_name() {
        fn name_of<F>(_: &F) -> &'static str {
            short_type_name::<F>()
        }
        assert_eq!(name_of(&named_function), "named_function");
        assert_eq!(short_type_name::<Vec<u8>>(), "Vec");
        let closure = || 1;
        assert_eq!(name_of(&closure), "test_short_type_name");
    }

    #[test]
    fn test_unknown_unit_falls_back() {
        let session = MemorySession::new(SessionConfig::default().unit_name("petabytes"));
        assert_eq!(session.unit(), MemoryUnit::MiB);
        assert_eq!(session.unit_factor(), 1.0);

        let session = MemorySession::new(SessionConfig::default().unit_name("KB"));
        assert_eq!(session.unit_factor(), 1024.0);
    }

    #[test]
    fn test_split_and_stop_without_start() {
        let mut session = MemorySession::new(quiet());
        assert!(matches!(session.split(), Err(SessionError::NotStarted)));
        assert!(matches!(session.stop(), Err(SessionError::NotStarted)));
    }

    #[test]
    fn test_reset_is_idempotent() {
        let mut session = MemorySession::new(quiet());
        session.reset().unwrap();
        session.reset().unwrap();
        assert!(!session.is_running());
        assert!(session.value().is_none());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_recorded_labels() {
        let mut session = MemorySession::recording(quiet());
        session.start().unwrap();
        session.split().unwrap();
        session.split().unwrap();
        session.stop().unwrap();

        let records = session.take_records();
        let labels: Vec<_> = records.labels().collect();
        assert_eq!(labels, ["memory 1", "memory 2", "memory 3"]);
        assert!(records.iter().all(|(_, v)| *v >= 0.0));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_unsplit_window_uses_plain_label() {
        let mut session = MemorySession::recording(quiet().label("alloc"));
        session.start().unwrap();
        let value = session.stop().unwrap();

        assert_eq!(session.value(), Some(value));
        assert_eq!(session.records().unwrap().get("alloc"), Some(&value));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_start_restarts_open_window() {
        let mut session = MemorySession::recording(quiet());
        session.start().unwrap();
        session.split().unwrap();
        session.start().unwrap();
        assert_eq!(session.splits(), 0);
        session.stop().unwrap();
        assert!(session.records().unwrap().get("memory").is_some());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_guard_stops_on_drop() {
        let mut session = MemorySession::recording(quiet());
        {
            let mut guard = session.enter().unwrap();
            guard.split().unwrap();
        }
        assert!(!session.is_running());
        assert_eq!(session.records().unwrap().len(), 2);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_scope_stops_on_panic() {
        let mut session = MemorySession::recording(quiet());
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _ = session.scope::<()>(|_| panic!("boom"));
        }));
        assert!(result.is_err());
        assert!(!session.is_running());
        assert!(session.records().unwrap().get("memory").is_some());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_call_restores_label_and_verbosity() {
        let mut session = MemorySession::recording(quiet());
        let out = session.call(named_function).unwrap();

        assert_eq!(out, 7);
        assert_eq!(session.label(), "memory");
        assert!(!session.config().verbose);
        assert!(session.records().unwrap().get("named_function").is_some());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_call_labeled_restores_label_after_panic() {
        let mut session = MemorySession::recording(quiet());
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _ = session.call_labeled::<()>("exploding", || panic!("boom"));
        }));

        assert!(result.is_err());
        assert!(!session.is_running());
        assert_eq!(session.label(), "memory");
        assert!(!session.config().verbose);
        assert!(session.records().unwrap().get("exploding").is_some());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_trial_session_guard() {
        let trial = TrialSession::new(MemorySession::recording(quiet()));
        {
            let guard = trial.enter().unwrap();
            guard.split().unwrap();
        }
        assert!(!trial.is_running());
        let count = trial.with_session(|s| s.records().map(ValueMap::len));
        assert_eq!(count, Some(2));
    }
}
