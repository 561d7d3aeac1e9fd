//! Where session results go.

use crate::unit::MemoryUnit;
use crate::values::ValueMap;

/// Destination for values produced by `split` and `stop`
#[derive(Debug, Clone, Default)]
pub enum Sink {
    /// Only log (when verbose)
    #[default]
    Log,
    /// Keep every value under its label, and log when verbose
    Record(ValueMap<f64>),
}

impl Sink {
    /// Fresh recording sink
    pub fn recording() -> Self {
        Sink::Record(ValueMap::new())
    }

    /// Deliver one measurement
    pub fn report(&mut self, label: &str, value: f64, unit: MemoryUnit, verbose: bool) {
        if let Sink::Record(records) = self {
            records.insert(label, value);
        }
        if verbose {
            tracing::info!("{}: {:.3}{}", label, value, unit);
        }
    }

    /// Recorded values, if this sink records
    pub fn records(&self) -> Option<&ValueMap<f64>> {
        match self {
            Sink::Record(records) => Some(records),
            Sink::Log => None,
        }
    }

    /// Take the recorded values, leaving the sink empty but still recording
    pub fn take_records(&mut self) -> ValueMap<f64> {
        match self {
            Sink::Record(records) => std::mem::take(records),
            Sink::Log => ValueMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_sink_keeps_nothing() {
        let mut sink = Sink::Log;
        sink.report("memory", 1.0, MemoryUnit::MiB, true);
        assert!(sink.records().is_none());
        assert!(sink.take_records().is_empty());
    }

    #[test]
    fn test_record_sink_overwrites_label() {
        let mut sink = Sink::recording();
        sink.report("memory", 1.0, MemoryUnit::MiB, false);
        sink.report("memory", 2.0, MemoryUnit::MiB, false);

        let records = sink.take_records();
        assert_eq!(records.get("memory"), Some(&2.0));
        assert!(sink.records().is_some_and(|r| r.is_empty()));
    }
}
