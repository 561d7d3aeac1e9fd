//! Integration tests for topcraft
//!
//! These tests drive real sampler threads against this test process, so they
//! only run on Linux.

#![cfg(target_os = "linux")]

use std::hint::black_box;
use std::process::Command;
use std::time::Duration;
use topcraft::{
    CollectorToggle, MemTrend, Memit, MemitConfig, MemorySession, MemoryUnit, ReportMode,
    SessionConfig, SessionError, collector_enabled,
};

const MIB: usize = 1 << 20;

fn quiet() -> SessionConfig {
    SessionConfig::default()
        .verbose(false)
        .poll_interval(Duration::from_millis(1))
}

/// Allocate and touch every page so it shows up in resident memory
fn touched_buffer(mebibytes: usize) -> Vec<u8> {
    black_box(vec![1u8; mebibytes * MIB])
}

/// Split while holding 50 MiB, stop after releasing it
#[test]
fn test_split_sees_allocation_and_stop_sees_release() {
    let mut session = MemorySession::new(quiet().unit_name("mb"));
    session.start().unwrap();

    let buffer = touched_buffer(50);
    let held = session.split().unwrap();
    drop(buffer);
    let released = session.stop().unwrap();

    assert!((42.0..=60.0).contains(&held), "split reported {held}");
    assert!(released < 5.0, "stop reported {released}");
}

/// With a positive poll interval the stop reply still carries the peak of a
/// buffer that was freed before stop
#[test]
fn test_stop_keeps_peak_of_freed_buffer() {
    for interval in [Duration::from_millis(1), Duration::from_millis(5)] {
        let mut session = MemorySession::new(quiet().poll_interval(interval));
        session.start().unwrap();

        let buffer = touched_buffer(40);
        std::thread::sleep(Duration::from_millis(30));
        drop(buffer);
        let peak = session.stop().unwrap();

        assert!(peak >= 0.0, "{interval:?}: stop reported {peak}");
        assert!(
            (32.0..=50.0).contains(&peak),
            "{interval:?}: stop reported {peak}"
        );
    }
}

/// N splits followed by a stop record exactly N + 1 non-negative values
#[test]
fn test_splits_record_n_plus_one_values() {
    let mut session = MemorySession::recording(quiet());
    session.start().unwrap();
    for _ in 0..3 {
        session.split().unwrap();
    }
    session.stop().unwrap();

    let records = session.take_records();
    assert_eq!(records.len(), 4);
    assert_eq!(records.labels().last(), Some("memory 4"));
    assert!(records.iter().all(|(_, value)| *value >= 0.0));
}

#[test]
fn test_reset_twice_is_noop() {
    let mut session = MemorySession::new(quiet());
    session.start().unwrap();
    session.reset().unwrap();
    session.reset().unwrap();
    assert!(!session.is_running());
    assert_eq!(session.splits(), 0);
}

/// Warm-up iteration is yielded but never recorded
#[test]
fn test_memit_yields_warmup_but_records_repeat() {
    let mut memit = Memit::with_config(MemitConfig {
        repeat: 5,
        session: quiet(),
        mode: ReportMode::Log,
    });

    let mut handles = 0;
    for trial in &mut memit {
        let _trial = trial.unwrap();
        black_box(vec![0u8; 1024]);
        handles += 1;
    }

    assert_eq!(handles, 6);
    assert_eq!(memit.values().get("memory").map(Vec::len), Some(5));
    assert_eq!(memit.results().len(), 1);
}

/// A target killed between start and split must surface an error, not a number
#[test]
fn test_killed_target_is_fatal() {
    let mut child = Command::new("sleep").arg("30").spawn().unwrap();
    let mut config = quiet();
    config.target_pid = Some(child.id());
    config.include_children = false;

    let mut session = MemorySession::new(config);
    session.start().unwrap();

    child.kill().unwrap();
    child.wait().unwrap();

    let result = session.split();
    assert!(
        matches!(result, Err(SessionError::SamplerFailed(_))),
        "got {result:?}"
    );
    assert!(!session.is_running());
}

#[test]
fn test_unknown_unit_uses_mib() {
    let session = MemorySession::new(SessionConfig::default().unit_name("petabytes"));
    assert_eq!(session.unit_factor(), 1.0);
    assert_eq!(session.unit(), MemoryUnit::MiB);
}

#[test]
fn test_kib_round_trip() {
    let raw = 12.345;
    let unit = MemoryUnit::KiB;
    let shown = unit.from_mebibytes(raw);
    assert!((shown / unit.factor() - raw).abs() < 1e-9);
    assert!((unit.to_mebibytes(shown) - raw).abs() < 1e-9);
}

/// Errors from the measured code still stop the window, then propagate
#[test]
fn test_scope_stops_before_error_propagates() {
    let mut session = MemorySession::recording(quiet());
    let result = session.scope(|_| -> Result<(), &'static str> { Err("boom") });

    assert_eq!(result.unwrap(), Err("boom"));
    assert!(!session.is_running());
    assert!(session.records().unwrap().get("memory").is_some());
}

fn build_lookup_table() -> usize {
    black_box((0..10_000u64).collect::<Vec<_>>()).len()
}

#[test]
fn test_call_labels_with_function_name() {
    let mut session = MemorySession::recording(quiet().label("outer"));
    let len = session.call(build_lookup_table).unwrap();

    assert_eq!(len, 10_000);
    let records = session.records().unwrap();
    assert!(records.get("build_lookup_table").is_some());
    assert_eq!(session.label(), "outer");
}

#[test]
fn test_trend_accumulates_across_points() {
    let mut trend = MemTrend::with_config([1, 2], 1, quiet()).verbose(false);
    let mut last_point = 0;
    for item in &mut trend {
        let (point, trial) = item.unwrap();
        trial
            .scope(|_| black_box(vec![0u8; point as usize * 1024]))
            .unwrap();
        last_point = point;
    }

    assert_eq!(last_point, 2);
    assert_eq!(trend.values().get("memory").map(Vec::len), Some(2));
}

#[test]
fn test_collector_toggle_restores() {
    let before = collector_enabled();
    CollectorToggle::disable().run(|| assert!(!collector_enabled()));
    assert_eq!(collector_enabled(), before);
}
