//! topcraft Memory Demo
//!
//! Run with:
//!   cargo run --example memory
//!   RUST_LOG=topcraft_core=debug cargo run --example memory

use std::hint::black_box;
use topcraft::prelude::*;

fn build_index() -> Vec<u64> {
    black_box((0..2_000_000).collect())
}

fn main() -> Result<(), SessionError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "topcraft_core=info".into()),
        )
        .init();

    // Explicit windows
    let mut session = mem();
    session.start()?;
    let buffer = black_box(vec![1u8; 32 << 20]);
    session.split()?;
    drop(buffer);
    session.stop()?;

    // Scoped window and a wrapped call
    session.scope(|s| {
        let _grow = black_box(vec![1u8; 8 << 20]);
        s.split()
    })??;
    session.call(build_index)?;

    // Repeated trials with explicit labels
    let mut bench = Memit::with_config(MemitConfig {
        repeat: 5,
        session: SessionConfig::default().verbose(true).label("parse"),
        ..Default::default()
    });
    for trial in &mut bench {
        let trial = trial?;
        trial.start()?;
        let raw = black_box(vec![7u8; 4 << 20]);
        trial.split()?;
        let _parsed: Vec<u32> = black_box(raw.iter().map(|&b| b as u32).collect());
        trial.stop()?;
    }

    // Memory growth with input size
    let mut trend = mem_trend((1..=4).map(|i| i * 4), 2);
    for item in &mut trend {
        let (size, _trial) = item?;
        black_box(vec![1u8; (size as usize) << 20]);
    }

    Ok(())
}
