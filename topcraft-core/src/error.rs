//! Error types for probing, sampling and sessions.

use std::time::Duration;
use thiserror::Error;
use topcraft_ipc::FrameError;

/// Errors from the memory query primitive
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("Process {pid} no longer exists")]
    ProcessGone { pid: u32 },

    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed {path}: {reason}")]
    Parse { path: String, reason: String },

    #[error("Memory probing is not supported on this platform")]
    Unsupported,
}

/// Errors raised inside the sampler thread
#[derive(Debug, Error)]
pub enum SamplerError {
    #[error("Memory probe failed: {0}")]
    Probe(#[from] ProbeError),

    #[error("IPC error: {0}")]
    Ipc(#[from] FrameError),
}

/// Errors surfaced to the controller side
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("No measurement window is open")]
    NotStarted,

    #[error("Failed to spawn sampler: {0}")]
    SpawnFailed(std::io::Error),

    #[error("IPC error: {0}")]
    Ipc(FrameError),

    #[error("Sampler failed: {0}")]
    SamplerFailed(String),

    #[error("Timed out after {0:?} waiting for the sampler")]
    Timeout(Duration),

    #[error("Sampler protocol error: expected {expected}, got {got}")]
    ProtocolError { expected: String, got: String },

    #[error("Sampler thread panicked")]
    SamplerPanicked,
}

impl From<FrameError> for SessionError {
    fn from(e: FrameError) -> Self {
        match e {
            FrameError::EndOfStream => {
                SessionError::SamplerFailed("sampler closed the channel unexpectedly".to_string())
            }
            other => SessionError::Ipc(other),
        }
    }
}
