//! IPC Message Types
//!
//! All messages are serialized with rkyv for zero-copy validation on receipt.

use rkyv::{Archive, Deserialize as RkyvDeserialize, Serialize as RkyvSerialize};

/// Control codes sent from the controller to the sampler.
///
/// The sampler acts on a code one loop iteration after receiving it, so the
/// reply always reflects a sample taken after the code was observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Archive, RkyvSerialize, RkyvDeserialize)]
#[archive(check_bytes)]
pub enum ControlCode {
    /// Close the current split window and open the next one
    Split,
    /// Report the final window and terminate
    Stop,
}

/// Which memory metric the sampler reads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Archive, RkyvSerialize, RkyvDeserialize)]
#[archive(check_bytes)]
pub enum MemoryBackendKind {
    /// Unique set size: private pages only
    Uss,
    /// Resident set size
    Rss,
}

impl MemoryBackendKind {
    /// Short lowercase name used in logs and configuration
    pub fn as_str(self) -> &'static str {
        match self {
            MemoryBackendKind::Uss => "uss",
            MemoryBackendKind::Rss => "rss",
        }
    }
}

/// Sampler description sent with the start acknowledgement
#[derive(Debug, Clone, Archive, RkyvSerialize, RkyvDeserialize)]
#[archive(check_bytes)]
pub struct SamplerInfo {
    /// Protocol version for compatibility
    pub protocol_version: u32,
    /// Memory metric in use
    pub backend: MemoryBackendKind,
    /// Process being observed
    pub target_pid: u32,
    /// Whether descendants of the target are included
    pub include_children: bool,
}

/// Categories of fatal sampler conditions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Archive, RkyvSerialize, RkyvDeserialize)]
#[archive(check_bytes)]
pub enum FailureKind {
    /// The observed process no longer exists
    ProcessGone,
    /// The memory query failed for another reason
    Probe,
    /// Any other sampler error, such as a garbled control frame
    Unknown,
}

/// Messages sent from the sampler to the controller
#[derive(Debug, Clone, Archive, RkyvSerialize, RkyvDeserialize)]
#[archive(check_bytes)]
pub enum SamplerMessage {
    /// Start acknowledgement, sent once the baseline is taken
    Started(SamplerInfo),

    /// Peak memory of the closed window minus its baseline
    Delta {
        /// Delta in MiB, never negative
        mebibytes: f64,
    },

    /// The sampler hit a fatal condition and is exiting
    Failure {
        /// Error category
        kind: FailureKind,
        /// Human-readable error message
        message: String,
    },
}

impl SamplerMessage {
    /// Short name of the message variant, for protocol errors
    pub fn kind_name(&self) -> &'static str {
        match self {
            SamplerMessage::Started(_) => "Started",
            SamplerMessage::Delta { .. } => "Delta",
            SamplerMessage::Failure { .. } => "Failure",
        }
    }
}
