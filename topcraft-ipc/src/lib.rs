#![warn(missing_docs)]
//! TOPCraft IPC Protocol
//!
//! Duplex channel between a memory session (the controller) and its sampler.
//! Messages are rkyv-archived, length-prefixed frames carried over a connected
//! socket pair, with `poll(2)` readiness checks so either side can wait for a
//! message with a bounded timeout.

mod channel;
mod framing;
mod messages;

pub use channel::{Endpoint, duplex};
pub use framing::{FrameError, FrameReader, FrameWriter, MAX_FRAME_SIZE, read_frame, write_frame};
pub use messages::{ControlCode, FailureKind, MemoryBackendKind, SamplerInfo, SamplerMessage};

/// Protocol version for compatibility checking
pub const PROTOCOL_VERSION: u32 = 1;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_limit_is_generous_for_control_traffic() {
        // A delta frame is a few dozen bytes; the cap only guards against garbage prefixes
        assert!(MAX_FRAME_SIZE >= 64 * 1024);
        assert_eq!(PROTOCOL_VERSION, 1);
    }
}
