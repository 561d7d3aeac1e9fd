//! Duplex Channel
//!
//! A connected socket pair carrying frames in both directions. One endpoint
//! stays with the controller, the other moves into the sampler.

use crate::framing::{FrameError, FrameReader, FrameWriter};
use rkyv::ser::serializers::AllocSerializer;
use rkyv::validation::validators::DefaultValidator;
use rkyv::{Archive, CheckBytes, Deserialize, Infallible, Serialize};
use std::net::Shutdown;
use std::os::unix::io::{AsRawFd, RawFd};
use std::os::unix::net::UnixStream;
use std::time::Duration;

/// Result of polling for data
#[derive(Debug)]
enum PollResult {
    DataAvailable,
    Timeout,
    PeerClosed,
    Error(std::io::Error),
}

/// Wait for data to be available on a file descriptor with timeout
fn wait_for_data(fd: RawFd, timeout: Duration) -> PollResult {
    let mut pollfd = libc::pollfd {
        fd,
        events: libc::POLLIN,
        revents: 0,
    };

    // poll(2) counts whole milliseconds; round up so a short interval still waits
    let timeout_ms = if timeout.is_zero() {
        0
    } else {
        timeout.as_micros().div_ceil(1000).min(i32::MAX as u128) as i32
    };

    let result = unsafe { libc::poll(&mut pollfd, 1, timeout_ms) };

    if result < 0 {
        let err = std::io::Error::last_os_error();
        if err.kind() == std::io::ErrorKind::Interrupted {
            PollResult::Timeout
        } else {
            PollResult::Error(err)
        }
    } else if result == 0 {
        PollResult::Timeout
    } else if pollfd.revents & libc::POLLIN != 0 {
        // Even if the peer is closing there might be data left to read
        PollResult::DataAvailable
    } else if pollfd.revents & (libc::POLLERR | libc::POLLHUP | libc::POLLNVAL) != 0 {
        PollResult::PeerClosed
    } else {
        PollResult::Timeout
    }
}

/// One side of a duplex channel
pub struct Endpoint {
    reader: FrameReader<UnixStream>,
    writer: FrameWriter<UnixStream>,
    fd: RawFd,
}

/// Create a connected pair of endpoints
pub fn duplex() -> Result<(Endpoint, Endpoint), FrameError> {
    let (left, right) = UnixStream::pair()?;
    Ok((Endpoint::from_stream(left)?, Endpoint::from_stream(right)?))
}

impl Endpoint {
    fn from_stream(stream: UnixStream) -> Result<Self, FrameError> {
        let fd = stream.as_raw_fd();
        let write_half = stream.try_clone()?;
        Ok(Self {
            reader: FrameReader::new(stream),
            writer: FrameWriter::new(write_half),
            fd,
        })
    }

    /// Send a message to the peer
    pub fn send<T>(&mut self, message: &T) -> Result<(), FrameError>
    where
        T: Serialize<AllocSerializer<256>>,
    {
        self.writer.write(message)
    }

    /// Block until the next message arrives
    pub fn recv<T>(&mut self) -> Result<T, FrameError>
    where
        T: Archive,
        T::Archived: for<'a> CheckBytes<DefaultValidator<'a>> + Deserialize<T, Infallible>,
    {
        self.reader.read()
    }

    /// Wait up to `timeout` for something to read.
    ///
    /// Returns `true` when a message (or the peer's hang-up) is ready, so the
    /// following `recv` will not block indefinitely.
    pub fn poll(&mut self, timeout: Duration) -> Result<bool, FrameError> {
        if self.reader.has_buffered_data() {
            return Ok(true);
        }

        match wait_for_data(self.fd, timeout) {
            PollResult::DataAvailable | PollResult::PeerClosed => Ok(true),
            PollResult::Timeout => Ok(false),
            PollResult::Error(e) => Err(FrameError::Io(e)),
        }
    }

    /// Receive the next message, giving up after `timeout`
    pub fn recv_timeout<T>(&mut self, timeout: Duration) -> Result<T, FrameError>
    where
        T: Archive,
        T::Archived: for<'a> CheckBytes<DefaultValidator<'a>> + Deserialize<T, Infallible>,
    {
        if !self.poll(timeout)? {
            return Err(FrameError::Timeout);
        }
        self.recv()
    }

    /// Close this side; the peer observes end-of-stream
    pub fn close(self) {
        let _ = self.reader.get_ref().shutdown(Shutdown::Both);
    }
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint").field("fd", &self.fd).finish()
    }
}
