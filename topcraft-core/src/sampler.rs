//! Sampler Thread
//!
//! The sampler polls the target's memory in a loop and answers control codes
//! from the controller over a duplex channel:
//!
//! 1. Take a baseline sample, acknowledge with `Started`.
//! 2. Each iteration: sample, update the peak, act on the code received in the
//!    previous iteration, then wait up to `poll_interval` for the next code.
//! 3. `Split` replies with the window's delta and re-baselines immediately,
//!    `Stop` replies with the final delta and ends the thread.
//!
//! Acting one iteration late guarantees every reply includes a sample taken
//! after the code arrived.

use crate::error::{ProbeError, SamplerError, SessionError};
use crate::probe::{MemoryBackend, MemoryProbe};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use topcraft_ipc::{
    ControlCode, Endpoint, FailureKind, FrameError, PROTOCOL_VERSION, SamplerInfo, SamplerMessage,
    duplex,
};

/// Default upper bound on how long the controller waits for any reply
pub const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(60);

/// What the sampler observes and how often
#[derive(Debug, Clone)]
pub struct SamplerConfig {
    /// Process to observe
    pub target_pid: u32,
    /// Longest wait for a control code between two samples
    pub poll_interval: Duration,
    /// Sum the memory of all descendants into each sample
    pub include_children: bool,
    /// Force a backend instead of auto-detecting
    pub backend: Option<MemoryBackend>,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            target_pid: std::process::id(),
            poll_interval: Duration::ZERO,
            include_children: true,
            backend: None,
        }
    }
}

impl SamplerConfig {
    fn probe(&self) -> MemoryProbe {
        match self.backend {
            Some(backend) => {
                MemoryProbe::with_backend(self.target_pid, self.include_children, backend)
            }
            None => MemoryProbe::new(self.target_pid, self.include_children),
        }
    }
}

/// Sampler side of the channel, owned by the background thread
struct Sampler {
    probe: MemoryProbe,
    poll_interval: Duration,
    endpoint: Endpoint,
}

impl Sampler {
    fn run(mut self) -> Result<(), SamplerError> {
        match self.observe() {
            Ok(()) => Ok(()),
            Err(SamplerError::Probe(e)) => {
                let kind = match e {
                    ProbeError::ProcessGone { .. } => FailureKind::ProcessGone,
                    _ => FailureKind::Probe,
                };
                tracing::debug!(pid = self.probe.pid(), error = %e, "sampler aborting");
                let _ = self.endpoint.send(&SamplerMessage::Failure {
                    kind,
                    message: e.to_string(),
                });
                Err(SamplerError::Probe(e))
            }
            Err(SamplerError::Ipc(e)) if controller_gone(&e) => {
                tracing::debug!("controller hung up, sampler exiting");
                Ok(())
            }
            Err(e) => {
                tracing::debug!(error = %e, "sampler failed");
                let _ = self.endpoint.send(&SamplerMessage::Failure {
                    kind: FailureKind::Unknown,
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    fn observe(&mut self) -> Result<(), SamplerError> {
        let mut baseline = self.probe.sample()?;
        let mut peak = 0.0_f64;
        let mut pending: Option<ControlCode> = None;

        self.endpoint.send(&SamplerMessage::Started(SamplerInfo {
            protocol_version: PROTOCOL_VERSION,
            backend: self.probe.backend(),
            target_pid: self.probe.pid(),
            include_children: self.probe.include_children(),
        }))?;

        loop {
            let mem = self.probe.sample()?;
            peak = peak.max(mem);

            match pending.take() {
                Some(ControlCode::Stop) => break,
                Some(ControlCode::Split) => {
                    self.endpoint.send(&SamplerMessage::Delta {
                        mebibytes: (peak - baseline).max(0.0),
                    })?;
                    baseline = self.probe.sample()?;
                    peak = 0.0;
                }
                None => {}
            }

            if self.endpoint.poll(self.poll_interval)? {
                pending = Some(self.endpoint.recv::<ControlCode>()?);
            }
        }

        self.endpoint.send(&SamplerMessage::Delta {
            mebibytes: (peak - baseline).max(0.0),
        })?;
        Ok(())
    }
}

fn controller_gone(e: &FrameError) -> bool {
    match e {
        FrameError::EndOfStream => true,
        FrameError::Io(io) => matches!(
            io.kind(),
            std::io::ErrorKind::BrokenPipe | std::io::ErrorKind::ConnectionReset
        ),
        _ => false,
    }
}

/// Controller side of a running sampler.
///
/// Dropping the handle closes the channel and joins the thread, so a sampler
/// never outlives its handle.
pub struct SamplerHandle {
    endpoint: Option<Endpoint>,
    thread: Option<JoinHandle<Result<(), SamplerError>>>,
    info: Option<SamplerInfo>,
    reply_timeout: Duration,
}

impl SamplerHandle {
    /// Spawn a sampler thread and wait for its start acknowledgement
    pub fn spawn(config: &SamplerConfig, reply_timeout: Duration) -> Result<Self, SessionError> {
        let (controller, sampler_end) = duplex()?;
        let sampler = Sampler {
            probe: config.probe(),
            poll_interval: config.poll_interval,
            endpoint: sampler_end,
        };

        let thread = thread::Builder::new()
            .name("topcraft-sampler".to_string())
            .spawn(move || sampler.run())
            .map_err(SessionError::SpawnFailed)?;

        let mut handle = Self {
            endpoint: Some(controller),
            thread: Some(thread),
            info: None,
            reply_timeout,
        };
        handle.wait_for_start()?;
        Ok(handle)
    }

    fn wait_for_start(&mut self) -> Result<(), SessionError> {
        match self.receive()? {
            SamplerMessage::Started(info) => {
                if info.protocol_version != PROTOCOL_VERSION {
                    return Err(SessionError::ProtocolError {
                        expected: format!("protocol version {}", PROTOCOL_VERSION),
                        got: format!("protocol version {}", info.protocol_version),
                    });
                }
                tracing::debug!(
                    pid = info.target_pid,
                    backend = info.backend.as_str(),
                    children = info.include_children,
                    "sampler started"
                );
                self.info = Some(info);
                Ok(())
            }
            SamplerMessage::Failure { message, .. } => Err(SessionError::SamplerFailed(message)),
            other => Err(SessionError::ProtocolError {
                expected: "Started".to_string(),
                got: other.kind_name().to_string(),
            }),
        }
    }

    /// Description sent by the sampler when it started
    pub fn info(&self) -> Option<&SamplerInfo> {
        self.info.as_ref()
    }

    /// Close the current window and open the next; returns the delta in MiB
    pub fn split(&mut self) -> Result<f64, SessionError> {
        self.request(ControlCode::Split)
    }

    /// Close the last window and join the sampler; returns the delta in MiB
    pub fn stop(mut self) -> Result<f64, SessionError> {
        let result = self.request(ControlCode::Stop);
        let panicked = self.shutdown();
        match result {
            Err(_) if panicked => Err(SessionError::SamplerPanicked),
            other => other,
        }
    }

    fn request(&mut self, code: ControlCode) -> Result<f64, SessionError> {
        let endpoint = self.endpoint.as_mut().ok_or(SessionError::NotStarted)?;

        if let Err(send_err) = endpoint.send(&code) {
            // A sampler that died first may have left its reason behind
            return match endpoint.recv_timeout::<SamplerMessage>(Duration::ZERO) {
                Ok(SamplerMessage::Failure { message, .. }) => {
                    Err(SessionError::SamplerFailed(message))
                }
                _ => Err(send_err.into()),
            };
        }

        match self.receive()? {
            SamplerMessage::Delta { mebibytes } => Ok(mebibytes),
            SamplerMessage::Failure { message, .. } => Err(SessionError::SamplerFailed(message)),
            other => Err(SessionError::ProtocolError {
                expected: "Delta".to_string(),
                got: other.kind_name().to_string(),
            }),
        }
    }

    fn receive(&mut self) -> Result<SamplerMessage, SessionError> {
        let endpoint = self.endpoint.as_mut().ok_or(SessionError::NotStarted)?;
        match endpoint.recv_timeout::<SamplerMessage>(self.reply_timeout) {
            Ok(message) => Ok(message),
            Err(FrameError::Timeout) => Err(SessionError::Timeout(self.reply_timeout)),
            Err(e) => Err(e.into()),
        }
    }

    /// Close the channel, then join. The order matters: a sampler blocked on
    /// a full channel could never be joined.
    /// Returns `true` if the sampler thread panicked.
    fn shutdown(&mut self) -> bool {
        if let Some(endpoint) = self.endpoint.take() {
            endpoint.close();
        }
        match self.thread.take().map(JoinHandle::join) {
            Some(Ok(Err(e))) => {
                tracing::debug!(error = %e, "sampler exited with error");
                false
            }
            Some(Err(_)) => {
                tracing::warn!("sampler thread panicked");
                true
            }
            _ => false,
        }
    }
}

impl Drop for SamplerHandle {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}

impl std::fmt::Debug for SamplerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SamplerHandle")
            .field("info", &self.info)
            .field("reply_timeout", &self.reply_timeout)
            .finish()
    }
}

#[cfg(all(test, target_os = "linux"))]
mod tests {
    use super::*;
    use std::process::Command;

    fn fast_config() -> SamplerConfig {
        SamplerConfig {
            poll_interval: Duration::from_millis(1),
            ..Default::default()
        }
    }

    #[test]
    fn test_start_then_stop() {
        let handle = SamplerHandle::spawn(&fast_config(), DEFAULT_REPLY_TIMEOUT).unwrap();
        let info = handle.info().unwrap();
        assert_eq!(info.target_pid, std::process::id());
        assert_eq!(info.protocol_version, PROTOCOL_VERSION);

        let delta = handle.stop().unwrap();
        assert!(delta >= 0.0);
    }

    #[test]
    fn test_splits_are_non_negative() {
        let mut handle = SamplerHandle::spawn(&fast_config(), DEFAULT_REPLY_TIMEOUT).unwrap();
        for _ in 0..3 {
            assert!(handle.split().unwrap() >= 0.0);
        }
        assert!(handle.stop().unwrap() >= 0.0);
    }

    #[test]
    fn test_vanished_target_fails_loudly() {
        let mut child = Command::new("sleep").arg("30").spawn().unwrap();
        let config = SamplerConfig {
            target_pid: child.id(),
            include_children: false,
            ..fast_config()
        };
        let mut handle = SamplerHandle::spawn(&config, Duration::from_secs(10)).unwrap();

        child.kill().unwrap();
        child.wait().unwrap();

        let result = handle.split();
        assert!(result.is_err(), "got {result:?}");
    }

    #[test]
    fn test_missing_target_fails_at_spawn() {
        let mut child = Command::new("true").spawn().unwrap();
        let pid = child.id();
        child.wait().unwrap();

        let config = SamplerConfig {
            target_pid: pid,
            include_children: false,
            backend: Some(MemoryBackend::Rss),
            ..fast_config()
        };
        let result = SamplerHandle::spawn(&config, Duration::from_secs(10));
        assert!(matches!(result, Err(SessionError::SamplerFailed(_))));
    }

    #[test]
    fn test_garbled_control_code_reports_unknown_failure() {
        let (mut controller, sampler_end) = duplex().unwrap();
        let config = fast_config();
        let sampler = Sampler {
            probe: config.probe(),
            poll_interval: config.poll_interval,
            endpoint: sampler_end,
        };
        let thread = thread::spawn(move || sampler.run());

        let started = controller.recv::<SamplerMessage>().unwrap();
        assert!(matches!(started, SamplerMessage::Started(_)));

        // no valid control code has an all-ones tag
        controller.send(&u32::MAX).unwrap();
        let reply = controller.recv::<SamplerMessage>().unwrap();
        let SamplerMessage::Failure { kind, .. } = &reply else {
            panic!("expected failure, got {reply:?}");
        };
        assert_eq!(*kind, FailureKind::Unknown);
        let outcome = thread.join().unwrap();
        assert!(matches!(outcome, Err(SamplerError::Ipc(_))));
    }

    #[test]
    fn test_drop_joins_sampler() {
        let handle = SamplerHandle::spawn(&fast_config(), DEFAULT_REPLY_TIMEOUT).unwrap();
        drop(handle);
    }
}
