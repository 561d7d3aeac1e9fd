//! Memory Query Primitive
//!
//! Reads the memory footprint of a process from procfs. Unique set size
//! (private pages, from `smaps_rollup`) is preferred because it ignores
//! shared libraries; resident set size from `statm` is the fallback on
//! kernels without `smaps_rollup`.

use crate::error::ProbeError;
pub use topcraft_ipc::MemoryBackendKind as MemoryBackend;

#[cfg(target_os = "linux")]
use std::collections::HashMap;
#[cfg(target_os = "linux")]
use std::fs;

/// Reads the memory of one target process, optionally with its descendants
#[derive(Debug, Clone)]
pub struct MemoryProbe {
    pid: u32,
    include_children: bool,
    backend: MemoryBackend,
    page_size: u64,
}

impl MemoryProbe {
    /// Create a probe, picking USS when the kernel exposes it for `pid`
    pub fn new(pid: u32, include_children: bool) -> Self {
        Self::with_backend(pid, include_children, detect_backend(pid))
    }

    /// Create a probe with an explicit backend
    pub fn with_backend(pid: u32, include_children: bool, backend: MemoryBackend) -> Self {
        Self {
            pid,
            include_children,
            backend,
            page_size: page_size(),
        }
    }

    /// Probe for the calling process
    pub fn current_process(include_children: bool) -> Self {
        Self::new(std::process::id(), include_children)
    }

    /// Target process id
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Backend in use
    pub fn backend(&self) -> MemoryBackend {
        self.backend
    }

    /// Whether descendants are summed into each sample
    pub fn include_children(&self) -> bool {
        self.include_children
    }

    /// Current memory of the target in MiB.
    ///
    /// Fails with `ProcessGone` once the target has exited, even if it has
    /// not been reaped yet. Descendants that exit mid-scan are skipped.
    #[cfg(target_os = "linux")]
    pub fn sample(&self) -> Result<f64, ProbeError> {
        let state = read_state(self.pid)?;
        if matches!(state, 'Z' | 'X' | 'x') {
            return Err(ProbeError::ProcessGone { pid: self.pid });
        }

        let mut total_kib = self.process_kib(self.pid)?;

        if self.include_children {
            for child in descendants(self.pid) {
                match self.process_kib(child) {
                    Ok(kib) => total_kib += kib,
                    Err(ProbeError::ProcessGone { .. }) => {}
                    Err(e) => {
                        tracing::trace!(pid = child, error = %e, "skipping unreadable child");
                    }
                }
            }
        }

        Ok(total_kib as f64 / 1024.0)
    }

    #[cfg(not(target_os = "linux"))]
    pub fn sample(&self) -> Result<f64, ProbeError> {
        Err(ProbeError::Unsupported)
    }

    #[cfg(target_os = "linux")]
    fn process_kib(&self, pid: u32) -> Result<u64, ProbeError> {
        match self.backend {
            MemoryBackend::Uss => read_uss_kib(pid),
            MemoryBackend::Rss => read_rss_kib(pid, self.page_size),
        }
    }
}

fn page_size() -> u64 {
    #[cfg(unix)]
    {
        let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        if size > 0 {
            return size as u64;
        }
    }
    4096
}

#[cfg(target_os = "linux")]
fn detect_backend(pid: u32) -> MemoryBackend {
    if fs::read_to_string(format!("/proc/{pid}/smaps_rollup")).is_ok() {
        MemoryBackend::Uss
    } else {
        MemoryBackend::Rss
    }
}

#[cfg(not(target_os = "linux"))]
fn detect_backend(_pid: u32) -> MemoryBackend {
    MemoryBackend::Rss
}

#[cfg(target_os = "linux")]
fn read_proc(pid: u32, file: &str) -> Result<String, ProbeError> {
    let path = format!("/proc/{pid}/{file}");
    fs::read_to_string(&path).map_err(|source| {
        let gone = source.kind() == std::io::ErrorKind::NotFound
            || source.raw_os_error() == Some(libc::ESRCH);
        if gone {
            ProbeError::ProcessGone { pid }
        } else {
            ProbeError::Io { path, source }
        }
    })
}

/// Split `/proc/<pid>/stat` after the command name, which may itself contain
/// spaces and parentheses.
#[cfg(target_os = "linux")]
fn stat_fields(pid: u32) -> Result<Vec<String>, ProbeError> {
    let content = read_proc(pid, "stat")?;
    let rest = content
        .rfind(')')
        .and_then(|idx| content.get(idx + 1..))
        .ok_or_else(|| ProbeError::Parse {
            path: format!("/proc/{pid}/stat"),
            reason: "missing command terminator".to_string(),
        })?;
    Ok(rest.split_whitespace().map(str::to_string).collect())
}

#[cfg(target_os = "linux")]
fn read_state(pid: u32) -> Result<char, ProbeError> {
    stat_fields(pid)?
        .first()
        .and_then(|field| field.chars().next())
        .ok_or_else(|| ProbeError::Parse {
            path: format!("/proc/{pid}/stat"),
            reason: "missing state field".to_string(),
        })
}

#[cfg(target_os = "linux")]
fn read_parent(pid: u32) -> Option<u32> {
    stat_fields(pid).ok()?.get(1)?.parse().ok()
}

#[cfg(target_os = "linux")]
fn read_uss_kib(pid: u32) -> Result<u64, ProbeError> {
    let content = read_proc(pid, "smaps_rollup")?;
    let total = content
        .lines()
        .filter(|line| {
            line.starts_with("Private_Clean:")
                || line.starts_with("Private_Dirty:")
                || line.starts_with("Private_Hugetlb:")
        })
        .filter_map(|line| line.split_whitespace().nth(1))
        .filter_map(|value| value.parse::<u64>().ok())
        .sum();
    Ok(total)
}

#[cfg(target_os = "linux")]
fn read_rss_kib(pid: u32, page_size: u64) -> Result<u64, ProbeError> {
    let content = read_proc(pid, "statm")?;
    let pages: u64 = content
        .split_whitespace()
        .nth(1)
        .and_then(|field| field.parse().ok())
        .ok_or_else(|| ProbeError::Parse {
            path: format!("/proc/{pid}/statm"),
            reason: "missing resident field".to_string(),
        })?;
    Ok(pages * page_size / 1024)
}

/// All live descendants of `root`, found through parent pids in procfs
#[cfg(target_os = "linux")]
fn descendants(root: u32) -> Vec<u32> {
    let Ok(entries) = fs::read_dir("/proc") else {
        return Vec::new();
    };

    let mut children: HashMap<u32, Vec<u32>> = HashMap::new();
    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(pid) = name.to_str().and_then(|n| n.parse::<u32>().ok()) else {
            continue;
        };
        if let Some(parent) = read_parent(pid) {
            children.entry(parent).or_default().push(pid);
        }
    }

    let mut found = Vec::new();
    let mut queue = vec![root];
    while let Some(pid) = queue.pop() {
        if let Some(kids) = children.get(&pid) {
            for &kid in kids {
                if kid != root && !found.contains(&kid) {
                    found.push(kid);
                    queue.push(kid);
                }
            }
        }
    }
    found
}

#[cfg(all(test, target_os = "linux"))]
mod tests {
    use super::*;
    use std::process::Command;

    #[test]
    fn test_sample_current_process() {
        let probe = MemoryProbe::current_process(false);
        let mib = probe.sample().unwrap();
        assert!(mib > 0.0);
    }

    #[test]
    fn test_rss_backend_grows_with_touched_buffer() {
        let probe = MemoryProbe::with_backend(std::process::id(), false, MemoryBackend::Rss);
        let before = probe.sample().unwrap();

        // Filling with a non-zero byte forces every page to be resident
        let buffer = vec![1u8; 32 * 1024 * 1024];
        let during = probe.sample().unwrap();
        drop(std::hint::black_box(buffer));

        assert!(during - before > 24.0, "before={before} during={during}");
    }

    #[test]
    fn test_missing_process_is_gone() {
        // Spawn and reap a child so its pid is known to be free
        let mut child = Command::new("true").spawn().unwrap();
        let pid = child.id();
        child.wait().unwrap();

        let probe = MemoryProbe::with_backend(pid, false, MemoryBackend::Rss);
        let result = probe.sample();
        assert!(matches!(result, Err(ProbeError::ProcessGone { .. })));
    }

    #[test]
    fn test_children_are_discovered() {
        let mut child = Command::new("sleep").arg("5").spawn().unwrap();
        let kids = descendants(std::process::id());
        let found = kids.contains(&child.id());
        child.kill().unwrap();
        child.wait().unwrap();
        assert!(found);
    }

    #[test]
    fn test_stat_state_parses() {
        let state = read_state(std::process::id()).unwrap();
        assert!(matches!(state, 'R' | 'S' | 'D'));
    }
}
