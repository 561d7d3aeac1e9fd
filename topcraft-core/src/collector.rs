//! Collector Control
//!
//! Rust has no garbage collector, but freed heap memory often stays mapped
//! inside the allocator, which hides releases from a resident-memory sampler.
//! A "collection pass" asks the allocator to hand free pages back to the OS
//! so each measurement window starts from a comparable state.

use std::sync::atomic::{AtomicBool, Ordering};

static COLLECTOR_ENABLED: AtomicBool = AtomicBool::new(true);

/// Whether collection passes currently run
pub fn collector_enabled() -> bool {
    COLLECTOR_ENABLED.load(Ordering::SeqCst)
}

/// Force a collection pass.
///
/// Returns `false` when the collector is suspended or the platform allocator
/// offers no way to release memory.
pub fn collect() -> bool {
    if !collector_enabled() {
        return false;
    }
    trim_allocator()
}

#[cfg(all(target_os = "linux", target_env = "gnu"))]
fn trim_allocator() -> bool {
    unsafe {
        libc::malloc_trim(0);
    }
    true
}

#[cfg(not(all(target_os = "linux", target_env = "gnu")))]
fn trim_allocator() -> bool {
    false
}

/// Switch the collector on, off, or flip it, for a bounded scope.
///
/// ```
/// use topcraft_core::{CollectorToggle, collector_enabled};
///
/// CollectorToggle::disable().run(|| {
///     assert!(!collector_enabled());
/// });
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectorToggle {
    target: Option<bool>,
}

impl Default for CollectorToggle {
    fn default() -> Self {
        Self::disable()
    }
}

impl CollectorToggle {
    /// `Some(state)` forces that state, `None` flips the current one
    pub const fn new(target: Option<bool>) -> Self {
        Self { target }
    }

    /// Suspend collection passes
    pub const fn disable() -> Self {
        Self::new(Some(false))
    }

    /// Enable collection passes
    pub const fn enable() -> Self {
        Self::new(Some(true))
    }

    /// Flip whatever the current state is
    pub const fn flip() -> Self {
        Self::new(None)
    }

    /// Apply the toggle until the returned guard is dropped
    pub fn enter(self) -> CollectorGuard {
        let current = collector_enabled();
        let wanted = self.target.unwrap_or(!current);

        if wanted == current {
            return CollectorGuard { restore: None };
        }

        COLLECTOR_ENABLED.store(wanted, Ordering::SeqCst);
        let state = if wanted { "enabled" } else { "disabled" };
        tracing::debug!("Collector {state}");
        CollectorGuard {
            restore: Some(current),
        }
    }

    /// Run `f` with the toggle applied
    pub fn run<T>(self, f: impl FnOnce() -> T) -> T {
        let _guard = self.enter();
        f()
    }
}

/// Restores the collector state it replaced, also while unwinding
#[derive(Debug)]
#[must_use = "the previous collector state is restored when the guard is dropped"]
pub struct CollectorGuard {
    restore: Option<bool>,
}

impl Drop for CollectorGuard {
    fn drop(&mut self) {
        if let Some(previous) = self.restore.take() {
            COLLECTOR_ENABLED.store(previous, Ordering::SeqCst);
            tracing::debug!(
                "Collector {}",
                if previous { "enabled" } else { "disabled" }
            );
        }
    }
}
