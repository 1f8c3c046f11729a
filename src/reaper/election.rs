//! Election Guard
//!
//! Decides whether this process may run the reaper. Only one process in a
//! worker pool should sweep; the others would just repeat the same deletes.
//!
//! This is a coarse role check, not a consensus protocol. There are no
//! leases and no fencing tokens: if the eligible process dies, reaping stops
//! until another eligible process starts. Operators should alert on it.

use std::fmt;

/// Decides whether the current process is the one allowed to reap.
pub trait ElectionGuard: Send + Sync + fmt::Debug {
    fn is_eligible(&self) -> bool;
}

/// Always eligible. For single-process deployments.
#[derive(Debug, Clone, Copy, Default)]
pub struct Always;

impl ElectionGuard for Always {
    fn is_eligible(&self) -> bool {
        true
    }
}

/// Never eligible. For workers that must not reap.
#[derive(Debug, Clone, Copy, Default)]
pub struct Never;

impl ElectionGuard for Never {
    fn is_eligible(&self) -> bool {
        false
    }
}

/// A role fixed when the process starts, e.g. by a supervisor that knows
/// which worker is the coordinator.
#[derive(Debug, Clone, Copy)]
pub struct StaticRole(pub bool);

impl ElectionGuard for StaticRole {
    fn is_eligible(&self) -> bool {
        self.0
    }
}

/// Eligible when an environment variable holds an expected value.
///
/// The variable is read on every call, so a supervisor can hand the role to
/// another process without restarting it.
///
/// # Example
///
/// ```
/// use kvsession::reaper::{ElectionGuard, EnvRole};
///
/// let guard = EnvRole::new("KVSESSION_DOCTEST_WORKER_ID", "0");
/// assert!(!guard.is_eligible());
/// ```
#[derive(Debug, Clone)]
pub struct EnvRole {
    var: String,
    expected: String,
}

impl EnvRole {
    pub fn new(var: impl Into<String>, expected: impl Into<String>) -> Self {
        Self {
            var: var.into(),
            expected: expected.into(),
        }
    }
}

impl ElectionGuard for EnvRole {
    fn is_eligible(&self) -> bool {
        std::env::var(&self.var)
            .map(|value| value.trim() == self.expected)
            .unwrap_or(false)
    }
}
