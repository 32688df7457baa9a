//! Metrics instrumentation for lease-hosts.
//!
//! All metrics are prefixed with `lease_hosts.`

use metrics::{counter, gauge, histogram};
use std::time::Instant;

/// Outcome of one watch cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollResult {
    /// Leases fetched and hosts file published.
    Published,
    /// Lease query failed; hosts file left untouched.
    QueryFailed,
    /// Leases fetched but the hosts file could not be written.
    WriteFailed,
}

impl PollResult {
    fn as_str(self) -> &'static str {
        match self {
            PollResult::Published => "published",
            PollResult::QueryFailed => "query_failed",
            PollResult::WriteFailed => "write_failed",
        }
    }
}

/// Record a completed watch cycle.
pub fn record_poll(result: PollResult, duration: std::time::Duration) {
    counter!("lease_hosts.poll.count", "result" => result.as_str()).increment(1);
    histogram!("lease_hosts.poll.duration.seconds").record(duration.as_secs_f64());
}

/// Record the size of the last published lease set.
pub fn record_published(leases: usize, lines: usize) {
    gauge!("lease_hosts.leases.count").set(leases as f64);
    gauge!("lease_hosts.hostfile.lines").set(lines as f64);
}

/// Reconnect reasons.
#[derive(Debug, Clone, Copy)]
pub enum ReconnectReason {
    /// The previous session broke on a transport error.
    SessionLost,
}

/// Record a reconnect to the libvirt daemon.
pub fn record_reconnect(reason: ReconnectReason) {
    let reason_str = match reason {
        ReconnectReason::SessionLost => "session_lost",
    };

    counter!("lease_hosts.libvirt.reconnect.count", "reason" => reason_str).increment(1);
}

/// Helper for timing operations.
pub struct Timer {
    start: Instant,
}

impl Timer {
    /// Start a new timer.
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get elapsed duration since timer start.
    pub fn elapsed(&self) -> std::time::Duration {
        self.start.elapsed()
    }
}
