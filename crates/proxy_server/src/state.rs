//! Process-wide server state shared by every connection.
//!
//! Holds the lifecycle phase, a pending restart time and the consecutive
//! backend-dial failure counter that acts as a circuit breaker. All fields are
//! atomics so connection setup paths on different tasks can update them
//! without locking.

use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};
use tokio::sync::Notify;
use tracing::error;

/// Lifecycle phase of the relay process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum ServerLifecycle {
    /// Still starting; clients are turned away.
    Starting = 0,
    /// Accepting and relaying.
    Running = 1,
    /// Shutting down on request.
    ShuttingDown = 2,
    /// Backend unreachable too many times in a row; needs a restart.
    Crashed = 3,
}

impl ServerLifecycle {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Starting,
            1 => Self::Running,
            2 => Self::ShuttingDown,
            _ => Self::Crashed,
        }
    }
}

/// Outcome of recording one failed backend dial.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DialFailure {
    /// Failures in a row, this one included.
    pub consecutive: u32,
    /// True only for the call that moved the server into `Crashed`.
    pub escalated: bool,
}

#[derive(Debug)]
pub struct ServerState {
    lifecycle: AtomicU8,
    restart_at: AtomicU64,
    failed_connections: AtomicU32,
    crash_signal: Notify,
}

impl Default for ServerState {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerState {
    pub fn new() -> Self {
        Self {
            lifecycle: AtomicU8::new(ServerLifecycle::Starting as u8),
            restart_at: AtomicU64::new(0),
            failed_connections: AtomicU32::new(0),
            crash_signal: Notify::new(),
        }
    }

    pub fn lifecycle(&self) -> ServerLifecycle {
        ServerLifecycle::from_u8(self.lifecycle.load(Ordering::Acquire))
    }

    /// Moves from `Starting` to `Running`. Later phases are left alone.
    pub fn mark_running(&self) -> bool {
        self.lifecycle
            .compare_exchange(
                ServerLifecycle::Starting as u8,
                ServerLifecycle::Running as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Enters `ShuttingDown` unless the server already crashed.
    pub fn begin_shutdown(&self) {
        let _ = self
            .lifecycle
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current != ServerLifecycle::Crashed as u8)
                    .then_some(ServerLifecycle::ShuttingDown as u8)
            });
    }

    /// Enters `Crashed`. Returns true if this call made the transition.
    pub fn mark_crashed(&self) -> bool {
        let flipped = self.lifecycle.swap(ServerLifecycle::Crashed as u8, Ordering::AcqRel)
            != ServerLifecycle::Crashed as u8;
        if flipped {
            self.crash_signal.notify_waiters();
        }
        flipped
    }

    pub fn is_crashed(&self) -> bool {
        self.lifecycle() == ServerLifecycle::Crashed
    }

    /// Resolves once the server has crashed.
    pub async fn wait_for_crash(&self) {
        loop {
            let notified = self.crash_signal.notified();
            if self.is_crashed() {
                return;
            }
            notified.await;
        }
    }

    /// Unix time of a scheduled restart, or zero when none is pending.
    pub fn restart_time(&self) -> u64 {
        self.restart_at.load(Ordering::Acquire)
    }

    pub fn schedule_restart(&self, at: u64) {
        self.restart_at.store(at, Ordering::Release);
    }

    pub fn cancel_restart(&self) {
        self.restart_at.store(0, Ordering::Release);
    }

    pub fn failed_connections(&self) -> u32 {
        self.failed_connections.load(Ordering::Acquire)
    }

    /// Counts one failed dial and escalates once `threshold` is reached.
    ///
    /// A threshold of zero never escalates.
    pub fn record_dial_failure(&self, threshold: u32) -> DialFailure {
        let consecutive = self
            .failed_connections
            .fetch_add(1, Ordering::AcqRel)
            .saturating_add(1);

        let escalated = threshold > 0 && consecutive >= threshold && self.mark_crashed();
        if escalated {
            error!(
                "{} clients failed to connect in a row. Restarting...",
                consecutive
            );
        }

        DialFailure {
            consecutive,
            escalated,
        }
    }

    pub fn reset_failures(&self) {
        self.failed_connections.store(0, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_lifecycle_transitions() {
        let state = ServerState::new();
        assert_eq!(state.lifecycle(), ServerLifecycle::Starting);
        assert!(state.mark_running());
        assert!(!state.mark_running());
        state.begin_shutdown();
        assert_eq!(state.lifecycle(), ServerLifecycle::ShuttingDown);
        assert!(state.mark_crashed());
        state.begin_shutdown();
        assert!(state.is_crashed());
    }

    #[test]
    fn test_threshold_minus_one_does_not_crash() {
        let state = ServerState::new();
        state.mark_running();
        for expected in 1..3 {
            let failure = state.record_dial_failure(3);
            assert_eq!(failure.consecutive, expected);
            assert!(!failure.escalated);
        }
        assert_eq!(state.lifecycle(), ServerLifecycle::Running);

        let failure = state.record_dial_failure(3);
        assert!(failure.escalated);
        assert!(state.is_crashed());

        // Further failures keep counting without escalating again.
        assert!(!state.record_dial_failure(3).escalated);
    }

    #[test]
    fn test_success_resets_counter() {
        let state = ServerState::new();
        state.mark_running();
        state.record_dial_failure(3);
        state.record_dial_failure(3);
        state.reset_failures();
        assert!(!state.record_dial_failure(3).escalated);
        assert_eq!(state.failed_connections(), 1);
        assert!(!state.is_crashed());
    }

    #[test]
    fn test_zero_threshold_never_escalates() {
        let state = ServerState::new();
        for _ in 0..10 {
            assert!(!state.record_dial_failure(0).escalated);
        }
        assert!(!state.is_crashed());
    }

    #[test]
    fn test_concurrent_failures_escalate_exactly_once() {
        let state = Arc::new(ServerState::new());
        state.mark_running();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let state = state.clone();
                std::thread::spawn(move || {
                    (0..25)
                        .filter(|_| state.record_dial_failure(50).escalated)
                        .count()
                })
            })
            .collect();
        let escalations: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(escalations, 1);
        assert_eq!(state.failed_connections(), 200);
    }

    #[tokio::test]
    async fn test_crash_wakes_waiters() {
        let state = Arc::new(ServerState::new());
        let waiter = tokio::spawn({
            let state = state.clone();
            async move { state.wait_for_crash().await }
        });
        tokio::task::yield_now().await;
        state.record_dial_failure(1);
        tokio::time::timeout(std::time::Duration::from_secs(1), waiter)
            .await
            .expect("waiter woke")
            .unwrap();

        // Already crashed: returns at once.
        state.wait_for_crash().await;
    }

    #[test]
    fn test_restart_schedule() {
        let state = ServerState::new();
        assert_eq!(state.restart_time(), 0);
        state.schedule_restart(1_700_000_000);
        assert_eq!(state.restart_time(), 1_700_000_000);
        state.cancel_restart();
        assert_eq!(state.restart_time(), 0);
    }
}
