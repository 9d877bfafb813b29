//! Cancellable waiting between polls and reconnects

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::error::Cancelled;

/// Longest uninterrupted sleep; bounds how late a cancel is noticed
const SLICE: Duration = Duration::from_millis(250);

/// Shutdown flag shared between the signal handler and the run loop.
#[derive(Clone, Debug, Default)]
pub struct ShutdownToken(Arc<AtomicBool>);

impl ShutdownToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request shutdown. Returns whether it had already been requested.
    pub fn request(&self) -> bool {
        self.0.swap(true, Ordering::Relaxed)
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Waiting policy for the poll and retry loops.
///
/// Implementations must return `Err(Cancelled)` once the run should stop.
pub trait Pacer {
    /// Block for `duration`, or less if cancelled.
    fn pause(&self, duration: Duration) -> Result<(), Cancelled>;

    /// Cheap cancellation check at the top of a loop iteration.
    fn checkpoint(&self) -> Result<(), Cancelled> {
        Ok(())
    }
}

/// Real-time pacer: sleeps in short slices and watches the token.
pub struct SleepPacer {
    token: ShutdownToken,
}

impl SleepPacer {
    pub fn new(token: ShutdownToken) -> Self {
        Self { token }
    }
}

impl Pacer for SleepPacer {
    fn pause(&self, duration: Duration) -> Result<(), Cancelled> {
        let deadline = Instant::now() + duration;
        loop {
            self.checkpoint()?;
            let now = Instant::now();
            if now >= deadline {
                return Ok(());
            }
            std::thread::sleep((deadline - now).min(SLICE));
        }
    }

    fn checkpoint(&self) -> Result<(), Cancelled> {
        if self.token.is_requested() {
            Err(Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Delays used by the safety poller and the reconnect loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Intervals {
    /// Health objects not yet published (e.g. right after a topology change)
    pub unavailable: Duration,
    /// A service reported ENDANGERED; re-check the same service
    pub endangered: Duration,
    /// A health query threw; re-enumerate from the top
    pub query_error: Duration,
    /// Connect/stop failed before safety was confirmed
    pub reconnect: Duration,
}

impl Default for Intervals {
    fn default() -> Self {
        Self {
            unavailable: Duration::from_secs(1),
            endangered: Duration::from_secs(5),
            query_error: Duration::from_secs(10),
            reconnect: Duration::from_secs(10),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_starts_clear() {
        let token = ShutdownToken::new();
        assert!(!token.is_requested());
    }

    #[test]
    fn request_reports_previous_state() {
        let token = ShutdownToken::new();
        assert!(!token.request());
        assert!(token.request());
        assert!(token.clone().is_requested());
    }

    #[test]
    fn pause_completes_when_not_cancelled() {
        let pacer = SleepPacer::new(ShutdownToken::new());
        let start = Instant::now();
        assert_eq!(pacer.pause(Duration::from_millis(20)), Ok(()));
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn pause_returns_early_on_cancel() {
        let token = ShutdownToken::new();
        let pacer = SleepPacer::new(token.clone());

        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            token.request();
        });

        let start = Instant::now();
        assert_eq!(pacer.pause(Duration::from_secs(30)), Err(Cancelled));
        assert!(start.elapsed() < Duration::from_secs(5));
        handle.join().unwrap();
    }

    #[test]
    fn default_intervals() {
        let i = Intervals::default();
        assert_eq!(i.unavailable, Duration::from_secs(1));
        assert_eq!(i.endangered, Duration::from_secs(5));
        assert_eq!(i.query_error, Duration::from_secs(10));
        assert_eq!(i.reconnect, Duration::from_secs(10));
    }
}
