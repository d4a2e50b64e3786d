//! Progress reporting: `(processed, total, rate_per_second, eta_seconds,
//! current_row)` over a `tokio::sync::watch` channel (spec §4.8).

use std::time::{Duration, Instant};

use tokio::sync::watch;

/// A point-in-time progress snapshot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Progress {
    pub processed: u64,
    pub total: u64,
    pub rate_per_second: f64,
    pub eta_seconds: Option<f64>,
    pub current_row: u64,
}

impl Progress {
    pub(crate) fn starting(total: u64) -> Self {
        Self { processed: 0, total, rate_per_second: 0.0, eta_seconds: None, current_row: 0 }
    }
}

/// Bounded-cadence emitter: never sends more than once per
/// `min_interval`, except the caller can force a send (used at batch
/// commit boundaries, which must always report progress regardless of
/// cadence).
pub struct ProgressEmitter {
    sender: watch::Sender<Progress>,
    started_at: Instant,
    min_interval: Duration,
    last_sent_at: Instant,
}

impl ProgressEmitter {
    pub const DEFAULT_MIN_INTERVAL: Duration = Duration::from_secs(2);

    pub fn new(total: u64) -> (Self, watch::Receiver<Progress>) {
        Self::with_min_interval(total, Self::DEFAULT_MIN_INTERVAL)
    }

    pub fn with_min_interval(total: u64, min_interval: Duration) -> (Self, watch::Receiver<Progress>) {
        let (sender, receiver) = watch::channel(Progress::starting(total));
        (Self::with_sender(total, min_interval, sender), receiver)
    }

    /// Builds an emitter that reports onto an existing sender rather
    /// than creating its own channel, so a caller can subscribe to
    /// progress across the whole lifetime of a `BatchRunner`, not just a
    /// single `run` call.
    pub fn with_sender(total: u64, min_interval: Duration, sender: watch::Sender<Progress>) -> Self {
        let _ = sender.send(Progress::starting(total));
        let now = Instant::now();
        Self { sender, started_at: now, min_interval, last_sent_at: now }
    }

    /// Sends a progress update if `min_interval` has elapsed since the
    /// last send, unless `force` is set.
    pub fn report(&mut self, processed: u64, total: u64, current_row: u64, force: bool) {
        let now = Instant::now();
        if !force && now.duration_since(self.last_sent_at) < self.min_interval {
            return;
        }
        self.last_sent_at = now;

        let elapsed = now.duration_since(self.started_at).as_secs_f64();
        let rate_per_second = if elapsed > 0.0 { processed as f64 / elapsed } else { 0.0 };
        let remaining = total.saturating_sub(processed);
        let eta_seconds = if rate_per_second > 0.0 { Some(remaining as f64 / rate_per_second) } else { None };

        let _ = self.sender.send(Progress { processed, total, rate_per_second, eta_seconds, current_row });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suppresses_updates_inside_the_cadence_window() {
        let (mut emitter, rx) = ProgressEmitter::with_min_interval(100, Duration::from_secs(60));
        emitter.report(10, 100, 10, false);
        assert_eq!(rx.borrow().processed, 0, "update suppressed before min_interval elapses");
    }

    #[test]
    fn forced_update_bypasses_cadence() {
        let (mut emitter, rx) = ProgressEmitter::with_min_interval(100, Duration::from_secs(60));
        emitter.report(10, 100, 10, true);
        assert_eq!(rx.borrow().processed, 10);
    }
}
