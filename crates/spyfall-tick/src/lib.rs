//! Room timers for the Spyfall server.
//!
//! Two cancellable timers, both designed to sit inside a room actor's
//! `tokio::select!` loop next to its command channel:
//!
//! - [`Countdown`] — the authoritative round clock. Ticks once per period,
//!   reports the remaining seconds, and stops itself at zero.
//! - [`Redelivery`] — a short list of fixed delays after an arming instant,
//!   used to repeat a phase signal a client may have missed.
//!
//! ```ignore
//! loop {
//!     tokio::select! {
//!         Some(cmd) = cmd_rx.recv() => { /* handle command */ }
//!         tick = countdown.wait_for_tick() => { /* broadcast tick.remaining */ }
//!         _ = redelivery.wait() => { /* re-send the signal */ }
//!     }
//! }
//! ```
//!
//! Both `wait` futures pend forever while idle and only mutate state after
//! their sleep completes, so dropping them when another branch wins is safe.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::{self, Instant};
use tracing::{debug, trace, warn};

// ---------------------------------------------------------------------------
// Countdown
// ---------------------------------------------------------------------------

/// One countdown step, returned by [`Countdown::wait_for_tick`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    /// Seconds left after this tick.
    pub remaining: u32,
    /// `true` on the final tick. The countdown is idle afterwards.
    pub expired: bool,
    /// Whole periods missed because the tick fired late.
    pub skipped: u32,
}

/// Counters kept by a [`Countdown`] across restarts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CountdownMetrics {
    pub total_ticks: u64,
    pub total_overruns: u64,
    pub total_skipped: u64,
    /// Times `start` replaced a countdown that was still running.
    pub restarts: u64,
    pub expirations: u64,
}

/// A cancellable countdown, one per room.
pub struct Countdown {
    period: Duration,
    remaining: u32,
    /// `None` while idle.
    next_tick: Option<Instant>,
    metrics: CountdownMetrics,
}

impl Countdown {
    /// Default tick period.
    pub const DEFAULT_PERIOD: Duration = Duration::from_secs(1);

    /// Creates an idle countdown. A zero period is bumped to one millisecond.
    pub fn new(period: Duration) -> Self {
        let period = if period.is_zero() {
            warn!("countdown period of zero, using 1ms");
            Duration::from_millis(1)
        } else {
            period
        };
        Self {
            period,
            remaining: 0,
            next_tick: None,
            metrics: CountdownMetrics::default(),
        }
    }

    /// Starts counting down from `seconds`, replacing any running countdown.
    pub fn start(&mut self, seconds: u32) {
        if self.is_running() {
            self.metrics.restarts += 1;
            debug!(
                previous = self.remaining,
                seconds, "countdown restarted before expiry"
            );
        } else {
            debug!(seconds, "countdown started");
        }
        self.remaining = seconds;
        self.next_tick = Some(Instant::now() + self.period);
    }

    /// Stops the countdown. Idempotent.
    pub fn cancel(&mut self) {
        if self.next_tick.take().is_some() {
            debug!(remaining = self.remaining, "countdown cancelled");
        }
    }

    pub fn is_running(&self) -> bool {
        self.next_tick.is_some()
    }

    /// Seconds left as of the last tick (or the start value).
    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn metrics(&self) -> &CountdownMetrics {
        &self.metrics
    }

    /// Waits for the next tick. Pends forever while idle.
    ///
    /// A tick that wakes up late by whole periods consumes those periods as
    /// well, so the clock never drifts behind wall time.
    pub async fn wait_for_tick(&mut self) -> Tick {
        let Some(due) = self.next_tick else {
            return std::future::pending().await;
        };

        time::sleep_until(due).await;

        let late_by = Instant::now().saturating_duration_since(due);
        let skipped = (late_by.as_nanos() / self.period.as_nanos()) as u32;
        if skipped > 0 {
            self.metrics.total_overruns += 1;
            self.metrics.total_skipped += u64::from(skipped);
            warn!(
                skipped,
                late_ms = late_by.as_secs_f64() * 1000.0,
                "countdown tick overrun, skipping ahead"
            );
        }

        self.remaining = self.remaining.saturating_sub(1 + skipped);
        self.metrics.total_ticks += 1;

        let expired = self.remaining == 0;
        if expired {
            self.next_tick = None;
            self.metrics.expirations += 1;
            debug!("countdown expired");
        } else {
            self.next_tick = Some(due + self.period * (1 + skipped));
        }

        trace!(remaining = self.remaining, expired, "countdown tick");

        Tick {
            remaining: self.remaining,
            expired,
            skipped,
        }
    }
}

impl Default for Countdown {
    fn default() -> Self {
        Self::new(Self::DEFAULT_PERIOD)
    }
}

// ---------------------------------------------------------------------------
// Redelivery
// ---------------------------------------------------------------------------

/// Fires once for each configured delay after [`arm`](Self::arm).
pub struct Redelivery {
    delays: Vec<Duration>,
    pending: VecDeque<Instant>,
}

impl Redelivery {
    pub fn new(mut delays: Vec<Duration>) -> Self {
        delays.sort();
        Self {
            delays,
            pending: VecDeque::new(),
        }
    }

    /// Schedules every delay relative to now, discarding anything pending.
    pub fn arm(&mut self) {
        let now = Instant::now();
        self.pending = self.delays.iter().map(|d| now + *d).collect();
    }

    /// Drops all pending deliveries. Idempotent.
    pub fn cancel(&mut self) {
        self.pending.clear();
    }

    pub fn is_armed(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn delays(&self) -> &[Duration] {
        &self.delays
    }

    /// Waits for the next scheduled delivery and returns how many are still
    /// pending after it. Pends forever while nothing is armed.
    pub async fn wait(&mut self) -> usize {
        let Some(&due) = self.pending.front() else {
            return std::future::pending().await;
        };
        time::sleep_until(due).await;
        self.pending.pop_front();
        self.pending.len()
    }
}
