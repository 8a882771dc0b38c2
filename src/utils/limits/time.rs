// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

/*
ExecutionTimer provides cooperative interruption of long-running expression
evaluations. The timer tracks:
- ExecutionTimerConfig, which holds the optional wall-clock budget and the
    interval (in work units) between checks.
- An optional cancellation flag shared with the host. Raising the flag stops
    the evaluation at the next check.
- The monotonic start instant recorded via start(now), expressed as a
    Duration from monotonic_now().
- An accumulator that counts work units so callers can amortize clock reads;
    once the counter reaches the configured interval, tick() performs a check
    and preserves any remainder.

The interpreter charges one work unit per evaluated node, so a pathological
expression is interrupted after at most check_interval further nodes.
*/

use core::num::NonZeroU32;
use core::time::Duration;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use super::LimitError;

/// Configuration for the cooperative execution time limiter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExecutionTimerConfig {
    /// Maximum allowed wall-clock duration.
    pub limit: Duration,
    /// Number of work units between time checks (minimum 1).
    pub check_interval: NonZeroU32,
}

/// Cooperative time-limit and cancellation tracker.
#[derive(Debug)]
pub struct ExecutionTimer {
    config: Option<ExecutionTimerConfig>,
    cancel: Option<Arc<AtomicBool>>,
    check_interval: NonZeroU32,
    start: Option<Duration>,
    accumulated_units: u32,
    last_elapsed: Duration,
}

/// Returns a non-decreasing duration since a process-wide anchor.
pub fn monotonic_now() -> Duration {
    static ANCHOR: OnceLock<std::time::Instant> = OnceLock::new();
    ANCHOR.get_or_init(std::time::Instant::now).elapsed()
}

impl ExecutionTimer {
    /// Construct a new timer with the provided configuration.
    pub const fn new(config: Option<ExecutionTimerConfig>) -> Self {
        let check_interval = match config {
            Some(config) => config.check_interval,
            None => NonZeroU32::MIN,
        };
        Self {
            config,
            cancel: None,
            check_interval,
            start: None,
            accumulated_units: 0,
            last_elapsed: Duration::ZERO,
        }
    }

    /// Attach a cancellation flag consulted every `check_interval` work units.
    pub fn with_cancellation(mut self, flag: Arc<AtomicBool>, check_interval: NonZeroU32) -> Self {
        if self.config.is_none() {
            self.check_interval = check_interval;
        }
        self.cancel = Some(flag);
        self
    }

    /// Reset any prior state and record the start instant.
    pub const fn start(&mut self, now: Duration) {
        self.start = Some(now);
        self.accumulated_units = 0;
        self.last_elapsed = Duration::ZERO;
    }

    /// Returns the configured limit.
    pub const fn limit(&self) -> Option<Duration> {
        match self.config {
            Some(config) => Some(config.limit),
            None => None,
        }
    }

    /// Returns the last elapsed duration recorded by a check.
    pub const fn last_elapsed(&self) -> Duration {
        self.last_elapsed
    }

    /// Increment work units and run the periodic check when necessary.
    pub fn tick(&mut self, work_units: u32) -> Result<(), LimitError> {
        self.tick_with(work_units, monotonic_now)
    }

    /// Like [`tick`](Self::tick), reading the clock from `now` only when a check is due.
    pub fn tick_with(
        &mut self,
        work_units: u32,
        now: impl FnOnce() -> Duration,
    ) -> Result<(), LimitError> {
        if self.config.is_none() && self.cancel.is_none() {
            return Ok(());
        }
        self.accumulated_units = self.accumulated_units.saturating_add(work_units);
        let interval = self.check_interval.get();
        if self.accumulated_units < interval {
            return Ok(());
        }

        // Preserve the remainder so that callers do not lose fractional work.
        self.accumulated_units %= interval;
        if self.is_cancelled() {
            return Err(LimitError::Cancelled);
        }
        self.check_now(now())
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    /// Force an immediate check against the configured deadline.
    pub fn check_now(&mut self, now: Duration) -> Result<(), LimitError> {
        let Some(config) = self.config else {
            return Ok(());
        };
        let Some(start) = self.start else {
            return Ok(());
        };

        let elapsed = now.checked_sub(start).unwrap_or(Duration::ZERO);
        self.last_elapsed = elapsed;
        if elapsed > config.limit {
            return Err(LimitError::TimeLimitExceeded {
                elapsed,
                limit: config.limit,
            });
        }
        Ok(())
    }

    /// Compute elapsed time relative to the recorded start, if available.
    pub fn elapsed(&self, now: Duration) -> Option<Duration> {
        let start = self.start?;
        Some(now.checked_sub(start).unwrap_or(Duration::ZERO))
    }
}
