// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Stopwatch for timing report parses.
//!
//! A parse tracks a start time and a duration. The start time is taken from both the realtime clock
//! (for display) and the monotonic clock (for ordering parses against each other).

use chrono::{DateTime, Local};
use std::time::{Duration, Instant};

pub(crate) fn stopwatch() -> StopwatchStart {
    StopwatchStart::new()
}

/// The start state of a stopwatch.
#[derive(Clone, Debug)]
pub(crate) struct StopwatchStart {
    start_time: DateTime<Local>,
    instant: Instant,
}

impl StopwatchStart {
    fn new() -> Self {
        Self {
            // These two syscalls will happen imperceptibly close to each other, which is good
            // enough for our purposes.
            start_time: Local::now(),
            instant: Instant::now(),
        }
    }

    /// The monotonic instant at which the stopwatch was started.
    pub(crate) fn instant(&self) -> Instant {
        self.instant
    }

    pub(crate) fn snapshot(&self) -> StopwatchSnapshot {
        StopwatchSnapshot {
            start_time: self.start_time,
            duration: self.instant.elapsed(),
        }
    }
}

#[derive(Clone, Debug)]
pub(crate) struct StopwatchSnapshot {
    pub(crate) start_time: DateTime<Local>,
    pub(crate) duration: Duration,
}

impl StopwatchSnapshot {
    pub(crate) fn end_time(&self) -> DateTime<Local> {
        self.start_time + self.duration
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn later_stopwatches_order_after_earlier_ones() {
        let first = stopwatch();
        std::thread::sleep(Duration::from_millis(10));
        let second = stopwatch();

        assert!(second.instant() > first.instant());
        let snapshot = first.snapshot();
        assert!(snapshot.duration >= Duration::from_millis(10));
        assert!(snapshot.end_time() >= snapshot.start_time);
    }
}
