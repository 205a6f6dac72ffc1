// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::config::{RefreshConfig, RefreshMode};
use std::time::Duration;

/// Decides how long a parsed result stays fresh.
#[derive(Clone, Debug)]
pub struct RefreshPolicy {
    minimum_interval: Duration,
    duration_divisor: u32,
    mode: RefreshMode,
}

impl RefreshPolicy {
    /// Creates a new policy from config.
    pub fn new(config: &RefreshConfig) -> Self {
        Self {
            minimum_interval: config.minimum_interval(),
            duration_divisor: config.duration_divisor().max(1),
            mode: config.mode(),
        }
    }

    /// Returns a copy of this policy with the given mode.
    pub fn with_mode(mut self, mode: RefreshMode) -> Self {
        self.mode = mode;
        self
    }

    /// The refresh mode.
    pub fn mode(&self) -> RefreshMode {
        self.mode
    }

    /// The refresh interval for a build.
    ///
    /// A per-handle override always wins. Otherwise the interval is the expected duration of the
    /// build divided by the divisor, but never less than the minimum interval.
    pub fn interval(
        &self,
        interval_override: Option<Duration>,
        estimated_duration: Option<Duration>,
    ) -> Duration {
        if let Some(interval) = interval_override {
            return interval;
        }
        let scaled = estimated_duration
            .map(|estimate| estimate / self.duration_divisor)
            .unwrap_or_default();
        self.minimum_interval.max(scaled)
    }
}
