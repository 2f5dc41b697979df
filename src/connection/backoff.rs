//! Retry delay policy for the reconnect loop

use std::time::Duration;

use rand::Rng;

use crate::config::ReconnectConfig;

/// Reconnect delay calculator.
///
/// With the default configuration (multiplier 1.0) every delay equals
/// `initial_delay_ms`, matching the deployed flat-delay client; a
/// multiplier above 1.0 turns it into capped exponential backoff. The
/// emitted delay is never zero and never exceeds `max_delay_ms`.
pub struct ReconnectBackoff {
    config: ReconnectConfig,
    current_delay_ms: u64,
    attempt: u32,
}

impl ReconnectBackoff {
    pub fn new(config: ReconnectConfig) -> Self {
        let initial = config.initial_delay_ms;
        Self {
            config,
            current_delay_ms: initial,
            attempt: 0,
        }
    }

    /// Get the delay to sleep before the next connect attempt
    pub fn next_delay(&mut self) -> Duration {
        self.attempt += 1;

        // A zero delay would retry-storm the server
        let capped = (self.current_delay_ms as f64)
            .min(self.config.max_delay_ms as f64)
            .max(1.0);

        // Apply jitter only if jitter_factor > 0
        let final_delay = if self.config.jitter_factor > 0.0 {
            let jitter_range = capped * self.config.jitter_factor;
            let jitter = rand::rng().random_range(-jitter_range..jitter_range);
            (capped + jitter).max(1.0) as u64
        } else {
            capped as u64
        };

        // Grow the base deterministically; jitter never compounds
        self.current_delay_ms = (capped * self.config.multiplier)
            .min(self.config.max_delay_ms as f64) as u64;

        Duration::from_millis(final_delay)
    }

    /// Reset after a successful connect
    pub fn reset(&mut self) {
        self.current_delay_ms = self.config.initial_delay_ms;
        self.attempt = 0;
    }

    /// Consecutive failed attempts since the last reset
    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}

impl Default for ReconnectBackoff {
    fn default() -> Self {
        Self::new(ReconnectConfig::default())
    }
}
