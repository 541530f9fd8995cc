//! Delay policy between same-provider retries.
//!
//! Exponential backoff via `backon`, capped at `max_delay`. The number of
//! retries comes from the effective retry policy, so `max_retries = 0`
//! yields a builder that never sleeps.

use std::time::Duration;

use backon::ExponentialBuilder;
use serde::{Deserialize, Serialize};

use crate::config::duration_human;

/// Backoff settings for same-provider retries.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BackoffConfig {
    /// Delay before the first retry
    #[serde(with = "duration_human")]
    pub min_delay: Duration,

    /// Upper bound on any single delay
    #[serde(with = "duration_human")]
    pub max_delay: Duration,

    /// Randomize delays to spread retries from concurrent runs
    pub jitter: bool,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            min_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(2),
            jitter: false,
        }
    }
}

impl BackoffConfig {
    /// No delay between retries.
    pub fn immediate() -> Self {
        Self {
            min_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            jitter: false,
        }
    }

    /// Builder allowing at most `max_retries` retries after the first attempt.
    pub fn builder(&self, max_retries: u32) -> ExponentialBuilder {
        let builder = ExponentialBuilder::default()
            .with_min_delay(self.min_delay)
            .with_max_delay(self.max_delay)
            .with_max_times(max_retries as usize);
        if self.jitter {
            builder.with_jitter()
        } else {
            builder
        }
    }
}
