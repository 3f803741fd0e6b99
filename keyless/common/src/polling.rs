// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use crate::error::KeylessError;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds};
use std::time::Duration;

/// Bounds for waiting on remote state. The attempt budget and the timeout are
/// independent: whichever is reached first ends the wait.
#[serde_as]
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq, Serialize)]
#[serde(try_from = "RawPollingConfig")]
pub struct PollingConfig {
    max_attempts: u32,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "poll_interval_ms")]
    poll_interval: Duration,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "timeout_ms")]
    timeout: Duration,
}

impl PollingConfig {
    pub const DEFAULT: PollingConfig = PollingConfig {
        max_attempts: 10,
        poll_interval: Duration::from_secs(2),
        timeout: Duration::from_secs(30),
    };
    pub const QUICK: PollingConfig = PollingConfig {
        max_attempts: 5,
        poll_interval: Duration::from_secs(1),
        timeout: Duration::from_secs(10),
    };
    pub const STANDARD: PollingConfig = PollingConfig {
        max_attempts: 5,
        poll_interval: Duration::from_secs(2),
        timeout: Duration::from_secs(15),
    };

    pub fn new(
        max_attempts: u32,
        poll_interval: Duration,
        timeout: Duration,
    ) -> Result<Self, KeylessError> {
        if max_attempts == 0 {
            return Err(KeylessError::InvalidInput(
                "max_attempts must be at least 1".into(),
            ));
        }
        Ok(Self {
            max_attempts,
            poll_interval,
            timeout,
        })
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[serde_as]
#[derive(Deserialize)]
struct RawPollingConfig {
    max_attempts: u32,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    poll_interval_ms: Duration,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    timeout_ms: Duration,
}

impl TryFrom<RawPollingConfig> for PollingConfig {
    type Error = KeylessError;

    fn try_from(raw: RawPollingConfig) -> Result<Self, Self::Error> {
        PollingConfig::new(raw.max_attempts, raw.poll_interval_ms, raw.timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn zero_attempts_are_rejected() {
        assert!(PollingConfig::new(0, Duration::ZERO, Duration::from_secs(1)).is_err());
        let config = PollingConfig::new(1, Duration::ZERO, Duration::from_secs(10)).unwrap();
        assert_eq!(config.max_attempts(), 1);
        assert_eq!(config.poll_interval(), Duration::ZERO);
    }

    #[test]
    fn presets_match_their_budgets() {
        assert_eq!(PollingConfig::default(), PollingConfig::DEFAULT);
        assert_eq!(PollingConfig::QUICK.max_attempts(), 5);
        assert_eq!(PollingConfig::QUICK.timeout(), Duration::from_secs(10));
        assert_eq!(PollingConfig::STANDARD.poll_interval(), Duration::from_secs(2));
    }

    #[test]
    fn deserializes_millisecond_durations() {
        let config: PollingConfig = serde_json::from_value(json!({
            "max_attempts": 3,
            "poll_interval_ms": 250,
            "timeout_ms": 5000,
        }))
        .unwrap();
        assert_eq!(config.poll_interval(), Duration::from_millis(250));
        assert_eq!(config.timeout(), Duration::from_secs(5));

        let zero_attempts = serde_json::from_value::<PollingConfig>(json!({
            "max_attempts": 0,
            "poll_interval_ms": 250,
            "timeout_ms": 5000,
        }));
        assert!(zero_attempts.is_err());
    }

    #[test]
    fn serializes_with_the_same_field_names() {
        let json = serde_json::to_value(PollingConfig::QUICK).unwrap();
        assert_eq!(json["poll_interval_ms"], 1000);
        assert_eq!(json["timeout_ms"], 10000);
    }
}
