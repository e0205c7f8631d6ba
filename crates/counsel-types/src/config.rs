//! Global configuration types for Counsel.
//!
//! `GlobalConfig` represents the top-level `config.toml` that controls
//! billing cadence, admission thresholds, and event-bus sizing.

use serde::{Deserialize, Serialize};

use std::time::Duration;

use crate::money::Amount;

/// Top-level configuration for the Counsel platform.
///
/// Loaded from `~/.counsel/config.toml`. All fields have sensible defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalConfig {
    #[serde(default)]
    pub billing: BillingConfig,

    #[serde(default)]
    pub notify: NotifyConfig,

    /// Capacity of the broadcast event bus.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_event_capacity() -> usize {
    1024
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            billing: BillingConfig::default(),
            notify: NotifyConfig::default(),
            event_capacity: default_event_capacity(),
        }
    }
}

/// Advisor notification configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    /// Seconds between repeated alerts for an unanswered pending session.
    #[serde(default = "default_realert_seconds")]
    pub realert_seconds: u64,
}

fn default_realert_seconds() -> u64 {
    10
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            realert_seconds: default_realert_seconds(),
        }
    }
}

impl NotifyConfig {
    /// Interval between repeated alerts for a pending session.
    pub fn realert_interval(&self) -> Duration {
        Duration::from_secs(self.realert_seconds)
    }
}

/// Billing engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillingConfig {
    /// Minimum client balance (cents) required to request or accept a
    /// session. Checked at admission and re-checked at accept.
    #[serde(default = "default_minimum_funding_cents")]
    pub minimum_funding_cents: u64,

    /// Seconds between billing cycles for an active session.
    #[serde(default = "default_cycle_seconds")]
    pub cycle_seconds: u64,

    /// Seconds an inactive billing meter is retained before removal, so a
    /// late duplicate "end" call observes "inactive" rather than "unknown".
    #[serde(default = "default_retention_seconds")]
    pub retention_seconds: u64,
}

fn default_minimum_funding_cents() -> u64 {
    300
}

fn default_cycle_seconds() -> u64 {
    60
}

fn default_retention_seconds() -> u64 {
    120
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            minimum_funding_cents: default_minimum_funding_cents(),
            cycle_seconds: default_cycle_seconds(),
            retention_seconds: default_retention_seconds(),
        }
    }
}

impl BillingConfig {
    /// The minimum funding threshold as an `Amount`.
    pub fn minimum_funding(&self) -> Amount {
        Amount::from_cents(self.minimum_funding_cents)
    }

    /// The billing cycle cadence.
    pub fn cycle_interval(&self) -> Duration {
        Duration::from_secs(self.cycle_seconds)
    }

    /// Grace window for retaining inactive billing meters.
    pub fn retention_grace(&self) -> Duration {
        Duration::from_secs(self.retention_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_config_default_values() {
        let config = GlobalConfig::default();
        assert_eq!(config.billing.minimum_funding_cents, 300);
        assert_eq!(config.billing.cycle_seconds, 60);
        assert_eq!(config.billing.retention_seconds, 120);
        assert_eq!(config.notify.realert_seconds, 10);
        assert_eq!(config.event_capacity, 1024);
    }

    #[test]
    fn test_deserialize_empty_uses_defaults() {
        let config: GlobalConfig = toml::from_str("").unwrap();
        assert_eq!(config.billing.minimum_funding(), Amount::from_units(3));
        assert_eq!(config.billing.cycle_interval(), Duration::from_secs(60));
    }

    #[test]
    fn test_deserialize_with_values() {
        let toml_str = r#"
event_capacity = 256

[billing]
minimum_funding_cents = 500
cycle_seconds = 30
"#;
        let config: GlobalConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.event_capacity, 256);
        assert_eq!(config.billing.minimum_funding(), Amount::from_cents(500));
        assert_eq!(config.billing.cycle_interval(), Duration::from_secs(30));
        // Unspecified field keeps its default
        assert_eq!(config.billing.retention_seconds, 120);
    }
}
