//! Configuration management for the reservation engine.
//!
//! Loads configuration from environment variables with sensible defaults.

use crate::finance::{CommissionPolicy, PROMO_FEE_RATE, PROMO_WINDOW_DAYS, STANDARD_FEE_RATE};
use crate::types::Rate;
use serde::{Deserialize, Serialize};
use std::env;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Commission defaults
    pub commission: CommissionConfig,
    /// Guest notification settings
    pub notifications: NotificationConfig,
    /// Bulk operation settings
    pub bulk: BulkConfig,
    /// Log filter (`RUST_LOG` syntax) handed to the subscriber
    pub log_level: String,
}

/// Commission defaults for venues without explicit terms
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommissionConfig {
    /// Standard rate in basis points
    pub standard_fee_bps: u32,
    /// Promotional rate in basis points
    pub promo_fee_bps: u32,
    /// Promotional window after first activation, in days
    pub promo_window_days: i64,
}

/// Guest notification settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Whether notification effects are produced at all
    pub enabled: bool,
}

/// Bulk operation settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkConfig {
    /// Maximum concurrent writes during a bulk reschedule
    pub reschedule_concurrency: usize,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Falls back to default values if environment variables are not set or
    /// cannot be parsed.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            commission: CommissionConfig {
                standard_fee_bps: lookup("DAYPASS_STANDARD_FEE_BPS")
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(STANDARD_FEE_RATE.basis_points()),
                promo_fee_bps: lookup("DAYPASS_PROMO_FEE_BPS")
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(PROMO_FEE_RATE.basis_points()),
                promo_window_days: lookup("DAYPASS_PROMO_WINDOW_DAYS")
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(PROMO_WINDOW_DAYS),
            },
            notifications: NotificationConfig {
                enabled: lookup("DAYPASS_NOTIFICATIONS_ENABLED")
                    .and_then(|s| parse_bool(&s))
                    .unwrap_or(true),
            },
            bulk: BulkConfig {
                reschedule_concurrency: lookup("DAYPASS_RESCHEDULE_CONCURRENCY")
                    .and_then(|s| s.parse().ok())
                    .filter(|n| *n > 0)
                    .unwrap_or(8),
            },
            log_level: lookup("RUST_LOG").unwrap_or_else(|| "info".to_string()),
        }
    }

    /// Commission policy for venues without explicit terms (no activation date)
    #[must_use]
    pub const fn commission_policy(&self) -> CommissionPolicy {
        CommissionPolicy {
            standard_rate: Rate::from_basis_points(self.commission.standard_fee_bps),
            promo_rate: Rate::from_basis_points(self.commission.promo_fee_bps),
            promo_window_days: self.commission.promo_window_days,
            first_activation: None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_match_the_commission_schedule() {
        let config = Config::default();
        assert_eq!(config.commission.standard_fee_bps, 1_200);
        assert_eq!(config.commission.promo_fee_bps, 1_000);
        assert_eq!(config.commission.promo_window_days, 30);
        assert!(config.notifications.enabled);
        assert_eq!(config.bulk.reschedule_concurrency, 8);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.commission_policy(), CommissionPolicy::default());
    }

    #[test]
    fn overrides_and_bad_values() {
        let vars = HashMap::from([
            ("DAYPASS_STANDARD_FEE_BPS", "1500"),
            ("DAYPASS_PROMO_FEE_BPS", "ten"),
            ("DAYPASS_NOTIFICATIONS_ENABLED", "off"),
            ("DAYPASS_RESCHEDULE_CONCURRENCY", "0"),
            ("RUST_LOG", "warn,daypass_reservations=trace"),
        ]);
        let config = Config::from_lookup(|key| vars.get(key).map(ToString::to_string));

        assert_eq!(config.commission_policy().standard_rate, Rate::from_basis_points(1_500));
        assert_eq!(config.commission.promo_fee_bps, 1_000);
        assert!(!config.notifications.enabled);
        assert_eq!(config.bulk.reschedule_concurrency, 8);
        assert_eq!(config.log_level, "warn,daypass_reservations=trace");
    }
}
