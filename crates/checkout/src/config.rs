//! Runtime configuration for the checkout services.

use std::env;

use chrono::Duration;

/// Tunables loaded from environment variables.
///
/// Reads from the environment:
/// - `RESERVATION_TTL_SECS` — reservation timeout (default: `900`)
/// - `RECONCILE_RETRY_LIMIT` — conditional-update retries (default: `3`)
/// - `SWEEP_BATCH_LIMIT` — reservations per sweep pass (default: `100`)
/// - `RUST_LOG` — tracing filter directive (default: `"info"`)
#[derive(Debug, Clone)]
pub struct CheckoutConfig {
    /// How long a stock reservation may sit unresolved before the
    /// sweeper cancels the order behind it, in seconds.
    pub reservation_ttl_secs: u64,
    /// How many times a conditional update is retried before the
    /// operation gives up with a contention error.
    pub reconcile_retry_limit: u32,
    /// Maximum number of expired reservations processed per sweep.
    pub sweep_batch_limit: i64,
    /// Default tracing filter when RUST_LOG is not set.
    pub log_filter: String,
}

impl CheckoutConfig {
    /// Loads configuration from environment variables, falling back to
    /// defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            reservation_ttl_secs: env::var("RESERVATION_TTL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.reservation_ttl_secs),
            reconcile_retry_limit: env::var("RECONCILE_RETRY_LIMIT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.reconcile_retry_limit),
            sweep_batch_limit: env::var("SWEEP_BATCH_LIMIT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.sweep_batch_limit),
            log_filter: env::var("RUST_LOG").unwrap_or(defaults.log_filter),
        }
    }

    /// The reservation timeout as a duration usable against stored
    /// timestamps.
    pub fn reservation_ttl(&self) -> Duration {
        Duration::seconds(self.reservation_ttl_secs as i64)
    }
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            reservation_ttl_secs: 900,
            reconcile_retry_limit: 3,
            sweep_batch_limit: 100,
            log_filter: "info".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = CheckoutConfig::default();
        assert_eq!(config.reservation_ttl_secs, 900);
        assert_eq!(config.reconcile_retry_limit, 3);
        assert_eq!(config.sweep_batch_limit, 100);
        assert_eq!(config.log_filter, "info");
    }

    #[test]
    fn test_reservation_ttl_conversion() {
        let config = CheckoutConfig {
            reservation_ttl_secs: 120,
            ..CheckoutConfig::default()
        };
        assert_eq!(config.reservation_ttl(), Duration::minutes(2));
    }
}
