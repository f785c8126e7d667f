//! Runtime configuration for the login core.

use std::time::Duration;

use super::throttle::ThrottleConfig;

const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(12 * 60 * 60);
const DEFAULT_LEDGER_RETENTION: Duration = Duration::from_secs(90 * 24 * 60 * 60);
const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

#[derive(Clone, Debug)]
pub struct AuthConfig {
    throttle: ThrottleConfig,
    session_ttl: Duration,
    ledger_retention: Duration,
    ledger_cleanup_interval: Duration,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthConfig {
    #[must_use]
    pub fn new() -> Self {
        Self {
            throttle: ThrottleConfig::default(),
            session_ttl: DEFAULT_SESSION_TTL,
            ledger_retention: DEFAULT_LEDGER_RETENTION,
            ledger_cleanup_interval: DEFAULT_CLEANUP_INTERVAL,
        }
    }

    #[must_use]
    pub fn with_throttle(mut self, throttle: ThrottleConfig) -> Self {
        self.throttle = throttle;
        self
    }

    #[must_use]
    pub fn with_session_ttl_seconds(mut self, seconds: u64) -> Self {
        self.session_ttl = Duration::from_secs(seconds);
        self
    }

    #[must_use]
    pub fn with_ledger_retention_days(mut self, days: u64) -> Self {
        self.ledger_retention = Duration::from_secs(days.saturating_mul(24 * 60 * 60));
        self
    }

    #[must_use]
    pub fn with_ledger_cleanup_interval_hours(mut self, hours: u64) -> Self {
        self.ledger_cleanup_interval = Duration::from_secs(hours.saturating_mul(60 * 60));
        self
    }

    #[must_use]
    pub fn throttle(&self) -> &ThrottleConfig {
        &self.throttle
    }

    #[must_use]
    pub fn session_ttl(&self) -> Duration {
        self.session_ttl
    }

    #[must_use]
    pub fn ledger_retention(&self) -> Duration {
        self.ledger_retention
    }

    #[must_use]
    pub fn ledger_cleanup_interval(&self) -> Duration {
        self.ledger_cleanup_interval
    }
}
