//! Lockout decisions derived from the attempt ledger.
//!
//! Two counters over the same rolling window:
//! 1) failures per submitted identity (defeats distributed stuffing on one account),
//! 2) failures per source address (defeats password spraying from one host).
//!
//! The evaluator only reads. Checking and recording are separate steps, so two
//! concurrent calls may both pass before either failure lands in the ledger.

use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::debug;

use super::{
    error::StoreError,
    ledger::{AttemptLedger, Dimension},
};

const DEFAULT_MAX_ATTEMPTS_PER_IDENTITY: u32 = 5;
const DEFAULT_WINDOW: Duration = Duration::from_secs(5 * 60);
const DEFAULT_LOCKOUT: Duration = Duration::from_secs(15 * 60);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ThrottleConfig {
    max_attempts_per_identity: u32,
    max_attempts_per_address: u32,
    window: Duration,
    lockout: Duration,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            max_attempts_per_identity: DEFAULT_MAX_ATTEMPTS_PER_IDENTITY,
            max_attempts_per_address: DEFAULT_MAX_ATTEMPTS_PER_IDENTITY * 2,
            window: DEFAULT_WINDOW,
            lockout: DEFAULT_LOCKOUT,
        }
    }
}

impl ThrottleConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the identity limit and re-derives the address limit as twice that.
    #[must_use]
    pub fn with_max_attempts_per_identity(mut self, limit: u32) -> Self {
        self.max_attempts_per_identity = limit;
        self.max_attempts_per_address = limit.saturating_mul(2);
        self
    }

    #[must_use]
    pub fn with_max_attempts_per_address(mut self, limit: u32) -> Self {
        self.max_attempts_per_address = limit;
        self
    }

    #[must_use]
    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    #[must_use]
    pub fn with_lockout(mut self, lockout: Duration) -> Self {
        self.lockout = lockout;
        self
    }

    #[must_use]
    pub fn max_attempts_per_identity(&self) -> u32 {
        self.max_attempts_per_identity
    }

    #[must_use]
    pub fn max_attempts_per_address(&self) -> u32 {
        self.max_attempts_per_address
    }

    #[must_use]
    pub fn window(&self) -> Duration {
        self.window
    }

    #[must_use]
    pub fn lockout(&self) -> Duration {
        self.lockout
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ThrottleDecision {
    /// Credential verification may proceed; `remaining` is `limit - failures`
    /// for the identity counter.
    Allowed { remaining: u32 },
    /// A counter reached its limit. `cooldown` is the advertised wait.
    LockedOut {
        dimension: Dimension,
        failures: u32,
        cooldown: Duration,
    },
}

#[derive(Clone, Debug, Default)]
pub struct ThrottleEvaluator {
    config: ThrottleConfig,
}

impl ThrottleEvaluator {
    #[must_use]
    pub fn new(config: ThrottleConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &ThrottleConfig {
        &self.config
    }

    /// Decide whether `identity` calling from `source_address` may attempt a login.
    ///
    /// # Errors
    /// Returns the ledger's error when either counter cannot be read.
    pub async fn evaluate(
        &self,
        ledger: &dyn AttemptLedger,
        identity: &str,
        source_address: &str,
        now: DateTime<Utc>,
    ) -> Result<ThrottleDecision, StoreError> {
        let window = self.config.window;

        let identity_failures = ledger
            .count_failures_within(Dimension::Identity, identity, window, now)
            .await?;
        if identity_failures >= self.config.max_attempts_per_identity {
            return Ok(self.locked(Dimension::Identity, identity_failures));
        }

        let address_failures = ledger
            .count_failures_within(Dimension::SourceAddress, source_address, window, now)
            .await?;
        if address_failures >= self.config.max_attempts_per_address {
            return Ok(self.locked(Dimension::SourceAddress, address_failures));
        }

        debug!(
            identity_failures,
            address_failures, "throttle check passed"
        );

        Ok(ThrottleDecision::Allowed {
            remaining: self.config.max_attempts_per_identity - identity_failures,
        })
    }

    fn locked(&self, dimension: Dimension, failures: u32) -> ThrottleDecision {
        ThrottleDecision::LockedOut {
            dimension,
            failures,
            cooldown: self.config.lockout,
        }
    }
}
