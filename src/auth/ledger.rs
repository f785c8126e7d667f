//! Append-only ledger of login attempts.
//!
//! Every login call that reaches credential verification writes exactly one
//! record, success or failure. Records are never updated; the only deletion is
//! the age-based cleanup run by the background worker.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::{fmt, time::Duration};
use utoipa::ToSchema;
use uuid::Uuid;

use super::{clock::cutoff, error::StoreError};

/// Why an attempt failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    InvalidCredentials,
    InactiveAccount,
}

impl FailureReason {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidCredentials => "invalid_credentials",
            Self::InactiveAccount => "inactive_account",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "invalid_credentials" => Some(Self::InvalidCredentials),
            "inactive_account" => Some(Self::InactiveAccount),
            _ => None,
        }
    }

    /// Only wrong-credential failures consume the throttle budget.
    #[must_use]
    pub const fn counts_toward_throttle(self) -> bool {
        matches!(self, Self::InvalidCredentials)
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which column a failure counter is keyed on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dimension {
    Identity,
    SourceAddress,
}

impl Dimension {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Identity => "identity",
            Self::SourceAddress => "source_address",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, ToSchema)]
pub struct AttemptRecord {
    pub id: Uuid,
    pub identity: String,
    pub source_address: String,
    pub user_agent: String,
    pub succeeded: bool,
    pub failure_reason: Option<FailureReason>,
    pub occurred_at: DateTime<Utc>,
}

impl AttemptRecord {
    /// Whether this record counts toward a lockout.
    #[must_use]
    pub fn is_throttled_failure(&self) -> bool {
        !self.succeeded
            && self
                .failure_reason
                .is_some_and(FailureReason::counts_toward_throttle)
    }

    #[must_use]
    pub fn key(&self, dimension: Dimension) -> &str {
        match dimension {
            Dimension::Identity => &self.identity,
            Dimension::SourceAddress => &self.source_address,
        }
    }
}

/// Attempt data supplied by the orchestrator; id and timestamp are assigned on write.
#[derive(Clone, Debug)]
pub struct NewAttempt {
    pub identity: String,
    pub source_address: String,
    pub user_agent: String,
    pub succeeded: bool,
    pub failure_reason: Option<FailureReason>,
}

impl NewAttempt {
    #[must_use]
    pub fn success(identity: &str, source_address: &str, user_agent: &str) -> Self {
        Self {
            identity: identity.to_string(),
            source_address: source_address.to_string(),
            user_agent: user_agent.to_string(),
            succeeded: true,
            failure_reason: None,
        }
    }

    #[must_use]
    pub fn failure(
        identity: &str,
        source_address: &str,
        user_agent: &str,
        reason: FailureReason,
    ) -> Self {
        Self {
            identity: identity.to_string(),
            source_address: source_address.to_string(),
            user_agent: user_agent.to_string(),
            succeeded: false,
            failure_reason: Some(reason),
        }
    }

    #[must_use]
    pub fn into_record(self, at: DateTime<Utc>) -> AttemptRecord {
        AttemptRecord {
            id: Uuid::now_v7(),
            identity: self.identity,
            source_address: self.source_address,
            user_agent: self.user_agent,
            succeeded: self.succeeded,
            failure_reason: self.failure_reason,
            occurred_at: at,
        }
    }
}

#[async_trait]
pub trait AttemptLedger: Send + Sync {
    /// Append an immutable record stamped with `at`.
    async fn record(&self, attempt: NewAttempt, at: DateTime<Utc>)
        -> Result<AttemptRecord, StoreError>;

    /// Count throttled failures for `key` with `occurred_at > since`.
    async fn count_failures(
        &self,
        dimension: Dimension,
        key: &str,
        since: DateTime<Utc>,
    ) -> Result<u32, StoreError>;

    /// Delete records with `occurred_at < before`, returning how many went away.
    async fn cleanup(&self, before: DateTime<Utc>) -> Result<u64, StoreError>;

    /// Newest records first.
    async fn recent(&self, limit: u32, offset: u32) -> Result<Vec<AttemptRecord>, StoreError>;

    /// Failures inside the trailing `window` ending at `now`.
    async fn count_failures_within(
        &self,
        dimension: Dimension,
        key: &str,
        window: Duration,
        now: DateTime<Utc>,
    ) -> Result<u32, StoreError> {
        self.count_failures(dimension, key, cutoff(now, window)).await
    }

    /// Prune everything older than `retention` as of `now`.
    async fn cleanup_older_than(
        &self,
        retention: Duration,
        now: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        self.cleanup(cutoff(now, retention)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_reason_round_trips_tags() {
        for reason in [FailureReason::InvalidCredentials, FailureReason::InactiveAccount] {
            assert_eq!(FailureReason::parse(reason.as_str()), Some(reason));
        }
        assert_eq!(FailureReason::parse("locked"), None);
    }

    #[test]
    fn inactive_failures_do_not_count() {
        let now = Utc::now();
        let inactive = NewAttempt::failure(
            "a@x.com",
            "10.0.0.1",
            "ua",
            FailureReason::InactiveAccount,
        )
        .into_record(now);
        let invalid = NewAttempt::failure(
            "a@x.com",
            "10.0.0.1",
            "ua",
            FailureReason::InvalidCredentials,
        )
        .into_record(now);
        let success = NewAttempt::success("a@x.com", "10.0.0.1", "ua").into_record(now);

        assert!(!inactive.is_throttled_failure());
        assert!(invalid.is_throttled_failure());
        assert!(!success.is_throttled_failure());
    }

    #[test]
    fn key_selects_dimension() {
        let record = NewAttempt::success("a@x.com", "10.0.0.1", "ua").into_record(Utc::now());
        assert_eq!(record.key(Dimension::Identity), "a@x.com");
        assert_eq!(record.key(Dimension::SourceAddress), "10.0.0.1");
    }

    #[test]
    fn failure_reason_serializes_snake_case() {
        let json = serde_json::to_string(&FailureReason::InactiveAccount).unwrap();
        assert_eq!(json, "\"inactive_account\"");
    }
}
