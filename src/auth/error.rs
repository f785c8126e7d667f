//! Error types for the login core.

use std::time::Duration;
use thiserror::Error;

/// Failure reported by a storage backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("corrupt row: {0}")]
    Corrupt(String),
}

/// Internal and request-level failures outside the tagged login outcomes.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Ledger, session or principal storage failed. Always fail-closed.
    #[error("storage failure: {0}")]
    Storage(#[from] StoreError),

    #[error("cryptography error: {0}")]
    Crypto(String),

    #[error("failed to generate session token: {0}")]
    TokenGeneration(#[from] rand::Error),

    #[error("unauthenticated")]
    Unauthenticated,

    #[error("forbidden")]
    Forbidden,

    #[error("current password is incorrect")]
    InvalidCurrentPassword,

    /// A throttle counter is at its limit; the password was not checked.
    #[error("too many attempts, locked for {}s", .cooldown.as_secs())]
    LockedOut { cooldown: Duration },

    #[error("password must be at least {min_length} characters")]
    WeakPassword { min_length: usize },
}

/// Round a cool-down up to whole minutes for user-facing text.
#[must_use]
pub fn whole_minutes(duration: Duration) -> u64 {
    duration.as_secs().div_ceil(60)
}
