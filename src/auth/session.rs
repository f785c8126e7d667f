//! Bearer session tokens.
//!
//! The raw token is returned to the caller once; storage only ever sees its
//! SHA-256 hash.

use async_trait::async_trait;
use base64::Engine;
use chrono::{DateTime, Utc};
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::{
    error::{AuthError, StoreError},
    principal::PrincipalKind,
};

#[derive(Clone, Debug)]
pub struct NewSession {
    pub token_hash: Vec<u8>,
    pub principal_kind: PrincipalKind,
    pub principal_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionRecord {
    pub id: Uuid,
    pub principal_kind: PrincipalKind,
    pub principal_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Returns `Ok(false)` when the hash already exists.
    async fn insert(&self, session: NewSession) -> Result<bool, StoreError>;

    /// Resolve an unrevoked session that has not expired at `now`.
    async fn lookup(
        &self,
        token_hash: &[u8],
        now: DateTime<Utc>,
    ) -> Result<Option<SessionRecord>, StoreError>;

    /// Returns whether a live session was revoked.
    async fn revoke(&self, token_hash: &[u8], at: DateTime<Utc>) -> Result<bool, StoreError>;
}

/// Create a new random session token.
///
/// # Errors
/// Returns `AuthError::TokenGeneration` if the OS random source fails.
pub fn generate_session_token() -> Result<String, AuthError> {
    let mut bytes = [0u8; 32];
    OsRng.try_fill_bytes(&mut bytes)?;
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes))
}

/// Hash a session token so raw values never touch storage.
#[must_use]
pub fn hash_session_token(token: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().to_vec()
}
