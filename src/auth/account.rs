//! Session-bound operations: bearer resolution, logout, password change and
//! the administrative views over both logs.

use secrecy::SecretString;
use serde_json::json;
use tracing::{info, instrument, warn};

use super::{
    audit::{AuditAction, AuditEntry, NewAuditEntry},
    credentials::validate_new_password,
    error::{AuthError, StoreError},
    ledger::{AttemptRecord, FailureReason, NewAttempt},
    login::{normalize_identity, Authenticator, ClientContext},
    principal::Principal,
    session::{hash_session_token, SessionRecord},
    throttle::ThrottleDecision,
};

/// A bearer token resolved to a live session and its principal.
#[derive(Clone, Debug)]
pub struct AuthenticatedSession {
    pub session: SessionRecord,
    pub principal: Principal,
    token_hash: Vec<u8>,
}

impl Authenticator {
    /// Resolve a raw bearer token.
    ///
    /// Disabled staff accounts lose their sessions immediately.
    ///
    /// # Errors
    /// Returns `AuthError::Unauthenticated` for unknown, revoked or expired
    /// tokens and `AuthError::Storage` when a lookup fails.
    pub async fn authenticate(&self, token: &str) -> Result<AuthenticatedSession, AuthError> {
        let token_hash = hash_session_token(token);
        let session = self
            .sessions
            .lookup(&token_hash, self.clock.now())
            .await?
            .ok_or(AuthError::Unauthenticated)?;

        let principal = self
            .directory
            .principal_by_id(session.principal_kind, session.principal_id)
            .await?
            .ok_or(AuthError::Unauthenticated)?;

        if let Principal::Staff(staff) = &principal {
            if !staff.active {
                return Err(AuthError::Unauthenticated);
            }
        }

        Ok(AuthenticatedSession {
            session,
            principal,
            token_hash,
        })
    }

    /// Revoke the caller's session.
    ///
    /// # Errors
    /// Returns `AuthError::Storage` if the session cannot be revoked.
    #[instrument(skip_all, fields(principal_id = %current.principal.id()))]
    pub async fn logout(
        &self,
        current: &AuthenticatedSession,
        client: &ClientContext,
    ) -> Result<(), AuthError> {
        let revoked = self
            .sessions
            .revoke(&current.token_hash, self.clock.now())
            .await?;
        if !revoked {
            warn!("session already revoked");
        }

        self.append_audit(NewAuditEntry::new(
            AuditAction::Logout,
            current.principal.email(),
            current.principal.actor_kind(),
            &client.source_address,
            &client.user_agent,
        ))
        .await;

        Ok(())
    }

    /// Replace the caller's password after re-verifying the current one.
    ///
    /// A wrong current password is a ledger failure for the principal's email,
    /// so it shares the login throttle with that identity and source address.
    ///
    /// # Errors
    /// Returns `AuthError::WeakPassword` or `AuthError::InvalidCurrentPassword`
    /// for rejected input, `AuthError::LockedOut` when a throttle counter is at
    /// its limit, `AuthError::Crypto` if hashing fails and
    /// `AuthError::Storage` if the ledger or the new hash cannot be written.
    #[instrument(skip_all, fields(principal_id = %current.principal.id()))]
    pub async fn change_password(
        &self,
        current: &AuthenticatedSession,
        current_password: &SecretString,
        new_password: &SecretString,
        client: &ClientContext,
    ) -> Result<(), AuthError> {
        validate_new_password(new_password)?;

        let principal = &current.principal;
        let identity = normalize_identity(principal.email());

        if let ThrottleDecision::LockedOut {
            dimension,
            failures,
            cooldown,
        } = self
            .throttle
            .evaluate(
                self.ledger.as_ref(),
                &identity,
                &client.source_address,
                self.clock.now(),
            )
            .await?
        {
            warn!(
                dimension = dimension.as_str(),
                failures, "password change rejected, throttle limit reached"
            );
            return Err(AuthError::LockedOut { cooldown });
        }

        if !self
            .verifier
            .matches(current_password, principal.credential_hash())
            .await
        {
            self.record_attempt(NewAttempt::failure(
                &identity,
                &client.source_address,
                &client.user_agent,
                FailureReason::InvalidCredentials,
            ))
            .await?;
            self.append_audit(
                NewAuditEntry::new(
                    AuditAction::PasswordChangeFailed,
                    principal.email(),
                    principal.actor_kind(),
                    &client.source_address,
                    &client.user_agent,
                )
                .with_detail(json!({ "reason": "invalid_current_password" })),
            )
            .await;
            return Err(AuthError::InvalidCurrentPassword);
        }

        let hash = self.verifier.hash_password(new_password)?;
        self.directory
            .set_credential_hash(principal.kind(), principal.id(), &hash)
            .await?;

        self.append_audit(NewAuditEntry::new(
            AuditAction::PasswordChanged,
            principal.email(),
            principal.actor_kind(),
            &client.source_address,
            &client.user_agent,
        ))
        .await;

        info!("password changed");
        Ok(())
    }

    /// Newest audit entries, staff admins only.
    ///
    /// # Errors
    /// Returns `AuthError::Forbidden` for non-admins and `AuthError::Storage`
    /// if the trail cannot be read.
    pub async fn audit_entries(
        &self,
        current: &AuthenticatedSession,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<AuditEntry>, AuthError> {
        require_admin(current)?;
        Ok(self.audit.recent(limit, offset).await?)
    }

    /// Remove every audit entry, then record who did it. Staff admins only.
    ///
    /// # Errors
    /// Returns `AuthError::Forbidden` for non-admins and `AuthError::Storage`
    /// if the clear fails.
    #[instrument(skip_all, fields(principal_id = %current.principal.id()))]
    pub async fn clear_audit(
        &self,
        current: &AuthenticatedSession,
        client: &ClientContext,
    ) -> Result<u64, AuthError> {
        require_admin(current)?;
        let removed = self.audit.clear().await?;

        self.append_audit(
            NewAuditEntry::new(
                AuditAction::AuditCleared,
                current.principal.email(),
                current.principal.actor_kind(),
                &client.source_address,
                &client.user_agent,
            )
            .with_detail(json!({ "removed": removed })),
        )
        .await;

        warn!(removed, "audit trail cleared");
        Ok(removed)
    }

    /// Newest ledger records, staff admins only.
    ///
    /// # Errors
    /// Returns `AuthError::Forbidden` for non-admins and `AuthError::Storage`
    /// if the ledger cannot be read.
    pub async fn login_attempts(
        &self,
        current: &AuthenticatedSession,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<AttemptRecord>, AuthError> {
        require_admin(current)?;
        Ok(self.ledger.recent(limit, offset).await?)
    }

    /// Prune ledger records older than the configured retention.
    ///
    /// # Errors
    /// Returns the ledger's error if the delete fails.
    pub async fn cleanup_ledger(&self) -> Result<u64, StoreError> {
        self.ledger
            .cleanup_older_than(self.config.ledger_retention(), self.clock.now())
            .await
    }
}

fn require_admin(current: &AuthenticatedSession) -> Result<(), AuthError> {
    if current.principal.is_admin() {
        Ok(())
    } else {
        Err(AuthError::Forbidden)
    }
}
