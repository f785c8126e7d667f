//! Login orchestration.
//!
//! Flow:
//! 1) Throttle check over the attempt ledger (no credential work when locked).
//! 2) Credential check, staff namespace before client namespace.
//! 3) Ledger write, then principal/session side effects, then audit.
//!
//! Ledger writes are fail-closed: a storage error aborts the call so an outage
//! can never switch brute-force protection off. Audit writes are best-effort.

use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde_json::json;
use std::{fmt, sync::Arc, time::Duration};
use tracing::{error, info, instrument, warn};

use super::{
    audit::{AuditAction, AuditTrail, NewAuditEntry, UNKNOWN_ACTOR},
    clock::{deadline, Clock},
    config::AuthConfig,
    credentials::{CredentialVerifier, Verification},
    error::{whole_minutes, AuthError},
    ledger::{AttemptLedger, FailureReason, NewAttempt},
    principal::{ActorKind, Principal, PrincipalDirectory},
    session::{generate_session_token, hash_session_token, NewSession, SessionStore},
    throttle::{ThrottleDecision, ThrottleEvaluator},
};

const SESSION_INSERT_RETRIES: usize = 3;

/// Caller metadata recorded alongside every ledger and audit write.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClientContext {
    pub source_address: String,
    pub user_agent: String,
}

impl ClientContext {
    #[must_use]
    pub fn new(source_address: impl Into<String>, user_agent: impl Into<String>) -> Self {
        Self {
            source_address: source_address.into(),
            user_agent: user_agent.into(),
        }
    }
}

#[derive(Debug)]
pub struct LoginInput {
    pub identity: String,
    pub secret: SecretString,
    pub client: ClientContext,
}

#[derive(Clone, Debug)]
pub struct LoginSuccess {
    /// Raw bearer token; only its hash is stored.
    pub token: String,
    pub principal: Principal,
    pub expires_at: DateTime<Utc>,
}

/// Terminal state of a login call.
#[derive(Clone, Debug)]
pub enum LoginOutcome {
    Success(LoginSuccess),
    /// A throttle counter is at its limit; nothing was verified or recorded.
    LockedOut { cooldown: Duration },
    /// Secret matched a disabled staff account.
    InactiveAccount,
    /// No principal matched. `remaining` already accounts for this failure.
    InvalidCredentials { remaining: u32, cooldown: Duration },
}

impl LoginOutcome {
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

impl fmt::Display for LoginOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success(_) => f.write_str("Login successful."),
            Self::LockedOut { cooldown } => write!(
                f,
                "Too many login attempts. Please try again in {} minutes.",
                whole_minutes(*cooldown)
            ),
            Self::InactiveAccount => {
                f.write_str("This account is inactive. Please contact an administrator.")
            }
            Self::InvalidCredentials {
                remaining,
                cooldown,
            } => {
                f.write_str("These credentials do not match our records.")?;
                match remaining {
                    0 => write!(
                        f,
                        " Your next attempt will be locked out for {} minutes.",
                        whole_minutes(*cooldown)
                    ),
                    1 => f.write_str(" 1 attempt remaining."),
                    n => write!(f, " {n} attempts remaining."),
                }
            }
        }
    }
}

/// Trimmed, lower-cased identity used for throttling, lookup and logging.
#[must_use]
pub fn normalize_identity(identity: &str) -> String {
    identity.trim().to_lowercase()
}

/// Composes the throttle, verifier, ledger, audit trail and session store.
pub struct Authenticator {
    pub(super) ledger: Arc<dyn AttemptLedger>,
    pub(super) audit: Arc<dyn AuditTrail>,
    pub(super) directory: Arc<dyn PrincipalDirectory>,
    pub(super) sessions: Arc<dyn SessionStore>,
    pub(super) clock: Arc<dyn Clock>,
    pub(super) throttle: ThrottleEvaluator,
    pub(super) verifier: CredentialVerifier,
    pub(super) config: AuthConfig,
}

impl fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Authenticator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Authenticator {
    /// Wire every seam to one backend implementing all storage traits.
    #[must_use]
    pub fn new<S>(
        store: Arc<S>,
        clock: Arc<dyn Clock>,
        verifier: CredentialVerifier,
        config: AuthConfig,
    ) -> Self
    where
        S: AttemptLedger + AuditTrail + PrincipalDirectory + SessionStore + 'static,
    {
        Self {
            ledger: store.clone(),
            audit: store.clone(),
            directory: store.clone(),
            sessions: store,
            clock,
            throttle: ThrottleEvaluator::new(config.throttle().clone()),
            verifier,
            config,
        }
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    #[must_use]
    pub fn verifier(&self) -> &CredentialVerifier {
        &self.verifier
    }

    /// Run one login attempt to a terminal outcome.
    ///
    /// # Errors
    /// Returns `AuthError::Storage` when the ledger, directory or session store
    /// fails, and `AuthError::TokenGeneration` or `AuthError::Crypto` when no
    /// session token can be generated.
    #[instrument(skip_all, fields(source_address = %input.client.source_address))]
    pub async fn login(&self, input: LoginInput) -> Result<LoginOutcome, AuthError> {
        let identity = normalize_identity(&input.identity);
        let client = &input.client;

        let decision = self
            .throttle
            .evaluate(
                self.ledger.as_ref(),
                &identity,
                &client.source_address,
                self.clock.now(),
            )
            .await
            .map_err(|err| {
                error!("Failed to read attempt ledger: {err}");
                AuthError::from(err)
            })?;

        let remaining = match decision {
            ThrottleDecision::LockedOut {
                dimension,
                failures,
                cooldown,
            } => {
                warn!(
                    identity = %identity,
                    dimension = dimension.as_str(),
                    failures,
                    "login locked out"
                );
                return Ok(LoginOutcome::LockedOut { cooldown });
            }
            ThrottleDecision::Allowed { remaining } => remaining,
        };

        let verification = self
            .verifier
            .verify(self.directory.as_ref(), &identity, &input.secret)
            .await?;

        match verification {
            Verification::Staff(staff) => {
                self.complete_login(Principal::Staff(staff), &identity, client)
                    .await
            }
            Verification::Client(account) => {
                self.complete_login(Principal::Client(account), &identity, client)
                    .await
            }
            Verification::Inactive(staff) => {
                let reason = FailureReason::InactiveAccount;
                self.record_attempt(NewAttempt::failure(
                    &identity,
                    &client.source_address,
                    &client.user_agent,
                    reason,
                ))
                .await?;

                let actor_kind = Principal::Staff(staff).actor_kind();
                self.append_audit(
                    NewAuditEntry::new(
                        AuditAction::LoginFailed,
                        &identity,
                        actor_kind,
                        &client.source_address,
                        &client.user_agent,
                    )
                    .with_detail(json!({ "reason": reason.as_str() })),
                )
                .await;

                warn!(identity = %identity, "login rejected for inactive account");
                Ok(LoginOutcome::InactiveAccount)
            }
            Verification::NoMatch => {
                let reason = FailureReason::InvalidCredentials;
                self.record_attempt(NewAttempt::failure(
                    &identity,
                    &client.source_address,
                    &client.user_agent,
                    reason,
                ))
                .await?;

                self.append_audit(
                    NewAuditEntry::new(
                        AuditAction::LoginFailed,
                        UNKNOWN_ACTOR,
                        ActorKind::Unknown,
                        &client.source_address,
                        &client.user_agent,
                    )
                    .with_detail(json!({ "reason": reason.as_str(), "email": identity })),
                )
                .await;

                Ok(LoginOutcome::InvalidCredentials {
                    remaining: remaining.saturating_sub(1),
                    cooldown: self.throttle.config().lockout(),
                })
            }
        }
    }

    async fn complete_login(
        &self,
        mut principal: Principal,
        identity: &str,
        client: &ClientContext,
    ) -> Result<LoginOutcome, AuthError> {
        self.record_attempt(NewAttempt::success(
            identity,
            &client.source_address,
            &client.user_agent,
        ))
        .await?;

        let now = self.clock.now();
        self.directory
            .touch_last_login(principal.kind(), principal.id(), now)
            .await?;
        match &mut principal {
            Principal::Staff(staff) => staff.last_login_at = Some(now),
            Principal::Client(account) => account.last_login_at = Some(now),
        }

        let (token, expires_at) = self.issue_token(&principal, now).await?;

        let action = match principal {
            Principal::Staff(_) => AuditAction::LoginSuccess,
            Principal::Client(_) => AuditAction::ClientLoginSuccess,
        };
        self.append_audit(NewAuditEntry::new(
            action,
            principal.email(),
            principal.actor_kind(),
            &client.source_address,
            &client.user_agent,
        ))
        .await;

        info!(
            principal_id = %principal.id(),
            kind = principal.kind().as_str(),
            "login succeeded"
        );

        Ok(LoginOutcome::Success(LoginSuccess {
            token,
            principal,
            expires_at,
        }))
    }

    /// Create a session for `principal` and return the raw bearer token.
    ///
    /// # Errors
    /// Returns `AuthError::Storage` if the session cannot be stored,
    /// `AuthError::TokenGeneration` if the random source fails and
    /// `AuthError::Crypto` if no unique token could be generated.
    pub async fn issue_token(
        &self,
        principal: &Principal,
        now: DateTime<Utc>,
    ) -> Result<(String, DateTime<Utc>), AuthError> {
        let expires_at = deadline(now, self.config.session_ttl());

        for _ in 0..SESSION_INSERT_RETRIES {
            let token = generate_session_token()?;
            let inserted = self
                .sessions
                .insert(NewSession {
                    token_hash: hash_session_token(&token),
                    principal_kind: principal.kind(),
                    principal_id: principal.id(),
                    created_at: now,
                    expires_at,
                })
                .await?;
            if inserted {
                return Ok((token, expires_at));
            }
        }

        Err(AuthError::Crypto(
            "failed to generate unique session token".to_string(),
        ))
    }

    pub(super) async fn record_attempt(&self, attempt: NewAttempt) -> Result<(), AuthError> {
        self.ledger
            .record(attempt, self.clock.now())
            .await
            .map(|_| ())
            .map_err(|err| {
                error!("Failed to write attempt ledger: {err}");
                AuthError::from(err)
            })
    }

    pub(super) async fn append_audit(&self, entry: NewAuditEntry) {
        let action = entry.action;
        if let Err(err) = self.audit.append(entry, self.clock.now()).await {
            warn!(action = action.as_str(), "Failed to write audit entry: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_identity_trims_and_lowercases() {
        assert_eq!(normalize_identity("  A@X.com "), "a@x.com");
    }

    #[test]
    fn invalid_message_counts_down() {
        let cooldown = Duration::from_secs(900);
        let outcome = LoginOutcome::InvalidCredentials {
            remaining: 3,
            cooldown,
        };
        assert_eq!(
            outcome.to_string(),
            "These credentials do not match our records. 3 attempts remaining."
        );
        let outcome = LoginOutcome::InvalidCredentials {
            remaining: 1,
            cooldown,
        };
        assert!(outcome.to_string().ends_with(" 1 attempt remaining."));
        let outcome = LoginOutcome::InvalidCredentials {
            remaining: 0,
            cooldown,
        };
        assert!(outcome
            .to_string()
            .ends_with("Your next attempt will be locked out for 15 minutes."));
    }

    #[test]
    fn lockout_message_names_minutes() {
        let outcome = LoginOutcome::LockedOut {
            cooldown: Duration::from_secs(900),
        };
        assert_eq!(
            outcome.to_string(),
            "Too many login attempts. Please try again in 15 minutes."
        );
    }
}
