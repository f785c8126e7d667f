//! Audit trail of security-relevant actions.
//!
//! Independent of the attempt ledger: entries are kept until an administrator
//! clears them, and a failed write never changes the outcome of the action
//! being audited.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use utoipa::ToSchema;
use uuid::Uuid;

use super::{error::StoreError, principal::ActorKind};

/// Identity recorded when the actor could not be resolved.
pub const UNKNOWN_ACTOR: &str = "unknown";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuditAction {
    LoginSuccess,
    ClientLoginSuccess,
    LoginFailed,
    Logout,
    PasswordChanged,
    PasswordChangeFailed,
    AuditCleared,
}

impl AuditAction {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LoginSuccess => "login_success",
            Self::ClientLoginSuccess => "client_login_success",
            Self::LoginFailed => "login_failed",
            Self::Logout => "logout",
            Self::PasswordChanged => "password_changed",
            Self::PasswordChangeFailed => "password_change_failed",
            Self::AuditCleared => "audit_cleared",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, ToSchema)]
pub struct AuditEntry {
    pub id: Uuid,
    pub action: String,
    pub actor_identity: String,
    pub actor_kind: ActorKind,
    pub source_address: String,
    pub user_agent: String,
    #[schema(value_type = Option<Object>)]
    pub detail: Option<Value>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Clone, Debug)]
pub struct NewAuditEntry {
    pub action: AuditAction,
    pub actor_identity: String,
    pub actor_kind: ActorKind,
    pub source_address: String,
    pub user_agent: String,
    pub detail: Option<Value>,
}

impl NewAuditEntry {
    #[must_use]
    pub fn new(
        action: AuditAction,
        actor_identity: &str,
        actor_kind: ActorKind,
        source_address: &str,
        user_agent: &str,
    ) -> Self {
        let actor_identity = if actor_identity.is_empty() {
            UNKNOWN_ACTOR
        } else {
            actor_identity
        };
        Self {
            action,
            actor_identity: actor_identity.to_string(),
            actor_kind,
            source_address: source_address.to_string(),
            user_agent: user_agent.to_string(),
            detail: None,
        }
    }

    #[must_use]
    pub fn with_detail(mut self, detail: Value) -> Self {
        self.detail = Some(detail);
        self
    }

    #[must_use]
    pub fn into_entry(self, at: DateTime<Utc>) -> AuditEntry {
        AuditEntry {
            id: Uuid::now_v7(),
            action: self.action.as_str().to_string(),
            actor_identity: self.actor_identity,
            actor_kind: self.actor_kind,
            source_address: self.source_address,
            user_agent: self.user_agent,
            detail: self.detail,
            occurred_at: at,
        }
    }
}

#[async_trait]
pub trait AuditTrail: Send + Sync {
    async fn append(&self, entry: NewAuditEntry, at: DateTime<Utc>)
        -> Result<AuditEntry, StoreError>;

    /// Newest entries first.
    async fn recent(&self, limit: u32, offset: u32) -> Result<Vec<AuditEntry>, StoreError>;

    /// Administrative bulk clear; returns the number of removed entries.
    async fn clear(&self) -> Result<u64, StoreError>;
}
