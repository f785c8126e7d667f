//! Staff and client principals, and the directory that resolves them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use utoipa::ToSchema;
use uuid::Uuid;

use super::error::StoreError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum StaffRole {
    Admin,
    User,
}

impl StaffRole {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::User => "user",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "admin" => Some(Self::Admin),
            "user" => Some(Self::User),
            _ => None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct StaffPrincipal {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub credential_hash: String,
    pub role: StaffRole,
    pub active: bool,
    pub last_login_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug)]
pub struct ClientPrincipal {
    pub id: Uuid,
    pub display_name: String,
    pub email: String,
    pub credential_hash: String,
    pub last_login_at: Option<DateTime<Utc>>,
}

/// Namespace a principal lives in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PrincipalKind {
    Staff,
    Client,
}

impl PrincipalKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Staff => "staff",
            Self::Client => "client",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "staff" => Some(Self::Staff),
            "client" => Some(Self::Client),
            _ => None,
        }
    }
}

/// Actor classification recorded in the audit trail.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ActorKind {
    StaffAdmin,
    StaffUser,
    Client,
    Unknown,
}

impl ActorKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::StaffAdmin => "staff_admin",
            Self::StaffUser => "staff_user",
            Self::Client => "client",
            Self::Unknown => "unknown",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "staff_admin" => Some(Self::StaffAdmin),
            "staff_user" => Some(Self::StaffUser),
            "client" => Some(Self::Client),
            "unknown" => Some(Self::Unknown),
            _ => None,
        }
    }
}

impl fmt::Display for ActorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A resolved principal of either kind.
#[derive(Clone, Debug)]
pub enum Principal {
    Staff(StaffPrincipal),
    Client(ClientPrincipal),
}

impl Principal {
    #[must_use]
    pub fn id(&self) -> Uuid {
        match self {
            Self::Staff(staff) => staff.id,
            Self::Client(client) => client.id,
        }
    }

    #[must_use]
    pub fn email(&self) -> &str {
        match self {
            Self::Staff(staff) => &staff.email,
            Self::Client(client) => &client.email,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Staff(staff) => &staff.name,
            Self::Client(client) => &client.display_name,
        }
    }

    #[must_use]
    pub fn credential_hash(&self) -> &str {
        match self {
            Self::Staff(staff) => &staff.credential_hash,
            Self::Client(client) => &client.credential_hash,
        }
    }

    #[must_use]
    pub fn kind(&self) -> PrincipalKind {
        match self {
            Self::Staff(_) => PrincipalKind::Staff,
            Self::Client(_) => PrincipalKind::Client,
        }
    }

    #[must_use]
    pub fn actor_kind(&self) -> ActorKind {
        match self {
            Self::Staff(staff) if staff.role == StaffRole::Admin => ActorKind::StaffAdmin,
            Self::Staff(_) => ActorKind::StaffUser,
            Self::Client(_) => ActorKind::Client,
        }
    }

    /// Role label exposed to the front end.
    #[must_use]
    pub fn role(&self) -> &'static str {
        match self {
            Self::Staff(staff) => staff.role.as_str(),
            Self::Client(_) => "client",
        }
    }

    #[must_use]
    pub fn is_admin(&self) -> bool {
        matches!(self, Self::Staff(staff) if staff.role == StaffRole::Admin && staff.active)
    }
}

/// Lookup and the few writes the login core performs on principals.
///
/// Emails are unique within each namespace only. Callers decide the order in
/// which the namespaces are consulted.
#[async_trait]
pub trait PrincipalDirectory: Send + Sync {
    async fn staff_by_email(&self, email: &str) -> Result<Option<StaffPrincipal>, StoreError>;

    async fn client_by_email(&self, email: &str) -> Result<Option<ClientPrincipal>, StoreError>;

    async fn staff_by_id(&self, id: Uuid) -> Result<Option<StaffPrincipal>, StoreError>;

    async fn client_by_id(&self, id: Uuid) -> Result<Option<ClientPrincipal>, StoreError>;

    async fn touch_last_login(
        &self,
        kind: PrincipalKind,
        id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    async fn set_credential_hash(
        &self,
        kind: PrincipalKind,
        id: Uuid,
        hash: &str,
    ) -> Result<(), StoreError>;

    async fn principal_by_id(
        &self,
        kind: PrincipalKind,
        id: Uuid,
    ) -> Result<Option<Principal>, StoreError> {
        Ok(match kind {
            PrincipalKind::Staff => self.staff_by_id(id).await?.map(Principal::Staff),
            PrincipalKind::Client => self.client_by_id(id).await?.map(Principal::Client),
        })
    }
}
