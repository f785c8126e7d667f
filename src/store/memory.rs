//! In-process backend used by tests and local demos.
//!
//! Ledger and audit writes can be switched off to replay storage outages.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::{
    collections::HashMap,
    sync::atomic::{AtomicBool, Ordering},
};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::StoreHealth;
use crate::auth::{
    AttemptLedger, AttemptRecord, AuditEntry, AuditTrail, ClientPrincipal, Dimension,
    NewAttempt, NewAuditEntry, NewSession, PrincipalDirectory, PrincipalKind, SessionRecord,
    SessionStore, StaffPrincipal, StoreError,
};

#[derive(Clone, Debug)]
struct StoredSession {
    record: SessionRecord,
    revoked_at: Option<DateTime<Utc>>,
}

#[derive(Debug)]
pub struct MemoryStore {
    attempts: RwLock<Vec<AttemptRecord>>,
    audit: RwLock<Vec<AuditEntry>>,
    staff: RwLock<HashMap<Uuid, StaffPrincipal>>,
    clients: RwLock<HashMap<Uuid, ClientPrincipal>>,
    sessions: RwLock<HashMap<Vec<u8>, StoredSession>>,
    ledger_available: AtomicBool,
    audit_available: AtomicBool,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            attempts: RwLock::new(Vec::new()),
            audit: RwLock::new(Vec::new()),
            staff: RwLock::new(HashMap::new()),
            clients: RwLock::new(HashMap::new()),
            sessions: RwLock::new(HashMap::new()),
            ledger_available: AtomicBool::new(true),
            audit_available: AtomicBool::new(true),
        }
    }

    pub fn set_ledger_available(&self, available: bool) {
        self.ledger_available.store(available, Ordering::SeqCst);
    }

    pub fn set_audit_available(&self, available: bool) {
        self.audit_available.store(available, Ordering::SeqCst);
    }

    pub async fn insert_staff(&self, staff: StaffPrincipal) {
        self.staff.write().await.insert(staff.id, staff);
    }

    pub async fn insert_client(&self, client: ClientPrincipal) {
        self.clients.write().await.insert(client.id, client);
    }

    /// Every ledger record in insertion order.
    pub async fn attempts(&self) -> Vec<AttemptRecord> {
        self.attempts.read().await.clone()
    }

    /// Every audit entry in insertion order.
    pub async fn audit_entries(&self) -> Vec<AuditEntry> {
        self.audit.read().await.clone()
    }

    fn ledger_guard(&self) -> Result<(), StoreError> {
        if self.ledger_available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("attempt ledger offline".to_string()))
        }
    }

    fn audit_guard(&self) -> Result<(), StoreError> {
        if self.audit_available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("audit trail offline".to_string()))
        }
    }
}

/// Newest first; equal timestamps keep reverse insertion order.
fn newest_page<T: Clone>(
    items: &[T],
    occurred_at: impl Fn(&T) -> DateTime<Utc>,
    limit: u32,
    offset: u32,
) -> Vec<T> {
    let mut page: Vec<T> = items.iter().rev().cloned().collect();
    page.sort_by_key(|item| std::cmp::Reverse(occurred_at(item)));
    page.into_iter()
        .skip(offset as usize)
        .take(limit as usize)
        .collect()
}

/// Mirrors `lower(email) = $1` in the Postgres backend.
fn same_email(stored: &str, wanted: &str) -> bool {
    stored.to_lowercase() == wanted
}

#[async_trait]
impl AttemptLedger for MemoryStore {
    async fn record(
        &self,
        attempt: NewAttempt,
        at: DateTime<Utc>,
    ) -> Result<AttemptRecord, StoreError> {
        self.ledger_guard()?;
        let record = attempt.into_record(at);
        self.attempts.write().await.push(record.clone());
        Ok(record)
    }

    async fn count_failures(
        &self,
        dimension: Dimension,
        key: &str,
        since: DateTime<Utc>,
    ) -> Result<u32, StoreError> {
        self.ledger_guard()?;
        let count = self
            .attempts
            .read()
            .await
            .iter()
            .filter(|record| {
                record.is_throttled_failure()
                    && record.key(dimension) == key
                    && record.occurred_at > since
            })
            .count();
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }

    async fn cleanup(&self, before: DateTime<Utc>) -> Result<u64, StoreError> {
        self.ledger_guard()?;
        let mut attempts = self.attempts.write().await;
        let len = attempts.len();
        attempts.retain(|record| record.occurred_at >= before);
        Ok((len - attempts.len()) as u64)
    }

    async fn recent(&self, limit: u32, offset: u32) -> Result<Vec<AttemptRecord>, StoreError> {
        self.ledger_guard()?;
        let attempts = self.attempts.read().await;
        Ok(newest_page(&attempts, |record| record.occurred_at, limit, offset))
    }
}

#[async_trait]
impl AuditTrail for MemoryStore {
    async fn append(
        &self,
        entry: NewAuditEntry,
        at: DateTime<Utc>,
    ) -> Result<AuditEntry, StoreError> {
        self.audit_guard()?;
        let entry = entry.into_entry(at);
        self.audit.write().await.push(entry.clone());
        Ok(entry)
    }

    async fn recent(&self, limit: u32, offset: u32) -> Result<Vec<AuditEntry>, StoreError> {
        self.audit_guard()?;
        let audit = self.audit.read().await;
        Ok(newest_page(&audit, |entry| entry.occurred_at, limit, offset))
    }

    async fn clear(&self) -> Result<u64, StoreError> {
        self.audit_guard()?;
        let mut audit = self.audit.write().await;
        let removed = audit.len() as u64;
        audit.clear();
        Ok(removed)
    }
}

#[async_trait]
impl PrincipalDirectory for MemoryStore {
    async fn staff_by_email(&self, email: &str) -> Result<Option<StaffPrincipal>, StoreError> {
        Ok(self
            .staff
            .read()
            .await
            .values()
            .find(|staff| same_email(&staff.email, email))
            .cloned())
    }

    async fn client_by_email(&self, email: &str) -> Result<Option<ClientPrincipal>, StoreError> {
        Ok(self
            .clients
            .read()
            .await
            .values()
            .find(|client| same_email(&client.email, email))
            .cloned())
    }

    async fn staff_by_id(&self, id: Uuid) -> Result<Option<StaffPrincipal>, StoreError> {
        Ok(self.staff.read().await.get(&id).cloned())
    }

    async fn client_by_id(&self, id: Uuid) -> Result<Option<ClientPrincipal>, StoreError> {
        Ok(self.clients.read().await.get(&id).cloned())
    }

    async fn touch_last_login(
        &self,
        kind: PrincipalKind,
        id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        match kind {
            PrincipalKind::Staff => {
                if let Some(staff) = self.staff.write().await.get_mut(&id) {
                    staff.last_login_at = Some(at);
                }
            }
            PrincipalKind::Client => {
                if let Some(client) = self.clients.write().await.get_mut(&id) {
                    client.last_login_at = Some(at);
                }
            }
        }
        Ok(())
    }

    async fn set_credential_hash(
        &self,
        kind: PrincipalKind,
        id: Uuid,
        hash: &str,
    ) -> Result<(), StoreError> {
        match kind {
            PrincipalKind::Staff => {
                if let Some(staff) = self.staff.write().await.get_mut(&id) {
                    staff.credential_hash = hash.to_string();
                }
            }
            PrincipalKind::Client => {
                if let Some(client) = self.clients.write().await.get_mut(&id) {
                    client.credential_hash = hash.to_string();
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn insert(&self, session: NewSession) -> Result<bool, StoreError> {
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&session.token_hash) {
            return Ok(false);
        }
        let record = SessionRecord {
            id: Uuid::now_v7(),
            principal_kind: session.principal_kind,
            principal_id: session.principal_id,
            created_at: session.created_at,
            expires_at: session.expires_at,
        };
        sessions.insert(
            session.token_hash,
            StoredSession {
                record,
                revoked_at: None,
            },
        );
        Ok(true)
    }

    async fn lookup(
        &self,
        token_hash: &[u8],
        now: DateTime<Utc>,
    ) -> Result<Option<SessionRecord>, StoreError> {
        Ok(self
            .sessions
            .read()
            .await
            .get(token_hash)
            .filter(|stored| stored.revoked_at.is_none() && stored.record.expires_at > now)
            .map(|stored| stored.record.clone()))
    }

    async fn revoke(&self, token_hash: &[u8], at: DateTime<Utc>) -> Result<bool, StoreError> {
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(token_hash) {
            Some(stored) if stored.revoked_at.is_none() => {
                stored.revoked_at = Some(at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl StoreHealth for MemoryStore {
    async fn ping(&self) -> Result<(), StoreError> {
        self.ledger_guard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::FailureReason;
    use chrono::{TimeDelta, TimeZone};

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 6, 9, minute, 0).unwrap()
    }

    #[tokio::test]
    async fn cleanup_keeps_records_at_cutoff() {
        let store = MemoryStore::new();
        for minute in [0, 10, 20] {
            store
                .record(NewAttempt::success("a@x.com", "10.0.0.1", "ua"), at(minute))
                .await
                .unwrap();
        }
        assert_eq!(store.cleanup(at(10)).await.unwrap(), 1);
        assert_eq!(store.cleanup(at(10)).await.unwrap(), 0);
        assert_eq!(store.attempts().await.len(), 2);
    }

    #[tokio::test]
    async fn recent_is_newest_first() {
        let store = MemoryStore::new();
        for minute in [5, 1, 9] {
            store
                .record(
                    NewAttempt::failure(
                        &format!("{minute}@x.com"),
                        "10.0.0.1",
                        "ua",
                        FailureReason::InvalidCredentials,
                    ),
                    at(minute),
                )
                .await
                .unwrap();
        }
        let page = AttemptLedger::recent(&store, 2, 0).await.unwrap();
        let identities: Vec<_> = page.iter().map(|r| r.identity.as_str()).collect();
        assert_eq!(identities, ["9@x.com", "5@x.com"]);
        let page = AttemptLedger::recent(&store, 2, 2).await.unwrap();
        assert_eq!(page.len(), 1);
    }

    #[tokio::test]
    async fn revoked_and_expired_sessions_do_not_resolve() {
        let store = MemoryStore::new();
        let session = NewSession {
            token_hash: vec![1, 2, 3],
            principal_kind: PrincipalKind::Client,
            principal_id: Uuid::nil(),
            created_at: at(0),
            expires_at: at(30),
        };
        assert!(store.insert(session.clone()).await.unwrap());
        assert!(!store.insert(session).await.unwrap());

        assert!(store.lookup(&[1, 2, 3], at(29)).await.unwrap().is_some());
        assert!(store.lookup(&[1, 2, 3], at(30)).await.unwrap().is_none());

        assert!(store.revoke(&[1, 2, 3], at(1)).await.unwrap());
        assert!(!store.revoke(&[1, 2, 3], at(2)).await.unwrap());
        assert!(store.lookup(&[1, 2, 3], at(2)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn audit_outage_fails_writes() {
        let store = MemoryStore::new();
        store.set_audit_available(false);
        let entry = NewAuditEntry::new(
            crate::auth::AuditAction::Logout,
            "a@x.com",
            crate::auth::ActorKind::Client,
            "10.0.0.1",
            "ua",
        );
        assert!(matches!(
            store.append(entry, at(0) + TimeDelta::seconds(1)).await,
            Err(StoreError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn email_lookup_lowercases_without_trimming() {
        let store = MemoryStore::new();
        let id = Uuid::now_v7();
        store
            .insert_client(ClientPrincipal {
                id,
                display_name: "Mixed".to_string(),
                email: "Mixed.Case@X.com".to_string(),
                credential_hash: String::new(),
                last_login_at: None,
            })
            .await;
        store
            .insert_client(ClientPrincipal {
                id: Uuid::now_v7(),
                display_name: "Padded".to_string(),
                email: " padded@x.com".to_string(),
                credential_hash: String::new(),
                last_login_at: None,
            })
            .await;

        let found = store.client_by_email("mixed.case@x.com").await.unwrap();
        assert_eq!(found.map(|client| client.id), Some(id));
        assert!(store.client_by_email("padded@x.com").await.unwrap().is_none());
    }
}
