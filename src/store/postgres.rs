//! Postgres backend. Schema lives in `sql/schema.sql`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgRow, Connection, PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

use super::StoreHealth;
use crate::auth::{
    ActorKind, AttemptLedger, AttemptRecord, AuditEntry, AuditTrail, ClientPrincipal, Dimension,
    FailureReason, NewAttempt, NewAuditEntry, NewSession, PrincipalDirectory, PrincipalKind,
    SessionRecord, SessionStore, StaffPrincipal, StaffRole, StoreError,
};

const COUNT_IDENTITY_FAILURES: &str = r"
    SELECT COUNT(*) AS failures
    FROM login_attempts
    WHERE identity = $1
      AND succeeded = FALSE
      AND failure_reason = 'invalid_credentials'
      AND occurred_at > $2
";

const COUNT_ADDRESS_FAILURES: &str = r"
    SELECT COUNT(*) AS failures
    FROM login_attempts
    WHERE source_address = $1
      AND succeeded = FALSE
      AND failure_reason = 'invalid_credentials'
      AND occurred_at > $2
";

const STAFF_COLUMNS: &str =
    "SELECT id, name, email, password_hash, role, active, last_login_at FROM staff_users";

const CLIENT_COLUMNS: &str =
    "SELECT id, display_name, email, password_hash, last_login_at FROM clients";

macro_rules! db_span {
    ($operation:literal, $query:expr) => {
        tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = $operation,
            db.statement = $query
        )
    };
}

#[derive(Clone, Debug)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn fetch_staff(
        &self,
        filter: &str,
        key: LookupKey<'_>,
    ) -> Result<Option<StaffPrincipal>, StoreError> {
        let query = format!("{STAFF_COLUMNS} WHERE {filter}");
        let span = db_span!("SELECT", query.as_str());
        let request = sqlx::query(&query);
        let request = match key {
            LookupKey::Email(email) => request.bind(email),
            LookupKey::Id(id) => request.bind(id),
        };
        let row = request.fetch_optional(&self.pool).instrument(span).await?;
        row.map(|row| staff_from_row(&row)).transpose()
    }

    async fn fetch_client(
        &self,
        filter: &str,
        key: LookupKey<'_>,
    ) -> Result<Option<ClientPrincipal>, StoreError> {
        let query = format!("{CLIENT_COLUMNS} WHERE {filter}");
        let span = db_span!("SELECT", query.as_str());
        let request = sqlx::query(&query);
        let request = match key {
            LookupKey::Email(email) => request.bind(email),
            LookupKey::Id(id) => request.bind(id),
        };
        let row = request.fetch_optional(&self.pool).instrument(span).await?;
        row.map(|row| client_from_row(&row)).transpose()
    }
}

enum LookupKey<'a> {
    Email(&'a str),
    Id(Uuid),
}

/// Unique violation on insert (SQLSTATE 23505).
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

fn attempt_from_row(row: &PgRow) -> Result<AttemptRecord, StoreError> {
    let failure_reason: Option<String> = row.try_get("failure_reason")?;
    let failure_reason = failure_reason
        .map(|reason| {
            FailureReason::parse(&reason)
                .ok_or_else(|| StoreError::Corrupt(format!("unknown failure reason: {reason}")))
        })
        .transpose()?;
    Ok(AttemptRecord {
        id: row.try_get("id")?,
        identity: row.try_get("identity")?,
        source_address: row.try_get("source_address")?,
        user_agent: row.try_get("user_agent")?,
        succeeded: row.try_get("succeeded")?,
        failure_reason,
        occurred_at: row.try_get("occurred_at")?,
    })
}

fn audit_from_row(row: &PgRow) -> Result<AuditEntry, StoreError> {
    let actor_kind: String = row.try_get("actor_kind")?;
    let actor_kind = ActorKind::parse(&actor_kind)
        .ok_or_else(|| StoreError::Corrupt(format!("unknown actor kind: {actor_kind}")))?;
    Ok(AuditEntry {
        id: row.try_get("id")?,
        action: row.try_get("action")?,
        actor_identity: row.try_get("actor_identity")?,
        actor_kind,
        source_address: row.try_get("source_address")?,
        user_agent: row.try_get("user_agent")?,
        detail: row.try_get("detail")?,
        occurred_at: row.try_get("occurred_at")?,
    })
}

fn staff_from_row(row: &PgRow) -> Result<StaffPrincipal, StoreError> {
    let role: String = row.try_get("role")?;
    let role = StaffRole::parse(&role)
        .ok_or_else(|| StoreError::Corrupt(format!("unknown staff role: {role}")))?;
    Ok(StaffPrincipal {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        credential_hash: row.try_get("password_hash")?,
        role,
        active: row.try_get("active")?,
        last_login_at: row.try_get("last_login_at")?,
    })
}

fn client_from_row(row: &PgRow) -> Result<ClientPrincipal, StoreError> {
    Ok(ClientPrincipal {
        id: row.try_get("id")?,
        display_name: row.try_get("display_name")?,
        email: row.try_get("email")?,
        credential_hash: row.try_get("password_hash")?,
        last_login_at: row.try_get("last_login_at")?,
    })
}

fn session_from_row(row: &PgRow) -> Result<SessionRecord, StoreError> {
    let kind: String = row.try_get("principal_kind")?;
    let principal_kind = PrincipalKind::parse(&kind)
        .ok_or_else(|| StoreError::Corrupt(format!("unknown principal kind: {kind}")))?;
    Ok(SessionRecord {
        id: row.try_get("id")?,
        principal_kind,
        principal_id: row.try_get("principal_id")?,
        created_at: row.try_get("created_at")?,
        expires_at: row.try_get("expires_at")?,
    })
}

#[async_trait]
impl AttemptLedger for PgStore {
    async fn record(
        &self,
        attempt: NewAttempt,
        at: DateTime<Utc>,
    ) -> Result<AttemptRecord, StoreError> {
        let record = attempt.into_record(at);
        let query = r"
            INSERT INTO login_attempts
                (id, identity, source_address, user_agent, succeeded, failure_reason, occurred_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
        ";
        sqlx::query(query)
            .bind(record.id)
            .bind(&record.identity)
            .bind(&record.source_address)
            .bind(&record.user_agent)
            .bind(record.succeeded)
            .bind(record.failure_reason.map(FailureReason::as_str))
            .bind(record.occurred_at)
            .execute(&self.pool)
            .instrument(db_span!("INSERT", query))
            .await?;
        Ok(record)
    }

    async fn count_failures(
        &self,
        dimension: Dimension,
        key: &str,
        since: DateTime<Utc>,
    ) -> Result<u32, StoreError> {
        let query = match dimension {
            Dimension::Identity => COUNT_IDENTITY_FAILURES,
            Dimension::SourceAddress => COUNT_ADDRESS_FAILURES,
        };
        let row = sqlx::query(query)
            .bind(key)
            .bind(since)
            .fetch_one(&self.pool)
            .instrument(db_span!("SELECT", query))
            .await?;
        let failures: i64 = row.try_get("failures")?;
        Ok(u32::try_from(failures.max(0)).unwrap_or(u32::MAX))
    }

    async fn cleanup(&self, before: DateTime<Utc>) -> Result<u64, StoreError> {
        let query = "DELETE FROM login_attempts WHERE occurred_at < $1";
        let result = sqlx::query(query)
            .bind(before)
            .execute(&self.pool)
            .instrument(db_span!("DELETE", query))
            .await?;
        Ok(result.rows_affected())
    }

    async fn recent(&self, limit: u32, offset: u32) -> Result<Vec<AttemptRecord>, StoreError> {
        let query = r"
            SELECT id, identity, source_address, user_agent, succeeded, failure_reason, occurred_at
            FROM login_attempts
            ORDER BY occurred_at DESC, id DESC
            LIMIT $1 OFFSET $2
        ";
        let rows = sqlx::query(query)
            .bind(i64::from(limit))
            .bind(i64::from(offset))
            .fetch_all(&self.pool)
            .instrument(db_span!("SELECT", query))
            .await?;
        rows.iter().map(attempt_from_row).collect()
    }
}

#[async_trait]
impl AuditTrail for PgStore {
    async fn append(
        &self,
        entry: NewAuditEntry,
        at: DateTime<Utc>,
    ) -> Result<AuditEntry, StoreError> {
        let entry = entry.into_entry(at);
        let query = r"
            INSERT INTO audit_log
                (id, action, actor_identity, actor_kind, source_address, user_agent, detail, occurred_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ";
        sqlx::query(query)
            .bind(entry.id)
            .bind(&entry.action)
            .bind(&entry.actor_identity)
            .bind(entry.actor_kind.as_str())
            .bind(&entry.source_address)
            .bind(&entry.user_agent)
            .bind(&entry.detail)
            .bind(entry.occurred_at)
            .execute(&self.pool)
            .instrument(db_span!("INSERT", query))
            .await?;
        Ok(entry)
    }

    async fn recent(&self, limit: u32, offset: u32) -> Result<Vec<AuditEntry>, StoreError> {
        let query = r"
            SELECT id, action, actor_identity, actor_kind, source_address, user_agent, detail, occurred_at
            FROM audit_log
            ORDER BY occurred_at DESC, id DESC
            LIMIT $1 OFFSET $2
        ";
        let rows = sqlx::query(query)
            .bind(i64::from(limit))
            .bind(i64::from(offset))
            .fetch_all(&self.pool)
            .instrument(db_span!("SELECT", query))
            .await?;
        rows.iter().map(audit_from_row).collect()
    }

    async fn clear(&self) -> Result<u64, StoreError> {
        let query = "DELETE FROM audit_log";
        let result = sqlx::query(query)
            .execute(&self.pool)
            .instrument(db_span!("DELETE", query))
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl PrincipalDirectory for PgStore {
    async fn staff_by_email(&self, email: &str) -> Result<Option<StaffPrincipal>, StoreError> {
        self.fetch_staff("lower(email) = $1", LookupKey::Email(email)).await
    }

    async fn client_by_email(&self, email: &str) -> Result<Option<ClientPrincipal>, StoreError> {
        self.fetch_client("lower(email) = $1", LookupKey::Email(email)).await
    }

    async fn staff_by_id(&self, id: Uuid) -> Result<Option<StaffPrincipal>, StoreError> {
        self.fetch_staff("id = $1", LookupKey::Id(id)).await
    }

    async fn client_by_id(&self, id: Uuid) -> Result<Option<ClientPrincipal>, StoreError> {
        self.fetch_client("id = $1", LookupKey::Id(id)).await
    }

    async fn touch_last_login(
        &self,
        kind: PrincipalKind,
        id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let query = match kind {
            PrincipalKind::Staff => "UPDATE staff_users SET last_login_at = $2 WHERE id = $1",
            PrincipalKind::Client => "UPDATE clients SET last_login_at = $2 WHERE id = $1",
        };
        sqlx::query(query)
            .bind(id)
            .bind(at)
            .execute(&self.pool)
            .instrument(db_span!("UPDATE", query))
            .await?;
        Ok(())
    }

    async fn set_credential_hash(
        &self,
        kind: PrincipalKind,
        id: Uuid,
        hash: &str,
    ) -> Result<(), StoreError> {
        let query = match kind {
            PrincipalKind::Staff => {
                "UPDATE staff_users SET password_hash = $2, updated_at = NOW() WHERE id = $1"
            }
            PrincipalKind::Client => {
                "UPDATE clients SET password_hash = $2, updated_at = NOW() WHERE id = $1"
            }
        };
        sqlx::query(query)
            .bind(id)
            .bind(hash)
            .execute(&self.pool)
            .instrument(db_span!("UPDATE", query))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl SessionStore for PgStore {
    async fn insert(&self, session: NewSession) -> Result<bool, StoreError> {
        let query = r"
            INSERT INTO auth_sessions
                (id, token_hash, principal_kind, principal_id, created_at, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6)
        ";
        let result = sqlx::query(query)
            .bind(Uuid::now_v7())
            .bind(&session.token_hash)
            .bind(session.principal_kind.as_str())
            .bind(session.principal_id)
            .bind(session.created_at)
            .bind(session.expires_at)
            .execute(&self.pool)
            .instrument(db_span!("INSERT", query))
            .await;

        match result {
            Ok(_) => Ok(true),
            Err(err) if is_unique_violation(&err) => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    async fn lookup(
        &self,
        token_hash: &[u8],
        now: DateTime<Utc>,
    ) -> Result<Option<SessionRecord>, StoreError> {
        let query = r"
            SELECT id, principal_kind, principal_id, created_at, expires_at
            FROM auth_sessions
            WHERE token_hash = $1
              AND revoked_at IS NULL
              AND expires_at > $2
        ";
        let row = sqlx::query(query)
            .bind(token_hash)
            .bind(now)
            .fetch_optional(&self.pool)
            .instrument(db_span!("SELECT", query))
            .await?;
        row.map(|row| session_from_row(&row)).transpose()
    }

    async fn revoke(&self, token_hash: &[u8], at: DateTime<Utc>) -> Result<bool, StoreError> {
        let query = r"
            UPDATE auth_sessions
            SET revoked_at = $2
            WHERE token_hash = $1
              AND revoked_at IS NULL
        ";
        let result = sqlx::query(query)
            .bind(token_hash)
            .bind(at)
            .execute(&self.pool)
            .instrument(db_span!("UPDATE", query))
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl StoreHealth for PgStore {
    async fn ping(&self) -> Result<(), StoreError> {
        let acquire_span = tracing::info_span!(
            "db.acquire",
            db.system = "postgresql",
            db.operation = "ACQUIRE"
        );
        let mut conn = self.pool.acquire().instrument(acquire_span).await?;
        let ping_span =
            tracing::info_span!("db.ping", db.system = "postgresql", db.operation = "PING");
        conn.ping().instrument(ping_span).await?;
        Ok(())
    }
}
