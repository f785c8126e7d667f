//! Administrative views over the audit trail and the attempt ledger.

use axum::{
    extract::{ConnectInfo, Extension, Query},
    http::HeaderMap,
    Json,
};
use std::{net::SocketAddr, sync::Arc};

use super::{
    auth::require_session,
    error::{ApiError, MessageBody},
    types::{ClearedResponse, PageQuery},
    utils::{client_context, ProxyPolicy},
};
use crate::auth::{AttemptRecord, AuditEntry, Authenticator};

#[utoipa::path(
    get,
    path = "/v1/audit",
    params(PageQuery),
    responses(
        (status = 200, description = "Newest audit entries first", body = [AuditEntry]),
        (status = 401, description = "Missing or unknown bearer token", body = MessageBody),
        (status = 403, description = "Caller is not a staff admin", body = MessageBody)
    ),
    security(("bearer" = [])),
    tag = "audit"
)]
pub async fn list_audit(
    headers: HeaderMap,
    auth: Extension<Arc<Authenticator>>,
    Query(page): Query<PageQuery>,
) -> Result<Json<Vec<AuditEntry>>, ApiError> {
    let current = require_session(&auth, &headers).await?;
    let entries = auth
        .audit_entries(&current, page.limit(), page.offset())
        .await?;
    Ok(Json(entries))
}

#[utoipa::path(
    delete,
    path = "/v1/audit",
    responses(
        (status = 200, description = "Audit trail cleared", body = ClearedResponse),
        (status = 401, description = "Missing or unknown bearer token", body = MessageBody),
        (status = 403, description = "Caller is not a staff admin", body = MessageBody)
    ),
    security(("bearer" = [])),
    tag = "audit"
)]
pub async fn clear_audit(
    headers: HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
    auth: Extension<Arc<Authenticator>>,
    policy: Extension<ProxyPolicy>,
) -> Result<Json<ClearedResponse>, ApiError> {
    let current = require_session(&auth, &headers).await?;
    let removed = auth
        .clear_audit(&current, &client_context(&headers, peer.as_ref(), *policy))
        .await?;
    Ok(Json(ClearedResponse { removed }))
}

#[utoipa::path(
    get,
    path = "/v1/login-attempts",
    params(PageQuery),
    responses(
        (status = 200, description = "Newest ledger records first", body = [AttemptRecord]),
        (status = 401, description = "Missing or unknown bearer token", body = MessageBody),
        (status = 403, description = "Caller is not a staff admin", body = MessageBody)
    ),
    security(("bearer" = [])),
    tag = "audit"
)]
pub async fn list_login_attempts(
    headers: HeaderMap,
    auth: Extension<Arc<Authenticator>>,
    Query(page): Query<PageQuery>,
) -> Result<Json<Vec<AttemptRecord>>, ApiError> {
    let current = require_session(&auth, &headers).await?;
    let records = auth
        .login_attempts(&current, page.limit(), page.offset())
        .await?;
    Ok(Json(records))
}
