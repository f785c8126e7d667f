//! Login, logout, current session and password change.

use axum::{
    extract::{rejection::JsonRejection, ConnectInfo, Extension},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use secrecy::SecretString;
use std::{net::SocketAddr, sync::Arc};

use super::{
    error::{ApiError, MessageBody, ValidationErrorBody},
    types::{ChangePasswordRequest, LoginRequest, LoginResponse, UserPayload},
    utils::{client_context, extract_bearer_token, valid_email, ProxyPolicy},
};
use crate::auth::{
    login::normalize_identity, AuthenticatedSession, Authenticator, LoginInput, LoginOutcome,
};

/// Resolve the bearer token on a request or fail with 401.
pub(super) async fn require_session(
    auth: &Authenticator,
    headers: &HeaderMap,
) -> Result<AuthenticatedSession, ApiError> {
    let token = extract_bearer_token(headers).ok_or(ApiError::Unauthenticated)?;
    Ok(auth.authenticate(&token).await?)
}

#[utoipa::path(
    post,
    path = "/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Session issued", body = LoginResponse),
        (status = 422, description = "Invalid input, invalid credentials, inactive account or lockout", body = ValidationErrorBody),
        (status = 500, description = "Storage failure", body = MessageBody)
    ),
    tag = "auth"
)]
pub async fn login(
    headers: HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
    auth: Extension<Arc<Authenticator>>,
    policy: Extension<ProxyPolicy>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<LoginResponse>, ApiError> {
    let Json(request) =
        payload.map_err(|rejection| ApiError::validation("email", rejection.body_text()))?;

    let email = normalize_identity(request.email.as_deref().unwrap_or_default());
    if email.is_empty() {
        return Err(ApiError::validation("email", "The email field is required."));
    }
    if !valid_email(&email) {
        return Err(ApiError::validation(
            "email",
            "The email must be a valid email address.",
        ));
    }
    let Some(password) = request.password.filter(|password| !password.is_empty()) else {
        return Err(ApiError::validation(
            "password",
            "The password field is required.",
        ));
    };

    let outcome = auth
        .login(LoginInput {
            identity: email,
            secret: SecretString::from(password),
            client: client_context(&headers, peer.as_ref(), *policy),
        })
        .await?;

    match outcome {
        LoginOutcome::Success(success) => Ok(Json(LoginResponse {
            token: success.token,
            expires_at: success.expires_at,
            user: UserPayload::from(&success.principal),
        })),
        rejected => Err(ApiError::validation("email", rejected.to_string())),
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/logout",
    responses(
        (status = 204, description = "Session revoked"),
        (status = 401, description = "Missing or unknown bearer token", body = MessageBody)
    ),
    security(("bearer" = [])),
    tag = "auth"
)]
pub async fn logout(
    headers: HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
    auth: Extension<Arc<Authenticator>>,
    policy: Extension<ProxyPolicy>,
) -> Result<StatusCode, ApiError> {
    let current = require_session(&auth, &headers).await?;
    auth.logout(&current, &client_context(&headers, peer.as_ref(), *policy))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/v1/auth/me",
    responses(
        (status = 200, description = "Current principal", body = UserPayload),
        (status = 401, description = "Missing or unknown bearer token", body = MessageBody)
    ),
    security(("bearer" = [])),
    tag = "auth"
)]
pub async fn me(
    headers: HeaderMap,
    auth: Extension<Arc<Authenticator>>,
) -> Result<Json<UserPayload>, ApiError> {
    let current = require_session(&auth, &headers).await?;
    Ok(Json(UserPayload::from(&current.principal)))
}

#[utoipa::path(
    post,
    path = "/v1/auth/password",
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Password updated", body = MessageBody),
        (status = 401, description = "Missing or unknown bearer token", body = MessageBody),
        (status = 422, description = "Wrong current password or weak new password", body = ValidationErrorBody)
    ),
    security(("bearer" = [])),
    tag = "auth"
)]
pub async fn change_password(
    headers: HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
    auth: Extension<Arc<Authenticator>>,
    policy: Extension<ProxyPolicy>,
    payload: Result<Json<ChangePasswordRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let current = require_session(&auth, &headers).await?;
    let Json(request) = payload
        .map_err(|rejection| ApiError::validation("password", rejection.body_text()))?;

    let Some(current_password) = request.current_password.filter(|value| !value.is_empty())
    else {
        return Err(ApiError::validation(
            "current_password",
            "The current password field is required.",
        ));
    };
    let Some(new_password) = request.password.filter(|value| !value.is_empty()) else {
        return Err(ApiError::validation(
            "password",
            "The password field is required.",
        ));
    };

    auth.change_password(
        &current,
        &SecretString::from(current_password),
        &SecretString::from(new_password),
        &client_context(&headers, peer.as_ref(), *policy),
    )
    .await?;

    Ok(Json(MessageBody {
        message: "Password updated.".to_string(),
    }))
}
