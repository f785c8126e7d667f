//! JSON error responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::error;
use utoipa::ToSchema;

use crate::auth::{AuthError, LoginOutcome};

/// Validation-style body returned with 422.
#[derive(ToSchema, Serialize, Debug)]
pub struct ValidationErrorBody {
    pub message: String,
    pub errors: BTreeMap<String, Vec<String>>,
}

#[derive(ToSchema, Serialize, Debug)]
pub struct MessageBody {
    pub message: String,
}

#[derive(Debug)]
pub enum ApiError {
    Validation { field: &'static str, message: String },
    Unauthenticated,
    Forbidden,
    Internal,
}

impl ApiError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Unauthenticated => Self::Unauthenticated,
            AuthError::Forbidden => Self::Forbidden,
            AuthError::InvalidCurrentPassword => Self::validation(
                "current_password",
                "The provided password does not match your current password.",
            ),
            AuthError::LockedOut { cooldown } => Self::validation(
                "current_password",
                LoginOutcome::LockedOut { cooldown }.to_string(),
            ),
            AuthError::WeakPassword { min_length } => Self::validation(
                "password",
                format!("The password must be at least {min_length} characters."),
            ),
            AuthError::Storage(_) | AuthError::Crypto(_) | AuthError::TokenGeneration(_) => {
                error!("Request failed: {err}");
                Self::Internal
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::Validation { field, message } => {
                let mut errors = BTreeMap::new();
                errors.insert(field.to_string(), vec![message.clone()]);
                (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    Json(ValidationErrorBody { message, errors }),
                )
                    .into_response()
            }
            Self::Unauthenticated => message(StatusCode::UNAUTHORIZED, "Unauthenticated."),
            Self::Forbidden => message(StatusCode::FORBIDDEN, "This action is unauthorized."),
            Self::Internal => message(StatusCode::INTERNAL_SERVER_ERROR, "Server Error"),
        }
    }
}

fn message(status: StatusCode, text: &str) -> Response {
    (
        status,
        Json(MessageBody {
            message: text.to_string(),
        }),
    )
        .into_response()
}
