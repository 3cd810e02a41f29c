use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::store::StoreError;

/// Expected, caller-recoverable conditions of the identity core.
///
/// In-process collaborators see the full typed variant; the HTTP mapping
/// below deliberately collapses credential, lock and status failures into
/// one generic body so callers cannot probe which accounts exist.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("account locked, retry in {retry_after_minutes} minutes")]
    AccountLocked { retry_after_minutes: i64 },

    #[error("account not active")]
    AccountNotActive,

    #[error("invalid token")]
    InvalidToken,

    #[error("rate limited, retry in {retry_after_secs} seconds")]
    RateLimited { retry_after_secs: u64 },

    #[error("missing permissions: {missing:?}")]
    Forbidden { missing: Vec<String> },

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("storage unavailable")]
    StorageUnavailable(#[source] anyhow::Error),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        AuthError::StorageUnavailable(anyhow::Error::new(err))
    }
}

/// The single body shape every error renders as.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub missing_permissions: Option<Vec<String>>,
}

/// Generic message for every authentication failure; the precise reason
/// lives only in the login attempt ledger.
const GENERIC_AUTH_FAILURE: &str = "Authentication failed";

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, error, missing, retry_after) = match self {
            AuthError::InvalidCredentials
            | AuthError::AccountLocked { .. }
            | AuthError::AccountNotActive => (
                StatusCode::UNAUTHORIZED,
                GENERIC_AUTH_FAILURE.to_string(),
                None,
                None,
            ),
            AuthError::InvalidToken => (
                StatusCode::UNAUTHORIZED,
                "Invalid or expired token".to_string(),
                None,
                None,
            ),
            AuthError::RateLimited { retry_after_secs } => (
                StatusCode::TOO_MANY_REQUESTS,
                "Too many requests. Please try again later.".to_string(),
                None,
                Some(retry_after_secs),
            ),
            AuthError::Forbidden { missing } => (
                StatusCode::FORBIDDEN,
                "Insufficient permissions".to_string(),
                Some(missing),
                None,
            ),
            AuthError::NotFound(entity) => (
                StatusCode::NOT_FOUND,
                format!("{entity} not found"),
                None,
                None,
            ),
            AuthError::Validation(err) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                err.to_string(),
                None,
                None,
            ),
            AuthError::StorageUnavailable(err) => {
                tracing::error!(error = %err, "Storage unavailable");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Service unavailable".to_string(),
                    None,
                    None,
                )
            }
            AuthError::Internal(err) => {
                tracing::error!(error = %err, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                    None,
                    None,
                )
            }
        };

        let mut res = (
            status,
            Json(ErrorResponse {
                error,
                missing_permissions: missing,
            }),
        )
            .into_response();

        if let Some(retry) = retry_after {
            res.headers_mut()
                .insert(axum::http::header::RETRY_AFTER, retry.into());
        }

        res
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_failures_share_a_generic_response() {
        // Wrong password, locked account and suspended account must be
        // indistinguishable to the caller
        for err in [
            AuthError::InvalidCredentials,
            AuthError::AccountLocked {
                retry_after_minutes: 10,
            },
            AuthError::AccountNotActive,
        ] {
            let res = err.into_response();
            assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        }
    }

    #[test]
    fn test_rate_limited_sets_retry_after() {
        let res = AuthError::RateLimited {
            retry_after_secs: 42,
        }
        .into_response();
        assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(res.headers().get("retry-after").unwrap(), "42");
    }

    #[test]
    fn test_forbidden_names_missing_codes() {
        let res = AuthError::Forbidden {
            missing: vec!["admin.identity.create".to_string()],
        }
        .into_response();
        assert_eq!(res.status(), StatusCode::FORBIDDEN);
    }
}
