use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use chrono::Utc;
use validator::Validate;

use crate::dtos::{
    ChangePasswordRequest, LoginRequest, LoginResponse, LogoutRequest, MeResponse,
    RefreshRequest, RefreshResponse,
};
use crate::middleware::{AuthIdentity, ClientOrigin};
use crate::services::AuthError;
use crate::AppState;

/// POST /auth/login
pub async fn login(
    State(state): State<AppState>,
    ClientOrigin(origin): ClientOrigin,
    Json(request): Json<LoginRequest>,
) -> Result<impl IntoResponse, AuthError> {
    request.validate()?;

    let session = state
        .auth
        .authenticate(&request.login, &request.password, &origin)
        .await?;

    Ok(Json(LoginResponse::from(session)))
}

/// POST /auth/refresh
pub async fn refresh(
    State(state): State<AppState>,
    ClientOrigin(origin): ClientOrigin,
    Json(request): Json<RefreshRequest>,
) -> Result<impl IntoResponse, AuthError> {
    request.validate()?;

    let refreshed = state
        .auth
        .refresh_access(&request.refresh_token, &origin)
        .await?;

    Ok(Json(RefreshResponse {
        access_token: refreshed.access_token,
        token_type: "Bearer",
        expires_in: refreshed.expires_in,
    }))
}

/// POST /auth/logout
pub async fn logout(
    State(state): State<AppState>,
    ClientOrigin(origin): ClientOrigin,
    Json(request): Json<LogoutRequest>,
) -> Result<impl IntoResponse, AuthError> {
    request.validate()?;

    state
        .auth
        .revoke_session(&request.refresh_token, &origin)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

/// GET /auth/me
pub async fn me(
    State(state): State<AppState>,
    AuthIdentity(claims): AuthIdentity,
) -> Result<impl IntoResponse, AuthError> {
    let identity = state
        .store
        .find_identity(claims.identity_id)
        .await
        .map_err(AuthError::from)?
        .ok_or(AuthError::InvalidToken)?;

    let access = state
        .auth
        .resolver()
        .resolve(claims.identity_id, Utc::now())
        .await?;

    let mut permissions: Vec<String> = access
        .permissions
        .iter()
        .map(|code| code.to_string())
        .collect();
    permissions.sort();

    Ok(Json(MeResponse {
        identity: identity.summary(),
        roles: access.role_codes,
        permissions,
        branch_scope: access.branch_scope,
    }))
}

/// PUT /auth/password
pub async fn change_password(
    State(state): State<AppState>,
    AuthIdentity(claims): AuthIdentity,
    ClientOrigin(origin): ClientOrigin,
    Json(request): Json<ChangePasswordRequest>,
) -> Result<impl IntoResponse, AuthError> {
    request.validate()?;

    state
        .auth
        .change_password(
            claims.identity_id,
            &request.current_password,
            &request.new_password,
            &origin,
        )
        .await?;

    Ok(StatusCode::NO_CONTENT)
}
