use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use uuid::Uuid;
use validator::Validate;

use crate::dtos::{CreateIdentityRequest, LedgerQuery, RevokedResponse, SetStatusRequest};
use crate::middleware::{AuthIdentity, ClientOrigin};
use crate::models::{
    AuditFilter, AuditLogEntry, AuditOutcome, OriginMeta, PermissionAction, PermissionCode,
};
use crate::services::{AuthError, IdentityClaims};
use crate::AppState;

fn identity_permission(action: PermissionAction) -> PermissionCode {
    PermissionCode::new("admin", "identity", action)
}

fn security_read() -> PermissionCode {
    PermissionCode::new("admin", "security", PermissionAction::Read)
}

/// Authorize the caller against `required`, auditing every denial.
async fn require(
    state: &AppState,
    claims: &IdentityClaims,
    origin: &OriginMeta,
    required: &[PermissionCode],
) -> Result<(), AuthError> {
    match state
        .auth
        .resolver()
        .authorize(claims.identity_id, required, Utc::now())
        .await
    {
        Err(AuthError::Forbidden { missing }) => {
            state
                .auth
                .audit()
                .record(AuditLogEntry::new(
                    Some(claims.identity_id),
                    "ADMIN",
                    "AUTHZ_DENY",
                    "permission",
                    None,
                    origin,
                    AuditOutcome::Failure,
                    format!("Denied, missing: {}", missing.join(", ")),
                ))
                .await;
            Err(AuthError::Forbidden { missing })
        }
        other => other,
    }
}

/// POST /admin/identities
pub async fn create_identity(
    State(state): State<AppState>,
    AuthIdentity(claims): AuthIdentity,
    ClientOrigin(origin): ClientOrigin,
    Json(request): Json<CreateIdentityRequest>,
) -> Result<impl IntoResponse, AuthError> {
    require(
        &state,
        &claims,
        &origin,
        &[identity_permission(PermissionAction::Create)],
    )
    .await?;
    request.validate()?;

    let identity = state
        .auth
        .create_identity(
            claims.identity_id,
            request.first_name,
            request.last_name,
            request.email,
            request.handle,
            &request.password,
            &origin,
        )
        .await?;

    Ok((StatusCode::CREATED, Json(identity.summary())))
}

/// PUT /admin/identities/:id/status
pub async fn set_status(
    State(state): State<AppState>,
    AuthIdentity(claims): AuthIdentity,
    ClientOrigin(origin): ClientOrigin,
    Path(identity_id): Path<Uuid>,
    Json(request): Json<SetStatusRequest>,
) -> Result<impl IntoResponse, AuthError> {
    require(
        &state,
        &claims,
        &origin,
        &[identity_permission(PermissionAction::Update)],
    )
    .await?;

    let identity = state
        .auth
        .set_status(claims.identity_id, identity_id, request.status, &origin)
        .await?;

    Ok(Json(identity.summary()))
}

/// POST /admin/identities/:id/unlock
pub async fn unlock(
    State(state): State<AppState>,
    AuthIdentity(claims): AuthIdentity,
    ClientOrigin(origin): ClientOrigin,
    Path(identity_id): Path<Uuid>,
) -> Result<impl IntoResponse, AuthError> {
    require(
        &state,
        &claims,
        &origin,
        &[identity_permission(PermissionAction::Execute)],
    )
    .await?;

    state
        .auth
        .admin_unlock(claims.identity_id, identity_id, &origin)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /admin/identities/:id/sessions
pub async fn revoke_sessions(
    State(state): State<AppState>,
    AuthIdentity(claims): AuthIdentity,
    ClientOrigin(origin): ClientOrigin,
    Path(identity_id): Path<Uuid>,
) -> Result<impl IntoResponse, AuthError> {
    require(
        &state,
        &claims,
        &origin,
        &[identity_permission(PermissionAction::Execute)],
    )
    .await?;

    let revoked = state
        .auth
        .revoke_all_sessions(identity_id, claims.identity_id, &origin)
        .await?;

    Ok(Json(RevokedResponse { revoked }))
}

/// GET /admin/login-attempts
pub async fn login_attempts(
    State(state): State<AppState>,
    AuthIdentity(claims): AuthIdentity,
    ClientOrigin(origin): ClientOrigin,
    Query(query): Query<LedgerQuery>,
) -> Result<impl IntoResponse, AuthError> {
    require(&state, &claims, &origin, &[security_read()]).await?;

    let attempts = state
        .auth
        .login_history(
            query.login.as_deref(),
            query.since,
            query.limit.unwrap_or(100),
        )
        .await?;

    Ok(Json(attempts))
}

/// GET /admin/audit
pub async fn audit_trail(
    State(state): State<AppState>,
    AuthIdentity(claims): AuthIdentity,
    ClientOrigin(origin): ClientOrigin,
    Query(filter): Query<AuditFilter>,
) -> Result<impl IntoResponse, AuthError> {
    require(&state, &claims, &origin, &[security_read()]).await?;

    let entries = state.auth.audit().query(&filter).await?;

    Ok(Json(entries))
}
