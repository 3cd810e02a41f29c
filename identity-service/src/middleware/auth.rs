use axum::{
    extract::{ConnectInfo, FromRequestParts, Request, State},
    http::{header, request::Parts},
    middleware::Next,
    response::Response,
};
use std::net::SocketAddr;

use crate::models::OriginMeta;
use crate::services::{AuthError, IdentityClaims};
use crate::AppState;

/// Middleware requiring a valid bearer token. Verified claims land in the
/// request extensions for the `AuthIdentity` extractor.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or(AuthError::InvalidToken)?;

    let claims = state.auth.tokens().verify_access_token(token)?;

    request.extensions_mut().insert(claims);

    Ok(next.run(request).await)
}

/// Extractor handing verified claims to protected handlers.
pub struct AuthIdentity(pub IdentityClaims);

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthIdentity
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        // Only reachable when a route skipped auth_middleware
        let claims = parts
            .extensions
            .get::<IdentityClaims>()
            .cloned()
            .ok_or(AuthError::InvalidToken)?;

        Ok(AuthIdentity(claims))
    }
}

/// Extractor capturing where a request came from, for the ledger and the
/// audit trail. Infallible: an unknown origin is recorded as such.
pub struct ClientOrigin(pub OriginMeta);

#[axum::async_trait]
impl<S> FromRequestParts<S> for ClientOrigin
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let ip = super::rate_limit::client_ip(
            &parts.headers,
            parts.extensions.get::<ConnectInfo<SocketAddr>>(),
        );

        let user_agent = parts
            .headers
            .get(header::USER_AGENT)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        let origin = match ip {
            Some(ip) => OriginMeta::new(ip.to_string(), user_agent),
            None => OriginMeta {
                user_agent,
                ..OriginMeta::unknown()
            },
        };

        Ok(ClientOrigin(origin))
    }
}
