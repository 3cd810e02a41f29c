pub mod config;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod store;
pub mod utils;

#[cfg(test)]
pub mod test_keys;

use axum::{
    http::{header, HeaderValue, Method},
    middleware::from_fn_with_state,
    routing::{delete, get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::Config;
use crate::middleware::OriginLimiter;
use crate::services::AuthService;
use crate::store::Store;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn Store + Send + Sync>,
    pub auth: AuthService,
    pub login_limiter: Arc<dyn OriginLimiter>,
}

/// Build the application router.
pub fn build_router(state: AppState) -> Router {
    let login = Router::new()
        .route("/auth/login", post(handlers::auth::login))
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware::login_rate_limit,
        ));

    let public = Router::new()
        .merge(login)
        .route("/auth/refresh", post(handlers::auth::refresh))
        .route("/health", get(handlers::health_check));

    let protected = Router::new()
        .route("/auth/logout", post(handlers::auth::logout))
        .route("/auth/me", get(handlers::auth::me))
        .route("/auth/password", put(handlers::auth::change_password))
        .route("/admin/identities", post(handlers::admin::create_identity))
        .route(
            "/admin/identities/:id/status",
            put(handlers::admin::set_status),
        )
        .route(
            "/admin/identities/:id/unlock",
            post(handlers::admin::unlock),
        )
        .route(
            "/admin/identities/:id/sessions",
            delete(handlers::admin::revoke_sessions),
        )
        .route(
            "/admin/login-attempts",
            get(handlers::admin::login_attempts),
        )
        .route("/admin/audit", get(handlers::admin::audit_trail))
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware::auth_middleware,
        ));

    let allowed_origins: Vec<HeaderValue> = state
        .config
        .security
        .allowed_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(allowed_origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    Router::new()
        .merge(public)
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
