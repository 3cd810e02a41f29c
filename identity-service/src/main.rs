use identity_service::{
    build_router,
    config::Config,
    middleware::create_login_limiter,
    services::{AuditRecorder, AuthService, LockoutEngine, PermissionResolver, TokenService},
    store::PgStore,
    AppState,
};
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    dotenvy::dotenv().ok();

    // Fail fast on invalid configuration
    let config = Config::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone())),
        )
        .init();

    tracing::info!(
        service = %config.service_name,
        environment = ?config.environment,
        "Starting identity service"
    );

    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect(&config.database.url)
        .await?;
    sqlx::migrate!("./migrations").run(&pool).await?;

    let store = Arc::new(PgStore::new(pool));
    store.health_check().await?;
    tracing::info!("Database connection established");

    let tokens = TokenService::new(&config.jwt)?;

    let lockout = LockoutEngine::new(store.clone(), config.lockout.clone());
    let resolver =
        PermissionResolver::new(store.clone(), config.security.admin_role_code.clone());
    let audit = AuditRecorder::new(store.clone());
    let auth = AuthService::new(store.clone(), tokens, lockout, resolver, audit);

    let login_limiter = create_login_limiter(
        config.rate_limit.login_attempts,
        config.rate_limit.login_window_seconds,
    );

    let port = config.port;
    let state = AppState {
        config: Arc::new(config),
        store,
        auth,
        login_limiter,
    };

    let app = build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(address = %addr, "Listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Service shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        },
    }
}
