use identity_service::{
    build_router,
    config::IdentityConfig,
    db,
    services::{
        spawn_code_sweeper, Database, EmailService, GoogleIdentityProvider, RedisStreamPublisher,
    },
    AppState,
};
use service_core::cache::RedisCache;
use service_core::error::AppError;
use service_core::observability::init_tracing;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = IdentityConfig::from_env()?;

    init_tracing(
        &config.service_name,
        &config.log_level,
        config.otlp_endpoint.as_deref(),
    );

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.environment,
        "Starting identity service"
    );

    let pool = db::create_pool(&config.database)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;
    db::run_migrations(&pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
    let store = Arc::new(Database::new(pool));

    let redis = RedisCache::connect(&config.redis.url)
        .await
        .map_err(AppError::InternalError)?;
    let publisher = Arc::new(RedisStreamPublisher::new(
        redis.connection(),
        config.events.partitions,
    ));

    let email = Arc::new(EmailService::new(&config.smtp, config.otp.expiry_seconds)?);
    let google = Arc::new(GoogleIdentityProvider::new(config.google.userinfo_url.clone())?);

    let sweep_every = config.otp.sweep_interval_seconds;
    let port = config.common.port;

    let state = AppState::build(
        config,
        store,
        Arc::new(redis),
        email,
        publisher,
        google,
    );

    if sweep_every > 0 {
        spawn_code_sweeper(state.otp.clone(), Duration::from_secs(sweep_every));
        tracing::info!(interval_seconds = sweep_every, "Expired code sweeper started");
    }

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
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
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
