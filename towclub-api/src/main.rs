//! # Towclub API Server
//!
//! Loads configuration, connects to PostgreSQL, applies migrations and
//! serves the JSON API until interrupted.
//!
//! ## Usage
//!
//! ```bash
//! DATABASE_URL=postgresql://localhost/towclub \
//! JWT_SECRET=$(openssl rand -hex 32) \
//! cargo run -p towclub-api
//! ```

use anyhow::Context;
use towclub_api::{
    app::{build_router, AppState},
    config::{Config, LogFormat},
};
use towclub_shared::db::{
    migrations::run_migrations,
    pool::{close_pool, create_pool, DatabaseConfig},
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    init_tracing(config.log_format);

    tracing::info!(
        "Towclub API Server v{} starting...",
        env!("CARGO_PKG_VERSION")
    );

    let db_config = DatabaseConfig {
        max_connections: config.database.max_connections,
        ..DatabaseConfig::new(config.database.url.clone())
    };
    let pool = create_pool(db_config)
        .await
        .context("Failed to connect to database")?;

    run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;

    let bind_address = config.bind_address();
    let state = AppState::new(pool.clone(), config);
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("Failed to bind {bind_address}"))?;
    tracing::info!("Server listening on http://{}", bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    close_pool(pool).await;
    tracing::info!("Server stopped");

    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "towclub_api=debug,towclub_shared=debug,tower_http=debug".into()
    });
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received, draining connections...");
}
