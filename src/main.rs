use sqlx::migrate::Migrator;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing_subscriber::prelude::*;

use glint_core::services::notifications::NotificationDispatcher;
use glint_core::{config, create_app, db, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = config::Config::from_env()?;

    // Setup logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Database pool
    let pool = db::create_pool(&config).await?;

    // Run migrations
    let migrator = Migrator::new(Path::new("./migrations")).await?;
    migrator.run(&pool).await?;
    tracing::info!("database migrations completed");

    let notifier = NotificationDispatcher::new(config.notify_webhook_url.clone());
    if config.notify_webhook_url.is_none() {
        tracing::warn!("NOTIFY_WEBHOOK_URL not set, notifications will only be logged");
    }

    let state = AppState {
        db: pool,
        notifier,
        booking_ref_prefix: config.booking_ref_prefix.clone(),
        start_time: Instant::now(),
    };

    let app = create_app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    tracing::info!("listening on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
