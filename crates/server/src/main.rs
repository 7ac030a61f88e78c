//! opsvoice server binary

use std::time::Duration;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use opsvoice_server::{create_router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config_path = std::env::var("OPSVOICE_CONFIG").ok();
    let settings = opsvoice_config::load_settings(config_path.as_deref())
        .context("failed to load settings")?;

    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    let ttl = Duration::from_secs(settings.pipeline.session_ttl_secs);

    let state = AppState::new(settings).map_err(|e| anyhow::anyhow!(e.to_string()))?;

    // periodic reaping of idle sessions
    let cleanup_shutdown = state
        .coordinator
        .registry()
        .start_cleanup_task(ttl, Duration::from_secs(60));

    let router = create_router(state);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(addr, "opsvoice server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    let _ = cleanup_shutdown.send(true);
    info!("shutdown complete");
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("opsvoice=info,tower_http=info"));

    if std::env::var("OPSVOICE_LOG_JSON").is_ok() {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received ctrl-c, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
