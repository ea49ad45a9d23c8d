//! Tablewatch server
//!
//! Polls the configured tables for row changes and serves the admin API for
//! managing monitors and triggering passes on demand.

use std::net::SocketAddr;
use std::sync::Arc;
use tablewatch::config::Settings;
use tablewatch::db::{create_pool, PostgresRowSource};
use tablewatch::events::{EventSink, TracingSink};
use tablewatch::introspection::PostgresCatalog;
use tablewatch::poller::spawn_pollers;
use tablewatch::routes::create_router;
use tablewatch::service::TableMonitorService;
use tablewatch::snapshot::{ChangeDetector, PostgresSnapshotStore};
use tablewatch::state::AppState;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    info!("Starting tablewatch...");

    let settings = Settings::load()?;
    info!("Configuration loaded successfully");

    let pool = create_pool(&settings.database).await?;

    let store = PostgresSnapshotStore::new(pool.clone(), &settings.monitor.store_table);
    store.ensure_table().await?;

    let detector = ChangeDetector::new(
        Arc::new(PostgresCatalog::new(pool.clone())),
        Arc::new(PostgresRowSource::new(pool)),
    );
    let sink: Arc<dyn EventSink> = Arc::new(TracingSink);
    let service = Arc::new(TableMonitorService::new(
        detector,
        Arc::new(store),
        sink.clone(),
    ));

    let pollers = spawn_pollers(
        service.clone(),
        &settings.monitor.tables,
        settings.monitor.interval(),
    );
    if pollers.is_empty() {
        info!("MONITOR_TABLES is empty, passes run only on request");
    }

    let state = Arc::new(AppState::new(service, sink));
    let app = create_router(state, &settings);

    let addr = SocketAddr::from((settings.server.host, settings.server.port));
    info!("Server listening on http://{}", addr);
    info!("   GET    /health");
    info!("   GET    /api/monitors");
    info!("   GET    /api/monitors/{{table}}");
    info!("   PUT    /api/monitors/{{table}}");
    info!("   DELETE /api/monitors/{{table}}");
    info!("   POST   /api/monitors/{{table}}/process");

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    for poller in pollers {
        poller.abort();
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Initialize tracing with structured logging
fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tablewatch=debug,tower_http=debug"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_level(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .compact(),
        )
        .init();
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal, initiating graceful shutdown...");
        },
        _ = terminate => {
            info!("Received terminate signal, initiating graceful shutdown...");
        },
    }
}
