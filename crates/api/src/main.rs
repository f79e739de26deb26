//! API server entry point.

use std::sync::Arc;

use api::{AppState, Config};
use event_store::{EventStore, InMemoryEventStore, PostgresEventStore};
use projections::{BuiltinRuntime, ManagementSettings, ProjectionCoordinator};
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

/// Opens the PostgreSQL log when `DATABASE_URL` is set, the in-memory log otherwise.
async fn open_store(config: &Config) -> Arc<dyn EventStore> {
    let Some(url) = &config.database_url else {
        tracing::warn!("DATABASE_URL not set, events are kept in memory");
        return Arc::new(InMemoryEventStore::new());
    };
    let pool = sqlx::PgPool::connect(url)
        .await
        .expect("failed to connect to PostgreSQL");
    let store = PostgresEventStore::new(pool);
    store
        .run_migrations()
        .await
        .expect("failed to run migrations");
    tracing::info!("using PostgreSQL event store");
    Arc::new(store)
}

#[tokio::main]
async fn main() {
    let config = Config::from_env();

    // 1. Initialize tracing
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 3. Open the log and recover every persisted projection
    let store = open_store(&config).await;
    let coordinator = Arc::new(ProjectionCoordinator::new(
        Arc::clone(&store),
        Arc::new(BuiltinRuntime),
        ManagementSettings::from_env(),
    ));
    let recovered = coordinator
        .recover()
        .await
        .expect("projection recovery failed");
    tracing::info!(count = recovered.len(), "projections recovered");

    // 4. Build the application
    let state = Arc::new(AppState::new(store, Arc::clone(&coordinator), &config));
    let app = api::create_app(state, metrics_handle);

    // 5. Start server
    let addr = config.addr();
    tracing::info!(%addr, base_url = %config.public_base_url, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    // 6. Checkpoint running projections before exiting
    coordinator.shutdown().await;
    tracing::info!("server shut down gracefully");
}
