//! HTTP server for projection management and stream feeds.
//!
//! Provides REST endpoints for projection commands and status, appends, and
//! paged feeds over single streams and the global log, with structured
//! logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;
pub mod state;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use config::Config;
pub use error::ApiError;
pub use state::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route(
            "/projections",
            get(routes::projections::list).post(routes::projections::create),
        )
        .route(
            "/projections/{name}",
            get(routes::projections::get).delete(routes::projections::delete),
        )
        .route("/projections/{name}/enable", post(routes::projections::enable))
        .route("/projections/{name}/disable", post(routes::projections::disable))
        .route("/projections/{name}/abort", post(routes::projections::abort))
        .route("/projections/{name}/reset", post(routes::projections::reset))
        .route(
            "/streams/{stream}",
            get(routes::streams::head).post(routes::streams::append),
        )
        .route("/streams/{stream}/{event}", get(routes::streams::event))
        .route(
            "/streams/{stream}/{from}/{direction}/{count}",
            get(routes::streams::page),
        )
        .route("/all", get(routes::all::head))
        .route("/all/{position}/{direction}/{count}", get(routes::all::page))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
