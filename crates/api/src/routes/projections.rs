//! Projection management endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::ProjectionName;
use projections::{ProjectionConfig, ProjectionDefinition, ProjectionStatus};
use serde::Deserialize;

use crate::error::ApiError;
use crate::state::AppState;

// -- Request types --

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProjectionRequest {
    pub name: String,
    pub query: String,
    /// Start running immediately after creation.
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub emit_enabled: bool,
    #[serde(default = "default_checkpoints")]
    pub checkpoints_enabled: bool,
}

fn default_checkpoints() -> bool {
    ProjectionConfig::default().checkpoints_enabled
}

// -- Handlers --

/// GET /projections: every live projection, ordered by name.
pub async fn list(State(state): State<Arc<AppState>>) -> Json<Vec<ProjectionStatus>> {
    Json(state.coordinator.list().await)
}

/// POST /projections: create a projection, idempotent for an identical definition.
#[tracing::instrument(skip(state, req), fields(name = %req.name))]
pub async fn create(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateProjectionRequest>,
) -> Result<(StatusCode, Json<ProjectionStatus>), ApiError> {
    let name = ProjectionName::new(req.name)?;
    let definition = ProjectionDefinition::new(
        name,
        req.query,
        ProjectionConfig {
            emit_enabled: req.emit_enabled,
            checkpoints_enabled: req.checkpoints_enabled,
        },
    );
    let status = state.coordinator.create(definition, req.enabled).await?;
    Ok((StatusCode::CREATED, Json(status)))
}

/// GET /projections/{name}
#[tracing::instrument(skip(state))]
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<ProjectionStatus>, ApiError> {
    let name = ProjectionName::new(name)?;
    Ok(Json(state.coordinator.status(&name).await?))
}

/// DELETE /projections/{name}: tombstone the name and drop its streams.
#[tracing::instrument(skip(state))]
pub async fn delete(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<StatusCode, ApiError> {
    let name = ProjectionName::new(name)?;
    state.coordinator.delete(&name).await?;
    record_command("delete");
    Ok(StatusCode::NO_CONTENT)
}

/// POST /projections/{name}/enable
#[tracing::instrument(skip(state))]
pub async fn enable(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<ProjectionStatus>, ApiError> {
    let name = ProjectionName::new(name)?;
    let status = state.coordinator.enable(&name).await?;
    record_command("enable");
    Ok(Json(status))
}

/// POST /projections/{name}/disable
#[tracing::instrument(skip(state))]
pub async fn disable(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<ProjectionStatus>, ApiError> {
    let name = ProjectionName::new(name)?;
    let status = state.coordinator.disable(&name).await?;
    record_command("disable");
    Ok(Json(status))
}

/// POST /projections/{name}/abort
#[tracing::instrument(skip(state))]
pub async fn abort(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<ProjectionStatus>, ApiError> {
    let name = ProjectionName::new(name)?;
    let status = state.coordinator.abort(&name).await?;
    record_command("abort");
    Ok(Json(status))
}

/// POST /projections/{name}/reset
#[tracing::instrument(skip(state))]
pub async fn reset(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<ProjectionStatus>, ApiError> {
    let name = ProjectionName::new(name)?;
    let status = state.coordinator.reset(&name).await?;
    record_command("reset");
    Ok(Json(status))
}

fn record_command(command: &'static str) {
    metrics::counter!("projection_commands_total", "command" => command).increment(1);
}
