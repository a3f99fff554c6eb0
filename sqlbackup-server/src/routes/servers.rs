use crate::error::AppError;
use crate::services::runner::{run_exclusive, run_shared};
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use sqlbackup_core::operations::{backup_all, distribute_backup, list_server_backups};
use sqlbackup_core::{OperationResult, ServerDescriptor};
use std::sync::Arc;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_servers))
        .route("/{name}/dump", post(create_dump))
        .route("/{name}/backups", get(list_backups))
        .route("/{name}/backups/{file}/distribute", post(distribute))
}

#[derive(Debug, Serialize)]
struct ServerSummary {
    name: String,
    host: String,
    port: u16,
    role: &'static str,
}

impl ServerSummary {
    fn new(server: &ServerDescriptor, role: &'static str) -> Self {
        Self {
            name: server.name.clone(),
            host: server.host.clone(),
            port: server.port,
            role,
        }
    }
}

async fn list_servers(State(state): State<Arc<AppState>>) -> Json<Vec<ServerSummary>> {
    let config = &state.config;
    let servers = config
        .masters
        .iter()
        .map(|s| ServerSummary::new(s, "master"))
        .chain(config.secondaries.iter().map(|s| ServerSummary::new(s, "secondary")))
        .collect();
    Json(servers)
}

async fn create_dump(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<OperationResult>, AppError> {
    // Reject unknown names before taking the lock
    state.config.master(&name)?;

    let result = run_exclusive(&state, "backup", move |config, connector| {
        backup_all(config, connector, Some(&name))
    })
    .await??;
    Ok(Json(result))
}

async fn list_backups(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<OperationResult>, AppError> {
    let result = run_shared(&state, move |config, _| list_server_backups(config, &name)).await??;
    Ok(Json(result))
}

async fn distribute(
    State(state): State<Arc<AppState>>,
    Path((name, file)): Path<(String, String)>,
) -> Result<Json<OperationResult>, AppError> {
    // Not serialized against rotation: a file renamed or pruned mid-push is
    // reported per target as a filesystem failure.
    let result = run_shared(&state, move |config, connector| {
        distribute_backup(config, connector, &name, &file)
    })
    .await??;
    Ok(Json(result))
}
