use crate::error::AppError;
use crate::services::runner::run_exclusive;
use crate::state::AppState;
use axum::extract::{Query, State};
use axum::routing::post;
use axum::{Json, Router};
use chrono::Local;
use serde::Deserialize;
use sqlbackup_core::operations::rotate_all;
use sqlbackup_core::{OperationResult, RetentionPolicy};
use std::sync::Arc;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/", post(rotate))
}

#[derive(Debug, Default, Deserialize)]
struct RotateQuery {
    #[serde(default)]
    dry_run: bool,
    max_hourly: Option<usize>,
    max_daily: Option<usize>,
}

impl RotateQuery {
    fn policy(&self, configured: &RetentionPolicy) -> Result<RetentionPolicy, AppError> {
        let policy = RetentionPolicy {
            max_hourly: self.max_hourly.unwrap_or(configured.max_hourly),
            max_daily: self.max_daily.unwrap_or(configured.max_daily),
        };
        if policy.max_hourly == 0 || policy.max_daily == 0 {
            return Err(AppError::BadRequest(
                "max_hourly and max_daily must be at least 1".into(),
            ));
        }
        Ok(policy)
    }
}

async fn rotate(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RotateQuery>,
) -> Result<Json<OperationResult>, AppError> {
    let policy = query.policy(&state.config.retention)?;
    let dry_run = query.dry_run;

    let result = run_exclusive(&state, "rotate", move |config, _| {
        rotate_all(config, &policy, Local::now().date_naive(), dry_run)
    })
    .await?;
    Ok(Json(result))
}
