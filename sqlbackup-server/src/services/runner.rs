//! Runs blocking core operations off the async runtime.
//!
//! Dumps and rotation passes both write into the backup root, so at most one
//! of them runs at a time. Requests that arrive while one is active are
//! refused with a conflict instead of being queued.

use crate::error::AppError;
use crate::state::AppState;
use sqlbackup_core::remote::Connector;
use sqlbackup_core::Config;
use std::sync::Arc;

pub async fn run_exclusive<T, F>(state: &Arc<AppState>, operation: &str, work: F) -> Result<T, AppError>
where
    F: FnOnce(&Config, &dyn Connector) -> T + Send + 'static,
    T: Send + 'static,
{
    let guard = state.try_begin(operation).map_err(|running| {
        AppError::Conflict(format!(
            "Cannot start {operation}: {running} is already running"
        ))
    })?;

    tracing::info!(operation, "Operation started");
    let worker = state.clone();
    let name = operation.to_string();
    // The guard lives with the blocking task: the slot stays claimed until the
    // work returns, even if the caller stops waiting for it.
    tokio::task::spawn_blocking(move || {
        let _guard = guard;
        let value = work(&worker.config, worker.connector.as_ref());
        tracing::info!(operation = %name, "Operation finished");
        value
    })
    .await
    .map_err(|e| AppError::Internal(anyhow::anyhow!(e)))
}

/// Runs a read-only operation on the blocking pool without taking the lock.
pub async fn run_shared<T, F>(state: &Arc<AppState>, work: F) -> Result<T, AppError>
where
    F: FnOnce(&Config, &dyn Connector) -> T + Send + 'static,
    T: Send + 'static,
{
    let worker = state.clone();
    tokio::task::spawn_blocking(move || work(&worker.config, worker.connector.as_ref()))
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!(e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlbackup_core::remote::SshConnector;
    use std::time::Duration;

    fn state() -> Arc<AppState> {
        Arc::new(AppState::new(
            Config::default(),
            Arc::new(SshConnector::new("/nonexistent/id_rsa")),
        ))
    }

    #[tokio::test]
    async fn test_refuses_second_operation() {
        let state = state();
        let _held = state.try_begin("backup").unwrap();

        let err = run_exclusive(&state, "rotate", |_, _| ()).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_releases_after_completion() {
        let state = state();

        let value = run_exclusive(&state, "rotate", |config, _| config.retention.max_hourly)
            .await
            .unwrap();
        assert_eq!(value, 6);
        assert!(state.active_operation().is_none());

        run_exclusive(&state, "backup", |_, _| ()).await.unwrap();
    }

    #[tokio::test]
    async fn test_abandoned_caller_releases_when_work_ends() {
        let state = state();

        let waited = tokio::time::timeout(
            Duration::from_millis(50),
            run_exclusive(&state, "backup", |_, _| {
                std::thread::sleep(Duration::from_millis(300))
            }),
        )
        .await;
        assert!(waited.is_err());

        // Still running on the blocking pool
        assert_eq!(state.active_operation().as_deref(), Some("backup"));
        assert!(matches!(
            run_exclusive(&state, "rotate", |_, _| ()).await,
            Err(AppError::Conflict(_))
        ));

        for _ in 0..40 {
            if state.active_operation().is_none() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(state.active_operation().is_none());
        run_exclusive(&state, "rotate", |_, _| ()).await.unwrap();
    }
}
