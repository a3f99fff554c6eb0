use crate::error::AppError;
use crate::services::runner::run_exclusive;
use crate::state::AppState;
use chrono::Local;
use sqlbackup_core::operations::{backup_all, rotate_all};
use sqlbackup_core::OperationResult;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduledOperation {
    Backup,
    Rotate,
}

impl fmt::Display for ScheduledOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ScheduledOperation::Backup => "backup",
            ScheduledOperation::Rotate => "rotate",
        })
    }
}

pub struct BackupScheduler {
    scheduler: Mutex<JobScheduler>,
    state: Arc<AppState>,
}

impl BackupScheduler {
    pub async fn new(state: Arc<AppState>) -> anyhow::Result<Self> {
        let scheduler = JobScheduler::new().await?;
        Ok(Self {
            scheduler: Mutex::new(scheduler),
            state,
        })
    }

    pub async fn schedule(&self, operation: ScheduledOperation, cron_expression: &str) -> anyhow::Result<()> {
        let state = self.state.clone();

        let job = Job::new_async(cron_expression, move |_uuid, _lock| {
            let state = state.clone();
            Box::pin(async move {
                run_scheduled(state, operation).await;
            })
        })?;

        self.scheduler.lock().await.add(job).await?;
        tracing::info!(%operation, cron = %cron_expression, "Operation scheduled");
        Ok(())
    }

    pub async fn init_schedules(&self) -> anyhow::Result<usize> {
        let schedule = &self.state.config.schedule;
        let entries = [
            (ScheduledOperation::Backup, schedule.backup_cron.as_deref()),
            (ScheduledOperation::Rotate, schedule.rotate_cron.as_deref()),
        ];

        let mut count = 0;
        for (operation, cron) in entries {
            let Some(cron) = cron.filter(|c| !c.trim().is_empty()) else {
                continue;
            };
            if let Err(e) = self.schedule(operation, cron).await {
                tracing::error!(%operation, cron = %cron, error = %e, "Failed to schedule operation");
            } else {
                count += 1;
            }
        }

        tracing::info!(count, "Cron schedules initialized");
        Ok(count)
    }

    pub async fn start(&self) -> anyhow::Result<()> {
        self.scheduler.lock().await.start().await?;
        Ok(())
    }

    pub async fn shutdown(&self) -> anyhow::Result<()> {
        self.scheduler.lock().await.shutdown().await?;
        Ok(())
    }
}

async fn run_scheduled(state: Arc<AppState>, operation: ScheduledOperation) {
    let name = operation.to_string();
    let outcome = match operation {
        ScheduledOperation::Backup => {
            run_exclusive(&state, &name, |config, connector| {
                backup_all(config, connector, None).map_err(AppError::from)
            })
            .await
            .and_then(|r| r)
        }
        ScheduledOperation::Rotate => {
            run_exclusive(&state, &name, |config, _| {
                rotate_all(config, &config.retention, Local::now().date_naive(), false)
            })
            .await
        }
    };

    match outcome {
        Ok(result) => log_summary(operation, &result),
        Err(AppError::Conflict(reason)) => {
            tracing::warn!(%operation, %reason, "Skipping scheduled run");
        }
        Err(e) => tracing::error!(%operation, error = %e, "Scheduled run failed"),
    }
}

fn log_summary(operation: ScheduledOperation, result: &OperationResult) {
    let failures = result.failures().count();
    if failures > 0 {
        tracing::warn!(%operation, failures, messages = result.messages.len(), "Scheduled run finished with failures");
    } else {
        tracing::info!(%operation, messages = result.messages.len(), "Scheduled run finished");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlbackup_core::remote::SshConnector;
    use sqlbackup_core::Config;

    fn state(backup_cron: Option<&str>, rotate_cron: Option<&str>) -> Arc<AppState> {
        let mut config = Config::default();
        config.schedule.backup_cron = backup_cron.map(String::from);
        config.schedule.rotate_cron = rotate_cron.map(String::from);
        Arc::new(AppState::new(config, Arc::new(SshConnector::new("/nonexistent/id_rsa"))))
    }

    #[tokio::test]
    async fn test_init_schedules_counts_configured_entries() {
        let scheduler = BackupScheduler::new(state(Some("0 0 * * * *"), Some("")))
            .await
            .unwrap();
        assert_eq!(scheduler.init_schedules().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_invalid_cron_is_skipped() {
        let scheduler = BackupScheduler::new(state(Some("not a cron"), Some("0 30 1 * * *")))
            .await
            .unwrap();
        assert_eq!(scheduler.init_schedules().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_scheduled_run_skips_while_busy() {
        let state = state(None, None);
        let held = state.try_begin("backup").unwrap();

        run_scheduled(state.clone(), ScheduledOperation::Rotate).await;

        assert_eq!(state.active_operation().as_deref(), Some("backup"));
        drop(held);
        assert!(state.active_operation().is_none());
    }
}
