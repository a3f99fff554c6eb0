//! Operation driver: runs the core components over the configured inventory.
//!
//! Servers are processed strictly one after another. A failure on one server
//! is recorded in the returned result and the loop moves on.

use crate::artifact::BackupArtifact;
use crate::config::{Config, RetentionPolicy, ServerDescriptor};
use crate::distribute::distribute;
use crate::dump::{create_dump, DumpOptions};
use crate::listing::{list_backups, snapshot};
use crate::remote::Connector;
use crate::result::OperationResult;
use crate::rotation::{plan_rotation, rotate_on};
use crate::utils::errors::{BackupError, Result};
use chrono::NaiveDate;

/// Dump every master, or only `server_filter` when given.
pub fn backup_all(
    config: &Config,
    connector: &dyn Connector,
    server_filter: Option<&str>,
) -> Result<OperationResult> {
    let servers: Vec<&ServerDescriptor> = match server_filter {
        Some(name) => vec![config.master(name)?],
        None => config.masters.iter().collect(),
    };

    let options = DumpOptions::from(&config.backup);
    let mut result = OperationResult::new();
    for server in servers {
        tracing::info!(server = %server.name, host = %server.host, "Starting dump");
        result.merge(create_dump(
            connector,
            server,
            server.database(&config.backup.database),
            &config.backup.root,
            &options,
        ));
    }
    Ok(result)
}

/// One rotation pass per master directory. With `dry_run` the planned
/// actions are reported without touching the filesystem.
pub fn rotate_all(
    config: &Config,
    policy: &RetentionPolicy,
    today: NaiveDate,
    dry_run: bool,
) -> OperationResult {
    let mut result = OperationResult::new();

    for server in &config.masters {
        let name = Some(server.name.as_str());
        let directory = config.server_dir(&server.name);

        let outcome = if dry_run {
            snapshot(&directory).map(|artifacts| plan_rotation(&artifacts, policy, today))
        } else {
            rotate_on(&directory, policy, today)
        };

        match outcome {
            Ok(actions) => {
                let prefix = if dry_run { "[dry run] " } else { "" };
                for action in &actions {
                    result.success(name, format!("{prefix}{action}"));
                }
                result.success(
                    name,
                    format!("{prefix}Rotation pass complete: {} changes", actions.len()),
                );
            }
            Err(e) => result.failure(name, "Rotation aborted", &e),
        }
    }

    result
}

pub fn list_server_backups(config: &Config, server_name: &str) -> Result<OperationResult> {
    config.master(server_name)?;
    Ok(list_backups(&config.server_dir(server_name)))
}

/// Push one of `source_name`'s artifacts to every configured secondary.
/// Only canonical artifact names are accepted.
pub fn distribute_backup(
    config: &Config,
    connector: &dyn Connector,
    source_name: &str,
    file_name: &str,
) -> Result<OperationResult> {
    config.master(source_name)?;
    if BackupArtifact::parse(file_name).is_none() {
        return Err(BackupError::InvalidFileName(file_name.to_string()));
    }
    if config.secondaries.is_empty() {
        tracing::warn!(server = %source_name, "No secondary servers configured");
    }

    Ok(distribute(
        connector,
        file_name,
        source_name,
        &config.backup.root,
        &config.secondaries,
        &config.backup.remote_root,
    ))
}
