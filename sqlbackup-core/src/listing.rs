//! Backup directory inspection.

use crate::artifact::{sort_newest_first, BackupArtifact};
use crate::result::OperationResult;
use crate::utils::errors::{BackupError, Result};
use std::path::Path;

/// Artifacts currently in `directory`, newest first. Files whose names are
/// not artifact names are skipped.
pub fn snapshot(directory: &Path) -> Result<Vec<BackupArtifact>> {
    let entries =
        std::fs::read_dir(directory).map_err(|e| BackupError::filesystem(directory, e))?;

    let mut artifacts = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| BackupError::filesystem(directory, e))?;
        let file_type = entry
            .file_type()
            .map_err(|e| BackupError::filesystem(entry.path(), e))?;
        if !file_type.is_file() {
            continue;
        }

        let file_name = entry.file_name();
        match file_name.to_str().and_then(BackupArtifact::parse) {
            Some(artifact) => artifacts.push(artifact),
            None => tracing::debug!(
                file = %file_name.to_string_lossy(),
                "Skipping foreign file in backup directory"
            ),
        }
    }

    sort_newest_first(&mut artifacts);
    Ok(artifacts)
}

pub fn list_backups(directory: &Path) -> OperationResult {
    let mut result = OperationResult::new();
    match snapshot(directory) {
        Ok(artifacts) if artifacts.is_empty() => result.success(None, "No backups found."),
        Ok(artifacts) => {
            result.success(None, format!("Found {} backups.", artifacts.len()));
            result.artifacts = artifacts.iter().map(BackupArtifact::file_name).collect();
        }
        Err(e) => result.failure(None, "Cannot read backup directory", &e),
    }
    result
}
