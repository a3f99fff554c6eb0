//! Error types for the backup engine.

use crate::result::MessageKind;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackupError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Remote execution failed: {0}")]
    RemoteExecution(String),

    #[error("Transfer failed: {0}")]
    Transfer(String),

    #[error("Filesystem error on {}: {source}", path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unknown server: {0}")]
    UnknownServer(String),

    #[error("Invalid backup file name: {0}")]
    InvalidFileName(String),
}

impl BackupError {
    /// Wrap an I/O error with the path it happened on.
    pub fn filesystem(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        BackupError::Filesystem {
            path: path.into(),
            source,
        }
    }

    /// The message kind this error is reported as in an `OperationResult`.
    pub fn kind(&self) -> MessageKind {
        match self {
            BackupError::RemoteExecution(_) => MessageKind::RemoteExecutionFailure,
            BackupError::Transfer(_) => MessageKind::TransferFailure,
            BackupError::Filesystem { .. } => MessageKind::FilesystemFailure,
            BackupError::Config(_)
            | BackupError::UnknownServer(_)
            | BackupError::InvalidFileName(_) => MessageKind::ConfigurationFailure,
        }
    }
}

pub type Result<T> = std::result::Result<T, BackupError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        let err = BackupError::filesystem(
            "/backups/db1",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert_eq!(err.kind(), MessageKind::FilesystemFailure);
        assert!(err.to_string().contains("/backups/db1"));

        assert_eq!(
            BackupError::Transfer("eof".into()).kind(),
            MessageKind::TransferFailure
        );
        assert_eq!(
            BackupError::UnknownServer("db9".into()).kind(),
            MessageKind::ConfigurationFailure
        );
    }
}
