//! SQL Backup Core
//!
//! Pulls database dumps from master servers over SSH, pushes them to
//! secondary servers and keeps each server's backup directory within its
//! hourly/daily/monthly retention bounds.

pub mod artifact;
pub mod config;
pub mod distribute;
pub mod dump;
pub mod listing;
pub mod operations;
pub mod remote;
pub mod result;
pub mod rotation;
pub mod utils;

// Re-export commonly used types
pub use artifact::{BackupArtifact, Tier};
pub use config::{Config, RetentionPolicy, ServerDescriptor};
pub use result::{MessageKind, OperationResult, OutcomeMessage};
pub use utils::errors::BackupError;
pub type Result<T> = std::result::Result<T, BackupError>;
