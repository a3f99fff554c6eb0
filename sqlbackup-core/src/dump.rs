//! Remote dump creation and retrieval.
//!
//! One dump is one sequence on a single session: run the dump command on the
//! master with its output redirected to a transient remote file, pull that
//! file into `<destination>/<server>/`, then remove the remote copy. The first
//! failing step ends the sequence; the remote cleanup is best effort.

use crate::artifact::BackupArtifact;
use crate::config::{BackupSettings, ServerDescriptor};
use crate::remote::{shell_quote, Connector};
use crate::result::OperationResult;
use crate::utils::errors::BackupError;
use chrono::NaiveDateTime;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct DumpOptions {
    /// Directory on the master that receives the transient dump
    pub remote_dump_dir: PathBuf,

    /// Command template; `{user}` and `{database}` are substituted
    pub command_template: String,
}

impl DumpOptions {
    fn render(&self, user: &str, database: &str) -> String {
        self.command_template
            .replace("{user}", &shell_quote(user))
            .replace("{database}", &shell_quote(database))
    }
}

impl From<&BackupSettings> for DumpOptions {
    fn from(settings: &BackupSettings) -> Self {
        Self {
            remote_dump_dir: settings.remote_dump_dir.clone(),
            command_template: settings.dump_command.clone(),
        }
    }
}

/// Dump `database` on `server` into a new hourly artifact under
/// `destination/<server.name>/`.
pub fn create_dump(
    connector: &dyn Connector,
    server: &ServerDescriptor,
    database: &str,
    destination: &Path,
    options: &DumpOptions,
) -> OperationResult {
    create_dump_at(
        connector,
        server,
        database,
        destination,
        options,
        chrono::Local::now().naive_local(),
    )
}

pub fn create_dump_at(
    connector: &dyn Connector,
    server: &ServerDescriptor,
    database: &str,
    destination: &Path,
    options: &DumpOptions,
    now: NaiveDateTime,
) -> OperationResult {
    let mut result = OperationResult::new();
    let name = Some(server.name.as_str());

    let file_name = BackupArtifact::hourly(now).file_name();
    let remote_path = options
        .remote_dump_dir
        .join(format!("{}-{}", server.name, file_name));
    let local_dir = destination.join(&server.name);
    let local_path = local_dir.join(&file_name);
    let quoted_remote = shell_quote(&remote_path.to_string_lossy());

    if let Err(e) = std::fs::create_dir_all(&local_dir) {
        result.failure(
            name,
            "Cannot prepare backup directory",
            &BackupError::filesystem(&local_dir, e),
        );
        return result;
    }

    let mut session = match connector.connect(server) {
        Ok(session) => session,
        Err(e) => {
            result.failure(name, "Connection failed", &e);
            return result;
        }
    };

    let command = format!("{} > {}", options.render(&server.user, database), quoted_remote);
    match session.exec(&command) {
        Ok(output) if output.failed() => {
            result.failure(
                name,
                "Dump failed",
                &BackupError::RemoteExecution(output.error_text()),
            );
            return result;
        }
        Ok(_) => result.success(name, format!("Dump created: {}", remote_path.display())),
        Err(e) => {
            result.failure(name, "Dump failed", &e);
            return result;
        }
    }

    match session.download(&remote_path, &local_path) {
        Ok(bytes) => {
            result.success(
                name,
                format!(
                    "Backup copied to backup server: {} ({} bytes)",
                    local_path.display(),
                    bytes
                ),
            );
            result.artifacts.push(file_name);
        }
        Err(e) => {
            // Never leave a truncated artifact behind
            if local_path.exists() {
                if let Err(rm) = std::fs::remove_file(&local_path) {
                    tracing::warn!(path = %local_path.display(), error = %rm, "Failed to remove partial download");
                }
            }
            result.failure(name, "Pull failed", &e);
            return result;
        }
    }

    match session.exec(&format!("rm -f {quoted_remote}")) {
        Ok(output) if !output.failed() => result.success(
            name,
            format!("Original dump removed: {}", remote_path.display()),
        ),
        Ok(output) => result.cleanup_failed(
            name,
            format!(
                "Original dump not removed: {} ({})",
                remote_path.display(),
                output.error_text()
            ),
        ),
        Err(e) => result.cleanup_failed(
            name,
            format!("Original dump not removed: {} ({e})", remote_path.display()),
        ),
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::mock::MockConnector;
    use crate::remote::CommandOutput;
    use crate::result::MessageKind;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn master() -> ServerDescriptor {
        ServerDescriptor {
            name: "db1".into(),
            host: "10.0.0.11".into(),
            port: 22,
            user: "backup".into(),
            key_path: None,
            database: None,
        }
    }

    fn options() -> DumpOptions {
        DumpOptions {
            remote_dump_dir: PathBuf::from("/tmp"),
            command_template: "mysqldump -u {user} {database}".into(),
        }
    }

    fn noon() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 10)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    const REMOTE: &str = "/tmp/db1-hourly_backup_2024-05-10_12-00-00.sql";
    const ARTIFACT: &str = "hourly_backup_2024-05-10_12-00-00.sql";

    #[test]
    fn test_successful_dump() {
        let dir = TempDir::new().unwrap();
        let connector = MockConnector::new();

        let result = create_dump_at(&connector, &master(), "shop_db", dir.path(), &options(), noon());

        assert!(!result.has_failures(), "{:?}", result.messages);
        assert_eq!(result.messages.len(), 3);
        assert!(result.messages.iter().all(|m| m.kind == MessageKind::Success));
        assert_eq!(result.artifacts, vec![ARTIFACT]);

        let local = dir.path().join("db1").join(ARTIFACT);
        assert_eq!(std::fs::read(&local).unwrap(), b"-- dump\n");
        assert!(connector.remote_file("10.0.0.11", Path::new(REMOTE)).is_none());

        let events = connector.events();
        assert_eq!(
            events,
            vec![
                "connect 10.0.0.11".to_string(),
                format!("exec 10.0.0.11: mysqldump -u 'backup' 'shop_db' > '{REMOTE}'"),
                format!("download 10.0.0.11: {REMOTE}"),
                format!("exec 10.0.0.11: rm -f '{REMOTE}'"),
                "close 10.0.0.11".to_string(),
            ]
        );
        assert_eq!(connector.open_sessions(), 0);
    }

    #[test]
    fn test_stderr_stops_the_sequence() {
        let dir = TempDir::new().unwrap();
        let connector = MockConnector::new().respond(
            "mysqldump",
            CommandOutput {
                stderr: "mysqldump: Got error: 1049: Unknown database 'shop_db'\n".into(),
                ..Default::default()
            },
        );

        let result = create_dump_at(&connector, &master(), "shop_db", dir.path(), &options(), noon());

        assert_eq!(result.messages.len(), 1);
        assert_eq!(result.messages[0].kind, MessageKind::RemoteExecutionFailure);
        assert!(result.messages[0].message.contains("Unknown database"));
        assert!(result.artifacts.is_empty());
        assert!(!dir.path().join("db1").join(ARTIFACT).exists());
        assert!(!connector.events().iter().any(|e| e.starts_with("download")));
        assert!(!connector.events().iter().any(|e| e.contains("rm -f")));
        assert_eq!(connector.open_sessions(), 0);
    }

    #[test]
    fn test_connection_failure_is_reported_not_raised() {
        let dir = TempDir::new().unwrap();
        let connector = MockConnector::new().refuse("10.0.0.11");

        let result = create_dump_at(&connector, &master(), "shop_db", dir.path(), &options(), noon());

        assert_eq!(result.messages.len(), 1);
        assert_eq!(result.messages[0].kind, MessageKind::RemoteExecutionFailure);
        assert_eq!(result.messages[0].server.as_deref(), Some("db1"));
        assert!(result.messages[0].message.contains("connection refused"));
    }

    #[test]
    fn test_failed_pull_removes_partial_file() {
        let dir = TempDir::new().unwrap();
        let connector = MockConnector::new().fail_download("10.0.0.11");

        let result = create_dump_at(&connector, &master(), "shop_db", dir.path(), &options(), noon());

        assert_eq!(result.messages.len(), 2);
        assert_eq!(result.messages[1].kind, MessageKind::TransferFailure);
        assert!(!dir.path().join("db1").join(ARTIFACT).exists());
        assert!(!connector.events().iter().any(|e| e.contains("rm -f")));
        assert_eq!(connector.open_sessions(), 0);
    }

    #[test]
    fn test_cleanup_failure_is_not_a_pipeline_failure() {
        let dir = TempDir::new().unwrap();
        let connector = MockConnector::new().respond(
            "rm -f",
            CommandOutput {
                stderr: "rm: cannot remove: Permission denied".into(),
                exit_status: 1,
                ..Default::default()
            },
        );

        let result = create_dump_at(&connector, &master(), "shop_db", dir.path(), &options(), noon());

        assert!(!result.has_failures());
        assert_eq!(result.artifacts, vec![ARTIFACT]);
        let last = result.messages.last().unwrap();
        assert_eq!(last.kind, MessageKind::CleanupFailed);
        assert!(last.message.contains("Permission denied"));
        assert!(dir.path().join("db1").join(ARTIFACT).exists());
    }

    #[test]
    fn test_cleanup_transport_error_is_cleanup_failed() {
        let dir = TempDir::new().unwrap();
        let connector = MockConnector::new().break_exec("rm -f", "channel closed");

        let result = create_dump_at(&connector, &master(), "shop_db", dir.path(), &options(), noon());

        assert!(!result.has_failures());
        assert_eq!(result.messages.last().unwrap().kind, MessageKind::CleanupFailed);
        assert_eq!(connector.open_sessions(), 0);
    }

    #[test]
    fn test_unwritable_destination() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("db1");
        std::fs::write(&blocker, b"not a directory").unwrap();
        let connector = MockConnector::new();

        let result = create_dump_at(&connector, &master(), "shop_db", dir.path(), &options(), noon());

        assert_eq!(result.messages.len(), 1);
        assert_eq!(result.messages[0].kind, MessageKind::FilesystemFailure);
        assert!(connector.events().is_empty());
    }
}
