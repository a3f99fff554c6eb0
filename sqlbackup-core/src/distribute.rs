//! Push an already-fetched artifact to secondary servers.
//!
//! Targets are handled one at a time and independently: a failure on one
//! target is recorded for that target and iteration continues.

use crate::config::{is_plain_file_name, ServerDescriptor};
use crate::remote::{shell_quote, Connector};
use crate::result::OperationResult;
use crate::utils::errors::{BackupError, Result};
use std::path::Path;

/// Copy `<backup_root>/<source_server>/<file_name>` to
/// `<remote_root>/<source_server>/<file_name>` on every target.
pub fn distribute(
    connector: &dyn Connector,
    file_name: &str,
    source_server: &str,
    backup_root: &Path,
    targets: &[ServerDescriptor],
    remote_root: &Path,
) -> OperationResult {
    let mut result = OperationResult::new();

    for part in [file_name, source_server] {
        if !is_plain_file_name(part) {
            result.failure(
                None,
                "Distribution rejected",
                &BackupError::InvalidFileName(part.to_string()),
            );
            return result;
        }
    }

    let local = backup_root.join(source_server).join(file_name);
    let remote_dir = remote_root.join(source_server);
    let remote = remote_dir.join(file_name);

    for target in targets {
        match push(connector, target, &local, &remote_dir, &remote) {
            Ok(bytes) => result.success(
                Some(&target.name),
                format!(
                    "Backup {} uploaded to {}: {} ({} bytes)",
                    file_name,
                    target.host,
                    remote.display(),
                    bytes
                ),
            ),
            Err(e) => result.failure(
                Some(&target.name),
                &format!("Could not upload {} to {}", file_name, target.host),
                &e,
            ),
        }
    }

    result
}

fn push(
    connector: &dyn Connector,
    target: &ServerDescriptor,
    local: &Path,
    remote_dir: &Path,
    remote: &Path,
) -> Result<u64> {
    let mut session = connector.connect(target)?;

    let mkdir = session.exec(&format!(
        "mkdir -p {}",
        shell_quote(&remote_dir.to_string_lossy())
    ))?;
    if mkdir.failed() {
        return Err(BackupError::RemoteExecution(mkdir.error_text()));
    }

    session.upload(local, remote)
}
