//! Remote command execution and file transfer.
//!
//! A `Connector` opens one `RemoteSession` per server. Sessions close when
//! dropped, so every exit path of an operation releases its connection.

pub mod ssh;

#[cfg(test)]
pub(crate) mod mock;

use crate::config::ServerDescriptor;
use crate::utils::errors::Result;
use std::path::Path;

pub use ssh::SshConnector;

/// Captured result of one remote command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_status: i32,
}

impl CommandOutput {
    /// A command failed if it wrote to stderr or exited non-zero.
    pub fn failed(&self) -> bool {
        !self.stderr.trim().is_empty() || self.exit_status != 0
    }

    pub fn error_text(&self) -> String {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            format!("command exited with status {}", self.exit_status)
        } else {
            stderr.to_string()
        }
    }
}

pub trait RemoteSession: Send {
    fn exec(&mut self, command: &str) -> Result<CommandOutput>;

    /// Pull `remote` into `local`, returning the number of bytes copied.
    fn download(&mut self, remote: &Path, local: &Path) -> Result<u64>;

    /// Push `local` to `remote`, returning the number of bytes copied.
    fn upload(&mut self, local: &Path, remote: &Path) -> Result<u64>;
}

pub trait Connector: Send + Sync {
    fn connect(&self, server: &ServerDescriptor) -> Result<Box<dyn RemoteSession>>;
}

/// Single-quote `value` for a POSIX shell.
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}
