//! `ssh2`-backed sessions: key authentication, channel exec and SFTP.

use super::{CommandOutput, Connector, RemoteSession};
use crate::config::ServerDescriptor;
use crate::utils::errors::{BackupError, Result};
use std::fs::File;
use std::io::Read;
use std::net::TcpStream;
use std::path::{Path, PathBuf};

pub struct SshConnector {
    default_key: PathBuf,
}

impl SshConnector {
    /// `default_key` is used for servers without their own `key_path`.
    pub fn new(default_key: impl Into<PathBuf>) -> Self {
        Self {
            default_key: default_key.into(),
        }
    }
}

impl Connector for SshConnector {
    fn connect(&self, server: &ServerDescriptor) -> Result<Box<dyn RemoteSession>> {
        let key = server.key_path(&self.default_key);
        let session = open_session(server, key).map_err(|e| {
            BackupError::RemoteExecution(format!(
                "{}@{}:{}: {e:#}",
                server.user, server.host, server.port
            ))
        })?;

        tracing::debug!(host = %server.host, user = %server.user, "SSH session opened");
        Ok(Box::new(SshSession {
            session,
            host: server.host.clone(),
        }))
    }
}

fn open_session(server: &ServerDescriptor, key: &Path) -> anyhow::Result<ssh2::Session> {
    let tcp = TcpStream::connect((server.host.as_str(), server.port))?;
    let mut sess = ssh2::Session::new()?;
    sess.set_tcp_stream(tcp);
    sess.handshake()?;

    sess.userauth_pubkey_file(&server.user, None, key, None)
        .map_err(|e| anyhow::anyhow!("SSH authentication failed: {}", e))?;

    if !sess.authenticated() {
        anyhow::bail!("SSH authentication failed");
    }
    Ok(sess)
}

struct SshSession {
    session: ssh2::Session,
    host: String,
}

impl SshSession {
    fn run(&self, command: &str) -> anyhow::Result<CommandOutput> {
        let mut channel = self.session.channel_session()?;
        channel.exec(command)?;

        let mut stdout = String::new();
        channel.read_to_string(&mut stdout)?;
        let mut stderr = String::new();
        channel.stderr().read_to_string(&mut stderr)?;

        channel.wait_close()?;
        let exit_status = channel.exit_status()?;
        Ok(CommandOutput {
            stdout,
            stderr,
            exit_status,
        })
    }

    fn transfer_error(&self, path: &Path, e: impl std::fmt::Display) -> BackupError {
        BackupError::Transfer(format!("{}:{}: {e}", self.host, path.display()))
    }
}

impl RemoteSession for SshSession {
    fn exec(&mut self, command: &str) -> Result<CommandOutput> {
        tracing::debug!(host = %self.host, command, "Executing remote command");
        self.run(command)
            .map_err(|e| BackupError::RemoteExecution(format!("{}: {e:#}", self.host)))
    }

    fn download(&mut self, remote: &Path, local: &Path) -> Result<u64> {
        let sftp = self
            .session
            .sftp()
            .map_err(|e| self.transfer_error(remote, e))?;
        let mut source = sftp.open(remote).map_err(|e| self.transfer_error(remote, e))?;
        let mut target = File::create(local).map_err(|e| BackupError::filesystem(local, e))?;

        let bytes =
            std::io::copy(&mut source, &mut target).map_err(|e| self.transfer_error(remote, e))?;
        target
            .sync_all()
            .map_err(|e| BackupError::filesystem(local, e))?;
        Ok(bytes)
    }

    fn upload(&mut self, local: &Path, remote: &Path) -> Result<u64> {
        let mut source = File::open(local).map_err(|e| BackupError::filesystem(local, e))?;
        let sftp = self
            .session
            .sftp()
            .map_err(|e| self.transfer_error(remote, e))?;
        let mut target = sftp
            .create(remote)
            .map_err(|e| self.transfer_error(remote, e))?;

        std::io::copy(&mut source, &mut target).map_err(|e| self.transfer_error(remote, e))
    }
}

impl Drop for SshSession {
    fn drop(&mut self) {
        if let Err(e) = self.session.disconnect(None, "backup session closed", None) {
            tracing::debug!(host = %self.host, error = %e, "SSH disconnect failed");
        }
        tracing::debug!(host = %self.host, "SSH session closed");
    }
}
