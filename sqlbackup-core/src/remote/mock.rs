//! Scripted in-memory connector for exercising dump and distribution sequences.

use super::{CommandOutput, Connector, RemoteSession};
use crate::config::ServerDescriptor;
use crate::utils::errors::{BackupError, Result};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct MockState {
    events: Vec<String>,
    open_sessions: usize,
    refused_hosts: HashSet<String>,
    failing_uploads: HashSet<String>,
    failing_downloads: HashSet<String>,
    responses: Vec<(String, std::result::Result<CommandOutput, String>)>,
    files: HashMap<(String, PathBuf), Vec<u8>>,
}

#[derive(Clone, Default)]
pub struct MockConnector {
    state: Arc<Mutex<MockState>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn refuse(self, host: &str) -> Self {
        self.state.lock().unwrap().refused_hosts.insert(host.into());
        self
    }

    pub fn fail_upload(self, host: &str) -> Self {
        self.state.lock().unwrap().failing_uploads.insert(host.into());
        self
    }

    pub fn fail_download(self, host: &str) -> Self {
        self.state.lock().unwrap().failing_downloads.insert(host.into());
        self
    }

    /// Commands containing `pattern` return `output` instead of running.
    pub fn respond(self, pattern: &str, output: CommandOutput) -> Self {
        self.state
            .lock()
            .unwrap()
            .responses
            .push((pattern.into(), Ok(output)));
        self
    }

    /// Commands containing `pattern` fail at the transport level.
    pub fn break_exec(self, pattern: &str, error: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .responses
            .push((pattern.into(), Err(error.into())));
        self
    }

    pub fn events(&self) -> Vec<String> {
        self.state.lock().unwrap().events.clone()
    }

    pub fn open_sessions(&self) -> usize {
        self.state.lock().unwrap().open_sessions
    }

    pub fn remote_file(&self, host: &str, path: &Path) -> Option<Vec<u8>> {
        self.state
            .lock()
            .unwrap()
            .files
            .get(&(host.to_string(), path.to_path_buf()))
            .cloned()
    }
}

impl Connector for MockConnector {
    fn connect(&self, server: &ServerDescriptor) -> Result<Box<dyn RemoteSession>> {
        let mut state = self.state.lock().unwrap();
        if state.refused_hosts.contains(&server.host) {
            state.events.push(format!("refused {}", server.host));
            return Err(BackupError::RemoteExecution(format!(
                "{}: connection refused",
                server.host
            )));
        }
        state.events.push(format!("connect {}", server.host));
        state.open_sessions += 1;
        Ok(Box::new(MockSession {
            host: server.host.clone(),
            state: self.state.clone(),
        }))
    }
}

struct MockSession {
    host: String,
    state: Arc<Mutex<MockState>>,
}

/// First single-quoted argument after `marker` in `command`.
fn quoted_after(command: &str, marker: &str) -> Option<PathBuf> {
    let rest = command.split_once(marker)?.1.trim_start();
    let rest = rest.strip_prefix('\'')?;
    let end = rest.find('\'')?;
    Some(PathBuf::from(&rest[..end]))
}

impl RemoteSession for MockSession {
    fn exec(&mut self, command: &str) -> Result<CommandOutput> {
        let mut state = self.state.lock().unwrap();
        state.events.push(format!("exec {}: {}", self.host, command));

        let scripted = state
            .responses
            .iter()
            .find(|(pattern, _)| command.contains(pattern.as_str()))
            .map(|(_, response)| response.clone());
        if let Some(response) = scripted {
            return response.map_err(BackupError::RemoteExecution);
        }

        if let Some(path) = quoted_after(command, "> ") {
            state
                .files
                .insert((self.host.clone(), path), b"-- dump\n".to_vec());
        } else if let Some(path) = quoted_after(command, "rm -f ") {
            state.files.remove(&(self.host.clone(), path));
        }
        Ok(CommandOutput::default())
    }

    fn download(&mut self, remote: &Path, local: &Path) -> Result<u64> {
        let mut state = self.state.lock().unwrap();
        state
            .events
            .push(format!("download {}: {}", self.host, remote.display()));
        if state.failing_downloads.contains(&self.host) {
            std::fs::write(local, b"-- trunc").map_err(|e| BackupError::filesystem(local, e))?;
            return Err(BackupError::Transfer(format!("{}: channel closed", self.host)));
        }
        let data = state
            .files
            .get(&(self.host.clone(), remote.to_path_buf()))
            .cloned()
            .ok_or_else(|| BackupError::Transfer(format!("{}: no such file", self.host)))?;
        std::fs::write(local, &data).map_err(|e| BackupError::filesystem(local, e))?;
        Ok(data.len() as u64)
    }

    fn upload(&mut self, local: &Path, remote: &Path) -> Result<u64> {
        let mut state = self.state.lock().unwrap();
        state
            .events
            .push(format!("upload {}: {}", self.host, remote.display()));
        let data = std::fs::read(local).map_err(|e| BackupError::filesystem(local, e))?;
        if state.failing_uploads.contains(&self.host) {
            return Err(BackupError::Transfer(format!("{}: permission denied", self.host)));
        }
        let len = data.len() as u64;
        state
            .files
            .insert((self.host.clone(), remote.to_path_buf()), data);
        Ok(len)
    }
}

impl Drop for MockSession {
    fn drop(&mut self) {
        let mut state = self.state.lock().unwrap();
        state.events.push(format!("close {}", self.host));
        state.open_sessions -= 1;
    }
}
