//! Outcome accumulator returned by every core operation.

use crate::utils::errors::BackupError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Success,
    /// A best-effort step failed; the operation itself still succeeded.
    CleanupFailed,
    RemoteExecutionFailure,
    TransferFailure,
    FilesystemFailure,
    ConfigurationFailure,
}

impl MessageKind {
    pub fn is_failure(&self) -> bool {
        !matches!(self, MessageKind::Success | MessageKind::CleanupFailed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeMessage {
    pub kind: MessageKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
    pub message: String,
}

/// Ordered outcome messages plus the artifacts an operation discovered or
/// produced. Success and failure messages are carried together.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationResult {
    pub messages: Vec<OutcomeMessage>,
    #[serde(default)]
    pub artifacts: Vec<String>,
}

impl OperationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn success(&mut self, server: Option<&str>, message: impl Into<String>) {
        let message = message.into();
        tracing::info!(server = server.unwrap_or("-"), "{}", message);
        self.push(MessageKind::Success, server, message);
    }

    pub fn cleanup_failed(&mut self, server: Option<&str>, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(server = server.unwrap_or("-"), "{}", message);
        self.push(MessageKind::CleanupFailed, server, message);
    }

    /// Record `error` with a short description of the step that failed.
    pub fn failure(&mut self, server: Option<&str>, context: &str, error: &BackupError) {
        let message = format!("{context}: {error}");
        tracing::error!(server = server.unwrap_or("-"), "{}", message);
        self.push(error.kind(), server, message);
    }

    pub fn merge(&mut self, other: OperationResult) {
        self.messages.extend(other.messages);
        self.artifacts.extend(other.artifacts);
    }

    pub fn has_failures(&self) -> bool {
        self.messages.iter().any(|m| m.kind.is_failure())
    }

    pub fn failures(&self) -> impl Iterator<Item = &OutcomeMessage> {
        self.messages.iter().filter(|m| m.kind.is_failure())
    }

    /// Messages recorded for one server, in order.
    pub fn for_server<'a>(&'a self, server: &'a str) -> impl Iterator<Item = &'a OutcomeMessage> {
        self.messages
            .iter()
            .filter(move |m| m.server.as_deref() == Some(server))
    }

    fn push(&mut self, kind: MessageKind, server: Option<&str>, message: String) {
        self.messages.push(OutcomeMessage {
            kind,
            server: server.map(str::to_string),
            message,
        });
    }
}
