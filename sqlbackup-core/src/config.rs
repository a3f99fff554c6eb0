//! Configuration management.
//!
//! Loads the server inventory and backup settings from a TOML file, with
//! environment variable overrides. The resulting value is passed explicitly
//! into every operation.

use crate::utils::errors::{BackupError, Result};
use serde::{de::Error as _, Deserialize, Deserializer, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub backup: BackupSettings,
    #[serde(default)]
    pub retention: RetentionPolicy,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub log: LogConfig,

    /// Dump sources
    #[serde(default)]
    pub masters: Vec<ServerDescriptor>,

    /// Distribution targets
    #[serde(default)]
    pub secondaries: Vec<ServerDescriptor>,
}

/// A machine that takes part in backups, either as a master or a secondary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerDescriptor {
    /// Display name, also the per-server directory name under the backup root
    pub name: String,

    pub host: String,

    #[serde(default = "default_ssh_port")]
    pub port: u16,

    pub user: String,

    /// Private key; falls back to `backup.ssh_key_path`
    #[serde(default, deserialize_with = "resolve_home_dir_option")]
    pub key_path: Option<PathBuf>,

    /// Database to dump (masters only); falls back to `backup.database`
    #[serde(default)]
    pub database: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupSettings {
    /// Local root; artifacts land in `<root>/<server name>/`
    #[serde(default = "default_backup_root")]
    pub root: PathBuf,

    #[serde(default = "default_database")]
    pub database: String,

    /// Where masters write the transient dump before it is pulled
    #[serde(default = "default_remote_dump_dir")]
    pub remote_dump_dir: PathBuf,

    /// Root on secondaries that distributed copies are pushed under
    #[serde(default = "default_backup_root")]
    pub remote_root: PathBuf,

    /// Dump command; `{user}` and `{database}` are substituted
    #[serde(default = "default_dump_command")]
    pub dump_command: String,

    #[serde(default = "default_ssh_key_path", deserialize_with = "resolve_home_dir")]
    pub ssh_key_path: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    #[serde(default = "default_max_hourly")]
    pub max_hourly: usize,

    #[serde(default = "default_max_daily")]
    pub max_daily: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_bind")]
    pub bind: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Cron expression (with seconds) for `backup` over all masters
    #[serde(default)]
    pub backup_cron: Option<String>,

    /// Cron expression (with seconds) for a rotation pass
    #[serde(default)]
    pub rotate_cron: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default values
fn default_ssh_port() -> u16 {
    22
}

fn default_backup_root() -> PathBuf {
    PathBuf::from("/backups")
}

fn default_database() -> String {
    "app_db".to_string()
}

fn default_remote_dump_dir() -> PathBuf {
    PathBuf::from("/tmp")
}

fn default_dump_command() -> String {
    "mysqldump -u {user} {database}".to_string()
}

fn default_ssh_key_path() -> PathBuf {
    home::home_dir()
        .map(|h| h.join(".ssh/id_rsa"))
        .unwrap_or_else(|| PathBuf::from("/root/.ssh/id_rsa"))
}

fn default_max_hourly() -> usize {
    6
}

fn default_max_daily() -> usize {
    30
}

fn default_bind() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for BackupSettings {
    fn default() -> Self {
        Self {
            root: default_backup_root(),
            database: default_database(),
            remote_dump_dir: default_remote_dump_dir(),
            remote_root: default_backup_root(),
            dump_command: default_dump_command(),
            ssh_key_path: default_ssh_key_path(),
        }
    }
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            max_hourly: default_max_hourly(),
            max_daily: default_max_daily(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            backup: BackupSettings::default(),
            retention: RetentionPolicy::default(),
            http: HttpConfig::default(),
            schedule: ScheduleConfig::default(),
            log: LogConfig::default(),
            masters: Vec::new(),
            secondaries: Vec::new(),
        }
    }
}

impl ServerDescriptor {
    pub fn key_path<'a>(&'a self, default: &'a Path) -> &'a Path {
        self.key_path.as_deref().unwrap_or(default)
    }

    pub fn database<'a>(&'a self, default: &'a str) -> &'a str {
        self.database.as_deref().unwrap_or(default)
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).map_err(|e| BackupError::filesystem(path, e))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| BackupError::Config(e.to_string()))
    }

    /// Apply `.env` and process environment overrides.
    pub fn apply_env_overrides(&mut self) {
        let _ = dotenvy::dotenv();

        if let Ok(dir) = std::env::var("BACKUPS_DIR") {
            self.backup.root = PathBuf::from(dir);
        }
        if let Ok(key) = std::env::var("SSH_KEY_PATH") {
            if let Ok(resolved) = path_with_resolved_home_dir(PathBuf::from(key)) {
                self.backup.ssh_key_path = resolved;
            }
        }
        if let Some(port) = std::env::var("PORT").ok().and_then(|v| v.parse().ok()) {
            self.http.port = port;
        }
        if let Ok(level) = std::env::var("LOG_LEVEL") {
            self.log.level = level;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.retention.max_hourly == 0 || self.retention.max_daily == 0 {
            return Err(BackupError::Config(
                "retention bounds must be at least 1".into(),
            ));
        }
        if !self.backup.dump_command.contains("{database}") {
            return Err(BackupError::Config(
                "dump_command must reference {database}".into(),
            ));
        }

        let mut seen = HashSet::new();
        for server in self.masters.iter().chain(&self.secondaries) {
            if server.host.is_empty() || server.user.is_empty() {
                return Err(BackupError::Config(format!(
                    "server '{}' needs a host and a user",
                    server.name
                )));
            }
        }
        for master in &self.masters {
            if !is_plain_file_name(&master.name) {
                return Err(BackupError::Config(format!(
                    "master name '{}' is not usable as a directory name",
                    master.name
                )));
            }
            if !seen.insert(master.name.as_str()) {
                return Err(BackupError::Config(format!(
                    "duplicate master name '{}'",
                    master.name
                )));
            }
        }
        Ok(())
    }

    pub fn master(&self, name: &str) -> Result<&ServerDescriptor> {
        self.masters
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| BackupError::UnknownServer(name.to_string()))
    }

    /// Local directory holding one master's artifacts.
    pub fn server_dir(&self, name: &str) -> PathBuf {
        self.backup.root.join(name)
    }
}

/// A single, non-empty path component with no separators or traversal.
pub fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '\0'])
}

fn resolve_home_dir<'de, D>(deserializer: D) -> std::result::Result<PathBuf, D::Error>
where
    D: Deserializer<'de>,
{
    let path: PathBuf = Deserialize::deserialize(deserializer)?;
    path_with_resolved_home_dir(path).map_err(D::Error::custom)
}

fn resolve_home_dir_option<'de, D>(deserializer: D) -> std::result::Result<Option<PathBuf>, D::Error>
where
    D: Deserializer<'de>,
{
    let path: Option<PathBuf> = Deserialize::deserialize(deserializer)?;
    let Some(path) = path else { return Ok(None) };
    Ok(Some(
        path_with_resolved_home_dir(path).map_err(D::Error::custom)?,
    ))
}

fn path_with_resolved_home_dir(path: PathBuf) -> anyhow::Result<PathBuf> {
    if !path.starts_with("~") {
        return Ok(path);
    }
    let home =
        home::home_dir().ok_or_else(|| anyhow::anyhow!("unable to resolve home directory"))?;
    Ok(home.join(path.strip_prefix("~")?))
}
