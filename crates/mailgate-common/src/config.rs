//! Configuration for mailgate
//!
//! The configuration is read once, before the privilege drop, from a fixed
//! root-owned location. Every field has a default, so a missing file simply
//! yields [`Config::default`].

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Fixed location of the configuration file
pub const CONFIG_PATH: &str = "/etc/mailgate/config.toml";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Delivery configuration
    #[serde(default)]
    pub delivery: DeliveryConfig,

    /// Helper program lookup
    #[serde(default)]
    pub helpers: HelperConfig,

    /// Mailbox lock configuration
    #[serde(default)]
    pub lock: LockConfig,

    /// Input limits
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Delivery configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    /// Directory holding the system mailboxes
    #[serde(default = "default_mail_dir")]
    pub mail_dir: PathBuf,

    /// Group id given to newly created mailboxes
    #[serde(default = "default_mail_gid")]
    pub mail_gid: u32,

    /// Lowest uid allowed to receive mail
    #[serde(default = "default_min_uid")]
    pub min_uid: u32,

    /// Refuse delivery to root, by name and by uid
    #[serde(default = "default_deny_root")]
    pub deny_root: bool,

    /// Login shell allow-list
    #[serde(default = "default_shells_file")]
    pub shells_file: PathBuf,

    /// Forward file, relative to the recipient home
    #[serde(default = "default_forward_file")]
    pub forward_file: PathBuf,

    /// Directory for the message spool file
    #[serde(default = "default_spool_dir")]
    pub spool_dir: PathBuf,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            mail_dir: default_mail_dir(),
            mail_gid: default_mail_gid(),
            min_uid: default_min_uid(),
            deny_root: default_deny_root(),
            shells_file: default_shells_file(),
            forward_file: default_forward_file(),
            spool_dir: default_spool_dir(),
        }
    }
}

fn default_mail_dir() -> PathBuf {
    PathBuf::from("/var/mail")
}

fn default_mail_gid() -> u32 {
    8 // "mail" on Debian
}

fn default_min_uid() -> u32 {
    1000
}

fn default_deny_root() -> bool {
    true
}

fn default_shells_file() -> PathBuf {
    PathBuf::from("/etc/shells")
}

fn default_forward_file() -> PathBuf {
    PathBuf::from(".forward")
}

fn default_spool_dir() -> PathBuf {
    PathBuf::from("/tmp")
}

impl DeliveryConfig {
    /// Path of the system mailbox for a recipient
    pub fn mailbox_path(&self, recipient: &str) -> PathBuf {
        self.mail_dir.join(recipient)
    }
}

/// Helper program lookup configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HelperConfig {
    /// Per-recipient override directory, relative to the recipient home
    #[serde(default = "default_user_dir")]
    pub user_dir: PathBuf,

    /// System-wide helper directory
    #[serde(default = "default_system_dir")]
    pub system_dir: PathBuf,

    /// PATH handed to every child process
    #[serde(default = "default_child_path")]
    pub child_path: String,
}

impl Default for HelperConfig {
    fn default() -> Self {
        Self {
            user_dir: default_user_dir(),
            system_dir: default_system_dir(),
            child_path: default_child_path(),
        }
    }
}

fn default_user_dir() -> PathBuf {
    PathBuf::from(".config/mailgate")
}

fn default_system_dir() -> PathBuf {
    PathBuf::from("/etc/mailgate")
}

fn default_child_path() -> String {
    "/bin:/usr/bin".to_string()
}

/// Mailbox dot-lock configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockConfig {
    /// Attempts after the first one
    #[serde(default = "default_lock_retries")]
    pub retries: u32,

    /// Backoff grows by this much after every failed attempt
    #[serde(default = "default_backoff_step_ms")]
    pub backoff_step_ms: u64,

    /// Upper bound for a single backoff sleep
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Age after which a lock file is treated as abandoned
    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            retries: default_lock_retries(),
            backoff_step_ms: default_backoff_step_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            stale_after_secs: default_stale_after_secs(),
        }
    }
}

fn default_lock_retries() -> u32 {
    4
}

fn default_backoff_step_ms() -> u64 {
    5000
}

fn default_max_backoff_ms() -> u64 {
    60_000
}

fn default_stale_after_secs() -> u64 {
    300
}

impl LockConfig {
    /// Sleep before retry number `attempt` (1-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let ms = self
            .backoff_step_ms
            .saturating_mul(u64::from(attempt))
            .min(self.max_backoff_ms);
        Duration::from_millis(ms)
    }

    /// Age after which a lock file is considered stale
    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }
}

/// Input limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Longest accepted forward-file line, in bytes
    #[serde(default = "default_max_line_length")]
    pub max_line_length: usize,

    /// Most arguments a pipe rule may carry
    #[serde(default = "default_max_pipe_args")]
    pub max_pipe_args: usize,

    /// Largest accepted message, in bytes
    pub max_message_size: Option<u64>,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_line_length: default_max_line_length(),
            max_pipe_args: default_max_pipe_args(),
            max_message_size: None,
        }
    }
}

fn default_max_line_length() -> usize {
    1024
}

fn default_max_pipe_args() -> usize {
    64
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: "json" or "text"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "warn".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

impl Config {
    /// Load configuration from file
    pub fn from_file(path: &Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::Error::Config(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;

        Ok(config)
    }

    /// Load configuration from `path`, falling back to defaults when the
    /// file does not exist
    pub fn load_or_default(path: &Path) -> crate::Result<Self> {
        match std::fs::metadata(path) {
            Ok(_) => Self::from_file(path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No configuration file, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(crate::Error::Config(format!(
                "Failed to stat config file: {}",
                e
            ))),
        }
    }

    /// Load configuration from the fixed system location
    pub fn load() -> crate::Result<Self> {
        Self::load_or_default(Path::new(CONFIG_PATH))
    }
}
