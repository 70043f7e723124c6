//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.studytask.toml` files.

use crate::cli::OutputFormat;
use crate::retry::RetryPolicy;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Name of the configuration file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = ".studytask.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Notification delivery settings.
    #[serde(default)]
    pub notify: NotifyConfig,

    /// Timeout and retry settings for store and notification calls.
    #[serde(default)]
    pub retry: RetryConfig,

    /// Report settings.
    #[serde(default)]
    pub report: ReportConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Path of the JSON task store.
    #[serde(default = "default_store")]
    pub store: PathBuf,

    /// Identity used when `--user` is not given.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_user: Option<String>,

    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,

    /// Output format used when `--format` is not given.
    #[serde(default)]
    pub format: OutputFormat,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            store: default_store(),
            default_user: None,
            verbose: false,
            format: OutputFormat::default(),
        }
    }
}

fn default_store() -> PathBuf {
    PathBuf::from("studytask.json")
}

/// How notifications are delivered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotifyKind {
    /// POST to an HTTP mail relay.
    Webhook,
    /// Only log what would be sent.
    #[default]
    Log,
}

/// Notification settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    #[serde(default)]
    pub kind: NotifyKind,

    /// Mail relay endpoint, required for `webhook`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,

    /// Sender address of every notification.
    #[serde(default = "default_from_address")]
    pub from_address: String,

    /// HTTP request timeout in seconds.
    #[serde(default = "default_notify_timeout")]
    pub timeout_seconds: u64,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            kind: NotifyKind::default(),
            webhook_url: None,
            from_address: default_from_address(),
            timeout_seconds: default_notify_timeout(),
        }
    }
}

fn default_from_address() -> String {
    "noreply@studenttaskmanager.com".to_string()
}

fn default_notify_timeout() -> u64 {
    30
}

/// Retry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts per call, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,

    /// Limit on one attempt, in seconds.
    #[serde(default = "default_call_timeout")]
    pub timeout_seconds: u64,

    /// First backoff delay in milliseconds; doubles per retry.
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            timeout_seconds: default_call_timeout(),
            backoff_ms: default_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

fn default_max_attempts() -> usize {
    3
}

/// Slack between the HTTP timeout and the per-attempt limit around it.
const CALL_TIMEOUT_MARGIN_SECS: u64 = 15;

fn default_call_timeout() -> u64 {
    default_notify_timeout() + CALL_TIMEOUT_MARGIN_SECS
}

fn default_backoff_ms() -> u64 {
    200
}

fn default_max_backoff_ms() -> u64 {
    5000
}

impl RetryConfig {
    /// Build the runtime retry policy.
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            timeout: Duration::from_secs(self.timeout_seconds.max(1)),
            backoff: Duration::from_millis(self.backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms.max(self.backoff_ms)),
        }
    }
}

/// Report settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Upcoming tasks shown on the dashboard.
    #[serde(default = "default_upcoming_limit")]
    pub upcoming_limit: usize,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            upcoming_limit: default_upcoming_limit(),
        }
    }
}

fn default_upcoming_limit() -> usize {
    5
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(DEFAULT_CONFIG_FILE);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings.
    /// This method only overrides config when CLI provides explicit values.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref store) = args.store {
            self.general.store = store.clone();
        }
        if let Some(ref user) = args.user {
            self.general.default_user = Some(user.clone());
        }

        if let Some(ref url) = args.webhook_url {
            self.notify.webhook_url = Some(url.clone());
            self.notify.kind = NotifyKind::Webhook;
        }

        // Dry run always wins over a configured relay
        if args.dry_run {
            self.notify.kind = NotifyKind::Log;
        }

        // The attempt limit must outlast the HTTP timeout it wraps
        if let Some(timeout) = args.timeout {
            self.notify.timeout_seconds = timeout;
            self.retry.timeout_seconds = timeout + CALL_TIMEOUT_MARGIN_SECS;
        }
        if let Some(retries) = args.retries {
            self.retry.max_attempts = retries;
        }

        if let Some(format) = args.format {
            self.general.format = format;
        }

        if args.verbose {
            self.general.verbose = true;
        }
    }

    /// Identity to act as, if one is configured.
    pub fn identity(&self) -> Option<&str> {
        self.general
            .default_user
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
