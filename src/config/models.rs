use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_valid::Validate;
use std::path::PathBuf;

/// Daemon settings.
///
/// Read from the device configuration document, table `main.plugins.telepwn`.
/// Only `bot_token` and `chat_id` are required; every path and tunable has a
/// default matching a stock device image.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Validate)]
pub struct Settings {
    /// Bot API token of the transport.
    #[validate(min_length = 1)]
    pub bot_token: String,

    /// The single chat allowed to drive the device.
    pub chat_id: ChatId,

    /// Durable document holding the webhook table.
    #[serde(default = "defaults::webhook_file")]
    pub webhook_file: PathBuf,

    /// Durable document holding the schedule table.
    #[serde(default = "defaults::schedule_file")]
    pub schedule_file: PathBuf,

    /// Directory of captured handshakes (counted, listed and downloadable).
    #[serde(default = "defaults::handshake_dir")]
    pub handshake_dir: PathBuf,

    /// Daemon log file tailed by the `logs` action.
    #[serde(default = "defaults::log_path")]
    pub log_path: PathBuf,

    /// Directories scanned for installed extensions (`*.py` modules).
    #[serde(default = "defaults::plugin_dirs")]
    pub plugin_dirs: Vec<PathBuf>,

    /// Paths collected into a backup archive (missing ones are skipped).
    #[serde(default = "defaults::backup_paths")]
    pub backup_paths: Vec<PathBuf>,

    /// Where backup archives are written.
    #[serde(default = "defaults::backup_dir")]
    pub backup_dir: PathBuf,

    /// Host service restarted, killed and signalled by device actions.
    #[serde(default = "defaults::service_name")]
    #[validate(min_length = 1)]
    pub service_name: String,

    /// Scheduler poll interval in seconds.
    #[serde(default = "defaults::scheduler_poll_secs")]
    #[validate(minimum = 1)]
    pub scheduler_poll_secs: u64,

    /// Minimum delay between two button presses from one chat, in milliseconds.
    #[serde(default = "defaults::cooldown_ms")]
    pub cooldown_ms: u64,

    /// Timeout for outbound HTTP requests made by webhook actions.
    #[serde(default = "defaults::http_timeout_secs")]
    #[validate(minimum = 1)]
    pub http_timeout_secs: u64,

    /// Longest outbound message; longer replies are split into chunks.
    #[serde(default = "defaults::max_message_len")]
    #[validate(minimum = 16)]
    pub max_message_len: usize,
}

impl Settings {
    /// Settings with every optional field at its default.
    pub fn new(bot_token: impl Into<String>, chat_id: i64) -> Self {
        Self {
            bot_token: bot_token.into(),
            chat_id: ChatId::Numeric(chat_id),
            webhook_file: defaults::webhook_file(),
            schedule_file: defaults::schedule_file(),
            handshake_dir: defaults::handshake_dir(),
            log_path: defaults::log_path(),
            plugin_dirs: defaults::plugin_dirs(),
            backup_paths: defaults::backup_paths(),
            backup_dir: defaults::backup_dir(),
            service_name: defaults::service_name(),
            scheduler_poll_secs: defaults::scheduler_poll_secs(),
            cooldown_ms: defaults::cooldown_ms(),
            http_timeout_secs: defaults::http_timeout_secs(),
            max_message_len: defaults::max_message_len(),
        }
    }
}

/// Chat identifiers appear both as integers and as quoted strings in the wild.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(untagged)]
pub enum ChatId {
    Numeric(i64),
    Text(String),
}

impl ChatId {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ChatId::Numeric(id) => Some(*id),
            ChatId::Text(s) => s.trim().parse().ok(),
        }
    }
}

pub(crate) mod defaults {
    use std::path::PathBuf;

    pub fn webhook_file() -> PathBuf {
        "/etc/pwnagotchi/telepwn_webhooks.toml".into()
    }

    pub fn schedule_file() -> PathBuf {
        "/etc/pwnagotchi/telepwn_schedules.toml".into()
    }

    pub fn handshake_dir() -> PathBuf {
        "/home/pi/handshakes".into()
    }

    pub fn log_path() -> PathBuf {
        "/etc/pwnagotchi/log/pwnagotchi.log".into()
    }

    pub fn plugin_dirs() -> Vec<PathBuf> {
        vec![
            "/home/pi/.pwn/lib/python3.11/site-packages/pwnagotchi/plugins/default".into(),
            "/usr/local/share/pwnagotchi/custom-plugins".into(),
        ]
    }

    pub fn backup_paths() -> Vec<PathBuf> {
        [
            "/root/settings.yaml",
            "/root/client_secrets.json",
            "/home/pi/handshakes/",
            "/root/.api-report.json",
            "/root/.ssh",
            "/root/.bashrc",
            "/root/.profile",
            "/root/peers",
            "/etc/pwnagotchi/",
            "/usr/local/share/pwnagotchi/custom-plugins",
            "/etc/ssh/",
            "/home/pi/.bashrc",
            "/home/pi/.profile",
            "/root/.auto-update",
            "/home/pi/.wpa_sec_Uploads",
        ]
        .into_iter()
        .map(PathBuf::from)
        .collect()
    }

    pub fn backup_dir() -> PathBuf {
        "/home/pi".into()
    }

    pub fn service_name() -> String {
        "pwnagotchi".into()
    }

    pub fn scheduler_poll_secs() -> u64 {
        60
    }

    pub fn cooldown_ms() -> u64 {
        2000
    }

    pub fn http_timeout_secs() -> u64 {
        5
    }

    pub fn max_message_len() -> usize {
        4096 / 2
    }
}
