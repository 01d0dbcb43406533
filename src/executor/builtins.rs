//! Built-in device actions: one-shot wrappers over host commands and files.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use tracing::{info, warn};

use super::actions::ActionExecutor;
use super::process::run_checked;
use crate::error::{DispatchError, DispatchResult};
use crate::sources::Reply;

const UPTIME_PATH: &str = "/proc/uptime";
const LOG_LINES: &str = "50";

/// Daemon mode selected by marker files under `/root`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Manual,
    Auto,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Auto => "auto",
        }
    }

    fn marker(self) -> String {
        format!("/root/.pwnagotchi-{}", self.as_str())
    }

    fn other(self) -> Self {
        match self {
            Self::Manual => Self::Auto,
            Self::Auto => Self::Manual,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = DispatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "manual" => Ok(Self::Manual),
            "auto" => Ok(Self::Auto),
            other => Err(DispatchError::validation(format!(
                "Unknown mode '{other}'. Use 'manual' or 'auto'."
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupTrigger {
    Manual,
    Scheduled,
}

impl BackupTrigger {
    fn archive_prefix(self) -> &'static str {
        match self {
            Self::Manual => "telepwn_backup",
            Self::Scheduled => "telepwn_scheduled_backup",
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Manual => "Backup",
            Self::Scheduled => "Scheduled backup",
        }
    }
}

impl ActionExecutor {
    fn service(&self) -> &str {
        &self.settings.service_name
    }

    async fn exec(&self, what: &str, argv: &[&str]) -> DispatchResult<String> {
        Ok(run_checked(self.runner.as_ref(), what, argv).await?.stdout)
    }

    async fn sudo(&self, what: &str, args: &[&str]) -> DispatchResult<String> {
        let mut argv = Vec::with_capacity(args.len() + 1);
        argv.push("sudo");
        argv.extend_from_slice(args);
        self.exec(what, &argv).await
    }

    async fn select_mode(&self, mode: Mode) -> DispatchResult<()> {
        let marker = mode.marker();
        let stale = mode.other().marker();
        self.sudo("Mode switch", &["touch", marker.as_str()]).await?;
        self.sudo("Mode switch", &["rm", "-f", stale.as_str()]).await?;
        Ok(())
    }

    /// Confirmed reboot into `mode`.
    pub async fn reboot(&self, mode: Mode) -> DispatchResult<()> {
        self.outbox
            .send(&Reply::notice(format!("🔄 Rebooting in {mode} mode...")))
            .await?;
        self.select_mode(mode).await?;
        self.sudo("Reboot", &["sync"]).await?;
        self.sudo("Reboot", &["reboot"]).await?;
        info!(target: "telepwn::actions", %mode, "Reboot issued");
        Ok(())
    }

    /// Confirmed shutdown: stop the daemon, blank the display, power off.
    pub async fn shutdown(&self) -> DispatchResult<()> {
        self.outbox
            .send(&Reply::notice(
                "📤 Stopping daemon, clearing screen, and shutting down...",
            ))
            .await?;
        let service = self.service();
        self.sudo("Shutdown", &["systemctl", "stop", service]).await?;
        self.sudo("Shutdown", &[service, "--clear"]).await?;
        self.sudo("Shutdown", &["sync"]).await?;
        self.sudo("Shutdown", &["shutdown", "-h", "now"]).await?;
        info!(target: "telepwn::actions", "Shutdown issued");
        Ok(())
    }

    pub async fn restart(&self, mode: Mode) -> DispatchResult<Reply> {
        self.outbox
            .send(&Reply::notice(format!("🔁 Restarting daemon in {mode} mode...")))
            .await?;
        self.select_mode(mode).await?;
        let service = self.service();
        self.sudo("Restart", &["systemctl", "restart", service]).await?;
        Ok(Reply::ok(format!("Daemon restarted in {mode} mode.")))
    }

    /// Restart the service so a configuration change takes effect.
    pub async fn restart_service(&self) -> DispatchResult<()> {
        let service = self.service();
        self.sudo("Service restart", &["systemctl", "restart", service])
            .await?;
        Ok(())
    }

    /// Ask the daemon to reload its extensions.
    pub async fn signal_reload(&self) -> DispatchResult<()> {
        let service = self.service();
        self.sudo("Plugin reload", &["killall", "-USR1", service])
            .await?;
        Ok(())
    }

    pub async fn kill_daemon(&self) -> DispatchResult<Reply> {
        self.outbox
            .send(&Reply::notice("🗡️ Killing daemon..."))
            .await?;
        self.signal_reload().await?;
        Ok(Reply::ok("Daemon killed and plugins reloaded."))
    }

    pub async fn clear_display(&self) -> DispatchResult<Reply> {
        self.outbox
            .send(&Reply::notice("🧹 Clearing screen..."))
            .await?;
        let service = self.service();
        self.sudo("Clear screen", &[service, "--clear"]).await?;
        Ok(Reply::ok("Screen cleared!"))
    }

    pub async fn uptime(&self) -> DispatchResult<Reply> {
        let text = tokio::fs::read_to_string(UPTIME_PATH)
            .await
            .map_err(|e| DispatchError::execution("Uptime", e.to_string()))?;
        let (hours, minutes) = parse_uptime(&text)
            .ok_or_else(|| DispatchError::execution("Uptime", "unreadable /proc/uptime"))?;
        Ok(Reply::ok(format!("Uptime: {hours}h {minutes}m")))
    }

    pub async fn handshake_count(&self) -> DispatchResult<Reply> {
        let count = self.handshake_files().await?.len();
        Ok(Reply::ok(format!("Handshakes captured: {count}")))
    }

    pub async fn logs(&self) -> DispatchResult<Reply> {
        let log_path = self.settings.log_path.to_string_lossy().into_owned();
        let lines = self
            .exec("Log fetch", &["tail", "-n", LOG_LINES, log_path.as_str()])
            .await?;
        let lines = lines.trim_end();
        if lines.is_empty() {
            return Ok(Reply::warn("Log is empty."));
        }
        Ok(Reply::ok(format!("Last {LOG_LINES} log lines:\n```\n{lines}\n```")))
    }

    pub async fn inbox(&self) -> DispatchResult<Reply> {
        self.outbox
            .send(&Reply::notice("📥 Checking Pwngrid inbox..."))
            .await?;
        let out = self.exec("Inbox fetch", &["pwngrid", "--inbox"]).await?;
        let out = out.trim_end();
        if out.is_empty() {
            return Ok(Reply::ok("Inbox is empty."));
        }
        Ok(Reply::ok(format!("Pwngrid Inbox:\n```\n{out}\n```")))
    }

    pub async fn pwngrid_send(&self, message: &str) -> DispatchResult<Reply> {
        let message = message.trim();
        if message.is_empty() {
            return Err(DispatchError::validation("Please provide a message to send."));
        }
        self.exec("Pwngrid send", &["pwngrid", "--send", message]).await?;
        Ok(Reply::ok(format!("Sent to Pwngrid: {message}")))
    }

    pub async fn pwngrid_clear(&self) -> DispatchResult<Reply> {
        self.exec("Pwngrid clear", &["pwngrid", "--clear"]).await?;
        Ok(Reply::ok("Pwngrid inbox cleared."))
    }

    /// Archive the existing backup paths, upload the archive and report its
    /// size. A run with no existing source path only warns.
    pub async fn backup(&self, trigger: BackupTrigger) -> DispatchResult<()> {
        let sources: Vec<String> = self
            .settings
            .backup_paths
            .iter()
            .filter(|p| p.exists())
            .map(|p| p.to_string_lossy().into_owned())
            .collect();
        if sources.is_empty() {
            let text = match trigger {
                BackupTrigger::Manual => "No files found to back up.",
                BackupTrigger::Scheduled => "No files found for scheduled backup.",
            };
            self.outbox.send(&Reply::warn(text)).await?;
            return Ok(());
        }
        if trigger == BackupTrigger::Manual {
            self.outbox.send(&Reply::notice("💾 Creating backup...")).await?;
        }

        let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let archive = self
            .settings
            .backup_dir
            .join(format!("{}_{stamp}.tar.gz", trigger.archive_prefix()));
        let archive_arg = archive.to_string_lossy().into_owned();
        let mut args = vec!["tar", "czf", archive_arg.as_str()];
        args.extend(sources.iter().map(String::as_str));
        self.sudo(trigger.label(), &args).await?;

        let size = tokio::fs::metadata(&archive)
            .await
            .map(|m| m.len())
            .map_err(|e| DispatchError::execution(trigger.label(), e.to_string()))?;
        self.outbox.send_document(&archive).await?;
        let megabytes = size as f64 / (1024.0 * 1024.0);
        info!(target: "telepwn::actions", archive = %archive.display(), size, "Backup created");
        self.outbox
            .send(&Reply::ok(format!(
                "{} created and sent ({megabytes:.2} MB)",
                trigger.label()
            )))
            .await
    }

    pub async fn list_files(&self) -> DispatchResult<Reply> {
        let mut names: Vec<String> = self
            .handshake_files()
            .await?
            .iter()
            .filter_map(|p| p.file_name().map(|n| format!("- {}", n.to_string_lossy())))
            .collect();
        if names.is_empty() {
            return Ok(Reply::warn("No files found in handshake directory."));
        }
        names.sort();
        Ok(Reply::notice(format!("Files in handshake directory:\n{}", names.join("\n"))))
    }

    pub async fn download_file(&self, name: &str) -> DispatchResult<Reply> {
        let name = name.trim();
        if name.is_empty()
            || name == "."
            || name == ".."
            || name.contains('/')
            || name.contains('\\')
        {
            return Err(DispatchError::validation("Invalid file name."));
        }
        let path = self.settings.handshake_dir.join(name);
        if !path.is_file() {
            return Err(DispatchError::validation(format!("File {name} not found.")));
        }
        self.outbox.send_document(&path).await?;
        Ok(Reply::ok(format!("Sent file: {name}")))
    }

    /// Run an operator-confirmed shell command; output is reported verbatim.
    pub async fn run_confirmed_shell(&self, command: &str) -> DispatchResult<Reply> {
        warn!(target: "telepwn::actions", %command, "Executing confirmed shell command");
        let output = self
            .runner
            .run_shell(command)
            .await
            .map_err(|e| DispatchError::execution("Shell command", e.to_string()))?;
        let combined = output.combined();
        let combined = combined.trim_end();
        if output.success() {
            Ok(Reply::ok(format!(
                "Shell command executed:\nCommand: {command}\nOutput:\n```\n{combined}\n```"
            )))
        } else {
            Ok(Reply::fail(format!(
                "Shell command failed (exit {}):\nCommand: {command}\nError:\n```\n{combined}\n```",
                output.code
            )))
        }
    }

    async fn handshake_files(&self) -> DispatchResult<Vec<PathBuf>> {
        regular_files(&self.settings.handshake_dir)
            .await
            .map_err(|e| DispatchError::execution("Handshake scan", e.to_string()))
    }
}

async fn regular_files(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(files),
        Err(e) => return Err(e),
    };
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_file() {
            files.push(entry.path());
        }
    }
    Ok(files)
}

/// Hours and minutes from the first field of `/proc/uptime`.
fn parse_uptime(text: &str) -> Option<(u64, u64)> {
    let seconds: f64 = text.split_whitespace().next()?.parse().ok()?;
    if !seconds.is_finite() || seconds < 0.0 {
        return None;
    }
    let seconds = seconds as u64;
    Some((seconds / 3600, (seconds % 3600) / 60))
}
