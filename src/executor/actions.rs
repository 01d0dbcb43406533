use std::sync::Arc;

use serde_json::json;
use tracing::{debug, error, info, warn};

use crate::config::{ConfigStore, ConfigValue, Settings};
use crate::error::{DispatchError, DispatchResult};
use crate::executor::http::WebClient;
use crate::executor::process::{ProcessOutput, ProcessRunner, run_checked};
use crate::registry::{TaskAction, WebhookAction, WebhookKind};
use crate::sources::{Outbox, Reply};
use crate::utils::interpolation;
use crate::utils::text::strip_matching_quotes;

/// Prefix stripped from a `plugin_toggle` action name to find its extension.
pub const TOGGLE_PREFIX: &str = "toggle_";

/// Executes resolved actions against the host.
///
/// Shared between the foreground dispatcher and the scheduler loop; every
/// effect goes through the process runner, the web client, the config store
/// or the outbox, so the executor itself holds no mutable state.
pub struct ActionExecutor {
    pub(crate) settings: Arc<Settings>,
    pub(crate) config: ConfigStore,
    pub(crate) outbox: Outbox,
    pub(crate) runner: Arc<dyn ProcessRunner>,
    web: Arc<dyn WebClient>,
}

impl ActionExecutor {
    pub fn new(
        settings: Arc<Settings>,
        config: ConfigStore,
        outbox: Outbox,
        runner: Arc<dyn ProcessRunner>,
        web: Arc<dyn WebClient>,
    ) -> Self {
        Self {
            settings,
            config,
            outbox,
            runner,
            web,
        }
    }

    pub fn outbox(&self) -> &Outbox {
        &self.outbox
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Run a registered webhook action. `extra` is the free text that
    /// followed the action name.
    ///
    /// Replies are sent from here; the error, if any, is left to the caller
    /// to report.
    pub async fn run_webhook(&self, name: &str, action: &WebhookAction, extra: &str) -> DispatchResult<()> {
        info!(target: "telepwn::actions", %name, kind = %action.kind, %extra, "Running webhook");
        match action.kind {
            WebhookKind::Notify => {
                self.outbox.send(&Reply::ok(format!("{name} triggered!"))).await?;
            }
            WebhookKind::Http => {
                self.outbox.send(&executing(name)).await?;
                self.http_request(name, action, extra).await?;
                self.outbox.send(&Reply::ok(format!("{name} executed!"))).await?;
            }
            WebhookKind::Shell => {
                self.outbox.send(&executing(name)).await?;
                let output = self.shell_command(name, action, extra).await?;
                self.outbox.send(&shell_success(name, &output)).await?;
            }
            WebhookKind::PluginToggle => {
                let plugin = toggle_target(name, extra);
                self.outbox.send(&executing(name)).await?;
                self.toggle_plugin(&plugin).await?;
                return Ok(());
            }
        }
        if let Some(url) = action.notify_url() {
            self.notify_secondary(url, name, extra).await;
        }
        Ok(())
    }

    async fn http_request(&self, name: &str, action: &WebhookAction, extra: &str) -> DispatchResult<()> {
        let template = action
            .request
            .as_deref()
            .ok_or_else(|| DispatchError::validation(format!("Webhook {name} has no request template")))?;
        let params = interpolation::parse_params(extra);
        let rendered = interpolation::substitute(template, &params)?;

        let mut tokens = rendered.split_whitespace();
        let (Some(method), Some(url), None) = (tokens.next(), tokens.next(), tokens.next()) else {
            return Err(DispatchError::validation(
                "Invalid HTTP request format in webhook configuration.",
            ));
        };

        let status = self
            .web
            .request(method, url, None)
            .await
            .map_err(|e| DispatchError::execution(name, format!("{e:#}")))?;
        if !(200..300).contains(&status) {
            return Err(DispatchError::execution(name, format!("HTTP {status}")));
        }
        debug!(target: "telepwn::actions", %name, status, "HTTP webhook succeeded");
        Ok(())
    }

    async fn shell_command(&self, name: &str, action: &WebhookAction, extra: &str) -> DispatchResult<ProcessOutput> {
        let template = action
            .command
            .as_deref()
            .ok_or_else(|| DispatchError::validation(format!("Webhook {name} has no command")))?;
        let params = interpolation::parse_params(extra);
        let command = interpolation::substitute(strip_matching_quotes(template), &params)?;

        info!(target: "telepwn::actions", %name, %command, "Executing shell webhook");
        let output = self
            .runner
            .run_shell(&command)
            .await
            .map_err(|e| DispatchError::execution(name, e.to_string()))?;
        if !output.success() {
            return Err(DispatchError::execution(name, output.failure_detail()));
        }
        Ok(output)
    }

    /// Flip `main.plugins.<plugin>.enabled` and ask the daemon to reload.
    /// Returns the new state.
    pub async fn toggle_plugin(&self, plugin: &str) -> DispatchResult<bool> {
        if plugin.is_empty()
            || !plugin
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(DispatchError::validation(format!("Invalid plugin name '{plugin}'")));
        }
        let section = format!("main.plugins.{plugin}");
        let enabled = !self.config.get_bool(&section, "enabled")?.unwrap_or(false);
        let state = if enabled { "enabled" } else { "disabled" };

        self.outbox
            .send(&Reply::notice(format!("🔧 Toggling {plugin} to {state}...")))
            .await?;
        self.config
            .set_value(&section, "enabled", ConfigValue::Bool(enabled))?;
        self.signal_reload().await?;
        info!(target: "telepwn::actions", %plugin, enabled, "Plugin toggled");
        self.outbox
            .send(&Reply::ok(format!("{plugin} {state}. Plugins reloaded.")))
            .await?;
        Ok(enabled)
    }

    /// Best-effort POST to the webhook's own URL; failures are only logged.
    async fn notify_secondary(&self, url: &str, name: &str, extra: &str) {
        let body = json!({
            "action": name,
            "extra": extra,
            "chat_id": self.outbox.chat_id(),
        });
        match self.web.request("POST", url, Some(&body)).await {
            Ok(status) if (200..300).contains(&status) => {
                debug!(target: "telepwn::actions", %name, %url, status, "Secondary notification sent");
            }
            Ok(status) => {
                warn!(target: "telepwn::actions", %name, %url, status, "Secondary notification rejected");
            }
            Err(e) => {
                warn!(target: "telepwn::actions", %name, %url, error = %e, "Secondary notification failed");
            }
        }
    }

    /// Entry point of the scheduler. Failures are reported to the operator
    /// here because nobody else is waiting on the result.
    pub async fn run_scheduled(&self, task_id: &str, action: TaskAction) {
        info!(target: "telepwn::actions", %task_id, %action, "Scheduled task firing");
        let result = match action {
            TaskAction::Reboot => self.scheduled_reboot().await,
            TaskAction::Backup => self.backup(super::builtins::BackupTrigger::Scheduled).await,
        };
        if let Err(e) = result {
            error!(target: "telepwn::actions", %task_id, %action, error = %e, "Scheduled task failed");
            let reply = match action {
                TaskAction::Backup => Reply::fail(format!("Scheduled backup failed: {e}")),
                TaskAction::Reboot => e.to_reply(),
            };
            self.outbox.deliver(&reply).await;
        }
    }

    async fn scheduled_reboot(&self) -> DispatchResult<()> {
        self.outbox
            .send(&Reply::notice("🔄 Scheduled reboot triggered..."))
            .await?;
        run_checked(self.runner.as_ref(), "Reboot", &["sudo", "reboot"]).await?;
        Ok(())
    }
}

fn executing(name: &str) -> Reply {
    Reply::notice(format!("🔧 Executing {name}..."))
}

fn shell_success(name: &str, output: &ProcessOutput) -> Reply {
    let stdout = output.stdout.trim_end();
    if stdout.is_empty() {
        Reply::ok(format!("{name} executed!"))
    } else {
        Reply::ok(format!("{name} executed!\nOutput:\n```\n{stdout}\n```"))
    }
}

/// Extension targeted by a `plugin_toggle` action: the first word of `extra`
/// when given, else the action name without its `toggle_` prefix.
pub fn toggle_target(action_name: &str, extra: &str) -> String {
    extra
        .split_whitespace()
        .next()
        .unwrap_or_else(|| action_name.strip_prefix(TOGGLE_PREFIX).unwrap_or(action_name))
        .to_string()
}
