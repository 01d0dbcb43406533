use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::Receiver;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::config::{ConfigStore, Settings};
use crate::confirm::{self, ConfirmToken, ConfirmVerb};
use crate::error::{DispatchError, DispatchResult};
use crate::executor::actions::ActionExecutor;
use crate::executor::builtins::{BackupTrigger, Mode};
use crate::menu::{self, Callback, MenuAction};
use crate::plugins::PluginCatalog;
use crate::registry::{ScheduleRegistry, TaskAction, WebhookKind, WebhookRegistry, schedules};
use crate::scheduler::Scheduler;
use crate::sources::{Command, Inbound, InboundEvent, Outbox, Reply};

/// Command list published to the transport on start.
pub const COMMANDS: &[(&str, &str)] = &[
    ("start", "Open the main menu"),
    ("reboot", "Reboot the device"),
    ("shutdown", "Shutdown with clear"),
    ("uptime", "Check uptime"),
    ("handshakes", "Count captured handshakes"),
    ("backup", "Create and send a backup"),
    ("restart_manual", "Restart daemon in manual mode"),
    ("restart_auto", "Restart daemon in auto mode"),
    ("kill", "Kill the daemon"),
    ("clear", "Clear the screen"),
    ("logs", "View recent logs"),
    ("inbox", "Check Pwngrid inbox"),
    ("plugins", "List plugins"),
    ("toggle", "Toggle a plugin"),
    ("setwebhook", "Set a webhook command"),
    ("webhook", "Trigger a custom webhook action"),
    ("config", "Edit config.toml (view/set/list)"),
    ("pwngrid", "Pwngrid actions (send/clear)"),
    ("files", "Manage files (list/download)"),
    ("schedule", "Manage scheduled tasks (add/remove/list)"),
    ("shell", "Run shell commands (with confirmation)"),
];

const SETWEBHOOK_USAGE: &str = "Usage: /setwebhook <action> <url|none> [type] [request/command]\n\
Example: /setwebhook ping https://discord.com/api/webhooks/12345/abcde notify\n\
For plugin_toggle: /setwebhook toggle_memtemp none plugin_toggle";
const WEBHOOK_USAGE: &str = "Usage: /webhook <action> [extra]\nExample: /webhook ping\n\
For plugin_toggle: /webhook toggle_memtemp memtemp";
const CONFIG_USAGE: &str = "Usage:\n/config view <section> <key>\n/config set <section> <key> <value>\n\
/config list\nExample: /config set main.plugins.memtemp enabled true";
const SCHEDULE_USAGE: &str = "Usage:\n/schedule add <action> <interval_hours>\n/schedule remove <task_id>\n\
/schedule list\nExample: /schedule add reboot 24";
const PWNGRID_USAGE: &str = "Usage:\n/pwngrid send <message>\n/pwngrid clear\n\
Example: /pwngrid send Hello from TelePwn";
const FILES_USAGE: &str = "Usage:\n/files list\n/files download <filename>\n\
Example: /files download handshake.pcap";

/// Per-chat throttle for button presses: one press per window, no burst
/// accounting.
#[derive(Debug)]
struct Cooldown {
    window: Duration,
    last: HashMap<i64, Instant>,
}

impl Cooldown {
    fn new(window: Duration) -> Self {
        Self {
            window,
            last: HashMap::new(),
        }
    }

    /// `true` and records the press when outside the window.
    fn admit(&mut self, chat_id: i64, now: Instant) -> bool {
        if let Some(previous) = self.last.get(&chat_id)
            && now.saturating_duration_since(*previous) < self.window
        {
            return false;
        }
        self.last.insert(chat_id, now);
        true
    }
}

/// Runtime is responsible for:
/// - authorising inbound events against the configured chat
/// - resolving commands and button presses to built-ins, confirmation steps
///   or registered webhooks
/// - owning the registries and the scheduler, restarting the latter around
///   every schedule change
/// - turning every error into a reply
pub struct Runtime {
    settings: Arc<Settings>,
    config: ConfigStore,
    outbox: Outbox,
    executor: Arc<ActionExecutor>,
    webhooks: WebhookRegistry,
    schedules: ScheduleRegistry,
    plugins: PluginCatalog,
    scheduler: Option<Scheduler>,
    cooldown: Cooldown,
}

impl Runtime {
    pub fn new(
        settings: Arc<Settings>,
        config: ConfigStore,
        outbox: Outbox,
        executor: Arc<ActionExecutor>,
    ) -> Self {
        let webhooks = WebhookRegistry::open(&settings.webhook_file);
        let schedules = ScheduleRegistry::open(&settings.schedule_file);
        let plugins = PluginCatalog::new(settings.plugin_dirs.clone(), config.clone());
        let cooldown = Cooldown::new(Duration::from_millis(settings.cooldown_ms));
        Self {
            settings,
            config,
            outbox,
            executor,
            webhooks,
            schedules,
            plugins,
            scheduler: None,
            cooldown,
        }
    }

    /// Handle events until `cancel` fires or every sender is gone, then stop
    /// the scheduler.
    pub async fn serve(mut self, mut inbound: Receiver<Inbound>, cancel: CancellationToken) {
        self.start_scheduler();
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                event = inbound.recv() => match event {
                    Some(event) => self.handle(event).await,
                    None => {
                        warn!(target: "telepwn::runtime", "Inbound channel closed");
                        break;
                    }
                },
            }
        }
        self.stop_scheduler().await;
        info!(target: "telepwn::runtime", "Runtime stopped");
    }

    pub fn start_scheduler(&mut self) {
        if self.scheduler.is_some() {
            return;
        }
        self.scheduler = Some(Scheduler::start(
            self.schedules.snapshot(),
            self.executor.clone(),
            Duration::from_secs(self.settings.scheduler_poll_secs),
        ));
    }

    pub async fn stop_scheduler(&mut self) {
        if let Some(scheduler) = self.scheduler.take() {
            scheduler.stop().await;
        }
    }

    pub fn scheduler_running(&self) -> bool {
        self.scheduler.is_some()
    }

    /// Handle one inbound event. Events from any other chat are ignored.
    pub async fn handle(&mut self, inbound: Inbound) {
        if inbound.chat_id != self.outbox.chat_id() {
            warn!(target: "telepwn::runtime", chat_id = inbound.chat_id, "Ignoring event from unauthorised chat");
            return;
        }
        let result = match &inbound.event {
            InboundEvent::Command(cmd) => {
                debug!(target: "telepwn::runtime", verb = %cmd.verb, "Command");
                self.dispatch_command(cmd).await
            }
            InboundEvent::Callback(token) => {
                if !self.cooldown.admit(inbound.chat_id, Instant::now()) {
                    trace!(target: "telepwn::runtime", %token, "Button press throttled");
                    let slow = Reply::warn("Slow down! Wait a moment.");
                    Ok(Some(match ConfirmToken::decode(token) {
                        Some(pending) => confirm::reoffer(slow, &pending),
                        None => slow,
                    }))
                } else {
                    debug!(target: "telepwn::runtime", %token, "Callback");
                    self.dispatch_callback(token).await
                }
            }
        };
        match result {
            Ok(Some(reply)) => self.outbox.deliver(&reply).await,
            Ok(None) => {}
            Err(e) => {
                warn!(target: "telepwn::runtime", error = %e, "Dispatch failed");
                self.outbox.deliver(&e.to_reply()).await;
            }
        }
    }

    async fn dispatch_command(&mut self, cmd: &Command) -> DispatchResult<Option<Reply>> {
        let exec = self.executor.clone();
        let reply = match cmd.verb.as_str() {
            "start" | "menu" => menu::main_menu_reply(),
            "reboot" => confirm::reboot_prompt(),
            "shutdown" => confirm::shutdown_prompt(),
            "shell" => confirm::shell_prompt(cmd.raw_from(0))?,
            "uptime" => exec.uptime().await?,
            "handshakes" => exec.handshake_count().await?,
            "backup" => {
                exec.backup(BackupTrigger::Manual).await?;
                return Ok(None);
            }
            "restart_manual" => exec.restart(Mode::Manual).await?,
            "restart_auto" => exec.restart(Mode::Auto).await?,
            "kill" => exec.kill_daemon().await?.with_keyboard(menu::initial_menu()),
            "clear" => exec.clear_display().await?,
            "logs" => exec.logs().await?,
            "inbox" => exec.inbox().await?,
            "plugins" => menu::plugin_menu(self.plugins.refresh()),
            "toggle" => return self.toggle_command(cmd).await,
            "setwebhook" => self.set_webhook(cmd)?,
            "webhook" => return self.trigger_webhook(cmd).await,
            "config" => return self.config_command(cmd).await,
            "schedule" => self.schedule_command(cmd).await?,
            "pwngrid" => self.pwngrid_command(cmd).await?,
            "files" => self.files_command(cmd).await?,
            other => Reply::warn(format!("Unknown command /{other}. Use /start for the menu.")),
        };
        Ok(Some(reply))
    }

    async fn dispatch_callback(&mut self, token: &str) -> DispatchResult<Option<Reply>> {
        let Some(callback) = Callback::parse(token) else {
            warn!(target: "telepwn::runtime", %token, "Unknown button token");
            return Ok(Some(Reply::warn("Unknown action.")));
        };
        let exec = self.executor.clone();
        let reply = match callback {
            Callback::Confirm(confirmed) => return self.run_confirmed(confirmed).await,
            Callback::TogglePlugin(plugin) => {
                self.toggle(&plugin).await?;
                return Ok(None);
            }
            Callback::Menu(action) => match action {
                MenuAction::ShowMenu => menu::main_menu_reply(),
                MenuAction::BackToInitial => menu::initial_menu_reply(),
                MenuAction::Cancel => {
                    self.outbox.send(&Reply::ok("Action cancelled.")).await?;
                    menu::main_menu_reply()
                }
                MenuAction::Reboot => confirm::reboot_prompt(),
                MenuAction::Shutdown => confirm::shutdown_prompt(),
                MenuAction::Uptime => exec.uptime().await?,
                MenuAction::Handshakes => exec.handshake_count().await?,
                MenuAction::Backup => {
                    exec.backup(BackupTrigger::Manual).await?;
                    return Ok(None);
                }
                MenuAction::RestartManual => exec.restart(Mode::Manual).await?,
                MenuAction::RestartAuto => exec.restart(Mode::Auto).await?,
                MenuAction::Kill => exec.kill_daemon().await?.with_keyboard(menu::initial_menu()),
                MenuAction::Clear => exec.clear_display().await?,
                MenuAction::Logs => exec.logs().await?,
                MenuAction::Inbox => exec.inbox().await?,
                MenuAction::Plugins => menu::plugin_menu(self.plugins.refresh()),
            },
        };
        Ok(Some(reply))
    }

    /// Second confirmation step: run whatever the token carries.
    async fn run_confirmed(&mut self, token: ConfirmToken) -> DispatchResult<Option<Reply>> {
        info!(target: "telepwn::runtime", verb = %token.verb, arg = %token.arg, "Confirmed");
        match token.verb {
            ConfirmVerb::Reboot => {
                let mode: Mode = token.arg.parse()?;
                self.executor.reboot(mode).await?;
                Ok(None)
            }
            ConfirmVerb::Shutdown => {
                self.executor.shutdown().await?;
                Ok(None)
            }
            ConfirmVerb::Shell => Ok(Some(self.executor.run_confirmed_shell(&token.arg).await?)),
        }
    }

    async fn toggle(&mut self, plugin: &str) -> DispatchResult<()> {
        if !self.plugins.contains(plugin) {
            return Err(DispatchError::validation(format!("Plugin {plugin} not found.")));
        }
        let enabled = self.executor.toggle_plugin(plugin).await?;
        self.plugins.note_state(plugin, enabled);
        Ok(())
    }

    async fn toggle_command(&mut self, cmd: &Command) -> DispatchResult<Option<Reply>> {
        let Some(plugin) = cmd.arg(0) else {
            let listing = self
                .plugins
                .list()
                .iter()
                .map(|p| {
                    let state = if p.enabled { "enabled" } else { "disabled" };
                    format!("- {} ({state})", p.name)
                })
                .collect::<Vec<_>>();
            let body = if listing.is_empty() {
                "⚠ No plugins found.".to_string()
            } else {
                format!("Available plugins:\n{}", listing.join("\n"))
            };
            return Ok(Some(Reply::notice(format!("Usage: /toggle <plugin_name>\n{body}"))));
        };
        self.toggle(plugin).await?;
        Ok(None)
    }

    fn set_webhook(&mut self, cmd: &Command) -> DispatchResult<Reply> {
        let (Some(name), Some(url)) = (cmd.arg(0), cmd.arg(1)) else {
            return Err(DispatchError::validation(SETWEBHOOK_USAGE));
        };
        let kind: WebhookKind = cmd.arg(2).unwrap_or("notify").parse()?;
        let template = cmd.raw_from(3);
        let template = (!template.is_empty()).then_some(template);
        let action = self.webhooks.register(name, Some(url), kind, template)?;
        Ok(Reply::ok(format!(
            "Webhook set for {name}: {}",
            action.notify_url().unwrap_or("none")
        )))
    }

    async fn trigger_webhook(&mut self, cmd: &Command) -> DispatchResult<Option<Reply>> {
        let Some(name) = cmd.arg(0) else {
            return Err(DispatchError::validation(WEBHOOK_USAGE));
        };
        let action = self.webhooks.resolve(name)?.clone();
        self.executor.run_webhook(name, &action, cmd.raw_from(1)).await?;
        Ok(None)
    }

    async fn config_command(&mut self, cmd: &Command) -> DispatchResult<Option<Reply>> {
        let Some(sub) = cmd.arg(0) else {
            return Err(DispatchError::validation(CONFIG_USAGE));
        };
        match sub.to_ascii_lowercase().as_str() {
            "list" => Ok(Some(Reply::notice(self.config.render_listing()?))),
            "view" => {
                let (Some(section), Some(key)) = (cmd.arg(1), cmd.arg(2)) else {
                    return Err(DispatchError::validation("Please provide section and key."));
                };
                match self.config.get(section, key)? {
                    Some(value) => Ok(Some(Reply::notice(format!("🔍 {section}.{key} = {value}")))),
                    None => Err(DispatchError::validation(format!("Key {section}.{key} not found."))),
                }
            }
            "set" => {
                let (Some(section), Some(key)) = (cmd.arg(1), cmd.arg(2)) else {
                    return Err(DispatchError::validation("Please provide section and key."));
                };
                let raw = cmd.raw_from(3);
                if raw.is_empty() {
                    return Err(DispatchError::validation("Please provide a value to set."));
                }
                let value = self.config.set(section, key, raw)?;
                self.outbox
                    .send(&Reply::ok(format!("Set {section}.{key} = {value}")))
                    .await?;
                self.executor.restart_service().await?;
                Ok(Some(Reply::ok(format!(
                    "{} restarted to apply changes.",
                    self.settings.service_name
                ))))
            }
            _ => Err(DispatchError::validation(
                "Invalid action. Use 'view', 'set', or 'list'.",
            )),
        }
    }

    async fn schedule_command(&mut self, cmd: &Command) -> DispatchResult<Reply> {
        let Some(sub) = cmd.arg(0) else {
            return Err(DispatchError::validation(SCHEDULE_USAGE));
        };
        match sub.to_ascii_lowercase().as_str() {
            "list" => {
                let tasks = self.schedules.snapshot();
                if tasks.is_empty() {
                    return Ok(Reply::warn("No scheduled tasks."));
                }
                let lines: Vec<String> = tasks
                    .iter()
                    .map(|(id, t)| format!("ID: {id} - {} every {} hours", t.action, t.interval))
                    .collect();
                Ok(Reply::notice(format!("Scheduled tasks:\n{}", lines.join("\n"))))
            }
            "add" => {
                let (Some(action), Some(interval)) = (cmd.arg(1), cmd.arg(2)) else {
                    return Err(DispatchError::validation(
                        "Please provide action and interval (in hours).",
                    ));
                };
                let action: TaskAction = action.parse()?;
                let interval = schedules::parse_interval(interval).map_err(|e| {
                    DispatchError::validation(format!("{e}\n{SCHEDULE_USAGE}"))
                })?;
                self.stop_scheduler().await;
                let added = self.schedules.add(action, interval);
                self.start_scheduler();
                let id = added?;
                Ok(Reply::ok(format!(
                    "Scheduled {action} every {interval} hours (ID: {id})"
                )))
            }
            "remove" => {
                let Some(id) = cmd.arg(1) else {
                    return Err(DispatchError::validation("Please provide the task ID to remove."));
                };
                self.stop_scheduler().await;
                let removed = self.schedules.remove(id);
                self.start_scheduler();
                removed?;
                Ok(Reply::ok(format!("Removed scheduled task (ID: {id})")))
            }
            _ => Err(DispatchError::validation(
                "Invalid action. Use 'add', 'remove', or 'list'.",
            )),
        }
    }

    async fn pwngrid_command(&mut self, cmd: &Command) -> DispatchResult<Reply> {
        match cmd.arg(0).map(str::to_ascii_lowercase).as_deref() {
            None => Err(DispatchError::validation(PWNGRID_USAGE)),
            Some("send") => self.executor.pwngrid_send(cmd.raw_from(1)).await,
            Some("clear") => self.executor.pwngrid_clear().await,
            Some(_) => Err(DispatchError::validation("Invalid action. Use 'send' or 'clear'.")),
        }
    }

    async fn files_command(&mut self, cmd: &Command) -> DispatchResult<Reply> {
        match cmd.arg(0).map(str::to_ascii_lowercase).as_deref() {
            None => Err(DispatchError::validation(FILES_USAGE)),
            Some("list") => self.executor.list_files().await,
            Some("download") => match cmd.arg(1) {
                Some(name) => self.executor.download_file(name).await,
                None => Err(DispatchError::validation("Please provide a filename to download.")),
            },
            Some(_) => Err(DispatchError::validation("Invalid action. Use 'list' or 'download'.")),
        }
    }
}
