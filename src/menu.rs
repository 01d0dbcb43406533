//! Inline menus and the built-in callback tokens behind their buttons.

use crate::confirm::ConfirmToken;
use crate::plugins::PluginEntry;
use crate::sources::{Button, Keyboard, Reply};

pub const SHOW_MENU: &str = "show_menu";
pub const BACK_TO_INITIAL: &str = "back_to_initial";
pub const CANCEL: &str = "cancel";
pub const TOGGLE_PLUGIN_PREFIX: &str = "toggle_plugin_";

pub const BANNER: &str = "🖐 TelePwn";

/// Built-in actions reachable from a button.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuAction {
    ShowMenu,
    BackToInitial,
    Cancel,
    Reboot,
    Shutdown,
    Uptime,
    Handshakes,
    Backup,
    RestartManual,
    RestartAuto,
    Kill,
    Clear,
    Logs,
    Inbox,
    Plugins,
}

impl MenuAction {
    pub fn from_token(token: &str) -> Option<Self> {
        Some(match token {
            // `start` is what the plugin list's Back button sends.
            SHOW_MENU | "start" => Self::ShowMenu,
            BACK_TO_INITIAL => Self::BackToInitial,
            CANCEL => Self::Cancel,
            "reboot" => Self::Reboot,
            "shutdown" => Self::Shutdown,
            "uptime" => Self::Uptime,
            "handshake_count" => Self::Handshakes,
            "create_backup" => Self::Backup,
            "restart_manual" => Self::RestartManual,
            "restart_auto" => Self::RestartAuto,
            "pwnkill" => Self::Kill,
            "clear" => Self::Clear,
            "logs" => Self::Logs,
            "inbox" => Self::Inbox,
            "plugins" => Self::Plugins,
            _ => return None,
        })
    }
}

/// A decoded button press.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Callback {
    Menu(MenuAction),
    TogglePlugin(String),
    Confirm(ConfirmToken),
}

impl Callback {
    pub fn parse(token: &str) -> Option<Self> {
        if let Some(plugin) = token.strip_prefix(TOGGLE_PLUGIN_PREFIX) {
            return Some(Self::TogglePlugin(plugin.to_string()));
        }
        if let Some(confirm) = ConfirmToken::decode(token) {
            return Some(Self::Confirm(confirm));
        }
        MenuAction::from_token(token).map(Self::Menu)
    }
}

pub fn initial_menu() -> Keyboard {
    vec![vec![Button::new("📋 Menu", SHOW_MENU)]]
}

pub fn main_menu() -> Keyboard {
    vec![
        vec![
            Button::new("🔄 Reboot", "reboot"),
            Button::new("⏏️ Shutdown", "shutdown"),
            Button::new("⏳ Uptime", "uptime"),
        ],
        vec![
            Button::new("🤝 Handshakes", "handshake_count"),
            Button::new("💾 Backup", "create_backup"),
        ],
        vec![
            Button::new("🔧 Manual Restart", "restart_manual"),
            Button::new("🤖 Auto Restart", "restart_auto"),
            Button::new("🗡️ Kill", "pwnkill"),
        ],
        vec![
            Button::new("🖌️ Clear", "clear"),
            Button::new("📜 Logs", "logs"),
            Button::new("📥 Inbox", "inbox"),
        ],
        vec![
            Button::new("🔩 Plugins", "plugins"),
            Button::new("⬅️ Back", BACK_TO_INITIAL),
        ],
    ]
}

pub fn main_menu_reply() -> Reply {
    Reply::notice(format!("{BANNER}\nSelect an option:")).with_keyboard(main_menu())
}

pub fn initial_menu_reply() -> Reply {
    Reply::notice(BANNER).with_keyboard(initial_menu())
}

/// One toggle button per extension, showing its current state.
pub fn plugin_menu(plugins: &[PluginEntry]) -> Reply {
    if plugins.is_empty() {
        return Reply::warn("No plugins found.");
    }
    let mut keyboard: Keyboard = plugins
        .iter()
        .map(|p| {
            let mark = if p.enabled { "✅" } else { "❌" };
            vec![Button::new(
                format!("{mark} {}", p.name),
                format!("{TOGGLE_PLUGIN_PREFIX}{}", p.name),
            )]
        })
        .collect();
    keyboard.push(vec![Button::new("Back", "start")]);
    Reply::notice("🔧 Toggle Plugins:").with_keyboard(keyboard)
}
