//! Two-step confirmation for destructive operations.
//!
//! Step one renders a prompt whose confirm button carries a [`ConfirmToken`];
//! step two decodes the token from the pressed button and runs the embedded
//! verb with its embedded argument. Nothing is stored between the two steps,
//! so a prompt survives a daemon restart. Whoever can press buttons in the
//! operator chat can therefore run any shell command; the chat is assumed to
//! be private to that operator.

use std::fmt;
use std::str::FromStr;

use crate::error::{DispatchError, DispatchResult};
use crate::executor::builtins::Mode;
use crate::menu::CANCEL;
use crate::sources::{Button, Reply};

const PREFIX: &str = "confirm:";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmVerb {
    Reboot,
    Shutdown,
    Shell,
}

impl ConfirmVerb {
    fn as_str(self) -> &'static str {
        match self {
            Self::Reboot => "reboot",
            Self::Shutdown => "shutdown",
            Self::Shell => "shell",
        }
    }
}

impl fmt::Display for ConfirmVerb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConfirmVerb {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "reboot" => Ok(Self::Reboot),
            "shutdown" => Ok(Self::Shutdown),
            "shell" => Ok(Self::Shell),
            _ => Err(()),
        }
    }
}

/// A pending destructive action: what to do and the literal argument it
/// was requested with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmToken {
    pub verb: ConfirmVerb,
    pub arg: String,
}

impl ConfirmToken {
    pub fn reboot(mode: Mode) -> Self {
        Self {
            verb: ConfirmVerb::Reboot,
            arg: mode.as_str().to_string(),
        }
    }

    pub fn shutdown() -> Self {
        Self {
            verb: ConfirmVerb::Shutdown,
            arg: String::new(),
        }
    }

    pub fn shell(command: &str) -> Self {
        Self {
            verb: ConfirmVerb::Shell,
            arg: command.to_string(),
        }
    }

    /// `confirm:<verb>:<arg>`; the argument is kept verbatim.
    pub fn encode(&self) -> String {
        format!("{PREFIX}{}:{}", self.verb, self.arg)
    }

    /// Inverse of [`encode`](Self::encode). `None` for anything that is not
    /// a confirmation token.
    pub fn decode(token: &str) -> Option<Self> {
        let body = token.strip_prefix(PREFIX)?;
        let (verb, arg) = body.split_once(':')?;
        Some(Self {
            verb: verb.parse().ok()?,
            arg: arg.to_string(),
        })
    }
}

fn cancel_row() -> Vec<Button> {
    vec![Button::new("❌ Cancel", CANCEL)]
}

/// Attach buttons offering `token` again, for a press that arrived too
/// early to be acted on. The transport clears the original buttons on
/// every press, so the prompt would otherwise be lost.
pub fn reoffer(reply: Reply, token: &ConfirmToken) -> Reply {
    reply.with_keyboard(vec![
        vec![Button::new("✅ Confirm", token.encode())],
        cancel_row(),
    ])
}

pub fn reboot_prompt() -> Reply {
    Reply::warn("Confirm reboot? SSH/Bluetooth will disconnect.").with_keyboard(vec![
        vec![Button::new("✅ Confirm Manual", ConfirmToken::reboot(Mode::Manual).encode())],
        vec![Button::new("✅ Confirm Auto", ConfirmToken::reboot(Mode::Auto).encode())],
        cancel_row(),
    ])
}

pub fn shutdown_prompt() -> Reply {
    Reply::warn("Confirm shutdown? Device will power off.").with_keyboard(vec![
        vec![Button::new("✅ Confirm", ConfirmToken::shutdown().encode())],
        cancel_row(),
    ])
}

pub fn shell_prompt(command: &str) -> DispatchResult<Reply> {
    let command = command.trim();
    if command.is_empty() {
        return Err(DispatchError::validation(
            "Usage: /shell <command>\nExample: /shell ls -la",
        ));
    }
    Ok(
        Reply::warn(format!("Confirm running shell command?\nCommand: {command}")).with_keyboard(vec![
            vec![Button::new("✅ Confirm", ConfirmToken::shell(command).encode())],
            cancel_row(),
        ]),
    )
}
