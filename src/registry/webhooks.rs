//! Named webhook actions.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::info;

use super::{Registry, Table};
use crate::error::{DispatchError, DispatchResult};
use crate::utils::interpolation;

/// The closed set of webhook action types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WebhookKind {
    #[default]
    Notify,
    Http,
    Shell,
    PluginToggle,
}

impl WebhookKind {
    pub const ALL: [WebhookKind; 4] = [Self::Notify, Self::Http, Self::Shell, Self::PluginToggle];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Notify => "notify",
            Self::Http => "http",
            Self::Shell => "shell",
            Self::PluginToggle => "plugin_toggle",
        }
    }
}

impl fmt::Display for WebhookKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WebhookKind {
    type Err = DispatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                DispatchError::validation(format!(
                    "Invalid type '{s}'. Use one of: notify, http, shell, plugin_toggle"
                ))
            })
    }
}

/// A stored webhook action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookAction {
    /// Secondary notification target; empty means none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(rename = "type", default)]
    pub kind: WebhookKind,

    /// `METHOD URL` template for `http`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<String>,

    /// Shell command template for `shell`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
}

impl WebhookAction {
    /// Validate and build an action. `template` is the request (http) or the
    /// command (shell); other types ignore it.
    pub fn build(url: Option<&str>, kind: WebhookKind, template: Option<&str>) -> DispatchResult<Self> {
        let url = url
            .map(str::trim)
            .filter(|u| !u.is_empty() && !u.eq_ignore_ascii_case("none"))
            .map(str::to_string);
        let template = template.map(str::trim).filter(|t| !t.is_empty());

        let mut action = Self {
            url,
            kind,
            request: None,
            command: None,
        };
        match kind {
            WebhookKind::Http => {
                let request = template.ok_or_else(|| {
                    DispatchError::validation("http webhooks need a request template: METHOD <URL>")
                })?;
                validate_request_shape(request)?;
                action.request = Some(request.to_string());
            }
            WebhookKind::Shell => {
                let command = template
                    .ok_or_else(|| DispatchError::validation("shell webhooks need a command"))?;
                action.command = Some(command.to_string());
            }
            WebhookKind::Notify | WebhookKind::PluginToggle => {}
        }
        Ok(action)
    }

    /// The secondary notification URL, if one is configured.
    pub fn notify_url(&self) -> Option<&str> {
        self.url.as_deref().map(str::trim).filter(|u| !u.is_empty())
    }
}

/// Dry-run the template with sentinel values and require exactly `METHOD URL`.
fn validate_request_shape(template: &str) -> DispatchResult<()> {
    let rendered = interpolation::render_sentinel(template);
    if rendered.split_whitespace().count() != 2 {
        return Err(DispatchError::validation(
            "Invalid HTTP request format. Expected format: METHOD <URL>",
        ));
    }
    Ok(())
}

/// Registry of webhook actions keyed by action name.
#[derive(Debug)]
pub struct WebhookRegistry {
    inner: Registry<WebhookAction>,
}

impl WebhookRegistry {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            inner: Registry::open(path),
        }
    }

    /// Register or overwrite `name`. Persisted before returning.
    pub fn register(
        &mut self,
        name: &str,
        url: Option<&str>,
        kind: WebhookKind,
        template: Option<&str>,
    ) -> DispatchResult<WebhookAction> {
        let name = name.trim();
        if name.is_empty() {
            return Err(DispatchError::validation("Webhook name must not be empty"));
        }
        let action = WebhookAction::build(url, kind, template)?;
        let previous = self.inner.insert(name, action.clone())?;
        info!(
            target: "telepwn::registry",
            %name,
            kind = %action.kind,
            replaced = previous.is_some(),
            "Webhook registered"
        );
        Ok(action)
    }

    pub fn resolve(&self, name: &str) -> DispatchResult<&WebhookAction> {
        self.inner
            .get(name)
            .ok_or_else(|| DispatchError::validation(format!("No webhook set for {name}")))
    }

    pub fn entries(&self) -> &Table<WebhookAction> {
        self.inner.entries()
    }
}
