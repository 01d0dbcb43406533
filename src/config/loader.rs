use anyhow::{Context, Result, anyhow, bail};
use schemars::{Schema, schema_for};
use serde_valid::Validate;
use std::path::Path;
use tracing::debug;

use super::models::Settings;

/// Location of the daemon's own table inside the device configuration.
pub const SETTINGS_SECTION: [&str; 3] = ["main", "plugins", "telepwn"];

/// Load settings from the text of a device configuration document.
pub fn load_from_str(s: &str) -> Result<Settings> {
    let doc: toml::Table = toml::from_str(s).context("Failed to parse device configuration as TOML")?;
    settings_from_table(&doc)
}

/// Load settings from a device configuration file synchronously.
pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Settings> {
    let path_ref = path.as_ref();
    let text = std::fs::read_to_string(path_ref)
        .with_context(|| format!("Failed to read device configuration {}", path_ref.display()))?;
    let settings = load_from_str(&text)
        .with_context(|| format!("Invalid settings in {}", path_ref.display()))?;
    debug!("Loaded settings from {}", path_ref.display());
    Ok(settings)
}

/// Load settings from a device configuration file asynchronously (Tokio).
pub async fn load_from_path_async<P: AsRef<Path>>(path: P) -> Result<Settings> {
    let path_ref = path.as_ref();
    let text = tokio::fs::read_to_string(path_ref)
        .await
        .with_context(|| format!("Failed to read device configuration {}", path_ref.display()))?;
    let settings = load_from_str(&text)
        .with_context(|| format!("Invalid settings in {}", path_ref.display()))?;
    debug!("Loaded settings from {}", path_ref.display());
    Ok(settings)
}

/// Generate the JSON Schema for the settings table.
pub fn generate_schema() -> Schema {
    schema_for!(Settings)
}

fn settings_from_table(doc: &toml::Table) -> Result<Settings> {
    let mut current = doc;
    for segment in SETTINGS_SECTION {
        current = current
            .get(segment)
            .and_then(toml::Value::as_table)
            .ok_or_else(|| anyhow!("Missing [{}] table", SETTINGS_SECTION.join(".")))?;
    }
    let settings: Settings = toml::Value::Table(current.clone())
        .try_into()
        .context("Failed to deserialize settings table")?;
    validate_settings(&settings)?;
    Ok(settings)
}

/// Field-level validation plus the cross-field checks serde cannot express.
pub fn validate_settings(settings: &Settings) -> Result<()> {
    settings
        .validate()
        .map_err(|e| anyhow!("Settings validation failed: {e}"))?;
    if settings.chat_id.as_i64().is_none() {
        bail!("chat_id {:?} is not a numeric chat identifier", settings.chat_id);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::models::ChatId;

    #[test]
    fn test_loads_with_defaults() {
        let s = load_from_str(
            r#"
            [main.plugins.telepwn]
            bot_token = "123:abc"
            chat_id = "42"
            "#,
        )
        .unwrap();
        assert_eq!(s.chat_id, ChatId::Text("42".into()));
        assert_eq!(s.chat_id.as_i64(), Some(42));
        assert_eq!(s.scheduler_poll_secs, 60);
        assert_eq!(s.cooldown_ms, 2000);
        assert_eq!(s.http_timeout_secs, 5);
        assert_eq!(s.max_message_len, 2048);
        assert_eq!(s.backup_paths.len(), 15);
    }

    #[test]
    fn test_missing_section_is_rejected() {
        let err = load_from_str("[main]\nname = \"pwn\"\n").unwrap_err();
        assert!(err.to_string().contains("main.plugins.telepwn"));
    }

    #[test]
    fn test_empty_token_and_bad_chat_are_rejected() {
        assert!(
            load_from_str("[main.plugins.telepwn]\nbot_token = \"\"\nchat_id = 1\n").is_err()
        );
        assert!(
            load_from_str("[main.plugins.telepwn]\nbot_token = \"t\"\nchat_id = \"me\"\n").is_err()
        );
    }

    #[test]
    fn test_zero_poll_interval_is_rejected() {
        let err = load_from_str(
            "[main.plugins.telepwn]\nbot_token = \"t\"\nchat_id = 1\nscheduler_poll_secs = 0\n",
        )
        .unwrap_err();
        assert!(format!("{err:#}").contains("validation"));
    }

    #[test]
    fn test_schema_mentions_fields() {
        let json = serde_json::to_string(&generate_schema()).unwrap();
        assert!(json.contains("bot_token"));
        assert!(json.contains("scheduler_poll_secs"));
    }
}
