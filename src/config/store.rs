//! Dotted-path access to the device configuration document.
//!
//! The document is owned by the host; it is read fresh from disk on every
//! call and written back whole on every single key write. Nothing is cached
//! between calls, so concurrent editors race with last-writer-wins.

use std::fmt;
use std::path::{Path, PathBuf};

use toml::{Table, Value};
use tracing::{debug, info};

use crate::error::{DispatchError, DispatchResult, PersistenceError};

/// A scalar parsed from operator input.
///
/// Precedence when coercing raw text: boolean literal, then integer, then
/// decimal, else the text itself.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl ConfigValue {
    pub fn coerce(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.eq_ignore_ascii_case("true") {
            return Self::Bool(true);
        }
        if raw.eq_ignore_ascii_case("false") {
            return Self::Bool(false);
        }
        if is_integer_literal(raw)
            && let Ok(n) = raw.parse::<i64>()
        {
            return Self::Integer(n);
        }
        if is_decimal_literal(raw)
            && let Ok(f) = raw.parse::<f64>()
        {
            return Self::Float(f);
        }
        Self::Text(raw.to_string())
    }

    fn into_toml(self) -> Value {
        match self {
            Self::Bool(b) => Value::Boolean(b),
            Self::Integer(n) => Value::Integer(n),
            Self::Float(f) => Value::Float(f),
            Self::Text(s) => Value::String(s),
        }
    }
}

impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Integer(n) => write!(f, "{n}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

fn digits(s: &str) -> &str {
    s.strip_prefix('-').unwrap_or(s)
}

fn is_integer_literal(s: &str) -> bool {
    let d = digits(s);
    !d.is_empty() && d.bytes().all(|b| b.is_ascii_digit())
}

fn is_decimal_literal(s: &str) -> bool {
    let d = digits(s);
    d.matches('.').count() == 1
        && d.bytes().any(|b| b.is_ascii_digit())
        && d.bytes().all(|b| b.is_ascii_digit() || b == b'.')
}

/// Reader/writer for the external configuration document.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the whole document. A missing file is an empty document.
    pub fn load(&self) -> Result<Table, PersistenceError> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Table::new()),
            Err(source) => {
                return Err(PersistenceError::Read {
                    path: self.path.clone(),
                    source,
                });
            }
        };
        toml::from_str(&text).map_err(|source| PersistenceError::Parse {
            path: self.path.clone(),
            source,
        })
    }

    fn save(&self, doc: &Table) -> Result<(), PersistenceError> {
        let text = toml::to_string(doc).map_err(|source| PersistenceError::Serialize {
            path: self.path.clone(),
            source,
        })?;
        std::fs::write(&self.path, text).map_err(|source| PersistenceError::Write {
            path: self.path.clone(),
            source,
        })?;
        debug!(target: "telepwn::config", path = %self.path.display(), "Configuration written");
        Ok(())
    }

    /// Look up `section.key`. Returns `None` as soon as any segment is absent
    /// or descends into a non-table; never creates structure.
    pub fn get(&self, section: &str, key: &str) -> Result<Option<Value>, PersistenceError> {
        let doc = self.load()?;
        let mut segments = path_segments(section, key);
        let Some(first) = segments.next() else {
            return Ok(None);
        };
        let mut current = match doc.get(first) {
            Some(v) => v,
            None => return Ok(None),
        };
        for segment in segments {
            current = match current.as_table().and_then(|t| t.get(segment)) {
                Some(v) => v,
                None => return Ok(None),
            };
        }
        Ok(Some(current.clone()))
    }

    /// Convenience for boolean flags; absent or non-boolean reads as `None`.
    pub fn get_bool(&self, section: &str, key: &str) -> Result<Option<bool>, PersistenceError> {
        Ok(self.get(section, key)?.and_then(|v| v.as_bool()))
    }

    /// Coerce `raw` and store it at `section.key`, creating every missing
    /// intermediate table. Returns the stored value.
    pub fn set(&self, section: &str, key: &str, raw: &str) -> DispatchResult<ConfigValue> {
        let value = ConfigValue::coerce(raw);
        self.set_value(section, key, value.clone())?;
        Ok(value)
    }

    /// Store an already typed value at `section.key`.
    pub fn set_value(&self, section: &str, key: &str, value: ConfigValue) -> DispatchResult<()> {
        let segments: Vec<&str> = path_segments(section, key).collect();
        let invalid = || DispatchError::validation(format!("Invalid config path {section}.{key}"));
        if segments.iter().any(|s| s.is_empty()) {
            return Err(invalid());
        }
        let Some((leaf, parents)) = segments.split_last() else {
            return Err(invalid());
        };

        let mut doc = self.load()?;
        let mut current = &mut doc;
        for (depth, segment) in parents.iter().enumerate() {
            let entry = current
                .entry(segment.to_string())
                .or_insert_with(|| Value::Table(Table::new()));
            current = match entry {
                Value::Table(t) => t,
                _ => {
                    return Err(DispatchError::validation(format!(
                        "{} is a value, not a section",
                        parents[..=depth].join(".")
                    )));
                }
            };
        }
        current.insert(leaf.to_string(), value.into_toml());
        self.save(&doc)?;
        info!(target: "telepwn::config", %section, %key, "Configuration key set");
        Ok(())
    }

    /// Human-readable listing: one block per top-level section, nested keys
    /// flattened one level deep.
    pub fn render_listing(&self) -> Result<String, PersistenceError> {
        let doc = self.load()?;
        let mut out = String::from("Config sections and keys:\n");
        for (section, values) in &doc {
            let Value::Table(values) = values else {
                out.push_str(&format!("\n{section} = {values}\n"));
                continue;
            };
            out.push_str(&format!("\n[{section}]\n"));
            for (key, val) in values {
                match val {
                    Value::Table(sub) => {
                        for (subkey, subval) in sub {
                            out.push_str(&format!("  {key}.{subkey} = {subval}\n"));
                        }
                    }
                    other => out.push_str(&format!("  {key} = {other}\n")),
                }
            }
        }
        Ok(out)
    }
}

fn path_segments<'a>(section: &'a str, key: &'a str) -> impl Iterator<Item = &'a str> {
    section.split('.').chain(key.split('.'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store_with(contents: Option<&str>) -> (TempDir, ConfigStore) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        if let Some(text) = contents {
            std::fs::write(&path, text).unwrap();
        }
        (dir, ConfigStore::new(path))
    }

    #[test]
    fn coercion_precedence() {
        assert_eq!(ConfigValue::coerce("TRUE"), ConfigValue::Bool(true));
        assert_eq!(ConfigValue::coerce("false"), ConfigValue::Bool(false));
        assert_eq!(ConfigValue::coerce("42"), ConfigValue::Integer(42));
        assert_eq!(ConfigValue::coerce("-7"), ConfigValue::Integer(-7));
        assert_eq!(ConfigValue::coerce("0.5"), ConfigValue::Float(0.5));
        assert_eq!(ConfigValue::coerce("1.2.3"), ConfigValue::Text("1.2.3".into()));
        assert_eq!(ConfigValue::coerce("inf"), ConfigValue::Text("inf".into()));
        assert_eq!(ConfigValue::coerce("Hello"), ConfigValue::Text("Hello".into()));
    }

    #[test]
    fn set_then_view_returns_boolean() {
        let (_dir, store) = store_with(None);
        let stored = store.set("main.plugins.memtemp", "enabled", "true").unwrap();
        assert_eq!(stored, ConfigValue::Bool(true));
        assert_eq!(
            store.get("main.plugins.memtemp", "enabled").unwrap(),
            Some(Value::Boolean(true))
        );
    }

    #[test]
    fn deep_set_keeps_siblings() {
        let (_dir, store) = store_with(Some(
            "[main]\nname = \"pwn\"\n[main.plugins.grid]\nenabled = true\n[ui.display]\nrotation = 180\n",
        ));
        store.set("main.plugins.memtemp", "opts.scale", "2").unwrap();

        assert_eq!(
            store.get("main.plugins.memtemp", "opts.scale").unwrap(),
            Some(Value::Integer(2))
        );
        assert_eq!(store.get("main", "name").unwrap(), Some(Value::String("pwn".into())));
        assert_eq!(store.get_bool("main.plugins.grid", "enabled").unwrap(), Some(true));
        assert_eq!(store.get("ui.display", "rotation").unwrap(), Some(Value::Integer(180)));
    }

    #[test]
    fn get_never_creates_structure() {
        let (dir, store) = store_with(Some("[main]\nname = \"pwn\"\n"));
        assert_eq!(store.get("main.plugins.nope", "enabled").unwrap(), None);
        assert_eq!(store.get("main", "name.deeper").unwrap(), None);
        let text = std::fs::read_to_string(dir.path().join("config.toml")).unwrap();
        assert!(!text.contains("plugins"));
    }

    #[test]
    fn set_through_scalar_is_rejected() {
        let (_dir, store) = store_with(Some("[main]\nname = \"pwn\"\n"));
        let err = store.set("main.name", "inner", "1").unwrap_err();
        assert!(matches!(err, DispatchError::Validation(_)));
        assert_eq!(store.get("main", "name").unwrap(), Some(Value::String("pwn".into())));
    }

    #[test]
    fn corrupt_document_is_reported() {
        let (_dir, store) = store_with(Some("[main\nbroken"));
        assert!(matches!(store.get("main", "x"), Err(PersistenceError::Parse { .. })));
    }

    #[test]
    fn listing_flattens_one_level() {
        let (_dir, store) = store_with(Some(
            "[main]\nname = \"pwn\"\n[main.plugins.grid]\nenabled = true\n",
        ));
        let listing = store.render_listing().unwrap();
        assert!(listing.contains("[main]"));
        assert!(listing.contains("  name = \"pwn\""));
        assert!(listing.contains("  plugins.grid = "));
    }
}
