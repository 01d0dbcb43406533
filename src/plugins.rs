//! Installed extensions and their enabled flags.
//!
//! The configuration document is the source of truth. The catalog keeps the
//! result of the last scan and may be stale until the next [`refresh`].
//!
//! [`refresh`]: PluginCatalog::refresh

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use tracing::{debug, error, warn};

use crate::config::ConfigStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginEntry {
    pub name: String,
    pub enabled: bool,
}

#[derive(Debug)]
pub struct PluginCatalog {
    dirs: Vec<PathBuf>,
    config: ConfigStore,
    cached: Vec<PluginEntry>,
}

impl PluginCatalog {
    pub fn new(dirs: Vec<PathBuf>, config: ConfigStore) -> Self {
        Self {
            dirs,
            config,
            cached: Vec::new(),
        }
    }

    /// Rescan the extension directories and reread every enabled flag.
    pub fn refresh(&mut self) -> &[PluginEntry] {
        let names = scan(&self.dirs);
        let plugins = match self.config.load() {
            Ok(doc) => doc
                .get("main")
                .and_then(|m| m.get("plugins"))
                .and_then(|p| p.as_table())
                .cloned()
                .unwrap_or_default(),
            Err(e) => {
                warn!(target: "telepwn::plugins", error = %e, "Failed to load plugin states");
                Default::default()
            }
        };
        self.cached = names
            .into_iter()
            .map(|name| {
                let enabled = plugins
                    .get(&name)
                    .and_then(|p| p.get("enabled"))
                    .and_then(|e| e.as_bool())
                    .unwrap_or(false);
                PluginEntry { name, enabled }
            })
            .collect();
        debug!(target: "telepwn::plugins", count = self.cached.len(), "Plugin catalog refreshed");
        &self.cached
    }

    /// Last scan result, or a fresh scan when nothing has been cached yet.
    pub fn list(&mut self) -> &[PluginEntry] {
        if self.cached.is_empty() {
            self.refresh();
        }
        &self.cached
    }

    /// Checks the cache first and rescans once on a miss.
    pub fn contains(&mut self, name: &str) -> bool {
        if self.cached.iter().any(|p| p.name == name) {
            return true;
        }
        self.refresh().iter().any(|p| p.name == name)
    }

    /// Record a state change made elsewhere without rescanning.
    pub fn note_state(&mut self, name: &str, enabled: bool) {
        if let Some(entry) = self.cached.iter_mut().find(|p| p.name == name) {
            entry.enabled = enabled;
        }
    }
}

/// Module names (`*.py` minus `__init__.py`) across all directories, sorted.
fn scan(dirs: &[PathBuf]) -> BTreeSet<String> {
    let mut names = BTreeSet::new();
    for dir in dirs {
        if let Err(e) = scan_dir(dir, &mut names) {
            error!(target: "telepwn::plugins", dir = %dir.display(), error = %e, "Failed to scan");
        }
    }
    names
}

fn scan_dir(dir: &Path, names: &mut BTreeSet<String>) -> std::io::Result<()> {
    if !dir.exists() {
        return Ok(());
    }
    for entry in std::fs::read_dir(dir)? {
        let file_name = entry?.file_name();
        let file_name = file_name.to_string_lossy();
        if file_name == "__init__.py" {
            continue;
        }
        if let Some(name) = file_name.strip_suffix(".py")
            && !name.is_empty()
        {
            names.insert(name.to_string());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn scan_merges_dirs_and_reads_states() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("default");
        let b = dir.path().join("custom");
        std::fs::create_dir_all(&a).unwrap();
        std::fs::create_dir_all(&b).unwrap();
        for f in ["grid.py", "__init__.py", "readme.md"] {
            std::fs::write(a.join(f), "").unwrap();
        }
        std::fs::write(b.join("memtemp.py"), "").unwrap();
        std::fs::write(b.join("grid.py"), "").unwrap();
        let config_path = dir.path().join("config.toml");
        std::fs::write(&config_path, "[main.plugins.grid]\nenabled = true\n").unwrap();

        let mut catalog = PluginCatalog::new(
            vec![a, b, dir.path().join("absent")],
            ConfigStore::new(config_path),
        );
        let listed = catalog.refresh().to_vec();
        assert_eq!(
            listed,
            vec![
                PluginEntry { name: "grid".into(), enabled: true },
                PluginEntry { name: "memtemp".into(), enabled: false },
            ]
        );
        assert!(catalog.contains("memtemp"));
        assert!(!catalog.contains("readme"));

        catalog.note_state("memtemp", true);
        assert!(catalog.list()[1].enabled);
    }
}
