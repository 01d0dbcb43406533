//! Configuration module for telepwn.
//!
//! Two different documents are handled here:
//! - the daemon's own [`Settings`] (models + loader), read once per engine start;
//! - the host device configuration, edited through [`ConfigStore`] by dotted path.
//!
//! Example:
//! use telepwn::config::{load_from_path, ConfigStore};
//!
//! let settings = load_from_path("/etc/pwnagotchi/config.toml")?;
//! let store = ConfigStore::new("/etc/pwnagotchi/config.toml");

pub mod loader;
pub mod models;
pub mod store;

pub use models::{ChatId, Settings};
pub use store::{ConfigStore, ConfigValue};

pub use loader::{
    SETTINGS_SECTION, generate_schema, load_from_path, load_from_path_async, load_from_str,
    validate_settings,
};
