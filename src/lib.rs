#![forbid(unsafe_code)]
#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc)]

//! TelePwn: remote control of an unattended device from a single chat.
//!
//! The crate organizes the daemon into cohesive modules:
//! - `config`: daemon settings (models, loader, schema) and the editable device configuration.
//! - `registry`: durable webhook and schedule tables.
//! - `executor`: process/HTTP seams, device actions and the command dispatcher.
//! - `scheduler`: the background loop firing scheduled tasks.
//! - `sources`: transports (Telegram, console) and the outbound reply path.
//! - `lifecycle`: engine start/stop under the single-instance rule.
//! - `utils`: placeholder interpolation and text helpers.
//!
//! Use `telepwn::prelude::*` to bring commonly used items into scope quickly.

/// Public module: settings and device configuration.
pub mod config;
pub mod confirm;
pub mod error;
/// Public module: execution engine (seams, actions, dispatcher).
pub mod executor;
pub mod lifecycle;
pub mod menu;
pub mod plugins;
pub mod registry;
pub mod scheduler;
/// Public module: transports and the outbox.
pub mod sources;
/// Public module: utilities (interpolation, text).
pub mod utils;

#[cfg(test)]
pub(crate) mod testing;

/// Crate-level constants for consumers that want to inspect package metadata at runtime.
pub const PKG_NAME: &str = env!("CARGO_PKG_NAME");
pub const PKG_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Returns the crate version (e.g., "0.1.0").
#[inline]
pub const fn version() -> &'static str {
    PKG_VERSION
}

fn parse_level(s: &str) -> Option<tracing::Level> {
    use tracing::Level;
    match s.to_lowercase().as_str() {
        "trace" => Some(Level::TRACE),
        "debug" => Some(Level::DEBUG),
        "info" => Some(Level::INFO),
        "warn" | "warning" => Some(Level::WARN),
        "error" => Some(Level::ERROR),
        _ => None,
    }
}

/// Initialize tracing (logging).
/// - `level` wins when given, then the `RUST_LOG` environment variable.
/// - Falls back to `info` level.
///
/// Safe to call multiple times; subsequent calls are no-ops.
pub fn init_tracing(level: Option<&str>) {
    let level = level
        .and_then(parse_level)
        .or_else(|| std::env::var("RUST_LOG").ok().as_deref().and_then(parse_level))
        .unwrap_or(tracing::Level::INFO);

    // Ignore the error if the global subscriber was already set.
    let _ = tracing_subscriber::fmt().with_max_level(level).try_init();
}

/// A convenient set of exports for most consumers.
///
/// Bring this into scope with:
/// `use telepwn::prelude::*;`
pub mod prelude {
    // Common result/error handling
    pub use anyhow::{Context, Error, Result, anyhow, bail, ensure};
    pub use crate::error::{DispatchError, DispatchResult};

    // Serialization
    pub use serde::{Deserialize, Serialize};

    // Tracing macros
    pub use tracing::{debug, error, info, instrument, trace, warn};

    // Timing helpers
    pub use std::time::Duration;
    pub use tokio::time::sleep;

    pub use crate as telepwn;

    // Frequently used internal modules
    pub use crate::{config, executor, lifecycle, registry, sources, utils};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_names_parse() {
        assert_eq!(parse_level("WARNING"), Some(tracing::Level::WARN));
        assert_eq!(parse_level("loud"), None);
    }
}
