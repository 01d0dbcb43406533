#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc)]

/*!
Executor module for TelePwn.

This module wires together:
- `process`: subprocess seam (`ProcessRunner`) with a dry-run capable system runner
- `http`: outbound HTTP seam (`WebClient`) backed by reqwest
- `actions`: webhook execution, plugin toggles and scheduled task entry points
- `builtins`: fixed device operations (reboot, backup, logs, pwngrid, files...)
- `runtime`: the dispatcher resolving commands and button presses

Typical usage:
- Build an `ActionExecutor` from the settings, the config store, an `Outbox`
  and the two seams.
- Wrap it in a `Runtime` and feed it `Inbound` events through `serve`.

Public re-exports:
- `ActionExecutor`: performs actions against the host (respecting dry-run).
- `Runtime`: authorises, dispatches and reports.
*/

pub mod actions;
pub mod builtins;
pub mod http;
pub mod process;
pub mod runtime;

pub use actions::ActionExecutor;
pub use runtime::Runtime;
