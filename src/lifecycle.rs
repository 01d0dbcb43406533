//! Engine start/stop and the single-instance rule.
//!
//! At most one engine runs per process. Installing a new engine stops the
//! previous one first (listener, dispatcher and scheduler), and a stop
//! request carrying a superseded instance id does nothing, so a late
//! shutdown from an old generation can never take down its replacement.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, Result};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{ConfigStore, Settings};
use crate::executor::http::WebClient;
use crate::executor::process::ProcessRunner;
use crate::executor::runtime::COMMANDS;
use crate::executor::{ActionExecutor, Runtime};
use crate::menu;
use crate::sources::{Inbound, Outbox, Reply, Transport};

const INBOUND_QUEUE: usize = 64;

/// A running engine.
pub struct EngineHandle {
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl EngineHandle {
    pub fn new(cancel: CancellationToken, tasks: Vec<JoinHandle<()>>) -> Self {
        Self { cancel, tasks }
    }

    /// Cancel every task and wait for each to finish.
    pub async fn stop(self) {
        self.cancel.cancel();
        for task in self.tasks {
            if let Err(e) = task.await {
                error!(target: "telepwn::lifecycle", error = %e, "Engine task failed");
            }
        }
    }
}

/// Holds the current engine and hands out instance ids.
#[derive(Default)]
pub struct InstanceSlot {
    current: Mutex<Option<(u64, EngineHandle)>>,
    next_id: AtomicU64,
}

impl InstanceSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop whatever is running, then start a new engine with `start`.
    /// The slot stays locked throughout, so two installs never overlap.
    pub async fn install<F, Fut>(&self, start: F) -> Result<u64>
    where
        F: FnOnce(u64) -> Fut,
        Fut: Future<Output = Result<EngineHandle>>,
    {
        let mut current = self.current.lock().await;
        if let Some((old_id, old)) = current.take() {
            info!(target: "telepwn::lifecycle", instance = old_id, "Stopping previous instance");
            old.stop().await;
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let handle = start(id).await?;
        *current = Some((id, handle));
        info!(target: "telepwn::lifecycle", instance = id, "Instance started");
        Ok(id)
    }

    /// Stop instance `id` if it is still the current one. Returns whether
    /// anything was stopped.
    pub async fn release(&self, id: u64) -> bool {
        let mut current = self.current.lock().await;
        match current.as_ref() {
            Some((live, _)) if *live == id => {}
            Some((live, _)) => {
                warn!(target: "telepwn::lifecycle", requested = id, live = *live, "Ignoring stop for superseded instance");
                return false;
            }
            None => return false,
        }
        if let Some((_, handle)) = current.take() {
            handle.stop().await;
        }
        info!(target: "telepwn::lifecycle", instance = id, "Instance stopped");
        true
    }

    pub async fn current(&self) -> Option<u64> {
        self.current.lock().await.as_ref().map(|(id, _)| *id)
    }
}

/// Wire one engine together and start it: transport listener, dispatcher
/// (which owns the scheduler), command list and the online notice.
pub async fn launch(
    settings: Arc<Settings>,
    config: ConfigStore,
    transport: Arc<dyn Transport>,
    runner: Arc<dyn ProcessRunner>,
    web: Arc<dyn WebClient>,
) -> Result<EngineHandle> {
    let chat_id = settings
        .chat_id
        .as_i64()
        .context("chat_id is not a numeric chat identifier")?;
    let outbox = Outbox::new(transport.clone(), chat_id, settings.max_message_len);
    let executor = Arc::new(ActionExecutor::new(
        settings.clone(),
        config.clone(),
        outbox.clone(),
        runner,
        web,
    ));
    let runtime = Runtime::new(settings, config, outbox.clone(), executor);

    let cancel = CancellationToken::new();
    let (tx, rx) = mpsc::channel::<Inbound>(INBOUND_QUEUE);
    let listener = transport.start(tx, cancel.child_token());
    debug!(target: "telepwn::lifecycle", transport = transport.name(), "Listener started");

    if let Err(e) = transport.announce_commands(COMMANDS).await {
        warn!(target: "telepwn::lifecycle", error = %format!("{e:#}"), "Failed to publish command list");
    }
    outbox
        .deliver(&Reply::notice(format!("{}\nTelePwn is online.", menu::BANNER)).with_keyboard(menu::initial_menu()))
        .await;

    let dispatcher = tokio::spawn(runtime.serve(rx, cancel.child_token()));
    Ok(EngineHandle::new(cancel, vec![listener, dispatcher]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{CHAT, Harness};

    fn idle_engine() -> EngineHandle {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let task = tokio::spawn(async move { token.cancelled().await });
        EngineHandle::new(cancel, vec![task])
    }

    #[tokio::test]
    async fn stale_release_is_a_no_op() {
        let slot = InstanceSlot::new();
        let first = slot.install(|_| async { Ok(idle_engine()) }).await.unwrap();
        let second = slot.install(|_| async { Ok(idle_engine()) }).await.unwrap();
        assert_ne!(first, second);

        assert!(!slot.release(first).await);
        assert_eq!(slot.current().await, Some(second));
        assert!(slot.release(second).await);
        assert_eq!(slot.current().await, None);
        assert!(!slot.release(second).await);
    }

    #[tokio::test]
    async fn install_stops_previous_instance_first() {
        let slot = InstanceSlot::new();
        let cancel = CancellationToken::new();
        let observed = cancel.clone();
        let token = cancel.clone();
        let task = tokio::spawn(async move { token.cancelled().await });
        slot.install(move |_| async move { Ok(EngineHandle::new(cancel, vec![task])) })
            .await
            .unwrap();

        let seen = observed.clone();
        slot.install(move |_| async move {
            assert!(seen.is_cancelled());
            Ok(idle_engine())
        })
        .await
        .unwrap();
        assert!(observed.is_cancelled());
    }

    #[tokio::test]
    async fn failed_start_leaves_slot_empty() {
        let slot = InstanceSlot::new();
        slot.install(|_| async { Ok(idle_engine()) }).await.unwrap();
        let result = slot
            .install(|_| async { Err(anyhow::anyhow!("no token")) })
            .await;
        assert!(result.is_err());
        assert_eq!(slot.current().await, None);
    }

    #[tokio::test]
    async fn launch_announces_and_greets() {
        let h = Harness::new();
        let engine = launch(
            h.settings.clone(),
            h.config.clone(),
            h.transport.clone(),
            h.runner.clone(),
            h.web.clone(),
        )
        .await
        .unwrap();

        assert!(h.transport.commands().contains(&"webhook".to_string()));
        let messages = h.transport.messages();
        assert!(messages[0].ends_with("TelePwn is online."));
        assert_eq!(h.transport.last_keyboard(), menu::initial_menu());
        assert_eq!(h.settings.chat_id.as_i64(), Some(CHAT));

        engine.stop().await;
    }
}
