// Hotkey toggle service

//! Global hotkey handling
//!
//! A hotkey press toggles the last successfully connected VPN (or the first
//! known one). The service is constructed explicitly with its collaborators
//! and has an explicit start/stop lifecycle; key registration itself lives
//! outside the crate and only delivers [`HotkeyEvent`]s over a channel.

use crate::controller::ConnectionController;
use crate::last_used::LastUsedStore;
use crate::refresh::{RefreshCoordinator, RefreshTrigger};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// A hotkey press delivered by the key-binding collaborator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HotkeyEvent;

/// Resolves hotkey presses to a target connection and toggles it
pub struct HotkeyToggleService {
    controller: ConnectionController,
    refresher: RefreshCoordinator,
    last_used: Arc<LastUsedStore>,
    task: Option<JoinHandle<()>>,
}

impl HotkeyToggleService {
    /// Create a stopped service
    pub fn new(
        controller: ConnectionController,
        refresher: RefreshCoordinator,
        last_used: Arc<LastUsedStore>,
    ) -> Self {
        Self {
            controller,
            refresher,
            last_used,
            task: None,
        }
    }

    /// Pick the connection a press should toggle
    ///
    /// Last used if still known, else the first known connection. Discovers
    /// first if nothing is known yet.
    pub async fn resolve_target(&self) -> Option<String> {
        let mut snapshot = self.refresher.registry().snapshot();
        if snapshot.is_empty() {
            log::debug!("No known connections, discovering before hotkey toggle");
            snapshot = self.refresher.discover().await;
        }

        let last_used = match self.last_used.load() {
            Ok(name) => name,
            Err(e) => {
                log::warn!("Failed to load last used VPN: {}", e);
                None
            }
        };

        last_used
            .filter(|name| snapshot.get(name).is_some())
            .or_else(|| snapshot.first().map(|c| c.name.clone()))
    }

    /// Handle one press; returns the toggle result (false when there is no target)
    pub async fn handle_hotkey(&self) -> bool {
        let target = match self.resolve_target().await {
            Some(target) => target,
            None => {
                log::info!("Hotkey pressed but no VPN services are known");
                return false;
            }
        };

        log::info!("Hotkey toggling '{}'", target);
        let success = self.controller.toggle(&target).await;
        self.refresher.request(RefreshTrigger::Hotkey).await;
        success
    }

    /// Start consuming hotkey events; restarts if already running
    pub fn start(&mut self, mut events: mpsc::Receiver<HotkeyEvent>) {
        self.stop();

        let service = Self::new(
            self.controller.clone(),
            self.refresher.clone(),
            self.last_used.clone(),
        );

        log::info!("Hotkey toggle service started");
        self.task = Some(tokio::spawn(async move {
            while let Some(HotkeyEvent) = events.recv().await {
                service.handle_hotkey().await;
            }
            log::debug!("Hotkey event channel closed");
        }));
    }

    /// Stop consuming events; an action already handed to the OS still completes
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            log::info!("Hotkey toggle service stopped");
        }
    }

    /// Whether the consumer task is running
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

impl Drop for HotkeyToggleService {
    fn drop(&mut self) {
        self.stop();
    }
}
