// VPN connection controller

//! Connect/disconnect/toggle with optimistic state and verification
//!
//! Each action reads the current status, publishes an optimistic marker,
//! issues the OS command, waits a settle interval and re-reads the status.
//! The resolved status is always written back, whatever the outcome, and a
//! status-only refresh follows since one OS action can affect other
//! services too.
//!
//! Action bodies run on their own tokio task. A caller that stops waiting
//! only abandons the observation: the command, the settle wait and the
//! registry write still complete.

use crate::gateway::NetworkServiceGateway;
use crate::last_used::LastUsedStore;
use crate::refresh::{fetch_status, RefreshCoordinator, RefreshTrigger};
use crate::registry::ConnectionRegistry;
use crate::state::{self, ConnectionCommand, StateAction};
use crate::types::Status;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Removes a name from the in-flight set when the action ends
struct InFlightGuard {
    busy: Arc<Mutex<HashSet<String>>>,
    name: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.busy
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.name);
    }
}

struct Inner {
    gateway: Arc<dyn NetworkServiceGateway>,
    registry: Arc<ConnectionRegistry>,
    refresher: RefreshCoordinator,
    last_used: Arc<LastUsedStore>,
    settle_delay: Duration,
    busy: Arc<Mutex<HashSet<String>>>,
}

impl Inner {
    /// Claim `name` for one action; `None` if an action is already outstanding
    fn claim(&self, name: &str) -> Option<InFlightGuard> {
        let mut busy = self.busy.lock().unwrap_or_else(PoisonError::into_inner);
        if !busy.insert(name.to_string()) {
            return None;
        }
        Some(InFlightGuard {
            busy: self.busy.clone(),
            name: name.to_string(),
        })
    }

    /// Fresh status read, also written to the registry
    async fn current_status(&self, name: &str) -> Status {
        let status = fetch_status(self.gateway.as_ref(), name).await;
        self.registry.set_status(name, status);
        status
    }

    async fn execute(&self, name: &str, cmd: ConnectionCommand) -> bool {
        let _guard = match self.claim(name) {
            Some(guard) => guard,
            None => {
                log::warn!("{:?} on '{}' rejected: another action is in progress", cmd, name);
                return false;
            }
        };

        let previous = self.current_status(name).await;
        let action = state::plan(previous, cmd);
        let marker = match state::optimistic_status(action) {
            Some(marker) => marker,
            None => {
                log::info!("{:?} on '{}' is a no-op (status: {})", cmd, name, previous);
                return false;
            }
        };

        self.registry.set_status(name, marker);

        let issued = match action {
            StateAction::Connect => self.gateway.connect(name).await,
            StateAction::Disconnect => self.gateway.disconnect(name).await,
            StateAction::None => Ok(()),
        };
        if let Err(e) = &issued {
            // Still settle and re-read: the OS may have acted anyway
            log::error!("{:?} command for '{}' failed: {}", action, name, e);
        }

        tokio::time::sleep(self.settle_delay).await;

        let resolved = fetch_status(self.gateway.as_ref(), name).await;
        self.registry.set_status(name, resolved);

        let success = state::action_succeeded(action, previous, resolved);
        if success {
            log::info!("{:?} '{}' succeeded ({} -> {})", action, name, previous, resolved);
        } else {
            log::warn!(
                "{:?} '{}' did not take effect ({} -> {})",
                action,
                name,
                previous,
                resolved
            );
        }

        if success && action == StateAction::Connect {
            if let Err(e) = self.last_used.save(name) {
                log::warn!("Failed to remember last used VPN '{}': {}", name, e);
            }
        }

        self.refresher.request(RefreshTrigger::PostAction).await;
        success
    }
}

/// Orchestrates connect/disconnect against the OS
#[derive(Clone)]
pub struct ConnectionController {
    inner: Arc<Inner>,
}

impl ConnectionController {
    /// Create a controller
    pub fn new(
        gateway: Arc<dyn NetworkServiceGateway>,
        refresher: RefreshCoordinator,
        last_used: Arc<LastUsedStore>,
        settle_delay: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                gateway,
                registry: refresher.registry().clone(),
                refresher,
                last_used,
                settle_delay,
                busy: Arc::new(Mutex::new(HashSet::new())),
            }),
        }
    }

    /// Whether an action on `name` is currently outstanding
    pub fn is_busy(&self, name: &str) -> bool {
        self.inner
            .busy
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(name)
    }

    /// Connect `name`; true iff it was not connected before and is connected after settling
    pub async fn connect(&self, name: &str) -> bool {
        self.run(name, ConnectionCommand::Connect).await
    }

    /// Disconnect `name`; true iff it was connected before and is not after settling
    ///
    /// The OS command is issued for any status except Disconnected, so a
    /// pending connect or an unreadable service can still be brought down.
    pub async fn disconnect(&self, name: &str) -> bool {
        self.run(name, ConnectionCommand::Disconnect).await
    }

    /// Connected/Connecting -> disconnect, Disconnected/Invalid -> connect,
    /// Disconnecting -> no-op
    pub async fn toggle(&self, name: &str) -> bool {
        self.run(name, ConnectionCommand::Toggle).await
    }

    async fn run(&self, name: &str, cmd: ConnectionCommand) -> bool {
        let inner = self.inner.clone();
        let name = name.to_string();

        // Detached task: dropping this future does not cancel the action
        let handle = tokio::spawn(async move { inner.execute(&name, cmd).await });

        match handle.await {
            Ok(success) => success,
            Err(e) => {
                log::error!("{:?} task failed: {}", cmd, e);
                false
            }
        }
    }
}
