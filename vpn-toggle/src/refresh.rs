// Refresh coordinator

//! Serialization and coalescing of registry refreshes
//!
//! Many triggers (UI open, hotkey, network change, post-action) ask for a
//! refresh. The coordinator guarantees that:
//!
//! - at most one discovery runs at a time, and concurrent discovery
//!   requests join the one in flight and observe its result;
//! - status-only refreshes run one after another, and every request that
//!   arrives while one runs is served by a single follow-up cycle that
//!   starts after it;
//! - per-connection status reads inside a cycle run concurrently and the
//!   cycle is published as one atomic registry update.

use crate::gateway::NetworkServiceGateway;
use crate::parser::{parse_service_list, resolve_status};
use crate::registry::{ConnectionRegistry, RegistrySnapshot};
use crate::types::{Connection, Status};
use futures_util::future::{join_all, BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// What a refresh re-reads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshKind {
    /// Re-list services and re-resolve every status
    Discovery,
    /// Re-resolve statuses of known connections only
    StatusOnly,
}

/// Events that ask for a refresh
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshTrigger {
    /// A UI surface listing connections was opened
    UiOpened,
    /// The user asked for a reload
    ExplicitReload,
    /// Global hotkey was pressed
    Hotkey,
    /// OS network configuration changed
    NetworkChanged,
    /// A connect/disconnect just finished
    PostAction,
}

impl RefreshTrigger {
    /// Cold events re-discover, everything else only re-reads statuses
    pub fn kind(&self) -> RefreshKind {
        match self {
            RefreshTrigger::UiOpened | RefreshTrigger::ExplicitReload => RefreshKind::Discovery,
            RefreshTrigger::Hotkey | RefreshTrigger::NetworkChanged | RefreshTrigger::PostAction => {
                RefreshKind::StatusOnly
            }
        }
    }
}

type SharedRefresh = Shared<BoxFuture<'static, Arc<RegistrySnapshot>>>;

/// Read and resolve one service's status; read failures become Invalid
pub async fn fetch_status(gateway: &dyn NetworkServiceGateway, name: &str) -> Status {
    match gateway.show_status(name).await {
        Ok(output) => {
            let status = resolve_status(&output);
            if status == Status::Invalid {
                log::debug!("Unrecognised status for '{}': {:?}", name, output);
            }
            status
        }
        Err(e) => {
            log::warn!("Failed to read status of '{}': {}", name, e);
            Status::Invalid
        }
    }
}

struct Inner {
    gateway: Arc<dyn NetworkServiceGateway>,
    registry: Arc<ConnectionRegistry>,
    excluded: Vec<String>,
    /// Discovery currently running, shared by every caller that asks for one
    discovery: Mutex<Option<SharedRefresh>>,
    /// Last status-only request ticket handed out
    status_requested: AtomicU64,
    /// Highest ticket covered by a finished status cycle; the lock serializes cycles
    status_completed: tokio::sync::Mutex<u64>,
}

impl Inner {
    async fn run_discovery(&self) -> Arc<RegistrySnapshot> {
        log::debug!("Starting discovery refresh");

        let mut connections = match self.gateway.list_services().await {
            Ok(output) => parse_service_list(&output, &self.excluded),
            Err(e) if e.is_launch() => {
                log::error!("Service discovery could not run: {}", e);
                Vec::new()
            }
            Err(e) => {
                log::warn!("Service discovery failed, treating as empty: {}", e);
                Vec::new()
            }
        };

        let statuses = self.fetch_all(&connections).await;
        for (conn, status) in connections.iter_mut().zip(statuses) {
            conn.status = status;
        }

        let snapshot = self.registry.replace_all(connections);
        log::info!(
            "Discovered {} VPN service(s) (any active: {})",
            snapshot.len(),
            snapshot.any_active()
        );
        snapshot
    }

    async fn run_status_cycle(&self) -> Arc<RegistrySnapshot> {
        let current = self.registry.snapshot();
        if current.is_empty() {
            log::debug!("Status refresh skipped, no known connections");
            return current;
        }

        let statuses = self.fetch_all(current.connections()).await;
        let batch: HashMap<String, Status> = current
            .connections()
            .iter()
            .map(|c| c.name.clone())
            .zip(statuses)
            .collect();

        // Entries written while we were reading (markers, discovery) win
        let snapshot = self.registry.apply_statuses(&batch, current.generation());
        log::debug!(
            "Status refresh applied (generation {}, any active: {})",
            snapshot.generation(),
            snapshot.any_active()
        );
        snapshot
    }

    /// Independent read-only status calls, run concurrently, results in input order
    async fn fetch_all(&self, connections: &[Connection]) -> Vec<Status> {
        let gateway = self.gateway.as_ref();
        join_all(
            connections
                .iter()
                .map(|conn| fetch_status(gateway, &conn.name)),
        )
        .await
    }

    fn in_flight_discovery(&self) -> Option<SharedRefresh> {
        self.discovery
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Coordinates all refreshes of the shared registry
#[derive(Clone)]
pub struct RefreshCoordinator {
    inner: Arc<Inner>,
}

impl RefreshCoordinator {
    /// Create a coordinator publishing into `registry`
    ///
    /// `excluded` names are hidden in addition to the built-in exclusions.
    pub fn new(
        gateway: Arc<dyn NetworkServiceGateway>,
        registry: Arc<ConnectionRegistry>,
        excluded: Vec<String>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                gateway,
                registry,
                excluded,
                discovery: Mutex::new(None),
                status_requested: AtomicU64::new(0),
                status_completed: tokio::sync::Mutex::new(0),
            }),
        }
    }

    /// Registry this coordinator publishes into
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.inner.registry
    }

    /// Refresh according to the trigger's policy and return the published snapshot
    pub async fn request(&self, trigger: RefreshTrigger) -> Arc<RegistrySnapshot> {
        log::debug!("Refresh requested by {:?}", trigger);
        match trigger.kind() {
            RefreshKind::Discovery => self.discover().await,
            RefreshKind::StatusOnly => self.refresh_statuses().await,
        }
    }

    /// Re-list and re-resolve everything, joining a discovery already in flight
    pub async fn discover(&self) -> Arc<RegistrySnapshot> {
        let refresh = {
            let mut slot = self
                .inner
                .discovery
                .lock()
                .unwrap_or_else(PoisonError::into_inner);

            match slot.as_ref() {
                Some(in_flight) => {
                    log::debug!("Joining discovery already in flight");
                    in_flight.clone()
                }
                None => {
                    // Runs on its own task so it completes even if every caller goes away
                    let inner = self.inner.clone();
                    let task = tokio::spawn(async move {
                        let snapshot = inner.run_discovery().await;
                        *inner.discovery.lock().unwrap_or_else(PoisonError::into_inner) = None;
                        snapshot
                    });

                    let inner = self.inner.clone();
                    let refresh = async move {
                        match task.await {
                            Ok(snapshot) => snapshot,
                            Err(e) => {
                                log::error!("Discovery task failed: {}", e);
                                *inner.discovery.lock().unwrap_or_else(PoisonError::into_inner) =
                                    None;
                                inner.registry.snapshot()
                            }
                        }
                    }
                    .boxed()
                    .shared();
                    *slot = Some(refresh.clone());
                    refresh
                }
            }
        };

        refresh.await
    }

    /// Re-read statuses of known connections, preserving identity and order
    ///
    /// Joins a discovery in flight instead, since it re-reads every status.
    pub async fn refresh_statuses(&self) -> Arc<RegistrySnapshot> {
        if let Some(discovery) = self.inner.in_flight_discovery() {
            log::debug!("Status refresh served by discovery in flight");
            return discovery.await;
        }

        let ticket = self.inner.status_requested.fetch_add(1, Ordering::SeqCst) + 1;
        let mut completed = self.inner.status_completed.lock().await;

        if *completed >= ticket {
            log::debug!("Status refresh #{} coalesced into a later cycle", ticket);
            return self.inner.registry.snapshot();
        }

        // Everything requested up to now is covered by a cycle starting now
        let covered = self.inner.status_requested.load(Ordering::SeqCst);
        let snapshot = self.inner.run_status_cycle().await;
        *completed = covered;
        snapshot
    }
}
