// Network configuration change monitor

//! Network configuration change detection
//!
//! Polls the host's interface addresses and emits a debounced
//! [`NetworkEvent::ConfigurationChanged`] whenever the set changes, so the
//! daemon can re-read VPN statuses (a VPN coming up or down adds or removes
//! a tunnel interface address).

use anyhow::{Context, Result};
use std::collections::BTreeSet;
use std::net::IpAddr;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Network event types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkEvent {
    /// Interface addresses changed and have since settled
    ConfigurationChanged,
}

/// Order-independent view of all interface addresses
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddressFingerprint(BTreeSet<(String, IpAddr)>);

impl AddressFingerprint {
    /// Build a fingerprint from (interface, address) pairs
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (String, IpAddr)>,
    {
        Self(pairs.into_iter().collect())
    }

    /// Sample the host's current interface addresses
    pub fn current() -> Result<Self> {
        let interfaces = if_addrs::get_if_addrs().context("Failed to get interface addresses")?;
        Ok(Self::from_pairs(
            interfaces.into_iter().map(|iface| {
                let ip = iface.ip();
                (iface.name, ip)
            }),
        ))
    }

    /// Number of (interface, address) pairs
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when no interface has an address
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Poll `sample` and send one event per settled change
///
/// Returns when the receiver is dropped.
pub async fn watch_changes<F>(
    mut sample: F,
    poll_interval: Duration,
    debounce: Duration,
    tx: mpsc::Sender<NetworkEvent>,
) where
    F: FnMut() -> Result<AddressFingerprint> + Send,
{
    let mut baseline = match sample() {
        Ok(fingerprint) => fingerprint,
        Err(e) => {
            log::warn!("Initial network sample failed: {}", e);
            AddressFingerprint::default()
        }
    };
    log::debug!("Network monitor baseline: {} address(es)", baseline.len());

    let mut ticker = tokio::time::interval(poll_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        let mut latest = match sample() {
            Ok(fingerprint) => fingerprint,
            Err(e) => {
                log::warn!("Failed to sample network configuration: {}", e);
                continue;
            }
        };
        if latest == baseline {
            continue;
        }

        // Wait until the address set stops moving
        loop {
            tokio::time::sleep(debounce).await;
            match sample() {
                Ok(next) if next == latest => break,
                Ok(next) => latest = next,
                Err(e) => {
                    log::warn!("Failed to sample network configuration: {}", e);
                    break;
                }
            }
        }

        if latest == baseline {
            log::debug!("Network configuration flapped back, ignoring");
            continue;
        }

        log::info!(
            "Network configuration changed ({} -> {} address(es))",
            baseline.len(),
            latest.len()
        );
        baseline = latest;

        if tx.send(NetworkEvent::ConfigurationChanged).await.is_err() {
            log::debug!("Network event receiver dropped, stopping monitor");
            return;
        }
    }
}

/// Background observer with explicit start/stop lifecycle
pub struct NetworkMonitor {
    poll_interval: Duration,
    debounce: Duration,
    task: Option<JoinHandle<()>>,
}

impl NetworkMonitor {
    /// Create a stopped monitor
    pub fn new(poll_interval: Duration, debounce: Duration) -> Self {
        Self {
            poll_interval,
            debounce,
            task: None,
        }
    }

    /// Start polling the host and sending events to `tx`; restarts if running
    pub fn start(&mut self, tx: mpsc::Sender<NetworkEvent>) {
        self.stop();
        log::info!(
            "Starting network monitor (poll every {:?}, debounce {:?})",
            self.poll_interval,
            self.debounce
        );
        self.task = Some(tokio::spawn(watch_changes(
            AddressFingerprint::current,
            self.poll_interval,
            self.debounce,
            tx,
        )));
    }

    /// Stop polling
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            log::info!("Network monitor stopped");
        }
    }

    /// Whether the polling task is alive
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

impl Drop for NetworkMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}
