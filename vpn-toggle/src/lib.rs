// VPN Toggle Library
// Shared modules for the daemon, the CLI and tests

#![warn(missing_docs)]

//! VPN Toggle Library
//!
//! This library discovers the system's configured VPN services, resolves
//! their connection status, and connects/disconnects them on demand, keeping
//! a shared registry consistent under concurrent refreshes and actions.
//!
//! # Main Components
//!
//! - [`config`]: Configuration file parsing and validation
//! - [`controller`]: Connect/disconnect/toggle with optimistic state and verification
//! - [`gateway`]: OS command gateway (`networksetup`) behind a trait
//! - [`hotkey`]: Global hotkey toggle of the last used VPN
//! - [`last_used`]: Persistence of the last successfully connected VPN
//! - [`network_monitor`]: Network configuration change detection
//! - [`parser`]: Service-list and status output parsing
//! - [`refresh`]: Serialized, coalesced registry refreshes
//! - [`registry`]: Shared connection registry with atomic snapshots
//! - [`snapshot_file`]: Registry export for external monitoring
//! - [`state`]: Action planning for connection commands
//! - [`types`]: Shared data structures

pub mod config;
pub mod controller;
pub mod gateway;
pub mod hotkey;
pub mod last_used;
pub mod network_monitor;
pub mod parser;
pub mod refresh;
pub mod registry;
pub mod snapshot_file;
pub mod state;
pub mod types;
