#![allow(dead_code)]

pub mod fake_gateway;

use fake_gateway::FakeGateway;
use log::LevelFilter;
use std::sync::Arc;
use std::time::Duration;
use vpn_toggle::controller::ConnectionController;
use vpn_toggle::hotkey::HotkeyToggleService;
use vpn_toggle::last_used::LastUsedStore;
use vpn_toggle::refresh::RefreshCoordinator;
use vpn_toggle::registry::ConnectionRegistry;

/// Logs appear with `-- --nocapture` or when a test fails
pub fn init_logging() {
    let _ = env_logger::Builder::from_default_env()
        .filter_level(LevelFilter::Debug)
        .is_test(true)
        .try_init();
}

/// Fully wired engine on top of a fake gateway
pub struct Harness {
    pub gateway: Arc<FakeGateway>,
    pub registry: Arc<ConnectionRegistry>,
    pub refresher: RefreshCoordinator,
    pub controller: ConnectionController,
    pub last_used: Arc<LastUsedStore>,
    _settings_dir: tempfile::TempDir,
}

impl Harness {
    pub fn new(gateway: FakeGateway, settle_delay: Duration) -> Self {
        init_logging();

        let settings_dir = tempfile::tempdir().expect("temp dir");
        let gateway = Arc::new(gateway);
        let registry = Arc::new(ConnectionRegistry::new());
        let refresher = RefreshCoordinator::new(gateway.clone(), registry.clone(), Vec::new());
        let last_used = Arc::new(LastUsedStore::new(
            settings_dir.path().join("settings.toml"),
        ));
        let controller = ConnectionController::new(
            gateway.clone(),
            refresher.clone(),
            last_used.clone(),
            settle_delay,
        );

        Self {
            gateway,
            registry,
            refresher,
            controller,
            last_used,
            _settings_dir: settings_dir,
        }
    }

    pub fn hotkey(&self) -> HotkeyToggleService {
        HotkeyToggleService::new(
            self.controller.clone(),
            self.refresher.clone(),
            self.last_used.clone(),
        )
    }
}
