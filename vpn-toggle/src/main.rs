// VPN Toggle CLI and daemon

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::{broadcast, mpsc};
use vpn_toggle::{
    config::{default_config_path, load_config, load_config_or_default},
    controller::ConnectionController,
    gateway::{NetworkServiceGateway, NetworkSetupGateway},
    hotkey::{HotkeyEvent, HotkeyToggleService},
    last_used::{default_settings_path, LastUsedStore},
    network_monitor::{NetworkEvent, NetworkMonitor},
    refresh::{fetch_status, RefreshCoordinator, RefreshTrigger},
    registry::ConnectionRegistry,
    snapshot_file,
    types::Config,
};

/// Size of the channel buffer for network events
const NETWORK_EVENT_CHANNEL_SIZE: usize = 32;

/// Size of the channel buffer for hotkey presses
const HOTKEY_EVENT_CHANNEL_SIZE: usize = 8;

#[derive(Parser)]
#[command(name = "vpn-toggle")]
#[command(about = "Discover, inspect and toggle system VPN connections", long_about = None)]
struct Args {
    /// Path to configuration file (default: <config_dir>/vpn-toggle/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List VPN services and their status
    List,
    /// Show the status of one VPN service
    Status {
        /// Service name as shown by `list`
        name: String,
    },
    /// Connect a VPN service
    Connect {
        /// Service name as shown by `list`
        name: String,
    },
    /// Disconnect a VPN service
    Disconnect {
        /// Service name as shown by `list`
        name: String,
    },
    /// Toggle a VPN service, or the last used one when no name is given
    Toggle {
        /// Service name as shown by `list`
        name: Option<String>,
    },
    /// Run as a daemon: follow network changes, toggle on SIGUSR1
    Watch,
}

/// Everything the commands need, wired once
struct App {
    config: Config,
    gateway: Arc<dyn NetworkServiceGateway>,
    refresher: RefreshCoordinator,
    controller: ConnectionController,
    last_used: Arc<LastUsedStore>,
}

impl App {
    fn new(config: Config) -> Result<Self> {
        let gateway: Arc<dyn NetworkServiceGateway> =
            Arc::new(NetworkSetupGateway::new(&config.gateway.networksetup_path));
        let registry = Arc::new(ConnectionRegistry::new());
        let refresher = RefreshCoordinator::new(
            gateway.clone(),
            registry,
            config.general.excluded_services.clone(),
        );

        let settings_path = match &config.storage.settings_file {
            Some(path) => path.clone(),
            None => default_settings_path()?,
        };
        log::debug!("Using settings file {:?}", settings_path);
        let last_used = Arc::new(LastUsedStore::new(settings_path));

        let controller = ConnectionController::new(
            gateway.clone(),
            refresher.clone(),
            last_used.clone(),
            Duration::from_millis(config.general.settle_delay_ms),
        );

        Ok(Self {
            config,
            gateway,
            refresher,
            controller,
            last_used,
        })
    }

    fn hotkey_service(&self) -> HotkeyToggleService {
        HotkeyToggleService::new(
            self.controller.clone(),
            self.refresher.clone(),
            self.last_used.clone(),
        )
    }

    /// Discover and fail with a useful message if `name` is not a VPN service
    async fn require_known(&self, name: &str) -> Result<()> {
        let snapshot = self.refresher.request(RefreshTrigger::ExplicitReload).await;
        if snapshot.get(name).is_none() {
            anyhow::bail!("Unknown VPN service '{}'", name);
        }
        Ok(())
    }
}

fn main() -> Result<()> {
    // Build custom Tokio runtime with limited thread pool
    // 2 threads: 1 for the main loop, 1 for process spawns and monitors
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .thread_name("vpn-toggle")
        .thread_stack_size(2 * 1024 * 1024)
        .enable_time()
        .enable_io()
        .build()?;

    let success = runtime.block_on(async_main())?;
    if !success {
        std::process::exit(1);
    }
    Ok(())
}

async fn async_main() -> Result<bool> {
    let args = Args::parse();

    // Load configuration
    let config = match &args.config {
        Some(path) => load_config(path)
            .with_context(|| format!("Failed to load config from {:?}", path))?,
        None => {
            let path = default_config_path()?;
            load_config_or_default(&path)
                .with_context(|| format!("Failed to load config from {:?}", path))?
        }
    };

    // Initialize logging
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(&config.general.log_level),
    )
    .init();

    let app = App::new(config)?;

    match args.command {
        Command::List => {
            let snapshot = app.refresher.request(RefreshTrigger::UiOpened).await;
            if snapshot.is_empty() {
                println!("No VPN services found");
            }
            for conn in snapshot.connections() {
                println!("{}\t{}\t{}", conn.name, conn.hardware_port, conn.status);
            }
            Ok(true)
        }
        Command::Status { name } => {
            let status = fetch_status(app.gateway.as_ref(), &name).await;
            println!("{}", status);
            Ok(true)
        }
        Command::Connect { name } => {
            app.require_known(&name).await?;
            Ok(report(&name, "connect", app.controller.connect(&name).await))
        }
        Command::Disconnect { name } => {
            app.require_known(&name).await?;
            Ok(report(&name, "disconnect", app.controller.disconnect(&name).await))
        }
        Command::Toggle { name: Some(name) } => {
            app.require_known(&name).await?;
            Ok(report(&name, "toggle", app.controller.toggle(&name).await))
        }
        Command::Toggle { name: None } => {
            // Same target selection as a hotkey press
            let target = match app.hotkey_service().resolve_target().await {
                Some(target) => target,
                None => anyhow::bail!("No VPN services found"),
            };
            let success = app.controller.toggle(&target).await;
            Ok(report(&target, "toggle", success))
        }
        Command::Watch => {
            run_daemon(app).await?;
            Ok(true)
        }
    }
}

fn report(name: &str, action: &str, success: bool) -> bool {
    if success {
        println!("{} '{}': ok", action, name);
    } else {
        eprintln!("{} '{}': no change", action, name);
    }
    success
}

async fn run_daemon(app: App) -> Result<()> {
    log::info!("Starting VPN toggle daemon");

    let state_file = app.config.general.state_file.clone();
    let mut updates = app.refresher.registry().subscribe();

    // Initial discovery
    let snapshot = app.refresher.request(RefreshTrigger::UiOpened).await;
    if let Some(path) = &state_file {
        if let Err(e) = snapshot_file::write_snapshot(path, &snapshot) {
            log::warn!("Failed to write state file: {}", e);
        }
    }

    // Network change observer
    let (network_tx, mut network_rx) = mpsc::channel::<NetworkEvent>(NETWORK_EVENT_CHANNEL_SIZE);
    let mut network_monitor = NetworkMonitor::new(
        Duration::from_millis(app.config.watch.poll_interval_ms),
        Duration::from_millis(app.config.watch.debounce_ms),
    );
    network_monitor.start(network_tx);

    // Hotkey presses arrive as SIGUSR1
    let (hotkey_tx, hotkey_rx) = mpsc::channel::<HotkeyEvent>(HOTKEY_EVENT_CHANNEL_SIZE);
    let mut hotkey = app.hotkey_service();
    hotkey.start(hotkey_rx);

    // Set up signal handlers
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
        .context("Failed to set up SIGTERM handler")?;
    let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())
        .context("Failed to set up SIGINT handler")?;
    let mut sigusr1 = signal::unix::signal(signal::unix::SignalKind::user_defined1())
        .context("Failed to set up SIGUSR1 handler")?;
    let mut sighup = signal::unix::signal(signal::unix::SignalKind::hangup())
        .context("Failed to set up SIGHUP handler")?;

    log::info!("Daemon started successfully");

    // Main event loop
    loop {
        tokio::select! {
            // Shutdown signals
            _ = sigterm.recv() => {
                log::info!("Received SIGTERM");
                break;
            }
            _ = sigint.recv() => {
                log::info!("Received SIGINT");
                break;
            }

            _ = sigusr1.recv() => {
                log::debug!("Received SIGUSR1, forwarding hotkey press");
                if hotkey_tx.try_send(HotkeyEvent).is_err() {
                    log::warn!("Hotkey press dropped, previous presses still pending");
                }
            }

            _ = sighup.recv() => {
                log::info!("Received SIGHUP, re-discovering VPN services");
                let refresher = app.refresher.clone();
                tokio::spawn(async move {
                    refresher.request(RefreshTrigger::ExplicitReload).await;
                });
            }

            Some(event) = network_rx.recv() => {
                match event {
                    NetworkEvent::ConfigurationChanged => {
                        log::info!("Network event: configuration changed");
                        let refresher = app.refresher.clone();
                        tokio::spawn(async move {
                            refresher.request(RefreshTrigger::NetworkChanged).await;
                        });
                    }
                }
            }

            update = updates.recv() => {
                match update {
                    Ok(snapshot) => {
                        if let Some(path) = &state_file {
                            if let Err(e) = snapshot_file::write_snapshot(path, &snapshot) {
                                log::warn!("Failed to write state file: {}", e);
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        log::debug!("Skipped {} registry update(s)", skipped);
                        if let Some(path) = &state_file {
                            let latest = app.refresher.registry().snapshot();
                            if let Err(e) = snapshot_file::write_snapshot(path, &latest) {
                                log::warn!("Failed to write state file: {}", e);
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        anyhow::bail!("Registry update channel closed");
                    }
                }
            }
        }
    }

    // Cleanup
    log::info!("Shutting down...");
    hotkey.stop();
    network_monitor.stop();

    if let Some(path) = &state_file {
        snapshot_file::cleanup(path);
    }

    log::info!("Shutdown complete");
    Ok(())
}
