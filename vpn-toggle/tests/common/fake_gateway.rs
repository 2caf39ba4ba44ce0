//! In-process stand-in for the `networksetup` gateway.
//!
//! Keeps a per-service status table, prints listings and statuses in the
//! same text format as the real tool, and counts every call so tests can
//! assert how often the OS was consulted. Connect/disconnect flip the
//! stored status unless actions are configured to have no effect.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use vpn_toggle::gateway::{GatewayError, NetworkServiceGateway};
use vpn_toggle::types::Status;

struct FakeService {
    name: String,
    port: String,
    device: String,
    status: Status,
}

#[derive(Default)]
pub struct FakeGateway {
    services: Mutex<Vec<FakeService>>,

    pub list_calls: AtomicUsize,
    pub status_calls: AtomicUsize,
    pub connect_calls: AtomicUsize,
    pub disconnect_calls: AtomicUsize,

    list_delay_ms: AtomicUsize,
    status_delay_ms: AtomicUsize,
    /// Extra status-read delay for individual services
    slow_services: Mutex<HashMap<String, Duration>>,

    /// List call fails because the binary cannot be launched
    pub fail_launch: AtomicBool,
    /// List call runs but exits nonzero
    pub fail_list: AtomicBool,
    /// Status reads exit nonzero
    pub fail_status: AtomicBool,
    /// Connect/disconnect commands exit nonzero (state untouched)
    pub fail_actions: AtomicBool,
    /// Connect/disconnect succeed but the OS does not change state
    pub ignore_actions: AtomicBool,
    /// Connecting one service drops every other connected one
    pub exclusive: AtomicBool,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a service at the end of the service order
    pub fn with_service(self, name: &str, port: &str, status: Status) -> Self {
        self.add_service(name, port, status);
        self
    }

    pub fn add_service(&self, name: &str, port: &str, status: Status) {
        self.services.lock().unwrap().push(FakeService {
            name: name.to_string(),
            port: port.to_string(),
            device: String::new(),
            status,
        });
    }

    pub fn remove_service(&self, name: &str) {
        self.services.lock().unwrap().retain(|s| s.name != name);
    }

    pub fn set_status(&self, name: &str, status: Status) {
        if let Some(service) = self.services.lock().unwrap().iter_mut().find(|s| s.name == name) {
            service.status = status;
        }
    }

    pub fn status(&self, name: &str) -> Option<Status> {
        self.services
            .lock()
            .unwrap()
            .iter()
            .find(|s| s.name == name)
            .map(|s| s.status)
    }

    pub fn set_list_delay(&self, delay: Duration) {
        self.list_delay_ms
            .store(delay.as_millis() as usize, Ordering::SeqCst);
    }

    pub fn set_status_delay(&self, delay: Duration) {
        self.status_delay_ms
            .store(delay.as_millis() as usize, Ordering::SeqCst);
    }

    pub fn set_status_delay_for(&self, name: &str, delay: Duration) {
        self.slow_services
            .lock()
            .unwrap()
            .insert(name.to_string(), delay);
    }

    pub fn calls(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    fn execution(operation: &'static str, detail: &str) -> GatewayError {
        GatewayError::Execution {
            program: "fake-networksetup".to_string(),
            operation,
            detail: detail.to_string(),
        }
    }

    async fn delay(millis: &AtomicUsize) {
        let millis = millis.load(Ordering::SeqCst) as u64;
        if millis > 0 {
            tokio::time::sleep(Duration::from_millis(millis)).await;
        }
    }

    fn render_listing(&self) -> String {
        let services = self.services.lock().unwrap();
        let mut out =
            String::from("An asterisk (*) denotes that a network service is disabled.\n");
        for (index, service) in services.iter().enumerate() {
            out.push_str(&format!(
                "({}) {}\n(Hardware Port: {}, Device: {})\n\n",
                index + 1,
                service.name,
                service.port,
                service.device
            ));
        }
        out
    }
}

#[async_trait]
impl NetworkServiceGateway for FakeGateway {
    async fn list_services(&self) -> Result<String, GatewayError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        Self::delay(&self.list_delay_ms).await;

        if self.fail_launch.load(Ordering::SeqCst) {
            return Err(GatewayError::Launch {
                program: "fake-networksetup".to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
            });
        }
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(Self::execution("list", "exit status 1: permission denied"));
        }
        Ok(self.render_listing())
    }

    async fn show_status(&self, name: &str) -> Result<String, GatewayError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        Self::delay(&self.status_delay_ms).await;
        let extra = self.slow_services.lock().unwrap().get(name).copied();
        if let Some(extra) = extra {
            tokio::time::sleep(extra).await;
        }

        if self.fail_status.load(Ordering::SeqCst) {
            return Err(Self::execution("status", "exit status 1: no such service"));
        }
        match self.status(name) {
            Some(status) if status != Status::Invalid => Ok(status.as_str().to_string()),
            Some(_) => Ok("garbage".to_string()),
            None => Err(Self::execution("status", "unknown service")),
        }
    }

    async fn connect(&self, name: &str) -> Result<(), GatewayError> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);

        if self.fail_actions.load(Ordering::SeqCst) {
            return Err(Self::execution("connect", "exit status 1: refused"));
        }
        if self.ignore_actions.load(Ordering::SeqCst) {
            return Ok(());
        }

        let exclusive = self.exclusive.load(Ordering::SeqCst);
        for service in self.services.lock().unwrap().iter_mut() {
            if service.name == name {
                service.status = Status::Connected;
            } else if exclusive && service.status == Status::Connected {
                service.status = Status::Disconnected;
            }
        }
        Ok(())
    }

    async fn disconnect(&self, name: &str) -> Result<(), GatewayError> {
        self.disconnect_calls.fetch_add(1, Ordering::SeqCst);

        if self.fail_actions.load(Ordering::SeqCst) {
            return Err(Self::execution("disconnect", "exit status 1: refused"));
        }
        if !self.ignore_actions.load(Ordering::SeqCst) {
            self.set_status(name, Status::Disconnected);
        }
        Ok(())
    }
}
