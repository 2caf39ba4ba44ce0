// Network service gateway (OS command boundary)

//! OS command execution for VPN services
//!
//! This module defines the [`NetworkServiceGateway`] contract used by the
//! rest of the crate and the default implementation that drives the macOS
//! `networksetup` tool. The gateway only returns raw text; interpretation is
//! left to [`crate::parser`].

use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Output;
use thiserror::Error;
use tokio::process::Command;

/// Failure of a single gateway call
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The command could not be started (missing binary, permissions)
    #[error("failed to launch {program}: {source}")]
    Launch {
        /// Binary that was run
        program: String,
        /// Spawn failure from the OS
        #[source]
        source: std::io::Error,
    },

    /// The command ran but its result is unusable (nonzero exit, stderr
    /// diagnostics, undecodable or empty output)
    #[error("{program} {operation} failed: {detail}")]
    Execution {
        /// Binary that was run
        program: String,
        /// Gateway call (`list`, `status`, `connect`, `disconnect`)
        operation: &'static str,
        /// Exit status and diagnostics
        detail: String,
    },

    /// The service name cannot be passed safely to the command line
    #[error("invalid service name '{name}': {reason}")]
    InvalidName {
        /// Rejected name
        name: String,
        /// Why it was rejected
        reason: &'static str,
    },
}

impl GatewayError {
    /// Whether the command never started
    pub fn is_launch(&self) -> bool {
        matches!(self, GatewayError::Launch { .. })
    }
}

/// Asynchronous boundary to the OS network stack
///
/// Every call is a suspension point; implementations must not block the
/// runtime. Unexpected but decodable text is returned as-is.
#[async_trait]
pub trait NetworkServiceGateway: Send + Sync {
    /// Enumerate all configured network services (non-empty on success)
    async fn list_services(&self) -> Result<String, GatewayError>;

    /// Single-word status for one named service
    async fn show_status(&self, name: &str) -> Result<String, GatewayError>;

    /// Ask the OS to connect; success only means the request was accepted
    async fn connect(&self, name: &str) -> Result<(), GatewayError>;

    /// Ask the OS to disconnect
    async fn disconnect(&self, name: &str) -> Result<(), GatewayError>;
}

/// Validates that a service name is safe to hand to `networksetup`.
///
/// No shell is involved, so spaces and punctuation are fine; control
/// characters and a leading hyphen (which would be read as a flag) are not.
///
/// # Errors
///
/// Returns [`GatewayError::InvalidName`] if the name is empty, starts with
/// `-`, or contains control characters.
pub fn validate_service_name(name: &str) -> Result<(), GatewayError> {
    let invalid = |reason| GatewayError::InvalidName {
        name: name.to_string(),
        reason,
    };

    if name.trim().is_empty() {
        return Err(invalid("name cannot be empty"));
    }

    if name.starts_with('-') {
        return Err(invalid("name cannot start with '-'"));
    }

    if name.chars().any(char::is_control) {
        return Err(invalid("name cannot contain control characters"));
    }

    Ok(())
}

/// Gateway backed by `/usr/sbin/networksetup`
pub struct NetworkSetupGateway {
    program: PathBuf,
}

impl NetworkSetupGateway {
    /// Create a gateway that runs the given `networksetup` binary
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Path of the binary this gateway runs
    pub fn program(&self) -> &std::path::Path {
        &self.program
    }

    fn program_name(&self) -> String {
        self.program.display().to_string()
    }

    /// Run the binary with the given arguments and collect its output
    async fn run(&self, args: &[&str]) -> Result<Output, GatewayError> {
        log::debug!("Running {} {}", self.program_name(), args.join(" "));

        Command::new(&self.program)
            .args(args)
            .kill_on_drop(false)
            .output()
            .await
            .map_err(|source| GatewayError::Launch {
                program: self.program_name(),
                source,
            })
    }

    /// Turn process output into trimmed stdout, per the gateway error rules
    #[doc(hidden)]
    pub fn interpret_output(
        program: &str,
        operation: &'static str,
        output: &Output,
        allow_empty: bool,
    ) -> Result<String, GatewayError> {
        let execution = |detail: String| GatewayError::Execution {
            program: program.to_string(),
            operation,
            detail,
        };

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

        if !output.status.success() {
            let code = output
                .status
                .code()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "signal".to_string());
            return Err(execution(format!("exit status {}: {}", code, stderr)));
        }

        let stdout = String::from_utf8(output.stdout.clone())
            .map_err(|_| execution("output is not valid UTF-8".to_string()))?;
        let stdout = stdout.trim().to_string();

        if stdout.is_empty() && !allow_empty {
            if stderr.is_empty() {
                return Err(execution("empty output".to_string()));
            }
            return Err(execution(stderr));
        }

        if !stderr.is_empty() {
            log::debug!("{} {} stderr: {}", program, operation, stderr);
        }

        Ok(stdout)
    }

    async fn run_service_action(
        &self,
        flag: &str,
        operation: &'static str,
        name: &str,
    ) -> Result<(), GatewayError> {
        validate_service_name(name)?;
        let output = self.run(&[flag, name]).await?;
        Self::interpret_output(&self.program_name(), operation, &output, true)?;
        Ok(())
    }
}

#[async_trait]
impl NetworkServiceGateway for NetworkSetupGateway {
    async fn list_services(&self) -> Result<String, GatewayError> {
        let output = self.run(&["-listnetworkserviceorder"]).await?;
        Self::interpret_output(&self.program_name(), "list", &output, false)
    }

    async fn show_status(&self, name: &str) -> Result<String, GatewayError> {
        validate_service_name(name)?;
        let output = self.run(&["-showpppoestatus", name]).await?;
        Self::interpret_output(&self.program_name(), "status", &output, false)
    }

    async fn connect(&self, name: &str) -> Result<(), GatewayError> {
        log::info!("Requesting connect for service: {}", name);
        self.run_service_action("-connectpppoeservice", "connect", name)
            .await
    }

    async fn disconnect(&self, name: &str) -> Result<(), GatewayError> {
        log::info!("Requesting disconnect for service: {}", name);
        self.run_service_action("-disconnectpppoeservice", "disconnect", name)
            .await
    }
}
