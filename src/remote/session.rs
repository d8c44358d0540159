// dtbackuptool/src/remote/session.rs
use async_trait::async_trait;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::PlatformConfig;
use crate::errors::{BackupError, Result};
use crate::remote::platform::{PlatformLocation, agent_listing_command, extract_platform_version};
use crate::remote::transport::{CommandOutput, CommandRunner, Transport, quote_path};

/// One authenticated connection to the platform host plus what was learned
/// about the host while setting it up. Owned by a single request.
pub struct RemoteSession<T: Transport> {
    transport: T,
    platform_config: PlatformConfig,
    platform: Option<PlatformLocation>,
    backup_dir: Option<String>,
    command_timeout: Duration,
}

impl<T: Transport> RemoteSession<T> {
    pub fn new(transport: T, platform_config: PlatformConfig, command_timeout: Duration) -> Self {
        RemoteSession {
            transport,
            platform_config,
            platform: None,
            backup_dir: None,
            command_timeout,
        }
    }

    /// Connects, detects the platform version and prepares the backup
    /// directory. A missing platform agent does not fail the connection; it
    /// leaves the tool paths unresolved.
    pub async fn connect(&mut self) -> Result<()> {
        self.platform = None;
        self.backup_dir = None;

        self.transport.connect().await?;

        match self.detect_platform().await {
            Ok(Some(version)) => info!(version = %version, "🔍 Detected platform version"),
            Ok(None) => warn!(
                agent = %self.platform_config.agent_process,
                "Platform agent process not found, rac/ibcmd paths are unresolved"
            ),
            Err(e) => warn!(error = %e, "Platform detection failed"),
        }

        self.prepare_backup_dir().await?;
        Ok(())
    }

    /// Reconnects only when there is no live connection.
    pub async fn ensure_ready(&mut self) -> Result<()> {
        if self.transport.is_connected() && self.backup_dir.is_some() {
            return Ok(());
        }
        self.connect().await
    }

    /// Like [`ensure_ready`](Self::ensure_ready) but also retries platform
    /// detection once on a live connection before giving up.
    pub async fn ensure_platform(&mut self) -> Result<&PlatformLocation> {
        self.ensure_ready().await?;
        if self.platform.is_none() {
            self.detect_platform().await?;
        }
        self.platform.as_ref().ok_or(BackupError::PlatformNotDetected)
    }

    /// Scans the process list for the agent. Returns the detected version,
    /// or `None` when no version token was found.
    pub async fn detect_platform(&mut self) -> Result<Option<String>> {
        let command = agent_listing_command(&self.platform_config.agent_process);
        let listing = self.run(&command).await?;
        // grep exits 1 when nothing matched; that is "not found", not an error.
        let version = extract_platform_version(&listing.stdout);
        self.platform = version
            .as_deref()
            .map(|v| PlatformLocation::new(&self.platform_config, v));
        Ok(version)
    }

    async fn prepare_backup_dir(&mut self) -> Result<()> {
        let home = self.run("echo $HOME").await?;
        let home_dir = home.stdout.trim().trim_end_matches('/').to_string();
        if !home.success() || home_dir.is_empty() {
            return Err(BackupError::CommandFailed {
                stderr: format!("Could not resolve remote home directory: {}", home.diagnostics()),
            });
        }

        let backup_dir = format!("{}/{}", home_dir, self.platform_config.backup_dir_name);
        let mkdir = self.run(&format!("mkdir -p {}", quote_path(&backup_dir))).await?;
        if !mkdir.success() {
            return Err(BackupError::CommandFailed {
                stderr: format!("Failed to create {}: {}", backup_dir, mkdir.diagnostics()),
            });
        }

        debug!(backup_dir = %backup_dir, "Backup directory ready");
        self.backup_dir = Some(backup_dir);
        Ok(())
    }

    pub fn platform(&self) -> Result<&PlatformLocation> {
        self.platform.as_ref().ok_or(BackupError::PlatformNotDetected)
    }

    pub fn rac_path(&self) -> Result<String> {
        self.platform().map(PlatformLocation::rac)
    }

    pub fn ibcmd_path(&self) -> Result<String> {
        self.platform().map(PlatformLocation::ibcmd)
    }

    /// Detects again if the version is not known yet on this connection.
    pub async fn platform_version(&mut self) -> Result<String> {
        Ok(self.ensure_platform().await?.version().to_string())
    }

    pub fn backup_dir(&self) -> Result<&str> {
        self.backup_dir
            .as_deref()
            .ok_or_else(|| BackupError::Connection("Session is not connected".to_string()))
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    /// Idempotent.
    pub async fn close(&mut self) -> Result<()> {
        self.backup_dir = None;
        self.transport.close().await
    }
}

/// Name of the program a command line starts with, for logs and errors.
/// Never includes arguments since those may carry passwords.
pub(crate) fn program_name(command: &str) -> &str {
    let program = command.split_whitespace().next().unwrap_or("command");
    program.rsplit('/').next().unwrap_or(program)
}

#[async_trait]
impl<T: Transport> CommandRunner for RemoteSession<T> {
    async fn run(&mut self, command: &str) -> Result<CommandOutput> {
        let limit = self.command_timeout;
        self.run_for(command, limit).await
    }

    async fn run_for(&mut self, command: &str, limit: Duration) -> Result<CommandOutput> {
        let program = program_name(command);
        debug!(program = %program, "Running remote command");

        match timeout(limit, self.transport.exec(command)).await {
            Ok(result) => {
                let output = result?;
                debug!(program = %program, exit_status = output.exit_status, "Remote command finished");
                Ok(output)
            }
            Err(_) => Err(BackupError::Timeout {
                operation: format!("Remote command '{}'", program),
                seconds: limit.as_secs(),
            }),
        }
    }
}
