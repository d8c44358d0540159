// dtbackuptool/src/remote/ssh.rs
use async_trait::async_trait;
use russh::client::{self, Handle};
use russh::{ChannelMsg, Disconnect};
use russh_keys::key::PublicKey;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::SshConfig;
use crate::errors::{BackupError, Result};
use crate::remote::transport::{CommandOutput, Transport};

/// Accepts whatever host key the server presents. The bot connects to a
/// single known server and has no known_hosts store of its own.
struct TrustOnFirstUse {
    host: String,
}

#[async_trait]
impl client::Handler for TrustOnFirstUse {
    type Error = russh::Error;

    async fn check_server_key(&mut self, server_public_key: &PublicKey) -> std::result::Result<bool, Self::Error> {
        warn!(
            host = %self.host,
            fingerprint = %server_public_key.fingerprint(),
            "Host key verification disabled, accepting server key"
        );
        Ok(true)
    }
}

/// Dumps can run for hours without printing anything, so the session never
/// times out for inactivity and keepalives stop NAT and firewalls from
/// dropping the idle connection.
fn client_config() -> client::Config {
    client::Config {
        inactivity_timeout: None,
        keepalive_interval: Some(Duration::from_secs(60)),
        keepalive_max: 3,
        ..Default::default()
    }
}

/// SSH connection authenticated with a password.
pub struct SshTransport {
    config: SshConfig,
    connect_timeout: Duration,
    handle: Option<Handle<TrustOnFirstUse>>,
}

impl SshTransport {
    pub fn new(config: SshConfig, connect_timeout: Duration) -> Self {
        SshTransport {
            config,
            connect_timeout,
            handle: None,
        }
    }

    async fn open(&self) -> Result<Handle<TrustOnFirstUse>> {
        let client_config = Arc::new(client_config());
        let handler = TrustOnFirstUse {
            host: self.config.host.clone(),
        };

        let mut handle = client::connect(
            client_config,
            (self.config.host.as_str(), self.config.port),
            handler,
        )
        .await
        .map_err(|e| {
            BackupError::Connection(format!(
                "Failed to connect to {}:{}: {}",
                self.config.host, self.config.port, e
            ))
        })?;

        let authenticated = handle
            .authenticate_password(self.config.username.as_str(), self.config.password.as_str())
            .await
            .map_err(|e| BackupError::Connection(format!("Authentication error: {}", e)))?;

        if !authenticated {
            return Err(BackupError::Connection(format!(
                "Password authentication rejected for {}@{}",
                self.config.username, self.config.host
            )));
        }

        Ok(handle)
    }
}

#[async_trait]
impl Transport for SshTransport {
    async fn connect(&mut self) -> Result<()> {
        info!(host = %self.config.host, port = self.config.port, user = %self.config.username, "🔌 Connecting over SSH");

        let handle = match timeout(self.connect_timeout, self.open()).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(BackupError::Timeout {
                    operation: format!("SSH connection to {}", self.config.host),
                    seconds: self.connect_timeout.as_secs(),
                });
            }
        };

        self.handle = Some(handle);
        info!(host = %self.config.host, "✅ SSH session established");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_closed())
    }

    async fn exec(&mut self, command: &str) -> Result<CommandOutput> {
        let handle = self
            .handle
            .as_ref()
            .ok_or_else(|| BackupError::Connection("SSH session is not connected".to_string()))?;

        let mut channel = handle.channel_open_session().await?;
        channel.exec(true, command).await?;

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let mut exit_status = None;

        while let Some(msg) = channel.wait().await {
            match msg {
                ChannelMsg::Data { ref data } => stdout.extend_from_slice(data),
                // ext 1 is SSH_EXTENDED_DATA_STDERR
                ChannelMsg::ExtendedData { ref data, ext: 1 } => stderr.extend_from_slice(data),
                ChannelMsg::ExitStatus { exit_status: code } => exit_status = Some(code),
                _ => {}
            }
        }

        let exit_status = exit_status.unwrap_or_else(|| {
            debug!("Channel closed without an exit status, treating as failure");
            u32::MAX
        });

        Ok(CommandOutput {
            exit_status,
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
        })
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(handle) = self.handle.take() {
            debug!(host = %self.config.host, "Closing SSH session");
            if !handle.is_closed() {
                handle
                    .disconnect(Disconnect::ByApplication, "", "English")
                    .await?;
            }
        }
        Ok(())
    }
}
