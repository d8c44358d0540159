// dtbackuptool/src/config/mod.rs
use anyhow::{Context, Result};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

const DEFAULT_SSH_PORT: u16 = 22;
const DEFAULT_PLATFORM_BASE: &str = "/opt/1cv8";
const DEFAULT_PLATFORM_ARCH: &str = "x86_64";
const DEFAULT_AGENT_PROCESS: &str = "ragent";
const DEFAULT_BACKUP_DIR_NAME: &str = "dump_1s_dt";
const DEFAULT_CONNECT_SECS: u64 = 30;
const DEFAULT_COMMAND_SECS: u64 = 120;
const DEFAULT_DUMP_SECS: u64 = 4 * 60 * 60;
const DEFAULT_UPLOAD_SECS: u64 = 4 * 60 * 60;

// Structs for deserializing config.json
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JsonSshConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct JsonPlatformConfig {
    pub base_path: Option<String>,
    pub arch: Option<String>,
    pub agent_process: Option<String>,
    pub backup_dir_name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct JsonDatabaseConfig {
    pub server: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct JsonPlatformUserConfig {
    pub user: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct JsonCloudConfig {
    pub remote: Option<String>,
    pub base_path: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct JsonTimeouts {
    pub connect_secs: Option<u64>,
    pub command_secs: Option<u64>,
    pub dump_secs: Option<u64>,
    pub upload_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawJsonConfig {
    #[serde(default)]
    pub ssh: JsonSshConfig,
    #[serde(default)]
    pub platform: JsonPlatformConfig,
    #[serde(default)]
    pub database: JsonDatabaseConfig,
    #[serde(default)]
    pub platform_user: JsonPlatformUserConfig,
    #[serde(default)]
    pub cloud: JsonCloudConfig,
    #[serde(default)]
    pub timeouts: JsonTimeouts,
}

// Application's internal configuration structs
#[derive(Debug, Clone)]
pub struct SshConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct PlatformConfig {
    pub base_path: String,
    pub arch: String,
    pub agent_process: String,
    pub backup_dir_name: String,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        PlatformConfig {
            base_path: DEFAULT_PLATFORM_BASE.to_string(),
            arch: DEFAULT_PLATFORM_ARCH.to_string(),
            agent_process: DEFAULT_AGENT_PROCESS.to_string(),
            backup_dir_name: DEFAULT_BACKUP_DIR_NAME.to_string(),
        }
    }
}

/// Credentials handed to `ibcmd infobase dump`.
#[derive(Debug, Clone)]
pub struct DumpCredentials {
    pub db_server: String,
    pub db_user: String,
    pub db_password: String,
    pub platform_user: String,
    pub platform_password: String,
}

#[derive(Debug, Clone)]
pub struct CloudConfig {
    pub remote: String,
    pub base_path: String,
}

#[derive(Debug, Clone, Copy)]
pub struct Timeouts {
    pub connect: Duration,
    pub command: Duration,
    pub dump: Duration,
    pub upload: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Timeouts {
            connect: Duration::from_secs(DEFAULT_CONNECT_SECS),
            command: Duration::from_secs(DEFAULT_COMMAND_SECS),
            dump: Duration::from_secs(DEFAULT_DUMP_SECS),
            upload: Duration::from_secs(DEFAULT_UPLOAD_SECS),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub ssh: SshConfig,
    pub platform: PlatformConfig,
    pub credentials: DumpCredentials,
    pub cloud: CloudConfig,
    pub timeouts: Timeouts,
}

impl AppConfig {
    /// Reads `config.json`, then lets environment variables (including ones
    /// loaded from `.env`) override individual values.
    pub fn load_from_json(config_path: &Path) -> Result<Self> {
        let config_content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file at {}", config_path.display()))?;
        let mut raw_json_config: RawJsonConfig = serde_json::from_str(&config_content)
            .with_context(|| {
                format!(
                    "Failed to parse JSON from config file at {}",
                    config_path.display()
                )
            })?;

        apply_env_overrides(&mut raw_json_config, |key| env::var(key).ok());
        Self::from_raw(raw_json_config)
    }

    /// Builds the configuration from environment variables alone, for hosts
    /// that carry no `config.json`.
    pub fn load_from_env() -> Result<Self> {
        let mut raw_json_config = RawJsonConfig::default();
        apply_env_overrides(&mut raw_json_config, |key| env::var(key).ok());
        Self::from_raw(raw_json_config)
    }

    pub fn from_raw(raw: RawJsonConfig) -> Result<Self> {
        let ssh = SshConfig {
            host: required(raw.ssh.host, "ssh.host (SSH_HOST)")?,
            port: raw.ssh.port.unwrap_or(DEFAULT_SSH_PORT),
            username: required(raw.ssh.username, "ssh.username (SSH_USERNAME)")?,
            password: required(raw.ssh.password, "ssh.password (SSH_PASSWORD)")?,
        };

        let defaults = PlatformConfig::default();
        let platform = PlatformConfig {
            base_path: non_empty(raw.platform.base_path)
                .map(|p| p.trim_end_matches('/').to_string())
                .unwrap_or(defaults.base_path),
            arch: non_empty(raw.platform.arch).unwrap_or(defaults.arch),
            agent_process: non_empty(raw.platform.agent_process).unwrap_or(defaults.agent_process),
            backup_dir_name: non_empty(raw.platform.backup_dir_name).unwrap_or(defaults.backup_dir_name),
        };

        let credentials = DumpCredentials {
            db_server: required(raw.database.server, "database.server (DB_SERVER)")?,
            db_user: required(raw.database.user, "database.user (DB_USER)")?,
            db_password: required(raw.database.password, "database.password (DB_PASSWORD)")?,
            platform_user: required(raw.platform_user.user, "platform_user.user (PLATFORM_USER)")?,
            // An empty platform password is legitimate for infobases without authentication.
            platform_password: raw.platform_user.password.unwrap_or_default(),
        };

        let cloud = CloudConfig {
            remote: required(raw.cloud.remote, "cloud.remote (RCLONE_REMOTE)")?
                .trim_end_matches(':')
                .to_string(),
            base_path: required(raw.cloud.base_path, "cloud.base_path (RCLONE_PATH)")?
                .trim_matches('/')
                .to_string(),
        };

        let default_timeouts = Timeouts::default();
        let timeouts = Timeouts {
            connect: raw.timeouts.connect_secs.map(Duration::from_secs).unwrap_or(default_timeouts.connect),
            command: raw.timeouts.command_secs.map(Duration::from_secs).unwrap_or(default_timeouts.command),
            dump: raw.timeouts.dump_secs.map(Duration::from_secs).unwrap_or(default_timeouts.dump),
            upload: raw.timeouts.upload_secs.map(Duration::from_secs).unwrap_or(default_timeouts.upload),
        };

        Ok(AppConfig {
            ssh,
            platform,
            credentials,
            cloud,
            timeouts,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

fn required(value: Option<String>, name: &str) -> Result<String> {
    non_empty(value).with_context(|| format!("{} must be set in config.json or the environment", name))
}

/// Overwrites values in `raw` with the matching environment variables.
fn apply_env_overrides<F>(raw: &mut RawJsonConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let set = |slot: &mut Option<String>, key: &str| {
        if let Some(value) = lookup(key).filter(|v| !v.is_empty()) {
            *slot = Some(value);
        }
    };

    set(&mut raw.ssh.host, "SSH_HOST");
    set(&mut raw.ssh.username, "SSH_USERNAME");
    set(&mut raw.ssh.password, "SSH_PASSWORD");
    set(&mut raw.database.server, "DB_SERVER");
    set(&mut raw.database.user, "DB_USER");
    set(&mut raw.database.password, "DB_PASSWORD");
    set(&mut raw.platform_user.user, "PLATFORM_USER");
    set(&mut raw.platform_user.password, "PLATFORM_PASSWORD");
    set(&mut raw.cloud.remote, "RCLONE_REMOTE");
    set(&mut raw.cloud.base_path, "RCLONE_PATH");

    if let Some(port) = lookup("SSH_PORT").and_then(|p| p.parse::<u16>().ok()) {
        raw.ssh.port = Some(port);
    }
}
