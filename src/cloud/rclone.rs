// dtbackuptool/src/cloud/rclone.rs
use async_trait::async_trait;
use std::time::Duration;
use tracing::{info, warn};

use crate::backup::dump::file_stem;
use crate::cloud::link::normalize_share_link;
use crate::cloud::{CloudArtifact, CloudPublisher};
use crate::config::CloudConfig;
use crate::errors::{BackupError, Result};
use crate::remote::{CommandOutput, CommandRunner, quote_path};

/// Uploads through the `rclone` binary installed on the platform host.
///
/// Each database gets its own folder `<remote>:<base>/<db>` that holds only
/// the latest dump: the folder is purged before every upload.
#[derive(Debug, Clone)]
pub struct RcloneUploader {
    remote: String,
    base_path: String,
    upload_timeout: Duration,
}

impl RcloneUploader {
    pub fn new(config: &CloudConfig, upload_timeout: Duration) -> Self {
        RcloneUploader {
            remote: config.remote.clone(),
            base_path: config.base_path.clone(),
            upload_timeout,
        }
    }

    /// Same name sanitizing as the dump file, so one database never maps to
    /// a folder nested inside another's.
    pub fn folder_for(&self, database: &str) -> String {
        let name = file_stem(database);
        if self.base_path.is_empty() {
            format!("{}:{}", self.remote, name)
        } else {
            format!("{}:{}/{}", self.remote, self.base_path, name)
        }
    }

    async fn step(
        runner: &mut dyn CommandRunner,
        step: &str,
        command: &str,
        limit: Option<Duration>,
    ) -> Result<CommandOutput> {
        let result = match limit {
            Some(limit) => runner.run_for(command, limit).await,
            None => runner.run(command).await,
        };
        result.map_err(|e| BackupError::UploadFailed {
            step: step.to_string(),
            stderr: e.to_string(),
        })
    }

    async fn required_step(
        runner: &mut dyn CommandRunner,
        step: &str,
        command: &str,
        limit: Option<Duration>,
    ) -> Result<CommandOutput> {
        let output = Self::step(runner, step, command, limit).await?;
        if !output.success() {
            return Err(BackupError::UploadFailed {
                step: step.to_string(),
                stderr: output.diagnostics(),
            });
        }
        Ok(output)
    }
}

#[async_trait]
impl CloudPublisher for RcloneUploader {
    async fn publish(
        &self,
        runner: &mut dyn CommandRunner,
        local_path: &str,
        database: &str,
    ) -> Result<CloudArtifact> {
        let folder = self.folder_for(database);
        let file_name = local_path.rsplit('/').next().unwrap_or(local_path);
        let cloud_path = format!("{}/{}", folder, file_name);
        info!(database = %database, folder = %folder, "☁️ Uploading dump");

        // The folder does not exist on the first upload, so purge may fail.
        let purge = Self::step(runner, "purge", &format!("rclone purge {}", quote_path(&folder)), None).await?;
        if !purge.success() {
            warn!(folder = %folder, error = %purge.diagnostics(), "rclone purge failed, continuing");
        }

        Self::required_step(runner, "mkdir", &format!("rclone mkdir {}", quote_path(&folder)), None).await?;

        Self::required_step(
            runner,
            "copy",
            &format!("rclone copy {} {}", quote_path(local_path), quote_path(&folder)),
            Some(self.upload_timeout),
        )
        .await?;

        let link_output =
            Self::required_step(runner, "link", &format!("rclone link {}", quote_path(&cloud_path)), None).await?;
        let share_link = link_output.stdout.trim();
        if share_link.is_empty() {
            return Err(BackupError::UploadFailed {
                step: "link".to_string(),
                stderr: "rclone link printed no link".to_string(),
            });
        }

        // The dump is safely in the cloud; free the space on the host.
        match runner.run(&format!("rm -f {}", quote_path(local_path))).await {
            Ok(output) if output.success() => {}
            Ok(output) => warn!(path = %local_path, error = %output.diagnostics(), "Failed to delete uploaded dump"),
            Err(e) => warn!(path = %local_path, error = %e, "Failed to delete uploaded dump"),
        }

        let link = normalize_share_link(share_link);
        info!(database = %database, link = %link, "✅ Dump published");
        Ok(CloudArtifact { cloud_path, link })
    }
}
