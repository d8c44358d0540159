//! Publishing finished dumps to cloud storage.

pub mod link;
pub mod rclone;

use async_trait::async_trait;

use crate::errors::Result;
use crate::remote::CommandRunner;

pub use link::normalize_share_link;
pub use rclone::RcloneUploader;

/// Where a dump ended up and how to download it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloudArtifact {
    pub cloud_path: String,
    pub link: String,
}

/// Moves a dump that already sits on the remote host into cloud storage.
/// Commands go through `runner`, so the upload happens host-side.
#[async_trait]
pub trait CloudPublisher: Send + Sync {
    async fn publish(
        &self,
        runner: &mut dyn CommandRunner,
        local_path: &str,
        database: &str,
    ) -> Result<CloudArtifact>;
}
