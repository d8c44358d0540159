pub mod parser;

use tracing::{debug, info};

use crate::errors::{BackupError, Result};
use crate::remote::CommandRunner;

pub use parser::DatabaseRecord;

/// Ids of all clusters known to the server agent, in `rac` order.
pub async fn list_clusters(runner: &mut dyn CommandRunner, rac: &str) -> Result<Vec<String>> {
    let output = runner.run(&format!("{} cluster list", rac)).await?;
    if !output.success() {
        return Err(BackupError::InventoryQueryFailed {
            stderr: output.diagnostics(),
        });
    }

    let clusters = parser::parse_cluster_list(&output.stdout)?;
    if clusters.is_empty() {
        return Err(BackupError::NoClusterFound);
    }
    debug!(clusters = ?clusters, "Clusters found");
    Ok(clusters)
}

/// Infobases registered in the given cluster.
pub async fn list_databases(
    runner: &mut dyn CommandRunner,
    rac: &str,
    cluster_id: &str,
) -> Result<Vec<DatabaseRecord>> {
    let output = runner
        .run(&format!("{} infobase --cluster={} summary list", rac, cluster_id))
        .await?;
    if !output.success() {
        return Err(BackupError::InventoryQueryFailed {
            stderr: output.diagnostics(),
        });
    }

    let databases = parser::parse_infobase_list(&output.stdout)?;
    info!(cluster = %cluster_id, count = databases.len(), "📋 Found infobases");
    Ok(databases)
}

/// Infobases of the first cluster, which is the only one a single-server
/// installation has.
pub async fn list_first_cluster_databases(
    runner: &mut dyn CommandRunner,
    rac: &str,
) -> Result<Vec<DatabaseRecord>> {
    let clusters = list_clusters(runner, rac).await?;
    list_databases(runner, rac, &clusters[0]).await
}
