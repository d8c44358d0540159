// dtbackuptool/src/backup/executor.rs
use chrono::Utc;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::backup::dump::{
    BackupJob, DumpCommand, HOST_KILL_AFTER_SECS, cleanup_command, stopped_by_host_limit, verify_command,
};
use crate::backup::guard::BackupGuard;
use crate::cloud::{CloudArtifact, CloudPublisher};
use crate::config::DumpCredentials;
use crate::errors::{BackupError, Result};
use crate::remote::{CommandRunner, RemoteSession, Transport};

/// Lifecycle of one backup job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupStage {
    Requested,
    Reserved,
    Dumping,
    Verifying,
    CleaningUp,
    Succeeded,
    Failed,
}

impl fmt::Display for BackupStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BackupStage::Requested => "requested",
            BackupStage::Reserved => "reserved",
            BackupStage::Dumping => "dumping",
            BackupStage::Verifying => "verifying",
            BackupStage::CleaningUp => "cleaning-up",
            BackupStage::Succeeded => "succeeded",
            BackupStage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Extra local wait on top of the dump limit, so the host's `timeout` has
/// stopped ibcmd before the data directory is removed.
const HOST_STOP_GRACE: Duration = Duration::from_secs(HOST_KILL_AFTER_SECS + 30);

fn enter(stage: BackupStage) {
    debug!(stage = %stage, "Backup stage");
}

/// Dumps one infobase on the remote host and hands the file to the cloud
/// publisher, holding the database's guard reservation for the whole run.
pub struct BackupExecutor {
    guard: BackupGuard,
    credentials: DumpCredentials,
    publisher: Arc<dyn CloudPublisher>,
    dump_timeout: Duration,
}

impl BackupExecutor {
    pub fn new(
        guard: BackupGuard,
        credentials: DumpCredentials,
        publisher: Arc<dyn CloudPublisher>,
        dump_timeout: Duration,
    ) -> Self {
        BackupExecutor {
            guard,
            credentials,
            publisher,
            dump_timeout,
        }
    }

    /// Runs the whole pipeline. The reservation is taken before anything
    /// touches the host and is released after the final outcome is known,
    /// including when this future is dropped midway.
    pub async fn run<T: Transport>(
        &self,
        session: &mut RemoteSession<T>,
        database: &str,
    ) -> Result<CloudArtifact> {
        enter(BackupStage::Requested);
        let Some(lease) = self.guard.acquire(database) else {
            info!(database = %database, "⏳ Backup already in progress, request rejected");
            return Err(BackupError::BackupAlreadyInProgress(database.to_string()));
        };
        enter(BackupStage::Reserved);

        let outcome = self.run_reserved(session, database).await;
        match &outcome {
            Ok(artifact) => {
                enter(BackupStage::Succeeded);
                info!(database = %database, link = %artifact.link, "✅ Backup completed");
            }
            Err(e) => {
                enter(BackupStage::Failed);
                error!(database = %database, error = %e, "❌ Backup failed");
            }
        }

        drop(lease);
        outcome
    }

    async fn run_reserved<T: Transport>(
        &self,
        session: &mut RemoteSession<T>,
        database: &str,
    ) -> Result<CloudArtifact> {
        let ibcmd = session.ensure_platform().await?.ibcmd();
        let backup_dir = session.backup_dir()?.to_string();
        let job = BackupJob::new(&backup_dir, database, Utc::now());

        let span = info_span!("backup", job = %job.id, database = %job.database);
        async move {
            let dumped = self.dump_and_verify(session, &ibcmd, &job).await;

            enter(BackupStage::CleaningUp);
            match session.run(&cleanup_command(&job.data_dir)).await {
                Ok(output) if output.success() => {}
                Ok(output) => warn!(data_dir = %job.data_dir, error = %output.diagnostics(), "Failed to remove temporary data directory"),
                Err(e) => warn!(data_dir = %job.data_dir, error = %e, "Failed to remove temporary data directory"),
            }
            dumped?;

            self.publisher
                .publish(session, &job.dump_path, &job.database)
                .await
        }
        .instrument(span)
        .await
    }

    async fn dump_and_verify<T: Transport>(
        &self,
        session: &mut RemoteSession<T>,
        ibcmd: &str,
        job: &BackupJob,
    ) -> Result<()> {
        enter(BackupStage::Dumping);
        let command = DumpCommand::new(ibcmd, &self.credentials, job).with_time_limit(self.dump_timeout);
        info!(command = %command.redacted(), "💾 Starting dump");

        let local_wait = self.dump_timeout + HOST_STOP_GRACE.min(self.dump_timeout);
        let output = match session.run_for(&command.command_line(), local_wait).await {
            Err(BackupError::Timeout { .. }) => return Err(self.dump_timed_out()),
            result => result?,
        };
        if stopped_by_host_limit(output.exit_status) {
            return Err(self.dump_timed_out());
        }

        enter(BackupStage::Verifying);
        if !output.success() {
            return Err(BackupError::CommandFailed {
                stderr: output.diagnostics(),
            });
        }

        let check = session.run(&verify_command(&job.dump_path)).await?;
        if check.stdout.trim() != "exists" {
            return Err(BackupError::FileVerificationFailed(job.dump_path.clone()));
        }

        info!(path = %job.dump_path, "✓ Dump file verified");
        Ok(())
    }

    fn dump_timed_out(&self) -> BackupError {
        BackupError::Timeout {
            operation: "Infobase dump".to_string(),
            seconds: self.dump_timeout.as_secs(),
        }
    }
}
