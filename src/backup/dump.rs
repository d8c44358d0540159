// dtbackuptool/src/backup/dump.rs
use chrono::{DateTime, Utc};
use std::time::Duration;
use uuid::Uuid;

use crate::config::DumpCredentials;
use crate::remote::{quote_arg, quote_path};

const REDACTED: &str = "******";

/// Seconds coreutils `timeout` waits after TERM before sending KILL.
pub const HOST_KILL_AFTER_SECS: u64 = 30;

/// A single dump of one infobase, from reservation to release.
#[derive(Debug, Clone)]
pub struct BackupJob {
    pub id: Uuid,
    pub database: String,
    pub dump_path: String,
    pub data_dir: String,
    pub started_at: DateTime<Utc>,
}

impl BackupJob {
    pub fn new(backup_dir: &str, database: &str, started_at: DateTime<Utc>) -> Self {
        let stem = file_stem(database);
        BackupJob {
            id: Uuid::new_v4(),
            database: database.to_string(),
            dump_path: format!("{}/{}", backup_dir, dump_file_name(database, started_at)),
            data_dir: format!("{}/data_{}", backup_dir, stem),
            started_at,
        }
    }
}

/// Database names end up in file and folder names; path separators would
/// escape the backup directory.
pub fn file_stem(database: &str) -> String {
    database.replace(['/', '\\'], "_")
}

/// `<db>_<YYYYMMDD_HHMMSS>.dt`, UTC.
pub fn dump_file_name(database: &str, at: DateTime<Utc>) -> String {
    format!("{}_{}.dt", file_stem(database), at.format("%Y%m%d_%H%M%S"))
}

/// `ibcmd infobase dump` invocation for a job.
pub struct DumpCommand<'a> {
    ibcmd: &'a str,
    credentials: &'a DumpCredentials,
    job: &'a BackupJob,
    time_limit: Option<Duration>,
}

impl<'a> DumpCommand<'a> {
    pub fn new(ibcmd: &'a str, credentials: &'a DumpCredentials, job: &'a BackupJob) -> Self {
        DumpCommand {
            ibcmd,
            credentials,
            job,
            time_limit: None,
        }
    }

    /// Runs ibcmd under coreutils `timeout` so the host stops the dump
    /// itself once `limit` is spent, even if nobody waits for it any more.
    pub fn with_time_limit(mut self, limit: Duration) -> Self {
        self.time_limit = Some(limit);
        self
    }

    fn args(&self, redact: bool) -> Vec<String> {
        let secret = |value: &str| if redact { REDACTED.to_string() } else { value.to_string() };
        let mut args = Vec::new();
        if let Some(limit) = self.time_limit {
            args.extend([
                "timeout".to_string(),
                format!("--kill-after={}", HOST_KILL_AFTER_SECS),
                // `timeout 0` would disable the limit
                limit.as_secs().max(1).to_string(),
            ]);
        }
        args.extend([
            self.ibcmd.to_string(),
            "infobase".to_string(),
            "dump".to_string(),
            "--dbms=PostgreSQL".to_string(),
            format!("--db-server={}", self.credentials.db_server),
            format!("--db-user={}", self.credentials.db_user),
            format!("--db-pwd={}", secret(&self.credentials.db_password)),
            format!("--user={}", self.credentials.platform_user),
            format!("--password={}", secret(&self.credentials.platform_password)),
            format!("--db-name={}", self.job.database),
            format!("--data={}", self.job.data_dir),
            self.job.dump_path.clone(),
        ]);
        args
    }

    fn join(args: Vec<String>) -> String {
        args.iter().map(|a| quote_arg(a)).collect::<Vec<_>>().join(" ")
    }

    /// The command line to execute. Carries both passwords in clear text.
    pub fn command_line(&self) -> String {
        Self::join(self.args(false))
    }

    /// Same command with passwords masked, for logs.
    pub fn redacted(&self) -> String {
        Self::join(self.args(true))
    }
}

/// Exit statuses of `timeout` when it had to stop the command: 124 after
/// TERM, 137 after KILL.
pub fn stopped_by_host_limit(exit_status: u32) -> bool {
    matches!(exit_status, 124 | 137)
}

pub fn verify_command(dump_path: &str) -> String {
    format!("test -f {} && echo exists", quote_path(dump_path))
}

pub fn cleanup_command(data_dir: &str) -> String {
    format!("rm -rf {}", quote_path(data_dir))
}
