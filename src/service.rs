// dtbackuptool/src/service.rs
//! Entry points for the chat front end. Every call opens its own session to
//! the platform host and closes it before returning.

use std::sync::Arc;
use tracing::{info, warn};

use crate::backup::{BackupExecutor, BackupGuard};
use crate::cloud::{CloudArtifact, CloudPublisher, RcloneUploader};
use crate::config::AppConfig;
use crate::errors::Result;
use crate::inventory::{self, DatabaseRecord};
use crate::remote::{RemoteSession, SshTransport, Transport};

type TransportFactory<T> = Box<dyn Fn() -> T + Send + Sync>;

pub struct BackupService<T: Transport> {
    config: AppConfig,
    guard: BackupGuard,
    executor: BackupExecutor,
    make_transport: TransportFactory<T>,
}

impl BackupService<SshTransport> {
    /// Service talking SSH to the configured host and uploading with rclone.
    pub fn from_config(config: AppConfig) -> Self {
        let ssh = config.ssh.clone();
        let connect_timeout = config.timeouts.connect;
        let publisher = Arc::new(RcloneUploader::new(&config.cloud, config.timeouts.upload));
        Self::new(config, BackupGuard::new(), publisher, move || {
            SshTransport::new(ssh.clone(), connect_timeout)
        })
    }
}

impl<T: Transport> BackupService<T> {
    pub fn new<F>(
        config: AppConfig,
        guard: BackupGuard,
        publisher: Arc<dyn CloudPublisher>,
        make_transport: F,
    ) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        let executor = BackupExecutor::new(
            guard.clone(),
            config.credentials.clone(),
            publisher,
            config.timeouts.dump,
        );
        BackupService {
            config,
            guard,
            executor,
            make_transport: Box::new(make_transport),
        }
    }

    pub fn guard(&self) -> &BackupGuard {
        &self.guard
    }

    fn open_session(&self) -> RemoteSession<T> {
        RemoteSession::new(
            (self.make_transport)(),
            self.config.platform.clone(),
            self.config.timeouts.command,
        )
    }

    async fn finish(mut session: RemoteSession<T>) {
        if let Err(e) = session.close().await {
            warn!(error = %e, "Failed to close remote session");
        }
    }

    /// Infobases of the first cluster on the host.
    pub async fn list_databases(&self) -> Result<Vec<DatabaseRecord>> {
        let mut session = self.open_session();
        let result = async {
            let rac = session.ensure_platform().await?.rac();
            inventory::list_first_cluster_databases(&mut session, &rac).await
        }
        .await;
        Self::finish(session).await;
        result
    }

    /// Advisory only; use [`request_backup`](Self::request_backup) to start work.
    pub fn is_backup_active(&self, name: &str) -> bool {
        self.guard.is_active(name)
    }

    /// Dumps `name` and publishes it, returning the download link.
    pub async fn request_backup(&self, name: &str) -> Result<CloudArtifact> {
        info!(database = %name, "🚀 Backup requested");
        let mut session = self.open_session();
        let result = self.executor.run(&mut session, name).await;
        Self::finish(session).await;
        result
    }

    pub async fn get_platform_version(&self) -> Result<String> {
        let mut session = self.open_session();
        let result = session.platform_version().await;
        Self::finish(session).await;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RawJsonConfig;
    use crate::errors::BackupError;
    use crate::remote::CommandRunner;
    use crate::remote::testing::{CommandLog, ScriptedTransport};
    use async_trait::async_trait;
    use serde_json::json;
    use std::time::Duration;
    use tokio::sync::Notify;

    const LINK: &str = "https://disk.yandex.ru/d/ABC123";

    struct StubPublisher {
        fail: bool,
    }

    #[async_trait]
    impl CloudPublisher for StubPublisher {
        async fn publish(
            &self,
            _runner: &mut dyn CommandRunner,
            _local_path: &str,
            database: &str,
        ) -> Result<CloudArtifact> {
            if self.fail {
                return Err(BackupError::UploadFailed {
                    step: "copy".to_string(),
                    stderr: "network unreachable".to_string(),
                });
            }
            Ok(CloudArtifact {
                cloud_path: format!("yandex:backups/{}", database),
                link: LINK.to_string(),
            })
        }
    }

    fn config() -> AppConfig {
        let raw: RawJsonConfig = serde_json::from_value(json!({
            "ssh": { "host": "srv-1c", "username": "backup", "password": "secret" },
            "database": { "server": "pg.local", "user": "postgres", "password": "pgpass" },
            "platform_user": { "user": "Admin" },
            "cloud": { "remote": "yandex", "base_path": "backups" },
            "timeouts": { "command_secs": 5, "dump_secs": 5, "upload_secs": 5 }
        }))
        .unwrap();
        AppConfig::from_raw(raw).unwrap()
    }

    fn service<F>(publisher: Arc<dyn CloudPublisher>, make_transport: F) -> BackupService<ScriptedTransport>
    where
        F: Fn() -> ScriptedTransport + Send + Sync + 'static,
    {
        BackupService::new(config(), BackupGuard::new(), publisher, make_transport)
    }

    fn healthy_host(log: &CommandLog) -> ScriptedTransport {
        ScriptedTransport::with_platform("8.3.21.1234")
            .respond("test -f", 0, "exists\n")
            .sharing_log(log.clone())
    }

    #[tokio::test]
    async fn test_successful_backup_returns_link() -> anyhow::Result<()> {
        let log = CommandLog::default();
        let shared = log.clone();
        let service = service(Arc::new(StubPublisher { fail: false }), move || healthy_host(&shared));

        let artifact = service.request_backup("testdb").await?;

        assert_eq!(artifact.link, LINK);
        assert!(!service.is_backup_active("testdb"));
        assert!(log.contains("--db-name=testdb"));
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_dump_reports_command_failure() {
        let log = CommandLog::default();
        let shared = log.clone();
        let service = service(Arc::new(StubPublisher { fail: false }), move || {
            healthy_host(&shared).respond_full("infobase dump", 1, "", "Infobase not found")
        });

        let err = service.request_backup("testdb").await.unwrap_err();

        assert!(matches!(err, BackupError::CommandFailed { .. }));
        assert!(log.contains("rm -rf \"/home/usr1cv8/dump_1s_dt/data_testdb\""));
        assert!(!service.is_backup_active("testdb"));
    }

    #[tokio::test]
    async fn test_upload_failure_leaves_dump_for_recovery() {
        let log = CommandLog::default();
        let shared = log.clone();
        let service = service(Arc::new(StubPublisher { fail: true }), move || healthy_host(&shared));

        let err = service.request_backup("testdb").await.unwrap_err();

        assert!(matches!(err, BackupError::UploadFailed { .. }));
        assert!(!log.contains("rm -f"));
        assert!(!service.is_backup_active("testdb"));
    }

    #[tokio::test]
    async fn test_rclone_copy_failure_leaves_dump_for_recovery() {
        let log = CommandLog::default();
        let shared = log.clone();
        let uploader = Arc::new(RcloneUploader::new(&config().cloud, Duration::from_secs(5)));
        let service = service(uploader, move || {
            healthy_host(&shared).respond_full("rclone copy", 1, "", "Failed to copy: 507 Insufficient Storage")
        });

        let err = service.request_backup("testdb").await.unwrap_err();

        match &err {
            BackupError::UploadFailed { step, .. } => assert_eq!(step, "copy"),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(log.contains("rclone copy \"/home/usr1cv8/dump_1s_dt/testdb_"));
        assert!(!log.contains("rm -f"));
        assert!(!service.is_backup_active("testdb"));
    }

    #[tokio::test]
    async fn test_full_pipeline_with_rclone() -> anyhow::Result<()> {
        let log = CommandLog::default();
        let shared = log.clone();
        let uploader = Arc::new(RcloneUploader::new(&config().cloud, Duration::from_secs(5)));
        let service = service(uploader, move || {
            healthy_host(&shared).respond("rclone link", 0, "https://disk.yandex.ru/d/Qw3rTy\n")
        });

        let artifact = service.request_backup("buh").await?;

        assert_eq!(artifact.link, "https://disk.yandex.ru/d/Qw3rTy");
        assert!(artifact.cloud_path.starts_with("yandex:backups/buh/buh_"));
        assert!(log.contains("rm -f \"/home/usr1cv8/dump_1s_dt/buh_"));
        Ok(())
    }

    #[tokio::test]
    async fn test_concurrent_requests_for_same_database() -> anyhow::Result<()> {
        let gate = Arc::new(Notify::new());
        let log = CommandLog::default();
        let (shared_gate, shared_log) = (gate.clone(), log.clone());
        let service = Arc::new(service(Arc::new(StubPublisher { fail: false }), move || {
            healthy_host(&shared_log).wait_on("infobase dump", shared_gate.clone(), "")
        }));

        let first = tokio::spawn({
            let service = Arc::clone(&service);
            async move { service.request_backup("buh").await }
        });
        while !service.is_backup_active("buh") {
            tokio::task::yield_now().await;
        }

        let second = service.request_backup("buh").await;
        assert!(matches!(second, Err(BackupError::BackupAlreadyInProgress(_))));

        gate.notify_one();
        let artifact = first.await??;
        assert_eq!(artifact.link, LINK);
        assert_eq!(log.count("infobase dump"), 1);
        assert!(!service.is_backup_active("buh"));
        Ok(())
    }

    #[tokio::test]
    async fn test_different_databases_run_concurrently() -> anyhow::Result<()> {
        let service = service(Arc::new(StubPublisher { fail: false }), || {
            healthy_host(&CommandLog::default())
        });

        let (a, b) = tokio::join!(service.request_backup("buh"), service.request_backup("zup"));

        assert_eq!(a?.link, LINK);
        assert_eq!(b?.link, LINK);
        assert!(service.guard().active().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_list_databases() -> anyhow::Result<()> {
        let service = service(Arc::new(StubPublisher { fail: false }), || {
            ScriptedTransport::with_platform("8.3.21.1234")
                .respond("cluster list", 0, "cluster : c-1\nhost : srv-1c\n")
                .respond("summary list", 0, "infobase : i-1\nname : buh\ndescr : Бухгалтерия\n\ninfobase : i-2\nname : zup\n")
        });

        let databases = service.list_databases().await?;

        let names: Vec<&str> = databases.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["buh", "zup"]);
        assert_eq!(databases[0].description.as_deref(), Some("Бухгалтерия"));
        assert_eq!(databases[1].description, None);
        Ok(())
    }

    #[tokio::test]
    async fn test_list_databases_without_platform() {
        let log = CommandLog::default();
        let shared = log.clone();
        let service = service(Arc::new(StubPublisher { fail: false }), move || {
            ScriptedTransport::new()
                .respond("echo $HOME", 0, "/home/usr1cv8\n")
                .sharing_log(shared.clone())
        });

        let err = service.list_databases().await.unwrap_err();

        assert!(matches!(err, BackupError::PlatformNotDetected));
        assert!(!log.contains("cluster list"));
    }

    #[tokio::test]
    async fn test_platform_version() -> anyhow::Result<()> {
        let service = service(Arc::new(StubPublisher { fail: false }), || {
            ScriptedTransport::with_platform("8.3.23.1865")
        });
        assert_eq!(service.get_platform_version().await?, "8.3.23.1865");
        Ok(())
    }

    #[tokio::test]
    async fn test_unreachable_host() {
        let service = service(Arc::new(StubPublisher { fail: false }), || {
            ScriptedTransport::new().refuse_connections()
        });

        let err = service.request_backup("buh").await.unwrap_err();
        assert!(matches!(err, BackupError::Connection(_)));
        assert!(!service.is_backup_active("buh"));
    }
}
