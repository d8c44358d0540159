use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackupError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Platform agent process not found on the remote host")]
    PlatformNotDetected,

    #[error("No cluster found in rac output")]
    NoClusterFound,

    #[error("Inventory query failed: {stderr}")]
    InventoryQueryFailed { stderr: String },

    #[error("Unparseable inventory line {line}: {content:?}")]
    InventoryParse { line: usize, content: String },

    #[error("Backup of '{0}' is already in progress")]
    BackupAlreadyInProgress(String),

    #[error("Remote command failed: {stderr}")]
    CommandFailed { stderr: String },

    #[error("Dump file was not found after dump: {0}")]
    FileVerificationFailed(String),

    #[error("Cloud upload failed at '{step}': {stderr}")]
    UploadFailed { step: String, stderr: String },

    #[error("{operation} timed out after {seconds}s")]
    Timeout { operation: String, seconds: u64 },
}

impl BackupError {
    /// Rejections that are expected outcomes rather than failures.
    pub fn is_informational(&self) -> bool {
        matches!(self, BackupError::BackupAlreadyInProgress(_))
    }

    /// One line suitable for sending back to whoever asked for the operation.
    pub fn status_message(&self) -> String {
        match self {
            BackupError::BackupAlreadyInProgress(name) => {
                format!("⏳ Backup of {} is already running, please wait for it to finish.", name)
            }
            BackupError::Connection(_) | BackupError::Timeout { .. } => {
                format!("❌ Could not reach the server: {}", self)
            }
            BackupError::PlatformNotDetected => {
                "❌ Platform server is not running on the host, its version could not be detected.".to_string()
            }
            BackupError::CommandFailed { .. } | BackupError::FileVerificationFailed(_) => {
                format!("❌ Backup failed: {}", self)
            }
            BackupError::UploadFailed { .. } => {
                format!("⚠️ Backup was created but could not be uploaded to the cloud: {}", self)
            }
            _ => format!("❌ Error: {}", self),
        }
    }
}

impl From<russh::Error> for BackupError {
    fn from(err: russh::Error) -> Self {
        BackupError::Connection(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, BackupError>;
