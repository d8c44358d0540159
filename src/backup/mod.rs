pub mod dump;
pub mod executor;
pub mod guard;

pub use dump::BackupJob;
pub use executor::{BackupExecutor, BackupStage};
pub use guard::{BackupGuard, BackupLease};
