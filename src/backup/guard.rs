// dtbackuptool/src/backup/guard.rs
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

/// Names of the databases currently being backed up in this process.
///
/// Cloning shares the same set. All mutation goes through [`reserve`] and
/// [`release`]; membership checks alone never grant the right to start work.
///
/// [`reserve`]: BackupGuard::reserve
/// [`release`]: BackupGuard::release
#[derive(Debug, Clone, Default)]
pub struct BackupGuard {
    active: Arc<Mutex<HashSet<String>>>,
}

impl BackupGuard {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<String>> {
        // The set stays consistent even if a holder panicked: every critical
        // section is a single insert, remove or lookup.
        self.active.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Check-and-insert in one step. `false` means another backup of `name`
    /// holds the reservation.
    pub fn reserve(&self, name: &str) -> bool {
        let reserved = self.lock().insert(name.to_string());
        debug!(database = %name, reserved, "Backup reservation");
        reserved
    }

    /// Unconditional; releasing an absent name is a no-op.
    pub fn release(&self, name: &str) {
        self.lock().remove(name);
        debug!(database = %name, "Backup reservation released");
    }

    /// Point-in-time answer for display purposes only.
    pub fn is_active(&self, name: &str) -> bool {
        self.lock().contains(name)
    }

    pub fn active(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lock().iter().cloned().collect();
        names.sort();
        names
    }

    /// Reserves `name` and ties the release to the returned lease.
    pub fn acquire(&self, name: &str) -> Option<BackupLease> {
        self.reserve(name).then(|| BackupLease {
            guard: self.clone(),
            name: name.to_string(),
        })
    }
}

/// Reservation that is released exactly once when dropped, whether the
/// backup finished, failed, timed out or its task was cancelled.
#[derive(Debug)]
pub struct BackupLease {
    guard: BackupGuard,
    name: String,
}

impl BackupLease {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for BackupLease {
    fn drop(&mut self) {
        self.guard.release(&self.name);
    }
}
