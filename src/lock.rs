//! Advisory edit locks
//!
//! One JSON lock record per feature id under `locks/`. Locks are
//! cooperative: the feature manager never consults them, callers check lock
//! state around edit sessions. Expired locks are detected lazily on read and
//! never swept.

use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::config::TrackerConfig;
use crate::error::{Result, TrackerError};
use crate::fsio;

/// On-disk lock record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockRecord {
    /// Feature id the lock covers
    pub id: String,
    /// Who is editing
    pub owner: String,
    /// When the lock was taken
    pub acquired_at: DateTime<Utc>,
    /// Minutes until the lock goes stale; 0 means no expiry is enforced
    pub ttl_minutes: i64,
}

impl LockRecord {
    /// Whether the lock is stale at `now`. A TTL too large to resolve to a
    /// concrete expiry instant never expires, same as a TTL of 0.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        if self.ttl_minutes <= 0 {
            return false;
        }
        Duration::try_minutes(self.ttl_minutes)
            .and_then(|ttl| self.acquired_at.checked_add_signed(ttl))
            .map_or(false, |expiry| now > expiry)
    }
}

/// A lock record plus its computed expiry state
#[derive(Debug, Clone, Serialize)]
pub struct LockState {
    #[serde(flatten)]
    pub record: LockRecord,
    pub expired: bool,
}

/// Creates, reads, and releases advisory locks
pub struct LockManager {
    config: TrackerConfig,
}

impl LockManager {
    pub fn new(config: TrackerConfig) -> Self {
        Self { config }
    }

    fn lock_path(&self, id: &str) -> PathBuf {
        self.config.locks_dir().join(format!("{id}.lock"))
    }

    /// Take a lock on a feature id.
    ///
    /// Fails with `ActiveLock` when an unexpired lock is already present and
    /// `force` is false; `force` overwrites unconditionally. A non-positive
    /// TTL is rejected up front.
    pub fn acquire(&self, id: &str, owner: &str, ttl_minutes: i64, force: bool) -> Result<LockRecord> {
        if ttl_minutes <= 0 {
            return Err(TrackerError::InvalidArgument(format!(
                "lock TTL must be positive, got {ttl_minutes}"
            )));
        }

        if !force {
            if let Some(existing) = self.load(id)? {
                if !existing.expired {
                    return Err(TrackerError::ActiveLock {
                        id: id.to_string(),
                        owner: existing.record.owner,
                    });
                }
            }
        }

        let record = LockRecord {
            id: id.to_string(),
            owner: owner.to_string(),
            acquired_at: Utc::now(),
            ttl_minutes,
        };

        if self.config.store.dry_run {
            tracing::info!("Dry-run: would lock {} for {} ({}m)", id, owner, ttl_minutes);
            return Ok(record);
        }

        let content = serde_json::to_string_pretty(&record)?;
        fsio::atomic_write(&self.lock_path(id), &content)?;
        tracing::info!("Locked {} for {} ({}m)", id, owner, ttl_minutes);
        Ok(record)
    }

    /// Read a lock without side effects. Absent lock is `None`; a lock file
    /// that does not parse is malformed, not silently ignored.
    pub fn load(&self, id: &str) -> Result<Option<LockState>> {
        let path = self.lock_path(id);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let record: LockRecord =
            serde_json::from_str(&content).map_err(|e| TrackerError::MalformedRecord {
                path,
                reason: format!("invalid lock record: {e}"),
            })?;
        let expired = record.is_expired(Utc::now());
        Ok(Some(LockState { record, expired }))
    }

    /// Drop a lock. Releasing a lock that does not exist is not an error.
    pub fn release(&self, id: &str) -> Result<()> {
        if self.config.store.dry_run {
            tracing::info!("Dry-run: would unlock {}", id);
            return Ok(());
        }

        match fs::remove_file(self.lock_path(id)) {
            Ok(()) => {
                tracing::info!("Unlocked {}", id);
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// All outstanding locks, sorted by feature id
    pub fn list(&self) -> Result<Vec<LockState>> {
        let dir = self.config.locks_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut ids = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().map_or(false, |e| e == "lock") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    ids.push(stem.to_string());
                }
            }
        }
        ids.sort();

        let mut states = Vec::new();
        for id in ids {
            if let Some(state) = self.load(&id)? {
                states.push(state);
            }
        }
        Ok(states)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn manager(root: &std::path::Path) -> LockManager {
        LockManager::new(TrackerConfig::with_root(root))
    }

    #[test]
    fn test_acquire_and_load() {
        let dir = tempdir().unwrap();
        let locks = manager(dir.path());

        locks.acquire("FEAT-0001", "dana", 30, false).unwrap();

        let state = locks.load("FEAT-0001").unwrap().unwrap();
        assert_eq!(state.record.owner, "dana");
        assert_eq!(state.record.ttl_minutes, 30);
        assert!(!state.expired);
    }

    #[test]
    fn test_acquire_conflict_names_holder() {
        let dir = tempdir().unwrap();
        let locks = manager(dir.path());

        locks.acquire("FEAT-0001", "dana", 30, false).unwrap();
        let err = locks.acquire("FEAT-0001", "kim", 30, false).unwrap_err();

        match err {
            TrackerError::ActiveLock { id, owner } => {
                assert_eq!(id, "FEAT-0001");
                assert_eq!(owner, "dana");
            }
            other => panic!("expected ActiveLock, got {other:?}"),
        }
    }

    #[test]
    fn test_force_steals_lock() {
        let dir = tempdir().unwrap();
        let locks = manager(dir.path());

        locks.acquire("FEAT-0001", "dana", 30, false).unwrap();
        locks.acquire("FEAT-0001", "kim", 30, true).unwrap();

        let state = locks.load("FEAT-0001").unwrap().unwrap();
        assert_eq!(state.record.owner, "kim");
    }

    #[test]
    fn test_non_positive_ttl_rejected() {
        let dir = tempdir().unwrap();
        let locks = manager(dir.path());

        for ttl in [0, -5] {
            let err = locks.acquire("FEAT-0001", "dana", ttl, false).unwrap_err();
            assert!(matches!(err, TrackerError::InvalidArgument(_)));
        }
    }

    #[test]
    fn test_release_missing_is_ok() {
        let dir = tempdir().unwrap();
        let locks = manager(dir.path());
        locks.release("FEAT-0404").unwrap();
    }

    #[test]
    fn test_release_removes_lock() {
        let dir = tempdir().unwrap();
        let locks = manager(dir.path());

        locks.acquire("FEAT-0001", "dana", 30, false).unwrap();
        locks.release("FEAT-0001").unwrap();

        assert!(locks.load("FEAT-0001").unwrap().is_none());
    }

    #[test]
    fn test_expiry_computed_lazily() {
        let dir = tempdir().unwrap();
        let locks = manager(dir.path());

        // One-minute lock taken two minutes ago
        let stale = LockRecord {
            id: "FEAT-0001".to_string(),
            owner: "dana".to_string(),
            acquired_at: Utc::now() - Duration::minutes(2),
            ttl_minutes: 1,
        };
        let path = dir.path().join("locks/FEAT-0001.lock");
        fsio::atomic_write(&path, &serde_json::to_string_pretty(&stale).unwrap()).unwrap();

        let state = locks.load("FEAT-0001").unwrap().unwrap();
        assert!(state.expired);

        // A stale lock no longer blocks acquisition
        locks.acquire("FEAT-0001", "kim", 30, false).unwrap();
    }

    #[test]
    fn test_zero_ttl_never_expires() {
        let record = LockRecord {
            id: "FEAT-0001".to_string(),
            owner: "dana".to_string(),
            acquired_at: Utc::now() - Duration::days(365),
            ttl_minutes: 0,
        };
        assert!(!record.is_expired(Utc::now()));
    }

    #[test]
    fn test_oversized_ttl_never_expires() {
        // Past the DateTime range, past the Duration range, and the extreme
        for ttl in [200_000_000_000_i64, i64::MAX / 60_000 + 1, i64::MAX] {
            let record = LockRecord {
                id: "FEAT-0001".to_string(),
                owner: "dana".to_string(),
                acquired_at: Utc::now() - Duration::days(365),
                ttl_minutes: ttl,
            };
            assert!(!record.is_expired(Utc::now()), "ttl {ttl} should not expire");
        }
    }

    #[test]
    fn test_oversized_ttl_lock_loads_and_blocks() {
        let dir = tempdir().unwrap();
        let locks = manager(dir.path());

        locks.acquire("FEAT-0001", "dana", i64::MAX / 60, false).unwrap();

        let state = locks.load("FEAT-0001").unwrap().unwrap();
        assert!(!state.expired);

        let err = locks.acquire("FEAT-0001", "kim", 30, false).unwrap_err();
        assert!(matches!(err, TrackerError::ActiveLock { .. }));
    }

    #[test]
    fn test_dry_run_reports_success_without_writing() {
        let dir = tempdir().unwrap();
        let mut config = TrackerConfig::with_root(dir.path());
        config.store.dry_run = true;
        let locks = LockManager::new(config);

        let record = locks.acquire("FEAT-0001", "dana", 30, false).unwrap();
        assert_eq!(record.owner, "dana");
        assert!(locks.load("FEAT-0001").unwrap().is_none());
    }

    #[test]
    fn test_list_sorted() {
        let dir = tempdir().unwrap();
        let locks = manager(dir.path());

        locks.acquire("FEAT-0002", "kim", 30, false).unwrap();
        locks.acquire("FEAT-0001", "dana", 30, false).unwrap();

        let states = locks.list().unwrap();
        let ids: Vec<_> = states.iter().map(|s| s.record.id.as_str()).collect();
        assert_eq!(ids, vec!["FEAT-0001", "FEAT-0002"]);
    }
}
