//! Platform state storage
//!
//! The store is the sole writer of [`PlatformState`]. Readers take versioned
//! snapshots; writers commit against the version they read, so a
//! read-modify-write either lands whole or fails with a retriable
//! [`StoreError::Conflict`].

use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use morphos_common::{MorphosError, PlatformState, StoreError};
use parking_lot::RwLock;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

/// Snapshot tagged with the store version it was read at
#[derive(Debug, Clone, PartialEq)]
pub struct Versioned<T> {
    pub version: u64,
    pub value: T,
}

/// Trait for platform state backends
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Consistent snapshot of the current state
    async fn snapshot(&self) -> Result<Versioned<PlatformState>, StoreError>;

    /// Replace the state if the store is still at `expected_version`
    ///
    /// Returns the new version.
    async fn commit(&self, expected_version: u64, state: PlatformState)
        -> Result<u64, StoreError>;
}

/// Run `attempt` until it stops failing with a write conflict
///
/// At most `retries` extra attempts are made; the last conflict is surfaced
/// to the caller unchanged.
pub async fn retry_on_conflict<T, F, Fut>(retries: u32, mut attempt: F) -> Result<T, MorphosError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, MorphosError>>,
{
    let mut n = 0;
    loop {
        match attempt(n).await {
            Err(err) if err.is_retriable() && n < retries => {
                debug!(attempt = n, error = %err, "Retrying after write conflict");
                n += 1;
            }
            other => return other,
        }
    }
}

/// In-memory store
///
/// Uses a parking_lot RwLock; commits are atomic under the write lock.
#[derive(Debug, Default)]
pub struct InMemoryStateStore {
    state: RwLock<PlatformState>,
}

impl InMemoryStateStore {
    pub fn new(initial: PlatformState) -> Self {
        Self {
            state: RwLock::new(initial),
        }
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn snapshot(&self) -> Result<Versioned<PlatformState>, StoreError> {
        let state = self.state.read().clone();
        Ok(Versioned {
            version: state.version,
            value: state,
        })
    }

    async fn commit(
        &self,
        expected_version: u64,
        mut state: PlatformState,
    ) -> Result<u64, StoreError> {
        let mut current = self.state.write();
        if current.version != expected_version {
            return Err(StoreError::Conflict {
                expected: expected_version,
                found: current.version,
            });
        }
        state.version = expected_version + 1;
        *current = state;
        Ok(current.version)
    }
}

/// Lockfiles older than this are assumed to belong to a crashed writer
pub const STALE_LOCK_AFTER: Duration = Duration::from_secs(30);

/// Single JSON document on disk
///
/// Every commit holds an exclusive `<name>.lock` file, created with
/// `create_new`, across the version check and the rename, so two processes
/// (or two handles) racing on the same document cannot both pass the check.
/// A held lock surfaces as [`StoreError::Conflict`]. Each commit writes a
/// uniquely named temp file. A missing or malformed document reads as the
/// empty state.
pub struct JsonFileStateStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_state(&self) -> Result<PlatformState, StoreError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => Ok(PlatformState::from_json_lenient(&raw)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No persisted state, starting empty");
                Ok(PlatformState::default())
            }
            Err(e) => Err(StoreError::Io(e.to_string())),
        }
    }

    fn sibling(&self, suffix: &str) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "state.json".into());
        name.push(suffix);
        self.path.with_file_name(name)
    }

    fn lock_path(&self) -> PathBuf {
        self.sibling(".lock")
    }

    fn temp_path(&self) -> PathBuf {
        self.sibling(&format!(".{}.tmp", Uuid::now_v7()))
    }

    /// Take the cross-process lock, or report who holds the document
    async fn acquire(&self, expected_version: u64) -> Result<LockFile, StoreError> {
        let path = self.lock_path();
        for reclaimed in [false, true] {
            match tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(_) => return Ok(LockFile { path }),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if !reclaimed && lock_is_stale(&path).await {
                        warn!(path = %path.display(), "Reclaiming stale state lock");
                        let _ = tokio::fs::remove_file(&path).await;
                        continue;
                    }
                    let found = self.read_state().await?.version;
                    debug!(path = %path.display(), expected_version, found, "State lock held");
                    return Err(StoreError::Conflict {
                        expected: expected_version,
                        found,
                    });
                }
                Err(e) => return Err(StoreError::Io(e.to_string())),
            }
        }
        Err(StoreError::Conflict {
            expected: expected_version,
            found: expected_version,
        })
    }
}

async fn lock_is_stale(path: &Path) -> bool {
    match tokio::fs::metadata(path).await.and_then(|m| m.modified()) {
        Ok(modified) => modified
            .elapsed()
            .map(|age| age > STALE_LOCK_AFTER)
            .unwrap_or(false),
        Err(_) => false,
    }
}

/// Held lockfile, removed on drop
struct LockFile {
    path: PathBuf,
}

impl Drop for LockFile {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %e, "Failed to release state lock");
        }
    }
}

#[async_trait]
impl StateStore for JsonFileStateStore {
    async fn snapshot(&self) -> Result<Versioned<PlatformState>, StoreError> {
        let state = self.read_state().await?;
        Ok(Versioned {
            version: state.version,
            value: state,
        })
    }

    async fn commit(
        &self,
        expected_version: u64,
        mut state: PlatformState,
    ) -> Result<u64, StoreError> {
        let _guard = self.write_lock.lock().await;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| StoreError::Io(e.to_string()))?;
            }
        }
        let _lock = self.acquire(expected_version).await?;

        let on_disk = self.read_state().await?;
        if on_disk.version != expected_version {
            return Err(StoreError::Conflict {
                expected: expected_version,
                found: on_disk.version,
            });
        }

        state.version = expected_version + 1;
        let body = serde_json::to_vec_pretty(&state)
            .map_err(|e| StoreError::Encoding(e.to_string()))?;

        let tmp = self.temp_path();
        if let Err(e) = tokio::fs::write(&tmp, &body).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(StoreError::Io(e.to_string()));
        }
        if let Err(e) = tokio::fs::rename(&tmp, &self.path).await {
            warn!(path = %self.path.display(), error = %e, "State rename failed");
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(StoreError::Io(e.to_string()));
        }

        Ok(state.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_in_memory_commit_bumps_version() {
        let store = InMemoryStateStore::default();
        let snap = store.snapshot().await.unwrap();
        assert_eq!(snap.version, 0);

        let mut next = snap.value.clone();
        next.linear_progress = 1.0;
        let version = store.commit(snap.version, next).await.unwrap();
        assert_eq!(version, 1);

        let snap = store.snapshot().await.unwrap();
        assert_eq!(snap.version, 1);
        assert_eq!(snap.value.linear_progress, 1.0);
    }

    #[tokio::test]
    async fn test_stale_commit_conflicts() {
        let store = InMemoryStateStore::default();
        let snap = store.snapshot().await.unwrap();
        store.commit(snap.version, snap.value.clone()).await.unwrap();

        let err = store.commit(snap.version, snap.value).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict { expected: 0, found: 1 }));
    }

    #[tokio::test]
    async fn test_file_store_missing_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStateStore::new(dir.path().join("state.json"));
        let snap = store.snapshot().await.unwrap();
        assert_eq!(snap.value, PlatformState::default());
    }

    #[tokio::test]
    async fn test_file_store_malformed_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        tokio::fs::write(&path, b"{\"linear_progress\": ").await.unwrap();
        let store = JsonFileStateStore::new(&path);
        let snap = store.snapshot().await.unwrap();
        assert_eq!(snap.value, PlatformState::default());
    }

    #[tokio::test]
    async fn test_file_store_round_trip_and_conflict() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("state.json");
        let store = JsonFileStateStore::new(&path);

        let mut state = PlatformState::default();
        state.circular_phase = 0.25;
        assert_eq!(store.commit(0, state).await.unwrap(), 1);

        // A second handle on the same file sees the committed version
        let other = JsonFileStateStore::new(&path);
        let snap = other.snapshot().await.unwrap();
        assert_eq!(snap.version, 1);
        assert_eq!(snap.value.circular_phase, 0.25);

        let err = other.commit(0, snap.value).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));
        assert!(!store.lock_path().exists());
        let leftovers: Vec<_> = std::fs::read_dir(path.parent().unwrap())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_racing_handles_commit_exactly_once() {
        for round in 0..32 {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("state.json");
            let first = Arc::new(JsonFileStateStore::new(&path));
            let second = Arc::new(JsonFileStateStore::new(&path));

            let mut a = PlatformState::default();
            a.linear_progress = 1.0;
            let mut b = PlatformState::default();
            b.linear_progress = 2.0;

            let left = tokio::spawn({
                let store = first.clone();
                async move { store.commit(0, a).await }
            });
            let right = tokio::spawn({
                let store = second.clone();
                async move { store.commit(0, b).await }
            });
            let results = [left.await.unwrap(), right.await.unwrap()];

            let won: Vec<_> = results.iter().filter(|r| r.is_ok()).collect();
            assert_eq!(won.len(), 1, "round {round}: {results:?}");
            assert!(results
                .iter()
                .any(|r| matches!(r, Err(StoreError::Conflict { expected: 0, .. }))));

            let snap = first.snapshot().await.unwrap();
            assert_eq!(snap.version, 1);
            assert!(!first.lock_path().exists());
        }
    }

    #[tokio::test]
    async fn test_held_lock_conflicts() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStateStore::new(dir.path().join("state.json"));
        std::fs::write(store.lock_path(), b"").unwrap();

        let err = store.commit(0, PlatformState::default()).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict { expected: 0, found: 0 }));
        // Someone else's lock is left in place
        assert!(store.lock_path().exists());
        assert_eq!(store.snapshot().await.unwrap().version, 0);
    }

    #[tokio::test]
    async fn test_stale_lock_is_reclaimed() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStateStore::new(dir.path().join("state.json"));
        let lock = std::fs::File::create(store.lock_path()).unwrap();
        let old = std::time::SystemTime::now() - STALE_LOCK_AFTER * 2;
        lock.set_modified(old).unwrap();
        drop(lock);

        assert_eq!(store.commit(0, PlatformState::default()).await.unwrap(), 1);
        assert!(!store.lock_path().exists());
    }

    #[tokio::test]
    async fn test_retry_surfaces_persistent_conflict() {
        let mut calls = 0;
        let result: Result<(), MorphosError> = retry_on_conflict(2, |_| {
            calls += 1;
            async {
                Err(MorphosError::from(StoreError::Conflict {
                    expected: 0,
                    found: 1,
                }))
            }
        })
        .await;
        assert!(result.unwrap_err().is_retriable());
        assert_eq!(calls, 3);
    }

    #[tokio::test]
    async fn test_retry_stops_on_success() {
        let result = retry_on_conflict(5, |n| async move {
            if n < 2 {
                Err(MorphosError::from(StoreError::Conflict {
                    expected: 0,
                    found: 1,
                }))
            } else {
                Ok(n)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 2);
    }
}
