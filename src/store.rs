//! Directory-backed snapshot store.
//!
//! One directory of JPEG files is the sole durable state: there is no index
//! file, the in-memory index is rebuilt by scanning the directory at open.
//! The collection is bounded two ways:
//!
//! - capacity: after every completed `add` the index holds at most
//!   `max_count` records, evicting by list position (front first);
//! - age: any record whose file modification time exceeds the retention
//!   bound is removed by the next operation that scans the index.
//!
//! The index is mutated by the capture loop (on trigger) and by concurrent
//! delete/list requests, so every index mutation goes through one internal
//! mutex. Filesystem errors on individual files are logged and isolated;
//! one failed deletion never aborts processing of the remaining records.
//!
//! Ordering caveat: open() sorts newest-first while add() appends at the
//! tail, so once fresh records mix with a loaded index, positional eviction
//! does not track true modification-time order. This mirrors the observable
//! eviction policy of the system this store replaces; see DESIGN.md.

use anyhow::{anyhow, Context, Result};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, SystemTime};

use crate::frame::Frame;

#[derive(Clone, Debug)]
struct SnapshotRecord {
    path: PathBuf,
    bytes: u64,
}

#[derive(Default)]
struct StoreInner {
    records: Vec<SnapshotRecord>,
    bytes_used: u64,
}

/// Capacity- and age-bounded collection of persisted JPEG snapshots.
pub struct SnapshotStore {
    dir: PathBuf,
    max_count: usize,
    retention: Duration,
    inner: Mutex<StoreInner>,
}

impl SnapshotStore {
    /// Open the store, creating `dir` if absent and rebuilding the index
    /// from the `*.jpg` files already on disk (newest first). Expired files
    /// are swept before the store is handed out.
    pub fn open(dir: impl Into<PathBuf>, max_count: usize, retention: Duration) -> Result<Self> {
        let dir = dir.into();
        if max_count == 0 {
            return Err(anyhow!("max snapshot count must be > 0"));
        }
        fs::create_dir_all(&dir)
            .with_context(|| format!("create snapshot dir {}", dir.display()))?;

        let mut loaded: Vec<(PathBuf, u64, SystemTime)> = Vec::new();
        for entry in
            fs::read_dir(&dir).with_context(|| format!("scan snapshot dir {}", dir.display()))?
        {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("jpg") {
                continue;
            }
            match entry.metadata() {
                Ok(meta) if meta.is_file() => {
                    let mtime = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
                    loaded.push((path, meta.len(), mtime));
                }
                Ok(_) => {}
                Err(e) => {
                    log::warn!("skipping unreadable snapshot {}: {}", path.display(), e);
                }
            }
        }
        loaded.sort_by(|a, b| b.2.cmp(&a.2));

        let bytes_used = loaded.iter().map(|(_, len, _)| *len).sum();
        let records = loaded
            .into_iter()
            .map(|(path, bytes, _)| SnapshotRecord { path, bytes })
            .collect();

        let store = Self {
            dir,
            max_count,
            retention,
            inner: Mutex::new(StoreInner {
                records,
                bytes_used,
            }),
        };
        store.sweep_expired()?;
        Ok(store)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Encode `frame` to JPEG, persist it as `dir/filename`, and bound the
    /// index. On write failure the index is left untouched.
    pub fn add(&self, frame: &Frame, filename: &str) -> Result<PathBuf> {
        let jpeg = frame.encode_jpeg()?;
        let path = self.dir.join(filename);
        fs::write(&path, &jpeg)
            .with_context(|| format!("write snapshot {}", path.display()))?;
        log::info!("saved snapshot -> {}", path.display());

        let mut inner = self.lock()?;
        inner.records.push(SnapshotRecord {
            path: path.clone(),
            bytes: jpeg.len() as u64,
        });
        inner.bytes_used += jpeg.len() as u64;

        sweep_expired_locked(&mut inner, self.retention);

        // Capacity eviction: drop from the front of the index. A record
        // whose file cannot be deleted is skipped rather than retried
        // forever.
        let mut idx = 0;
        while inner.records.len() > self.max_count && idx < inner.records.len() {
            if !remove_at(&mut inner, idx) {
                idx += 1;
            }
        }

        Ok(path)
    }

    /// Remove one snapshot. Idempotent: a missing file is treated as
    /// already removed and its record is dropped without error.
    pub fn remove(&self, path: &Path) -> Result<()> {
        let mut inner = self.lock()?;
        let Some(idx) = inner.records.iter().position(|r| r.path == path) else {
            // Not tracked; still unlink a stray file of that name.
            let _ = fs::remove_file(path);
            return Ok(());
        };
        if remove_at(&mut inner, idx) {
            Ok(())
        } else {
            Err(anyhow!("failed to remove snapshot {}", path.display()))
        }
    }

    /// Drop every record whose file modification time exceeds the retention
    /// bound, regardless of count. Returns the number of records removed.
    pub fn sweep_expired(&self) -> Result<usize> {
        let mut inner = self.lock()?;
        Ok(sweep_expired_locked(&mut inner, self.retention))
    }

    /// Tracked paths in current index order (presentation uses this as-is).
    pub fn list(&self) -> Result<Vec<PathBuf>> {
        let inner = self.lock()?;
        Ok(inner.records.iter().map(|r| r.path.clone()).collect())
    }

    pub fn count(&self) -> Result<usize> {
        Ok(self.lock()?.records.len())
    }

    /// Aggregate byte usage of tracked snapshots.
    pub fn bytes_used(&self) -> Result<u64> {
        Ok(self.lock()?.bytes_used)
    }

    /// Best-effort deletion of every tracked file; the index is cleared
    /// even when individual deletions fail.
    pub fn shutdown(&self) -> Result<()> {
        let mut inner = self.lock()?;
        for record in inner.records.drain(..) {
            if let Err(e) = fs::remove_file(&record.path) {
                if e.kind() != io::ErrorKind::NotFound {
                    log::warn!(
                        "shutdown: failed to remove snapshot {}: {}",
                        record.path.display(),
                        e
                    );
                }
            }
        }
        inner.bytes_used = 0;
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, StoreInner>> {
        self.inner
            .lock()
            .map_err(|_| anyhow!("snapshot index lock poisoned"))
    }
}

/// Delete the record at `idx` and reconcile byte usage. Returns false only
/// when an existing file could not be deleted (the record is kept so a
/// later sweep can retry).
fn remove_at(inner: &mut StoreInner, idx: usize) -> bool {
    let record = inner.records[idx].clone();
    match fs::remove_file(&record.path) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            // Already gone; treat as removed.
        }
        Err(e) => {
            log::warn!(
                "failed to remove snapshot {}: {}",
                record.path.display(),
                e
            );
            return false;
        }
    }
    inner.bytes_used = inner.bytes_used.saturating_sub(record.bytes);
    inner.records.remove(idx);
    log::info!("removed snapshot {}", record.path.display());
    true
}

fn sweep_expired_locked(inner: &mut StoreInner, retention: Duration) -> usize {
    let now = SystemTime::now();
    let mut removed = 0;
    let mut idx = 0;
    while idx < inner.records.len() {
        let expired = match fs::metadata(&inner.records[idx].path) {
            Ok(meta) => {
                let mtime = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
                now.duration_since(mtime)
                    .map(|age| age > retention)
                    .unwrap_or(false)
            }
            // File vanished underneath us; the record is stale either way.
            Err(_) => true,
        };
        if expired && remove_at(inner, idx) {
            removed += 1;
            continue;
        }
        idx += 1;
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    const RETENTION: Duration = Duration::from_secs(20 * 24 * 60 * 60);

    fn test_frame() -> Frame {
        Frame::new(vec![128u8; 16 * 16 * 3], 16, 16).unwrap()
    }

    fn open_store(dir: &TempDir, max_count: usize) -> SnapshotStore {
        SnapshotStore::open(dir.path(), max_count, RETENTION).unwrap()
    }

    #[test]
    fn add_persists_and_tracks_bytes() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir, 10);

        let path = store.add(&test_frame(), "motion_100.jpg").unwrap();
        assert!(path.exists());
        assert_eq!(store.count().unwrap(), 1);
        assert_eq!(
            store.bytes_used().unwrap(),
            fs::metadata(&path).unwrap().len()
        );
    }

    #[test]
    fn capacity_eviction_keeps_most_recent_adds() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir, 2);

        store.add(&test_frame(), "a.jpg").unwrap();
        store.add(&test_frame(), "b.jpg").unwrap();
        store.add(&test_frame(), "c.jpg").unwrap();

        let names: Vec<String> = store
            .list()
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["b.jpg", "c.jpg"]);
        assert!(!dir.path().join("a.jpg").exists());

        // Deleting b leaves only c.
        store.remove(&dir.path().join("b.jpg")).unwrap();
        let names: Vec<String> = store
            .list()
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["c.jpg"]);
    }

    #[test]
    fn index_never_exceeds_capacity() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir, 3);
        for i in 0..10 {
            store.add(&test_frame(), &format!("motion_{i}.jpg")).unwrap();
            assert!(store.count().unwrap() <= 3);
        }
    }

    #[test]
    fn remove_is_idempotent_for_missing_files() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir, 10);
        let path = store.add(&test_frame(), "motion_1.jpg").unwrap();

        fs::remove_file(&path).unwrap();
        store.remove(&path).unwrap();
        assert_eq!(store.count().unwrap(), 0);
        // And again, now untracked.
        store.remove(&path).unwrap();
    }

    #[test]
    fn bytes_used_floors_at_zero() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir, 10);
        let path = store.add(&test_frame(), "motion_1.jpg").unwrap();
        store.remove(&path).unwrap();
        assert_eq!(store.bytes_used().unwrap(), 0);
    }

    #[test]
    fn open_rebuilds_index_newest_first() {
        let dir = TempDir::new().unwrap();
        {
            let store = open_store(&dir, 10);
            store.add(&test_frame(), "old.jpg").unwrap();
            store.add(&test_frame(), "new.jpg").unwrap();
        }
        // Force distinct mtimes regardless of filesystem resolution.
        let old = dir.path().join("old.jpg");
        let past = SystemTime::now() - Duration::from_secs(3600);
        set_mtime(&old, past);

        let store = open_store(&dir, 10);
        let names: Vec<String> = store
            .list()
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["new.jpg", "old.jpg"]);
        assert!(store.bytes_used().unwrap() > 0);
    }

    #[test]
    fn sweep_removes_records_past_retention() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir, 10);
        let expired = store.add(&test_frame(), "motion_old.jpg").unwrap();
        let fresh = store.add(&test_frame(), "motion_new.jpg").unwrap();

        set_mtime(&expired, SystemTime::now() - (RETENTION + Duration::from_secs(60)));

        let removed = store.sweep_expired().unwrap();
        assert_eq!(removed, 1);
        assert!(!expired.exists());
        assert!(fresh.exists());
        assert_eq!(store.list().unwrap(), vec![fresh]);
    }

    #[test]
    fn shutdown_deletes_tracked_files() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir, 10);
        let a = store.add(&test_frame(), "motion_1.jpg").unwrap();
        let b = store.add(&test_frame(), "motion_2.jpg").unwrap();

        store.shutdown().unwrap();
        assert!(!a.exists());
        assert!(!b.exists());
        assert_eq!(store.count().unwrap(), 0);
        assert_eq!(store.bytes_used().unwrap(), 0);
    }

    #[test]
    fn non_jpg_files_are_ignored_at_open() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("notes.txt"), b"hi").unwrap();
        let store = open_store(&dir, 10);
        assert_eq!(store.count().unwrap(), 0);
    }

    fn set_mtime(path: &Path, to: SystemTime) {
        let file = fs::OpenOptions::new().write(true).open(path).unwrap();
        file.set_times(fs::FileTimes::new().set_modified(to)).unwrap();
        drop(file);
    }
}
