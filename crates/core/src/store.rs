//! File-backed time series, one JSON document per monitored target.
//!
//! Every append rewrites the whole document. Writes go to a temporary file in
//! the same directory which is then renamed over the document, so readers in
//! this or any other process only ever see complete snapshots.

use crate::error::{CoreError, Result};
use crate::model::{Sample, Series, Snapshot};
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::fs;
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

/// Retry policy for snapshot IO
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            initial_backoff: Duration::from_millis(100),
        }
    }
}

/// Mode of the snapshot document, readable by viewers running as other users.
#[cfg(unix)]
const DOCUMENT_MODE: u32 = 0o644;

pub struct TimeSeriesStore {
    path: PathBuf,
    retry: RetryPolicy,
    /// Serializes the whole load, append, persist sequence.
    write_lock: Mutex<()>,
}

impl TimeSeriesStore {
    /// Open the store for `target` under `data_dir`, creating an empty
    /// snapshot with every known series when none exists yet.
    pub fn open(data_dir: &Path, target: &str, retry: RetryPolicy) -> Result<Self> {
        let path = data_dir.join(format!("{}.json", target_key(target)));
        Self::open_at(path, retry)
    }

    /// Open the store backed by an explicit document path.
    pub fn open_at(path: PathBuf, retry: RetryPolicy) -> Result<Self> {
        let store = Self {
            path,
            retry,
            write_lock: Mutex::new(()),
        };

        store.with_retry("initialize", || {
            if let Some(dir) = store.dir() {
                fs::create_dir_all(dir)?;
            }
            if store.path.exists() {
                // Refuse to start over a document we cannot parse.
                read_snapshot(&store.path)?;
            } else {
                store.persist(&Snapshot::empty())?;
                debug!(path = %store.path.display(), "created empty snapshot");
            }
            Ok(())
        })?;

        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one sample to `series`.
    ///
    /// The read-modify-write runs under a single lock so concurrent appends
    /// from different agents never lose each other's samples.
    pub fn append(&self, series: Series, sample: Sample) -> Result<()> {
        let _guard = self.write_lock.lock();
        self.with_retry("append", || {
            let mut snapshot = read_snapshot(&self.path)?;
            snapshot.push(series, sample.clone());
            self.persist(&snapshot)
        })
    }

    /// The full current snapshot.
    pub fn read_all(&self) -> Result<Snapshot> {
        self.with_retry("read", || read_snapshot(&self.path))
    }

    fn dir(&self) -> Option<&Path> {
        self.path.parent().filter(|p| !p.as_os_str().is_empty())
    }

    fn persist(&self, snapshot: &Snapshot) -> Result<()> {
        let dir = self.dir().unwrap_or_else(|| Path::new("."));
        let tmp = NamedTempFile::new_in(dir)?;
        {
            let mut writer = BufWriter::new(tmp.as_file());
            serde_json::to_writer(&mut writer, snapshot)?;
            writer.flush()?;
        }
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tmp.as_file()
                .set_permissions(fs::Permissions::from_mode(DOCUMENT_MODE))?;
        }
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| CoreError::Io(e.error))?;
        Ok(())
    }

    fn with_retry<T>(&self, op: &str, mut f: impl FnMut() -> Result<T>) -> Result<T> {
        let mut backoff = self.retry.initial_backoff;
        let mut attempt = 1;
        loop {
            match f() {
                Ok(value) => return Ok(value),
                Err(e) if attempt >= self.retry.attempts => {
                    return Err(CoreError::store_io(format!(
                        "{op} on {} failed after {attempt} attempts: {e}",
                        self.path.display()
                    )));
                }
                Err(e) => {
                    warn!(
                        op,
                        attempt,
                        path = %self.path.display(),
                        error = %e,
                        "store access failed, retrying"
                    );
                    thread::sleep(backoff);
                    backoff = backoff.saturating_mul(2);
                    attempt += 1;
                }
            }
        }
    }
}

/// Parse the snapshot at `path`. Usable by readers outside the collector process.
pub fn read_snapshot(path: &Path) -> Result<Snapshot> {
    let contents = fs::read_to_string(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => CoreError::store_io(format!("no snapshot at {}", path.display())),
        _ => CoreError::Io(e),
    })?;
    Ok(serde_json::from_str(&contents)?)
}

/// Stable file stem for a target: the first 16 hex digits of its SHA-256.
pub fn target_key(target: &str) -> String {
    let digest = Sha256::digest(target.as_bytes());
    format!("{digest:x}")[..16].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn quick_retry() -> RetryPolicy {
        RetryPolicy {
            attempts: 3,
            initial_backoff: Duration::from_millis(1),
        }
    }

    #[test]
    fn open_creates_every_series_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = TimeSeriesStore::open(dir.path(), "192.168.1.42", quick_retry()).unwrap();

        let snapshot = store.read_all().unwrap();
        assert_eq!(snapshot, Snapshot::empty());
        assert!(store.path().starts_with(dir.path()));
    }

    #[cfg(unix)]
    #[test]
    fn document_is_world_readable() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let store = TimeSeriesStore::open(dir.path(), "pi", quick_retry()).unwrap();
        store.append(Series::Temperature, Sample::now("40.1")).unwrap();

        let mode = fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, DOCUMENT_MODE);
    }

    #[test]
    fn reopening_keeps_history() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = TimeSeriesStore::open(dir.path(), "pi", quick_retry()).unwrap();
            store.append(Series::Temperature, Sample::new("t0", "40.1")).unwrap();
        }
        let store = TimeSeriesStore::open(dir.path(), "pi", quick_retry()).unwrap();
        store.append(Series::Temperature, Sample::new("t1", "40.2")).unwrap();

        let temps = store.read_all().unwrap().series(Series::Temperature).to_vec();
        assert_eq!(temps, vec![Sample::new("t0", "40.1"), Sample::new("t1", "40.2")]);
    }

    #[test]
    fn target_key_is_stable_and_distinct() {
        assert_eq!(target_key("raspberrypi"), target_key("raspberrypi"));
        assert_ne!(target_key("10.0.0.1"), target_key("10.0.0.2"));
        assert_eq!(target_key("x").len(), 16);
    }

    #[test]
    fn concurrent_appends_are_never_lost() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(TimeSeriesStore::open(dir.path(), "pi", quick_retry()).unwrap());
        let writers = 8;
        let per_writer = 25;

        let handles: Vec<_> = (0..writers)
            .map(|w| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for i in 0..per_writer {
                        let series = if w % 2 == 0 { Series::CpuLoad } else { Series::MemoryLoad };
                        store.append(series, Sample::now(format!("{w}-{i}"))).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let snapshot = store.read_all().unwrap();
        assert_eq!(snapshot.total_samples(), writers * per_writer);
        assert_eq!(snapshot.series(Series::CpuLoad).len(), writers / 2 * per_writer);
    }

    #[test]
    fn readers_never_see_partial_documents() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(TimeSeriesStore::open(dir.path(), "pi", quick_retry()).unwrap());
        let path = store.path().to_path_buf();

        let writer = {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for i in 0..200 {
                    store.append(Series::RxKb, Sample::now(format!("{i}.5"))).unwrap();
                }
            })
        };

        let readers: Vec<_> = (0..3)
            .map(|_| {
                let path = path.clone();
                thread::spawn(move || {
                    let mut seen = 0;
                    for _ in 0..300 {
                        let snapshot = read_snapshot(&path).expect("reader saw a torn snapshot");
                        let len = snapshot.series(Series::RxKb).len();
                        assert!(len >= seen, "series shrank from {seen} to {len}");
                        seen = len;
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
        assert_eq!(store.read_all().unwrap().series(Series::RxKb).len(), 200);
    }

    #[test]
    fn corrupt_document_surfaces_store_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        fs::write(&path, "{\"temp\": [").unwrap();

        let err = TimeSeriesStore::open_at(path, quick_retry()).err().unwrap();
        assert!(err.is_fatal());
    }

    #[test]
    fn vanished_document_fails_after_retries() {
        let dir = tempfile::tempdir().unwrap();
        let store = TimeSeriesStore::open(dir.path(), "pi", quick_retry()).unwrap();
        fs::remove_file(store.path()).unwrap();

        let err = store.append(Series::Power, Sample::now("581.0")).unwrap_err();
        assert!(matches!(err, CoreError::StoreIo(ref msg) if msg.contains("3 attempts")));
    }
}
