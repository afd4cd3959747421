//! Append-only logs.
//!
//! Records are written once and never rewritten. Readers consume the log
//! tail-to-head through [`AppendLog::recent`].

use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::SeekFrom;

use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncSeekExt, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::{LedgerError, LedgerResult};

/// Anything that can be stored in a log.
pub trait Record: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

impl<T> Record for T where T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

/// Durable append-only log.
#[async_trait]
pub trait AppendLog<T: Record>: Send + Sync {
    /// Append one record.
    async fn append(&self, record: &T) -> LedgerResult<()>;

    /// Read every record, oldest first.
    async fn read_all(&self) -> LedgerResult<Vec<T>>;

    /// Number of records written.
    async fn len(&self) -> LedgerResult<u64>;

    /// Read up to `limit` records, newest first.
    async fn recent(&self, limit: usize) -> LedgerResult<Vec<T>> {
        let mut all = self.read_all().await?;
        all.reverse();
        all.truncate(limit);
        Ok(all)
    }

    async fn is_empty(&self) -> LedgerResult<bool> {
        Ok(self.len().await? == 0)
    }
}

/// In-memory log for tests and ephemeral runs.
pub struct MemoryLog<T> {
    records: RwLock<Vec<T>>,
}

impl<T: Record> MemoryLog<T> {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(Vec::new()),
        }
    }

    /// Snapshot of all records.
    pub fn records(&self) -> Vec<T> {
        self.records.read().clone()
    }
}

impl<T: Record> Default for MemoryLog<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T: Record> AppendLog<T> for MemoryLog<T> {
    async fn append(&self, record: &T) -> LedgerResult<()> {
        self.records.write().push(record.clone());
        Ok(())
    }

    async fn read_all(&self) -> LedgerResult<Vec<T>> {
        Ok(self.records.read().clone())
    }

    async fn len(&self) -> LedgerResult<u64> {
        Ok(self.records.read().len() as u64)
    }
}

/// Bytes read per step when scanning a log from its end.
const TAIL_CHUNK: usize = 64 * 1024;

/// JSON-lines file log with append-only writes.
///
/// A record is committed once its terminating newline is on disk. On open,
/// a final line without one is the remains of an interrupted append: it is
/// completed if it parses and discarded otherwise.
///
/// A log opened with [`FileLog::open`] validates every committed line and
/// reports a bad one as [`LedgerError::Corrupt`] instead of skipping it.
/// [`FileLog::open_lenient`] skips bad lines with a warning; it is meant
/// for observational logs whose loss does not make other state inconsistent.
pub struct FileLog<T> {
    path: PathBuf,
    strict: bool,
    count: RwLock<u64>,
    write_lock: Mutex<()>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Record> FileLog<T> {
    /// Open (or create) a log at `path`, validating every record.
    pub async fn open(path: impl Into<PathBuf>) -> LedgerResult<Self> {
        Self::open_with(path.into(), true).await
    }

    /// Open (or create) a log at `path` without parsing existing records.
    pub async fn open_lenient(path: impl Into<PathBuf>) -> LedgerResult<Self> {
        Self::open_with(path.into(), false).await
    }

    async fn open_with(path: PathBuf, strict: bool) -> LedgerResult<Self> {
        let count = if path.exists() {
            repair_tail::<T>(&path).await?;
            if strict {
                Self::load(&path, true).await?.len() as u64
            } else {
                count_lines(&path).await?
            }
        } else {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    tokio::fs::create_dir_all(parent).await?;
                }
            }
            0
        };

        debug!(path = %path.display(), records = count, strict = strict, "Opened append-only log");

        Ok(Self {
            path,
            strict,
            count: RwLock::new(count),
            write_lock: Mutex::new(()),
            _marker: PhantomData,
        })
    }

    /// Get the file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(path: &Path, strict: bool) -> LedgerResult<Vec<T>> {
        let file = File::open(path).await?;
        let mut lines = BufReader::new(file).lines();
        let mut records = Vec::new();
        let mut line_no = 0usize;

        while let Some(line) = lines.next_line().await? {
            line_no += 1;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(&line) {
                Ok(record) => records.push(record),
                Err(e) if strict => {
                    return Err(LedgerError::Corrupt {
                        path: path.to_path_buf(),
                        line: line_no,
                        reason: e.to_string(),
                    })
                }
                Err(e) => {
                    warn!(path = %path.display(), line = line_no, error = %e, "Skipping unreadable log record");
                }
            }
        }

        Ok(records)
    }
}

/// Read up to `limit` records from the end of a JSON-lines log, newest
/// first, without loading the whole file. Unreadable lines are skipped and
/// a missing file reads as empty. Never writes.
pub async fn read_tail<T: Record>(path: &Path, limit: usize) -> LedgerResult<Vec<T>> {
    if limit == 0 {
        return Ok(Vec::new());
    }
    let mut file = match File::open(path).await {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut pos = file.metadata().await?.len();
    let mut buf: Vec<u8> = Vec::new();
    while pos > 0 {
        let start = pos.saturating_sub(TAIL_CHUNK as u64);
        let mut chunk = vec![0u8; (pos - start) as usize];
        file.seek(SeekFrom::Start(start)).await?;
        file.read_exact(&mut chunk).await?;
        chunk.extend_from_slice(&buf);
        buf = chunk;
        pos = start;
        if buf.iter().filter(|b| **b == b'\n').count() > limit {
            break;
        }
    }

    let text = String::from_utf8_lossy(&buf);
    let mut lines: Vec<&str> = text.split('\n').collect();
    if pos > 0 && !lines.is_empty() {
        // Starts mid-record.
        lines.remove(0);
    }

    let mut records = Vec::with_capacity(limit);
    for line in lines.iter().rev() {
        if records.len() == limit {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str(line) {
            Ok(record) => records.push(record),
            Err(e) => debug!(path = %path.display(), error = %e, "Skipping unreadable tail record"),
        }
    }
    Ok(records)
}

/// Complete or drop a final line that lacks its newline.
async fn repair_tail<T: Record>(path: &Path) -> LedgerResult<()> {
    let mut file = OpenOptions::new().read(true).write(true).open(path).await?;
    let len = file.metadata().await?.len();
    if len == 0 {
        return Ok(());
    }

    let mut last = [0u8; 1];
    file.seek(SeekFrom::Start(len - 1)).await?;
    file.read_exact(&mut last).await?;
    if last[0] == b'\n' {
        return Ok(());
    }

    let keep = match last_newline(&mut file, len).await? {
        Some(at) => at + 1,
        None => 0,
    };
    let mut fragment = vec![0u8; (len - keep) as usize];
    file.seek(SeekFrom::Start(keep)).await?;
    file.read_exact(&mut fragment).await?;

    let complete = {
        let text = String::from_utf8_lossy(&fragment);
        !text.trim().is_empty() && serde_json::from_str::<T>(text.trim()).is_ok()
    };

    if complete {
        file.seek(SeekFrom::End(0)).await?;
        file.write_all(b"\n").await?;
        debug!(path = %path.display(), "Terminated final log record");
    } else {
        warn!(
            path = %path.display(),
            bytes = len - keep,
            "Discarding incomplete final log record"
        );
        file.set_len(keep).await?;
    }
    file.sync_all().await?;
    Ok(())
}

/// Offset of the last newline before `end`.
async fn last_newline(file: &mut File, end: u64) -> std::io::Result<Option<u64>> {
    let mut pos = end;
    let mut buf = vec![0u8; TAIL_CHUNK];
    while pos > 0 {
        let start = pos.saturating_sub(TAIL_CHUNK as u64);
        let n = (pos - start) as usize;
        file.seek(SeekFrom::Start(start)).await?;
        file.read_exact(&mut buf[..n]).await?;
        if let Some(i) = buf[..n].iter().rposition(|b| *b == b'\n') {
            return Ok(Some(start + i as u64));
        }
        pos = start;
    }
    Ok(None)
}

async fn count_lines(path: &Path) -> LedgerResult<u64> {
    let file = File::open(path).await?;
    let mut lines = BufReader::new(file).lines();
    let mut count = 0;
    while let Some(line) = lines.next_line().await? {
        if !line.trim().is_empty() {
            count += 1;
        }
    }
    Ok(count)
}

#[async_trait]
impl<T: Record> AppendLog<T> for FileLog<T> {
    async fn append(&self, record: &T) -> LedgerResult<()> {
        let mut json = serde_json::to_string(record)?;
        json.push('\n');

        let _guard = self.write_lock.lock().await;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;

        file.write_all(json.as_bytes()).await?;
        file.flush().await?;

        *self.count.write() += 1;
        Ok(())
    }

    async fn read_all(&self) -> LedgerResult<Vec<T>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        Self::load(&self.path, self.strict).await
    }

    async fn len(&self) -> LedgerResult<u64> {
        Ok(*self.count.read())
    }

    async fn recent(&self, limit: usize) -> LedgerResult<Vec<T>> {
        read_tail(&self.path, limit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use swen_types::{HealthEvent, HealthStatus};

    fn event(subsystem: &str) -> HealthEvent {
        HealthEvent::probe(subsystem, HealthStatus::Healthy, None)
    }

    #[tokio::test]
    async fn test_memory_log_recent_is_newest_first() {
        let log = MemoryLog::new();
        for name in ["a", "b", "c"] {
            log.append(&event(name)).await.unwrap();
        }

        let recent = log.recent(2).await.unwrap();
        let names: Vec<_> = recent.iter().map(|e| e.subsystem.as_str()).collect();
        assert_eq!(names, vec!["c", "b"]);
        assert_eq!(log.len().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_file_log_persistence() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("logs").join("health.jsonl");

        {
            let log = FileLog::<HealthEvent>::open(&path).await.unwrap();
            log.append(&event("api")).await.unwrap();
            log.append(&event("pool")).await.unwrap();
        }

        let log = FileLog::<HealthEvent>::open(&path).await.unwrap();
        assert_eq!(log.len().await.unwrap(), 2);

        log.append(&event("telemetry")).await.unwrap();
        let all = log.read_all().await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[2].subsystem, "telemetry");
    }

    #[tokio::test]
    async fn test_file_log_rejects_corrupt_line() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("decisions.jsonl");

        let good = serde_json::to_string(&event("api")).unwrap();
        std::fs::write(&path, format!("{}\n{{not json\n", good)).unwrap();

        let err = FileLog::<HealthEvent>::open(&path).await.err().unwrap();
        match err {
            LedgerError::Corrupt { line, .. } => assert_eq!(line, 2),
            other => panic!("expected corrupt error, got {other}"),
        }
    }

    #[tokio::test]
    async fn test_torn_final_line_is_discarded_on_open() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("health.jsonl");

        let good = serde_json::to_string(&event("api")).unwrap();
        std::fs::write(&path, format!("{}\n{}", good, &good[..good.len() / 2])).unwrap();

        let log = FileLog::<HealthEvent>::open(&path).await.unwrap();
        assert_eq!(log.len().await.unwrap(), 1);

        log.append(&event("pool")).await.unwrap();
        let reopened = FileLog::<HealthEvent>::open(&path).await.unwrap();
        let names: Vec<String> = reopened
            .read_all()
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.subsystem)
            .collect();
        assert_eq!(names, vec!["api", "pool"]);
    }

    #[tokio::test]
    async fn test_unterminated_complete_record_is_kept() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("health.jsonl");

        let good = serde_json::to_string(&event("api")).unwrap();
        std::fs::write(&path, &good).unwrap();

        let log = FileLog::<HealthEvent>::open(&path).await.unwrap();
        log.append(&event("pool")).await.unwrap();
        assert_eq!(log.read_all().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_lenient_log_skips_bad_lines() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("health.jsonl");

        let good = serde_json::to_string(&event("api")).unwrap();
        std::fs::write(&path, format!("{{oops\n{}\n", good)).unwrap();

        assert!(FileLog::<HealthEvent>::open(&path).await.is_err());
        let log = FileLog::<HealthEvent>::open_lenient(&path).await.unwrap();
        let all = log.read_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].subsystem, "api");
    }

    #[tokio::test]
    async fn test_tail_reads_newest_records() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("health.jsonl");

        let log = FileLog::<HealthEvent>::open(&path).await.unwrap();
        for i in 0..2_000 {
            log.append(&event(&format!("svc-{}", i))).await.unwrap();
        }

        let recent = log.recent(3).await.unwrap();
        let names: Vec<&str> = recent.iter().map(|e| e.subsystem.as_str()).collect();
        assert_eq!(names, vec!["svc-1999", "svc-1998", "svc-1997"]);

        let missing = read_tail::<HealthEvent>(&temp_dir.path().join("none.jsonl"), 5)
            .await
            .unwrap();
        assert!(missing.is_empty());
    }

    #[tokio::test]
    async fn test_blank_lines_are_ignored() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("health.jsonl");

        let good = serde_json::to_string(&event("api")).unwrap();
        std::fs::write(&path, format!("\n{}\n\n", good)).unwrap();

        let log = FileLog::<HealthEvent>::open(&path).await.unwrap();
        assert_eq!(log.len().await.unwrap(), 1);
    }
}
