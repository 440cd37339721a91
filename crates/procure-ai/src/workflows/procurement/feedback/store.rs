use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::super::scoring::Weights;
use super::FeedbackRecord;

const LOG_FILE: &str = "feedback.jsonl";
const SNAPSHOT_FILE: &str = "learned_weights.json";

/// Persistence boundary for the append-only feedback log.
pub trait FeedbackStore: Send + Sync {
    fn load(&self) -> Result<LoadedLog, FeedbackStoreError>;
    fn append(&self, record: &FeedbackRecord) -> Result<(), FeedbackStoreError>;
    fn write_snapshot(&self, snapshot: &LearnedSnapshot) -> Result<(), FeedbackStoreError>;
}

/// Records recovered from the log plus what had to be skipped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadedLog {
    pub records: Vec<FeedbackRecord>,
    /// One-based line numbers of complete lines that failed to parse.
    pub corrupt_lines: Vec<usize>,
    /// The final line had no terminating newline and was ignored.
    pub torn_tail: bool,
}

/// Derived weights written next to the log; always recomputable by replaying it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearnedSnapshot {
    pub decisions: u64,
    pub confidence: f64,
    pub learned_weights: Weights,
    pub effective_weights: Weights,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum FeedbackStoreError {
    #[error("feedback storage io failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("feedback record could not be encoded: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("feedback storage unavailable: {0}")]
    Unavailable(String),
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> FeedbackStoreError + '_ {
    move |source| FeedbackStoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// JSON-lines log at `<dir>/feedback.jsonl` with an atomically replaced snapshot at
/// `<dir>/learned_weights.json`.
#[derive(Debug)]
pub struct JsonlFeedbackStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlFeedbackStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn log_path(&self) -> PathBuf {
        self.dir.join(LOG_FILE)
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.dir.join(SNAPSHOT_FILE)
    }

    pub fn read_snapshot(&self) -> Result<Option<LearnedSnapshot>, FeedbackStoreError> {
        let path = self.snapshot_path();
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(io_error(&path)(err)),
        }
    }
}

impl FeedbackStore for JsonlFeedbackStore {
    fn load(&self) -> Result<LoadedLog, FeedbackStoreError> {
        let path = self.log_path();
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(LoadedLog::default()),
            Err(err) => return Err(io_error(&path)(err)),
        };
        Ok(parse_log(&bytes))
    }

    fn append(&self, record: &FeedbackRecord) -> Result<(), FeedbackStoreError> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let _guard = self.write_lock.lock().expect("feedback log mutex poisoned");
        fs::create_dir_all(&self.dir).map_err(io_error(&self.dir))?;

        let path = self.log_path();
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)
            .map_err(io_error(&path))?;

        // A torn trailing line must not swallow the next record.
        if ends_without_newline(&mut file).map_err(io_error(&path))? {
            warn!(path = %path.display(), "feedback log had a torn trailing line");
            line.insert(0, b'\n');
        }

        file.write_all(&line).map_err(io_error(&path))?;
        file.sync_data().map_err(io_error(&path))?;
        Ok(())
    }

    fn write_snapshot(&self, snapshot: &LearnedSnapshot) -> Result<(), FeedbackStoreError> {
        let bytes = serde_json::to_vec_pretty(snapshot)?;
        fs::create_dir_all(&self.dir).map_err(io_error(&self.dir))?;

        let target = self.snapshot_path();
        let staging = self.dir.join(format!("{SNAPSHOT_FILE}.tmp"));
        {
            let mut file = File::create(&staging).map_err(io_error(&staging))?;
            file.write_all(&bytes).map_err(io_error(&staging))?;
            file.sync_all().map_err(io_error(&staging))?;
        }
        fs::rename(&staging, &target).map_err(io_error(&target))?;
        Ok(())
    }
}

fn ends_without_newline(file: &mut File) -> std::io::Result<bool> {
    let length = file.metadata()?.len();
    if length == 0 {
        return Ok(false);
    }
    file.seek(SeekFrom::Start(length - 1))?;
    let mut last = [0_u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] != b'\n')
}

fn parse_log(bytes: &[u8]) -> LoadedLog {
    let mut log = LoadedLog::default();
    let mut lines: Vec<&[u8]> = bytes.split(|byte| *byte == b'\n').collect();

    // `split` yields an empty final slice when the log ends with a newline.
    match lines.last() {
        Some(last) if last.is_empty() => {
            lines.pop();
        }
        Some(_) => {
            lines.pop();
            log.torn_tail = true;
        }
        None => {}
    }

    for (index, line) in lines.iter().enumerate() {
        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }
        match serde_json::from_slice::<FeedbackRecord>(line) {
            Ok(record) => log.records.push(record),
            Err(_) => log.corrupt_lines.push(index + 1),
        }
    }

    log
}

/// Volatile store for tests and ephemeral runs.
#[derive(Debug, Default)]
pub struct MemoryFeedbackStore {
    records: Mutex<Vec<FeedbackRecord>>,
    snapshot: Mutex<Option<LearnedSnapshot>>,
}

impl MemoryFeedbackStore {
    pub fn with_records(records: Vec<FeedbackRecord>) -> Self {
        Self {
            records: Mutex::new(records),
            snapshot: Mutex::new(None),
        }
    }

    pub fn snapshot(&self) -> Option<LearnedSnapshot> {
        self.snapshot
            .lock()
            .expect("feedback snapshot mutex poisoned")
            .clone()
    }
}

impl FeedbackStore for MemoryFeedbackStore {
    fn load(&self) -> Result<LoadedLog, FeedbackStoreError> {
        Ok(LoadedLog {
            records: self
                .records
                .lock()
                .expect("feedback log mutex poisoned")
                .clone(),
            ..LoadedLog::default()
        })
    }

    fn append(&self, record: &FeedbackRecord) -> Result<(), FeedbackStoreError> {
        self.records
            .lock()
            .expect("feedback log mutex poisoned")
            .push(record.clone());
        Ok(())
    }

    fn write_snapshot(&self, snapshot: &LearnedSnapshot) -> Result<(), FeedbackStoreError> {
        *self
            .snapshot
            .lock()
            .expect("feedback snapshot mutex poisoned") = Some(snapshot.clone());
        Ok(())
    }
}
