//! Append-only JSON-lines sample log
//!
//! Every sample is written as one complete line. On open, the log is
//! replayed into an in-memory index that serves all queries; lines that
//! fail to decode (for example a torn final write) are skipped.

use super::{MemorySampleStore, SampleStore};
use crate::error::StoreError;
use crate::models::{IfIndex, Sample};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Sample store persisted to a JSON-lines file
#[derive(Debug)]
pub struct FileSampleStore {
    path: PathBuf,
    writer: Mutex<LogWriter<File>>,
    index: MemorySampleStore,
}

/// Append side of the log
///
/// `torn` is set while the log may end in a partial line, either found on
/// open or left by a failed write. The next line is then preceded by a
/// newline so it never merges with the fragment.
#[derive(Debug)]
pub(super) struct LogWriter<W> {
    pub(super) inner: W,
    torn: bool,
}

impl<W: AsyncWrite + Unpin> LogWriter<W> {
    pub(super) fn new(inner: W, torn: bool) -> Self {
        Self { inner, torn }
    }

    pub(super) async fn write_line(&mut self, line: &[u8]) -> std::io::Result<()> {
        if self.torn {
            self.inner.write_all(b"\n").await?;
            self.torn = false;
        }
        if let Err(e) = self.write_and_flush(line).await {
            self.torn = true;
            return Err(e);
        }
        Ok(())
    }

    async fn write_and_flush(&mut self, line: &[u8]) -> std::io::Result<()> {
        self.inner.write_all(line).await?;
        self.inner.flush().await
    }
}

impl FileSampleStore {
    /// Open (or create) the log at `path` and replay existing samples
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let open_err = |source| StoreError::Open {
            path: path.display().to_string(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.map_err(open_err)?;
        }

        let index = MemorySampleStore::new();
        let torn_tail = match fs::read_to_string(&path).await {
            Ok(content) => {
                replay(&path, &content, &index);
                !content.is_empty() && !content.ends_with('\n')
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
            Err(e) => return Err(open_err(e)),
        };

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(open_err)?;

        info!(path = %path.display(), samples = index.len(), "Opened sample log");

        Ok(Self {
            path,
            writer: Mutex::new(LogWriter::new(file, torn_tail)),
            index,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

pub(super) fn replay(path: &Path, content: &str, index: &MemorySampleStore) {
    let mut skipped = 0usize;
    for (line_no, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Sample>(line) {
            Ok(sample) => index.insert(sample),
            Err(e) => {
                skipped += 1;
                warn!(
                    path = %path.display(),
                    line = line_no + 1,
                    error = %e,
                    "Skipping undecodable sample log line"
                );
            }
        }
    }
    if skipped > 0 {
        warn!(path = %path.display(), skipped, "Sample log replay skipped lines");
    }
}

#[async_trait]
impl SampleStore for FileSampleStore {
    async fn append(&self, sample: Sample) -> Result<(), StoreError> {
        let if_index = sample.if_index;
        let write_err = |reason: String| StoreError::WriteFailure { if_index, reason };

        let mut line = serde_json::to_vec(&sample).map_err(|e| write_err(e.to_string()))?;
        line.push(b'\n');

        // Hold the writer across the index insert so file order matches index order
        let mut writer = self.writer.lock().await;
        writer
            .write_line(&line)
            .await
            .map_err(|e| write_err(e.to_string()))?;
        self.index.insert(sample);

        Ok(())
    }

    async fn latest_per_key(&self) -> Result<Vec<Sample>, StoreError> {
        self.index.latest_per_key().await
    }

    async fn range_for_key(
        &self,
        if_index: IfIndex,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<Sample>, StoreError> {
        self.index.range_for_key(if_index, since, until).await
    }

    async fn tail_for_key(
        &self,
        if_index: IfIndex,
        count: usize,
    ) -> Result<Vec<Sample>, StoreError> {
        self.index.tail_for_key(if_index, count).await
    }
}
