//! Newline-delimited file message source
//!
//! Each line of the file is one message payload; an empty line is an empty
//! payload. The committed position is kept in `<file>.offset` and replaced
//! atomically on every commit, so a restart resumes after the last committed
//! line and redelivers anything after it.

use async_trait::async_trait;
use orderline_core::{AckToken, Error, InboundMessage, MessageSource, Result};
use orderline_storage::AtomicWriter;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, BufReader};

use super::tracker::CommitTracker;

/// Message source reading newline-delimited payloads from a file
pub struct FileSource {
    path: PathBuf,
    offset_path: PathBuf,
    topic: String,
    reader: BufReader<File>,
    /// Byte position of the start of the next unread line
    position: u64,
    /// Bytes of an incomplete trailing line read so far
    partial: Vec<u8>,
    follow: bool,
    poll_interval: Duration,
    tracker: CommitTracker,
}

impl FileSource {
    /// Open `path` and seek to the last committed position
    ///
    /// With `follow` set, reaching the end of the file waits for more lines;
    /// otherwise it ends the source.
    pub async fn open(path: impl AsRef<Path>, follow: bool, poll_interval: Duration) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let offset_path = offset_path_for(&path);
        let position = read_committed_offset(&offset_path).await?;

        let mut file = File::open(&path).await?;
        let len = file.metadata().await?.len();
        let position = if position > len {
            tracing::warn!(
                path = %path.display(),
                committed = position,
                len,
                "Committed offset is past end of file, starting from the beginning"
            );
            0
        } else {
            position
        };
        file.seek(SeekFrom::Start(position)).await?;

        tracing::info!(path = %path.display(), position, follow, "Opened file source");

        Ok(Self {
            topic: path.display().to_string(),
            path,
            offset_path,
            reader: BufReader::new(file),
            position,
            partial: Vec::new(),
            follow,
            poll_interval,
            tracker: CommitTracker::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Where committed positions are persisted
    pub fn offset_path(&self) -> &Path {
        &self.offset_path
    }
}

/// `<file>.offset` next to the input file
pub fn offset_path_for(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".offset");
    PathBuf::from(name)
}

async fn read_committed_offset(offset_path: &Path) -> Result<u64> {
    match tokio::fs::read_to_string(offset_path).await {
        Ok(text) => text.trim().parse::<u64>().map_err(|e| {
            Error::Source(format!(
                "Invalid offset file {}: {}",
                offset_path.display(),
                e
            ))
        }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
        Err(e) => Err(Error::Io(e)),
    }
}

#[async_trait]
impl MessageSource for FileSource {
    async fn receive(&mut self) -> Result<InboundMessage> {
        loop {
            // Partial reads land in `self.partial`, so cancelling here loses nothing
            self.reader.read_until(b'\n', &mut self.partial).await?;

            if !self.partial.ends_with(b"\n") {
                if !self.follow {
                    if !self.partial.is_empty() {
                        // Unterminated last line
                        break;
                    }
                    return Err(Error::SourceClosed);
                }
                tokio::time::sleep(self.poll_interval).await;
                continue;
            }
            break;
        }

        let mut line = std::mem::take(&mut self.partial);
        let start = self.position;
        self.position += line.len() as u64;

        if line.ends_with(b"\n") {
            line.pop();
        }
        if line.ends_with(b"\r") {
            line.pop();
        }

        let start = start as i64;
        self.tracker.delivered(0, start, self.position as i64);

        Ok(InboundMessage {
            key: None,
            payload: line,
            token: AckToken {
                topic: self.topic.clone(),
                partition: 0,
                offset: start,
            },
        })
    }

    async fn commit(&mut self, token: &AckToken) -> Result<()> {
        let Some(watermark) = self.tracker.commit(token.partition, token.offset) else {
            return Ok(());
        };

        let offset_path = self.offset_path.clone();
        tokio::task::spawn_blocking(move || {
            AtomicWriter::write_file(&offset_path, watermark.to_string().as_bytes())
        })
        .await
        .map_err(|e| Error::Source(format!("Offset writer task failed: {}", e)))?
        .map_err(|e| Error::Source(format!("Failed to persist offset: {}", e)))?;

        tracing::trace!(offset = watermark, "Committed file offset");
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        tracing::info!(path = %self.path.display(), position = self.position, "Closing file source");
        Ok(())
    }
}
