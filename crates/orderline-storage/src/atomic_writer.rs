//! Atomic file writer
//!
//! Data is written to a sibling temp file, flushed to disk, and renamed over
//! the target. A crash at any point leaves either the previous file or the
//! complete new one, never a truncated mix.

use crate::error::StorageResult;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Atomic file writer that writes to a temporary file and renames on commit
pub struct AtomicWriter {
    temp_path: PathBuf,
    final_path: PathBuf,
    file: File,
    bytes_written: u64,
}

impl AtomicWriter {
    /// Create a new atomic writer for the given path
    pub fn new<P: AsRef<Path>>(path: P) -> StorageResult<Self> {
        let final_path = path.as_ref().to_path_buf();

        if let Some(parent) = final_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let temp_path = Self::temp_path(&final_path);
        let file = File::create(&temp_path)?;

        Ok(Self {
            temp_path,
            final_path,
            file,
            bytes_written: 0,
        })
    }

    /// Write `data` to `path` in one step
    pub fn write_file<P: AsRef<Path>>(path: P, data: &[u8]) -> StorageResult<()> {
        let mut writer = Self::new(path)?;
        writer.write(data)?;
        writer.commit()
    }

    /// Append data to the temporary file
    pub fn write(&mut self, data: &[u8]) -> StorageResult<()> {
        self.file.write_all(data)?;
        self.bytes_written += data.len() as u64;
        Ok(())
    }

    /// Bytes written so far
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Flush, fsync, and rename the temp file over the final path
    pub fn commit(mut self) -> StorageResult<()> {
        self.file.flush()?;
        self.file.sync_all()?;

        let temp_path = self.temp_path.clone();
        let final_path = self.final_path.clone();

        // Drop would delete the temp file
        std::mem::forget(self);

        fs::rename(&temp_path, &final_path)?;
        sync_parent_dir(&final_path);

        Ok(())
    }

    /// Temp file next to the target so the rename stays on one filesystem
    fn temp_path(final_path: &Path) -> PathBuf {
        let mut temp = final_path.as_os_str().to_owned();
        temp.push(format!(".{}.tmp", std::process::id()));
        PathBuf::from(temp)
    }
}

impl Drop for AtomicWriter {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.temp_path);
    }
}

/// Persist the rename itself; best effort
#[cfg(unix)]
fn sync_parent_dir(path: &Path) {
    if let Some(parent) = path.parent() {
        let dir = if parent.as_os_str().is_empty() {
            Path::new(".")
        } else {
            parent
        };
        if let Ok(handle) = File::open(dir) {
            if let Err(e) = handle.sync_all() {
                tracing::debug!(dir = %dir.display(), error = %e, "Directory fsync failed");
            }
        }
    }
}

#[cfg(not(unix))]
fn sync_parent_dir(_path: &Path) {}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_commit_replaces_previous_snapshot() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("order_cache.snap");
        fs::write(&path, b"old snapshot").unwrap();

        let mut writer = AtomicWriter::new(&path).unwrap();
        writer.write(b"new ").unwrap();
        writer.write(b"snapshot").unwrap();
        assert_eq!(writer.bytes_written(), 12);
        writer.commit().unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"new snapshot");
    }

    #[test]
    fn test_uncommitted_write_keeps_previous_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("order_cache.snap");
        fs::write(&path, b"previous").unwrap();

        {
            let mut writer = AtomicWriter::new(&path).unwrap();
            writer.write(b"half written").unwrap();
            // Dropped without commit, as on a failed encode
        }

        assert_eq!(fs::read(&path).unwrap(), b"previous");
        let leftovers: Vec<_> = fs::read_dir(temp_dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_creates_missing_parent_directories() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("state/cache/order_cache.snap");

        AtomicWriter::write_file(&path, b"data").unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_bare_filename_in_current_dir() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("bare.snap");
        // Parent is non-empty here; the empty-parent branch is covered by
        // `temp_path` keeping the file name intact.
        let temp = AtomicWriter::temp_path(Path::new("bare.snap"));
        assert!(temp.to_string_lossy().starts_with("bare.snap."));

        AtomicWriter::write_file(&path, b"x").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"x");
    }
}
