//! Cache snapshot file format
//!
//! Layout (all integers little-endian):
//!
//! ```text
//! magic        8 bytes   "OLSNAP\0\0"
//! version      u16       FORMAT_VERSION
//! compression  u8        CompressionAlgorithm tag
//! reserved     u8        0
//! length       u64       compressed payload length
//! checksum     32 bytes  SHA-256 of the compressed payload
//! payload      bincode(Vec<SnapshotEntry>), compressed
//! ```
//!
//! Anything that does not match this layout exactly is reported as
//! `StorageError::InvalidData`.

use crate::atomic_writer::AtomicWriter;
use crate::compression::{CompressionAlgorithm, compress, decompress};
use crate::error::{StorageError, StorageResult};
use bincode::Options;
use orderline_core::Order;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;

pub const MAGIC: &[u8; 8] = b"OLSNAP\0\0";
pub const FORMAT_VERSION: u16 = 1;

const HEADER_LEN: usize = 8 + 2 + 1 + 1 + 8 + 32;

/// One cache entry as persisted on disk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub key: String,
    pub order: Order,
    /// Absolute expiry as nanoseconds since the Unix epoch; `None` never expires
    pub expires_at_unix_nanos: Option<i64>,
}

fn bincode_options() -> impl Options {
    bincode::DefaultOptions::new()
}

/// Encode entries into a complete snapshot file image
pub fn encode_snapshot(
    entries: &[SnapshotEntry],
    algorithm: CompressionAlgorithm,
) -> StorageResult<Vec<u8>> {
    let raw = bincode_options()
        .serialize(entries)
        .map_err(|e| StorageError::Serialization(e.to_string()))?;
    let payload = compress(&raw, algorithm)?;
    let checksum = Sha256::digest(&payload);

    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    out.push(algorithm.tag());
    out.push(0);
    out.extend_from_slice(&(payload.len() as u64).to_le_bytes());
    out.extend_from_slice(&checksum);
    out.extend_from_slice(&payload);
    Ok(out)
}

/// Decode a snapshot file image
pub fn decode_snapshot(bytes: &[u8]) -> StorageResult<Vec<SnapshotEntry>> {
    if bytes.len() < HEADER_LEN {
        return Err(StorageError::InvalidData(format!(
            "Snapshot too short: {} bytes",
            bytes.len()
        )));
    }
    let (header, payload) = bytes.split_at(HEADER_LEN);

    if &header[0..8] != MAGIC {
        return Err(StorageError::InvalidData(
            "Snapshot magic mismatch".to_string(),
        ));
    }

    let version = u16::from_le_bytes([header[8], header[9]]);
    if version != FORMAT_VERSION {
        return Err(StorageError::InvalidData(format!(
            "Unsupported snapshot version {} (expected {})",
            version, FORMAT_VERSION
        )));
    }

    let algorithm = CompressionAlgorithm::from_tag(header[10])?;

    let mut len_bytes = [0u8; 8];
    len_bytes.copy_from_slice(&header[12..20]);
    let declared_len = u64::from_le_bytes(len_bytes);
    if declared_len != payload.len() as u64 {
        return Err(StorageError::InvalidData(format!(
            "Snapshot payload length mismatch: header says {}, found {}",
            declared_len,
            payload.len()
        )));
    }

    if Sha256::digest(payload).as_slice() != &header[20..52] {
        return Err(StorageError::InvalidData(
            "Snapshot checksum mismatch".to_string(),
        ));
    }

    let raw = decompress(payload, algorithm)?;
    bincode_options()
        .with_limit(raw.len() as u64)
        .deserialize(&raw)
        .map_err(|e| StorageError::InvalidData(format!("Snapshot decode failed: {}", e)))
}

/// Atomically write a snapshot to `path`
///
/// Returns the number of bytes written.
pub fn write_snapshot(
    path: &Path,
    entries: &[SnapshotEntry],
    algorithm: CompressionAlgorithm,
) -> StorageResult<u64> {
    let bytes = encode_snapshot(entries, algorithm)?;
    let mut writer = AtomicWriter::new(path)?;
    writer.write(&bytes)?;
    let written = writer.bytes_written();
    writer.commit()?;

    tracing::debug!(
        path = %path.display(),
        entries = entries.len(),
        bytes = written,
        "Snapshot written"
    );
    Ok(written)
}

/// Read and decode the snapshot at `path`
pub fn read_snapshot(path: &Path) -> StorageResult<Vec<SnapshotEntry>> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(StorageError::NotFound(path.display().to_string()));
        }
        Err(e) => return Err(StorageError::Io(e)),
    };
    decode_snapshot(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use orderline_core::testing::sample_order;
    use tempfile::TempDir;

    fn entries() -> Vec<SnapshotEntry> {
        vec![
            SnapshotEntry {
                key: "b563feb7b2b84b6test".to_string(),
                order: sample_order("b563feb7b2b84b6test"),
                expires_at_unix_nanos: None,
            },
            SnapshotEntry {
                key: "short-lived".to_string(),
                order: sample_order("short-lived"),
                expires_at_unix_nanos: Some(1_700_000_000_123_456_789),
            },
        ]
    }

    #[test]
    fn test_write_then_read_preserves_entries_and_expiry() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("order_cache.snap");

        write_snapshot(&path, &entries(), CompressionAlgorithm::Zstd).unwrap();
        let loaded = read_snapshot(&path).unwrap();

        assert_eq!(loaded, entries());
    }

    #[test]
    fn test_lz4_and_uncompressed_payloads_decode() {
        for algorithm in [CompressionAlgorithm::Lz4, CompressionAlgorithm::None] {
            let bytes = encode_snapshot(&entries(), algorithm).unwrap();
            assert_eq!(bytes[10], algorithm.tag());
            assert_eq!(decode_snapshot(&bytes).unwrap(), entries());
        }
    }

    #[test]
    fn test_empty_snapshot() {
        let bytes = encode_snapshot(&[], CompressionAlgorithm::Zstd).unwrap();
        assert!(decode_snapshot(&bytes).unwrap().is_empty());
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let err = read_snapshot(&temp_dir.path().join("absent.snap")).unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
        assert!(err.is_absent());
    }

    #[test]
    fn test_wrong_version_is_invalid() {
        let mut bytes = encode_snapshot(&entries(), CompressionAlgorithm::Zstd).unwrap();
        bytes[8..10].copy_from_slice(&2u16.to_le_bytes());

        let err = decode_snapshot(&bytes).unwrap_err();
        assert!(matches!(err, StorageError::InvalidData(ref m) if m.contains("version")));
    }

    #[test]
    fn test_bad_magic_is_invalid() {
        let mut bytes = encode_snapshot(&entries(), CompressionAlgorithm::Zstd).unwrap();
        bytes[0] = b'X';
        assert!(matches!(
            decode_snapshot(&bytes),
            Err(StorageError::InvalidData(_))
        ));
    }

    #[test]
    fn test_truncated_file_is_invalid() {
        let bytes = encode_snapshot(&entries(), CompressionAlgorithm::Zstd).unwrap();

        assert!(matches!(
            decode_snapshot(&bytes[..bytes.len() - 3]),
            Err(StorageError::InvalidData(_))
        ));
        assert!(matches!(
            decode_snapshot(&bytes[..5]),
            Err(StorageError::InvalidData(_))
        ));
    }

    #[test]
    fn test_flipped_payload_byte_is_invalid() {
        let mut bytes = encode_snapshot(&entries(), CompressionAlgorithm::None).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;

        let err = decode_snapshot(&bytes).unwrap_err();
        assert!(matches!(err, StorageError::InvalidData(ref m) if m.contains("checksum")));
    }

    #[test]
    fn test_garbage_file_is_invalid() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("order_cache.snap");
        std::fs::write(&path, vec![0xAB; 4096]).unwrap();

        assert!(read_snapshot(&path).unwrap_err().is_absent());
    }
}
