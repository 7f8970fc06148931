//! Compression utilities for snapshot payloads

use crate::error::{StorageError, StorageResult};
use std::io::{Read, Write};

/// Compression algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompressionAlgorithm {
    /// Zstandard compression (best compression ratio)
    #[default]
    Zstd,
    /// LZ4 compression (fastest)
    Lz4,
    /// No compression
    None,
}

impl CompressionAlgorithm {
    /// Tag stored in the snapshot header
    pub fn tag(self) -> u8 {
        match self {
            CompressionAlgorithm::None => 0,
            CompressionAlgorithm::Zstd => 1,
            CompressionAlgorithm::Lz4 => 2,
        }
    }

    /// Parse a header tag
    pub fn from_tag(tag: u8) -> StorageResult<Self> {
        match tag {
            0 => Ok(CompressionAlgorithm::None),
            1 => Ok(CompressionAlgorithm::Zstd),
            2 => Ok(CompressionAlgorithm::Lz4),
            other => Err(StorageError::InvalidData(format!(
                "Unknown compression tag: {}",
                other
            ))),
        }
    }
}

/// Compress data using the specified algorithm
pub fn compress(data: &[u8], algorithm: CompressionAlgorithm) -> StorageResult<Vec<u8>> {
    match algorithm {
        CompressionAlgorithm::Zstd => compress_zstd(data),
        CompressionAlgorithm::Lz4 => compress_lz4(data),
        CompressionAlgorithm::None => Ok(data.to_vec()),
    }
}

/// Decompress data using the specified algorithm
pub fn decompress(data: &[u8], algorithm: CompressionAlgorithm) -> StorageResult<Vec<u8>> {
    match algorithm {
        CompressionAlgorithm::Zstd => decompress_zstd(data),
        CompressionAlgorithm::Lz4 => decompress_lz4(data),
        CompressionAlgorithm::None => Ok(data.to_vec()),
    }
}

fn compress_zstd(data: &[u8]) -> StorageResult<Vec<u8>> {
    let mut encoder = zstd::Encoder::new(Vec::new(), 3)
        .map_err(|e| StorageError::Serialization(format!("Zstd encoder error: {}", e)))?;

    encoder
        .write_all(data)
        .map_err(|e| StorageError::Serialization(format!("Zstd write error: {}", e)))?;

    encoder
        .finish()
        .map_err(|e| StorageError::Serialization(format!("Zstd finish error: {}", e)))
}

// Decoding failures mean the file is unusable, not that we failed to write it
fn decompress_zstd(data: &[u8]) -> StorageResult<Vec<u8>> {
    let mut decoder = zstd::Decoder::new(data)
        .map_err(|e| StorageError::InvalidData(format!("Zstd decoder error: {}", e)))?;

    let mut decompressed = Vec::new();
    decoder
        .read_to_end(&mut decompressed)
        .map_err(|e| StorageError::InvalidData(format!("Zstd read error: {}", e)))?;

    Ok(decompressed)
}

fn compress_lz4(data: &[u8]) -> StorageResult<Vec<u8>> {
    let mut encoder = lz4::EncoderBuilder::new()
        .build(Vec::new())
        .map_err(|e| StorageError::Serialization(format!("LZ4 encoder error: {}", e)))?;

    encoder
        .write_all(data)
        .map_err(|e| StorageError::Serialization(format!("LZ4 write error: {}", e)))?;

    let (compressed, result) = encoder.finish();
    result.map_err(|e| StorageError::Serialization(format!("LZ4 finish error: {}", e)))?;

    Ok(compressed)
}

fn decompress_lz4(data: &[u8]) -> StorageResult<Vec<u8>> {
    let mut decoder = lz4::Decoder::new(data)
        .map_err(|e| StorageError::InvalidData(format!("LZ4 decoder error: {}", e)))?;

    let mut decompressed = Vec::new();
    decoder
        .read_to_end(&mut decompressed)
        .map_err(|e| StorageError::InvalidData(format!("LZ4 read error: {}", e)))?;

    Ok(decompressed)
}
