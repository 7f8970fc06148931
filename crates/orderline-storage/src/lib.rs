//! Orderline Storage
//!
//! This crate provides the on-disk primitives used by the cache:
//! - Atomic file writes (temp file + fsync + rename)
//! - Compression helpers
//! - Versioned, checksummed snapshot encoding

pub mod atomic_writer;
pub mod compression;
pub mod error;
pub mod snapshot;

pub use atomic_writer::AtomicWriter;
pub use compression::CompressionAlgorithm;
pub use error::{StorageError, StorageResult};
pub use snapshot::{SnapshotEntry, read_snapshot, write_snapshot};
