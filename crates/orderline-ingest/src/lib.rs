//! Orderline Ingestion
//!
//! Moves orders from a message source into the durable store and the cache:
//! - `IngestPipeline`: per-message decode, dedup, write-through, cache fill
//! - `Consumer`: the single receive/process/commit loop
//! - Message sources: in-process channel, newline-delimited file, Kafka

pub mod consumer;
pub mod pipeline;
pub mod sources;

pub use consumer::{Consumer, ConsumerHandle, ConsumerStats, RetryPolicy};
pub use pipeline::{CommitKind, IngestPipeline, ProcessOutcome, RejectReason};
