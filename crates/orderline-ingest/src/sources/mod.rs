//! `MessageSource` implementations

pub mod channel;
pub mod file;
#[cfg(feature = "kafka")]
pub mod kafka;
mod tracker;

pub use channel::{ChannelSender, ChannelSource, CommitLog};
pub use file::FileSource;
#[cfg(feature = "kafka")]
pub use kafka::{KafkaSource, KafkaSourceConfig};
