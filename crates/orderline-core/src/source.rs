//! Message source trait
//!
//! A message source is an at-least-once channel of opaque payloads. A message
//! is only considered consumed once its [`AckToken`] has been committed;
//! anything received but not committed is delivered again after a restart.

use async_trait::async_trait;

use crate::Result;

/// Position of a message in its source, handed back on commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AckToken {
    /// Topic or file the message came from
    pub topic: String,
    /// Partition within the topic (0 for unpartitioned sources)
    pub partition: i32,
    /// Offset of the message within the partition
    pub offset: i64,
}

/// A message received from a source
#[derive(Debug, Clone)]
pub struct InboundMessage {
    /// Optional message key
    pub key: Option<Vec<u8>>,
    /// Raw payload bytes (may be empty)
    pub payload: Vec<u8>,
    /// Token to commit once the message has been handled
    pub token: AckToken,
}

impl InboundMessage {
    /// Message key rendered for logging
    pub fn key_lossy(&self) -> String {
        self.key
            .as_deref()
            .map(|k| String::from_utf8_lossy(k).into_owned())
            .unwrap_or_default()
    }
}

/// At-least-once message source with explicit commits
#[async_trait]
pub trait MessageSource: Send {
    /// Wait for the next message
    ///
    /// Must be cancel-safe: dropping the future before it completes must not
    /// lose a message.
    ///
    /// # Errors
    /// - `Error::SourceClosed` once the source will never yield another message
    /// - `Error::Source` for transport failures (the caller may retry)
    async fn receive(&mut self) -> Result<InboundMessage>;

    /// Mark a message and everything before it in the same partition as consumed
    async fn commit(&mut self, token: &AckToken) -> Result<()>;

    /// Release the underlying connection or file handle
    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}
