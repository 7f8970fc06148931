//! In-process message source backed by a tokio channel

use async_trait::async_trait;
use orderline_core::{AckToken, Error, InboundMessage, MessageSource, Result};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

const TOPIC: &str = "channel";

/// Producer half of [`ChannelSource`]
#[derive(Clone)]
pub struct ChannelSender {
    tx: mpsc::Sender<InboundMessage>,
    next_offset: Arc<AtomicI64>,
}

impl ChannelSender {
    /// Queue a payload, returning the offset it was assigned
    pub async fn send(&self, payload: impl Into<Vec<u8>>) -> Result<i64> {
        self.send_keyed(None, payload).await
    }

    /// Queue a payload with a message key
    pub async fn send_keyed(
        &self,
        key: Option<Vec<u8>>,
        payload: impl Into<Vec<u8>>,
    ) -> Result<i64> {
        let offset = self.next_offset.fetch_add(1, Ordering::SeqCst);
        let message = InboundMessage {
            key,
            payload: payload.into(),
            token: AckToken {
                topic: TOPIC.to_string(),
                partition: 0,
                offset,
            },
        };
        self.tx.send(message).await.map_err(|_| Error::SourceClosed)?;
        Ok(offset)
    }
}

/// Shared record of committed tokens, readable after the source moves
#[derive(Clone, Default)]
pub struct CommitLog {
    tokens: Arc<Mutex<Vec<AckToken>>>,
}

impl CommitLog {
    /// Tokens committed so far, in commit order
    pub fn tokens(&self) -> Vec<AckToken> {
        self.tokens.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Committed offsets, in commit order
    pub fn offsets(&self) -> Vec<i64> {
        self.tokens().iter().map(|t| t.offset).collect()
    }

    fn push(&self, token: AckToken) {
        self.tokens
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(token);
    }
}

/// Message source fed by [`ChannelSender`]
///
/// Ends with `Error::SourceClosed` once every sender is dropped and the
/// queue is drained.
pub struct ChannelSource {
    rx: mpsc::Receiver<InboundMessage>,
    commits: CommitLog,
}

/// Create a bounded channel source
pub fn channel(capacity: usize) -> (ChannelSender, ChannelSource) {
    let (tx, rx) = mpsc::channel(capacity);
    (
        ChannelSender {
            tx,
            next_offset: Arc::new(AtomicI64::new(0)),
        },
        ChannelSource {
            rx,
            commits: CommitLog::default(),
        },
    )
}

impl ChannelSource {
    pub fn commit_log(&self) -> CommitLog {
        self.commits.clone()
    }
}

#[async_trait]
impl MessageSource for ChannelSource {
    async fn receive(&mut self) -> Result<InboundMessage> {
        // mpsc::Receiver::recv is cancel-safe
        self.rx.recv().await.ok_or(Error::SourceClosed)
    }

    async fn commit(&mut self, token: &AckToken) -> Result<()> {
        self.commits.push(token.clone());
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.rx.close();
        Ok(())
    }
}
