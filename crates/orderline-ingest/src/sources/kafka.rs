//! Kafka message source
//!
//! Auto-commit is disabled. Offsets are committed per partition only up to
//! the first message that has not been committed yet, so a message the
//! consumer gave up on is redelivered after a restart or rebalance.

use async_trait::async_trait;
use orderline_core::{AckToken, Error, InboundMessage, MessageSource, Result};
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::Message;
use rdkafka::{Offset, TopicPartitionList};

use super::tracker::CommitTracker;

/// Connection settings for [`KafkaSource`]
#[derive(Debug, Clone)]
pub struct KafkaSourceConfig {
    /// Comma-separated bootstrap servers
    pub brokers: String,
    pub topic: String,
    pub group_id: String,
}

impl Default for KafkaSourceConfig {
    fn default() -> Self {
        Self {
            brokers: "kafka:9092".to_string(),
            topic: "orders".to_string(),
            group_id: "order-service-group".to_string(),
        }
    }
}

/// Consumer-group member reading one topic
pub struct KafkaSource {
    consumer: StreamConsumer,
    topic: String,
    tracker: CommitTracker,
}

impl KafkaSource {
    /// Create the consumer and subscribe to the configured topic
    pub fn connect(config: &KafkaSourceConfig) -> Result<Self> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("group.id", &config.group_id)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .create()
            .map_err(|e| Error::Source(format!("Failed to create Kafka consumer: {}", e)))?;

        consumer
            .subscribe(&[config.topic.as_str()])
            .map_err(|e| Error::Source(format!("Failed to subscribe to {}: {}", config.topic, e)))?;

        tracing::info!(
            brokers = %config.brokers,
            topic = %config.topic,
            group_id = %config.group_id,
            "Kafka source subscribed"
        );

        Ok(Self {
            consumer,
            topic: config.topic.clone(),
            tracker: CommitTracker::new(),
        })
    }
}

#[async_trait]
impl MessageSource for KafkaSource {
    async fn receive(&mut self) -> Result<InboundMessage> {
        let message = self
            .consumer
            .recv()
            .await
            .map_err(|e| Error::Source(e.to_string()))?;

        let partition = message.partition();
        let offset = message.offset();
        self.tracker.delivered(partition, offset, offset + 1);

        Ok(InboundMessage {
            key: message.key().map(<[u8]>::to_vec),
            payload: message.payload().map(<[u8]>::to_vec).unwrap_or_default(),
            token: AckToken {
                topic: message.topic().to_string(),
                partition,
                offset,
            },
        })
    }

    async fn commit(&mut self, token: &AckToken) -> Result<()> {
        let Some(next_offset) = self.tracker.commit(token.partition, token.offset) else {
            return Ok(());
        };

        let mut list = TopicPartitionList::new();
        list.add_partition_offset(&self.topic, token.partition, Offset::Offset(next_offset))
            .map_err(|e| Error::Source(e.to_string()))?;
        self.consumer
            .commit(&list, CommitMode::Async)
            .map_err(|e| Error::Source(format!("Kafka commit failed: {}", e)))?;

        tracing::trace!(partition = token.partition, offset = next_offset, "Committed Kafka offset");
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.consumer.unsubscribe();
        tracing::info!(topic = %self.topic, "Kafka source closed");
        Ok(())
    }
}
