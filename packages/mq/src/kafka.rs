use std::time::Duration;

use async_trait::async_trait;
use rdkafka::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use tracing::debug;

use crate::config::BusConfig;
use crate::error::BusError;
use crate::models::{ChangeBus, ChangingRecord};

/// Kafka-backed change bus. Records are JSON values keyed by the recipient
/// chat id, so one recipient's events land in order on one partition.
pub struct KafkaChangeBus {
    producer: FutureProducer,
    topic: String,
    write_timeout: Duration,
}

impl KafkaChangeBus {
    pub fn new(cfg: BusConfig) -> Result<Self, BusError> {
        if cfg.brokers.is_empty() {
            return Err(BusError::Config("at least one broker is required".into()));
        }
        if cfg.topic.trim().is_empty() {
            return Err(BusError::Config("topic is required".into()));
        }

        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", cfg.brokers.join(","))
            .set("acks", "all")
            .set("message.send.max.retries", cfg.max_attempts.to_string())
            .set("linger.ms", cfg.batch_timeout_ms.to_string())
            .set("message.timeout.ms", cfg.write_timeout_ms.to_string())
            .create()?;

        Ok(Self {
            producer,
            topic: cfg.topic,
            write_timeout: Duration::from_millis(cfg.write_timeout_ms),
        })
    }
}

#[async_trait]
impl ChangeBus for KafkaChangeBus {
    async fn publish(&self, chat_id: &str, record: &ChangingRecord) -> Result<(), BusError> {
        let payload = serde_json::to_vec(record)?;
        let delivery = self
            .producer
            .send(
                FutureRecord::to(&self.topic).key(chat_id).payload(&payload),
                Timeout::After(self.write_timeout),
            )
            .await;

        match delivery {
            Ok((partition, offset)) => {
                debug!(chat_id, partition, offset, "change record delivered");
                Ok(())
            }
            Err((err, _unsent)) => Err(BusError::Broker(err)),
        }
    }
}
