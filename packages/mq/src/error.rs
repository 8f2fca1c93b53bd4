use thiserror::Error;

#[derive(Debug, Error)]
pub enum BusError {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("broker error: {0}")]
    Broker(#[from] rdkafka::error::KafkaError),

    #[error("configuration error: {0}")]
    Config(String),
}
