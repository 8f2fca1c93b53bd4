use serde::Deserialize;

/// Change-event bus configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct BusConfig {
    /// Broker addresses. Default: "localhost:9092".
    #[serde(default = "default_brokers")]
    pub brokers: Vec<String>,
    /// Topic the change records land on. Default: "repo-changes".
    #[serde(default = "default_topic")]
    pub topic: String,
    /// Delivery attempts per record. Default: 3.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Producer-side batching window in milliseconds. Default: 50.
    #[serde(default = "default_batch_timeout_ms")]
    pub batch_timeout_ms: u64,
    /// Per-record delivery deadline in milliseconds. Default: 10000.
    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,
}

fn default_brokers() -> Vec<String> {
    vec!["localhost:9092".into()]
}
fn default_topic() -> String {
    "repo-changes".into()
}
fn default_max_attempts() -> u32 {
    3
}
fn default_batch_timeout_ms() -> u64 {
    50
}
fn default_write_timeout_ms() -> u64 {
    10_000
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            brokers: default_brokers(),
            topic: default_topic(),
            max_attempts: default_max_attempts(),
            batch_timeout_ms: default_batch_timeout_ms(),
            write_timeout_ms: default_write_timeout_ms(),
        }
    }
}
