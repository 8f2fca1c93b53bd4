pub mod config;
pub mod error;
pub mod kafka;
pub mod models;

pub use config::BusConfig;
pub use error::BusError;
pub use kafka::KafkaChangeBus;
pub use models::{ChangeBus, ChangingRecord, SYSTEM_AUTHOR, normalize_source_link};
