use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// A single observed on-chain (or off-chain bridge) occurrence, as delivered
/// by the chain indexer to the event bus.
#[derive(Serialize, Deserialize, Clone, Debug, ToSchema)]
pub struct Event {
    pub topic: String,
    pub timestamp: DateTime<Utc>,
    pub payload: serde_json::Value,
    pub chain_id: Option<String>,
    pub block_height: Option<u64>,
    pub tx_hash: Option<String>,
    pub log_index: Option<u64>,
    pub contract_address: Option<String>,
}

impl Event {
    pub fn new(topic: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            topic: topic.into(),
            timestamp: Utc::now(),
            payload,
            chain_id: None,
            block_height: None,
            tx_hash: None,
            log_index: None,
            contract_address: None,
        }
    }

    /// The dedup key the indexer uses for exactly-once delivery: at most one
    /// `ProcessedEvent` exists per `(chain_id, tx_hash, log_index)`.
    pub fn dedup_key(&self) -> Option<(String, String, u64)> {
        Some((
            self.chain_id.clone()?,
            self.tx_hash.clone()?,
            self.log_index?,
        ))
    }
}

/// Marker row recorded once an `Event` has been durably processed by the
/// indexer, keyed by `(chain_id, tx_hash, log_index)`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, ToSchema)]
pub struct ProcessedEvent {
    pub chain_id: String,
    pub tx_hash: String,
    pub log_index: u64,
    pub block_height: u64,
    pub processed_at: DateTime<Utc>,
}

impl ProcessedEvent {
    pub fn key(&self) -> (String, String, u64) {
        (self.chain_id.clone(), self.tx_hash.clone(), self.log_index)
    }
}

/// Per-chain indexer cursor, advanced as blocks clear the confirmation depth.
#[derive(Serialize, Deserialize, Clone, Debug, Default, ToSchema)]
pub struct Progress {
    pub last_processed_block: u64,
    pub last_block_hash: Option<String>,
    pub last_processed_at: Option<DateTime<Utc>>,
}

impl Progress {
    /// The highest block height considered safe to index given a
    /// `confirmation_depth`: `chain_head - confirmation_depth`, floored at 0.
    pub fn safe_head(chain_head: u64, confirmation_depth: u64) -> u64 {
        chain_head.saturating_sub(confirmation_depth)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedup_key_requires_all_three_fields() {
        let mut event = Event::new("topic", serde_json::json!({}));
        assert_eq!(event.dedup_key(), None);
        event.chain_id = Some("1".to_string());
        event.tx_hash = Some("0xabc".to_string());
        event.log_index = Some(3);
        assert_eq!(
            event.dedup_key(),
            Some(("1".to_string(), "0xabc".to_string(), 3))
        );
    }

    #[test]
    fn safe_head_floors_at_zero() {
        assert_eq!(Progress::safe_head(10, 3), 7);
        assert_eq!(Progress::safe_head(2, 10), 0);
    }
}
