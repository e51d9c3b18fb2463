//! Inbound SMS records.
//!
//! The provider's webhook delivers either a single record or a batch of
//! records. The `smsburst` binary reads one such payload per line:
//!
//! ```json
//! {"guid":"abcde12345","number":"+639123456789","message":"yes","date":"2025-01-20","hour":"10:15:00","time_received":"2025-01-20 10:14:50"}
//! [{"guid":"g1","number":"09123456789","message":"I can"},{"guid":"g2","number":"09170001111","message":"no"}]
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One SMS as reported by the provider.
///
/// `guid` is the provider's unique id and is used for duplicate suppression.
/// `number` is the sender and becomes the grouping key after normalization.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SmsRecord {
    pub guid: String,
    pub number: String,
    pub message: String,
    /// Date the provider stored the SMS (YYYY-MM-DD).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    /// Hour the provider stored the SMS (HH:mm:ss).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hour: Option<String>,
    /// Timestamp at which the handset received the SMS.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_received: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum InboundPayload {
    Batch(Vec<SmsRecord>),
    Single(SmsRecord),
}

/// Error parsing an inbound line.
#[derive(Debug, Error)]
pub enum InboundError {
    #[error("malformed SMS record: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Parses one line of input into zero or more records.
///
/// Blank lines yield an empty list.
pub fn parse_line(line: &str) -> Result<Vec<SmsRecord>, InboundError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(Vec::new());
    }

    match serde_json::from_str::<InboundPayload>(line)? {
        InboundPayload::Batch(records) => Ok(records),
        InboundPayload::Single(record) => Ok(vec![record]),
    }
}
