use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::RamError;

/// Protocol version recorded in `ram_version`. Producers and consumers refuse
/// to run against a database carrying any other value.
pub const PROTOCOL_VERSION: &str = "1.0";

pub const DEFAULT_PARENT_KEY: &str = "default";

pub const DEFAULT_EVENT_KEY: &str = "default";

/// Only event type defined so far.
pub const EVENT_TYPE: i32 = 1;

/// Longest accepted event key or parent key, in characters.
pub const MAX_KEY_LEN: usize = 255;

pub const DEFAULT_MAX_RETRY_TIME: u32 = 5;

/// Backoff in minutes, indexed by how many times the event already failed.
pub const DEFAULT_DELAY_TIME_WHEN_RETRIES: [u64; 5] = [1, 2, 4, 8, 16];

pub const DEFAULT_SLEEP_TIME_IF_NO_EVENT: Duration = Duration::from_secs(1);

/// The idle sleep is stretched by this factor after an infrastructure error.
pub const ERROR_SLEEP_MULTIPLIER: u32 = 10;

/// Value of the event `status` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventStatus {
    Created,
    NeedRetry,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "CREATED",
            Self::NeedRetry => "NEED RETRY",
        }
    }
}

/// Outcome recorded for one processing attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LogStatus {
    #[serde(rename = "success")]
    Success,
    #[serde(rename = "fail and retry")]
    FailAndRetry,
    #[serde(rename = "fail and done")]
    FailAndDone,
}

impl LogStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::FailAndRetry => "fail and retry",
            Self::FailAndDone => "fail and done",
        }
    }
}

/// A row of the event table as seen by the consumer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RamEvent {
    pub id: i64,
    #[serde(rename = "ref")]
    pub event_ref: Option<String>,
    pub parent_key: String,
    pub key: String,
    #[serde(rename = "type")]
    pub event_type: i32,
    pub status: String,
    pub retry_count: Option<i32>,
    pub payload: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub want_to_send_after: DateTime<Utc>,
}

impl RamEvent {
    /// Prior failures, treating a missing count as zero.
    pub fn retry_count(&self) -> i32 {
        self.retry_count.unwrap_or(0)
    }
}

/// One processing attempt: the event as it was when picked up plus the outcome.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventLogEntry {
    pub event: RamEvent,
    pub status: LogStatus,
    pub error_message: Option<String>,
    pub start_timestamp: DateTime<Utc>,
    pub finish_timestamp: DateTime<Utc>,
}

/// A stored log entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredEventLog {
    pub id: i64,
    #[serde(flatten)]
    pub entry: EventLogEntry,
    pub created_at: DateTime<Utc>,
}

/// What happens to the event row once its log entry is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    Delete,
    Reschedule {
        retry_count: i32,
        want_to_send_after: DateTime<Utc>,
    },
}

pub fn ensure_key_len(field: &'static str, value: &str) -> Result<(), RamError> {
    let len = value.chars().count();
    if len > MAX_KEY_LEN {
        return Err(RamError::KeyTooLong { field, len });
    }
    Ok(())
}
