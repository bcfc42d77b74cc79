#![allow(async_fn_in_trait)]

use chrono::{DateTime, Utc};

use crate::domain::types::{EventLogEntry, RamEvent, Settlement};
use crate::error::RamError;

/// Storage the consumer drains.
pub trait EventStore: Send + Sync {
    /// Fail unless the version, event and event log tables exist and the
    /// recorded protocol version matches this build.
    async fn verify_consumer_schema(&self) -> Result<(), RamError>;

    /// Events under `parent_key` with one of `keys` that are due before `now`,
    /// ordered by `want_to_send_after` then id.
    async fn due_events(
        &self,
        parent_key: &str,
        keys: &[String],
        now: DateTime<Utc>,
    ) -> Result<Vec<RamEvent>, RamError>;

    /// Push a due event out to `lease_until`. Returns `false` when another
    /// consumer got there first.
    async fn claim(
        &self,
        event: &RamEvent,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
    ) -> Result<bool, RamError>;

    /// Append `log` and apply `settlement` to its event atomically.
    async fn settle(&self, log: &EventLogEntry, settlement: Settlement) -> Result<(), RamError>;
}
