//! Reliable Async Messaging: a transactional outbox over SQL.
//!
//! [`RamProducer`] writes events into the event table inside the caller's
//! connection or transaction. [`RamConsumer`] polls that table, hands each
//! due event to the handler registered for its key, and records every
//! attempt in the append-only event log before deleting or rescheduling the
//! event.

pub mod consumer;
pub mod domain;
pub mod error;
pub mod handler;
pub mod infra;
pub mod message;
pub mod producer;
pub mod retry;

pub use consumer::{ConsumerBuilder, RamConsumer};
pub use domain::repository::EventStore;
pub use domain::types::{
    EventLogEntry, EventStatus, LogStatus, RamEvent, Settlement, StoredEventLog,
};
pub use error::{HandlerError, RamError};
pub use handler::EventHandler;
pub use infra::db::DbEventStore;
pub use message::Message;
pub use producer::{NewEvent, ProducerBuilder, RamProducer};
pub use ram_core::{EventTables, MySqlConfig, MySqlSettings};
pub use ram_schema::event_logs::EventLogFilter;
pub use retry::RetryPolicy;
