//! Table definitions for the RAM outbox.
//!
//! Event and event-log table names are chosen at runtime, so instead of
//! entity derives each module exposes column identifiers, a row model and
//! the statement builders that operate on the table.

pub mod event_logs;
pub mod events;
pub mod version;
