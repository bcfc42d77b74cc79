//! Shared plumbing for the RAM producer, consumer and tooling.
//!
//! Holds connection settings, validated table identifiers and tracing setup.

pub mod config;
pub mod error;
pub mod sea_ext;
pub mod tracing;

pub use config::{MySqlConfig, MySqlSettings};
pub use error::ConfigError;
pub use sea_ext::{EventTables, TableName};
