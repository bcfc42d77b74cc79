use std::fmt;

use sea_orm::sea_query::Iden;

use crate::error::ConfigError;

/// Default name of the event (outbox) table.
pub const DEFAULT_EVENT_TABLE_NAME: &str = "ram_events";
/// Default name of the append-only event log table.
pub const DEFAULT_EVENT_LOG_TABLE_NAME: &str = "ram_event_logs";

const MAX_IDENTIFIER_LEN: usize = 64;

/// A table name that is safe to hand to the query builder as an identifier.
///
/// Checked once when configuration is resolved. Statements take their table
/// identifiers only from this type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableName(String);

impl TableName {
    pub fn parse(name: impl Into<String>) -> Result<Self, ConfigError> {
        let name = name.into();
        let mut chars = name.chars();
        let valid_head = chars
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
        let valid_tail = chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !valid_head || !valid_tail || name.len() > MAX_IDENTIFIER_LEN {
            return Err(ConfigError::InvalidTableName(name));
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Iden for TableName {
    fn unquoted(&self, s: &mut dyn fmt::Write) {
        // Statement buffers are Strings; writing into them does not fail.
        let _ = s.write_str(&self.0);
    }
}

/// The pair of tables a producer writes to and a consumer drains.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventTables {
    pub events: TableName,
    pub event_logs: TableName,
}

impl Default for EventTables {
    fn default() -> Self {
        Self {
            events: TableName(DEFAULT_EVENT_TABLE_NAME.to_owned()),
            event_logs: TableName(DEFAULT_EVENT_LOG_TABLE_NAME.to_owned()),
        }
    }
}
