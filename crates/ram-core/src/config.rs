use std::fmt;

use url::Url;

use crate::error::ConfigError;
use crate::sea_ext::{
    DEFAULT_EVENT_LOG_TABLE_NAME, DEFAULT_EVENT_TABLE_NAME, EventTables, TableName,
};

pub const MYSQL_DATABASE: &str = "MYSQL_DATABASE";
pub const MYSQL_HOST: &str = "MYSQL_HOST";
pub const MYSQL_PASSWORD: &str = "MYSQL_PASSWORD";
pub const MYSQL_USER: &str = "MYSQL_USER";
pub const MYSQL_FORWARD_PORT: &str = "MYSQL_FORWARD_PORT";
pub const MYSQL_EVENT_TABLE_NAME: &str = "MYSQL_EVENT_TABLE_NAME";
pub const MYSQL_EVENT_LOG_TABLE_NAME: &str = "MYSQL_EVENT_LOG_TABLE_NAME";

/// Default MySQL port when neither an explicit value nor `MYSQL_FORWARD_PORT` is given.
pub const DEFAULT_PORT: u16 = 3306;

/// Explicitly supplied settings. Any field left as `None` falls back to its
/// environment variable, then (for the port and table names) to a default.
#[derive(Debug, Clone, Default)]
pub struct MySqlSettings {
    pub database: Option<String>,
    pub host: Option<String>,
    pub password: Option<String>,
    pub user: Option<String>,
    pub port: Option<u16>,
    pub event_table_name: Option<String>,
    pub event_log_table_name: Option<String>,
}

/// Resolved MySQL connection parameters and RAM table names.
#[derive(Clone)]
pub struct MySqlConfig {
    /// Schema name. Env var: `MYSQL_DATABASE`.
    pub database: String,
    /// Server host. Env var: `MYSQL_HOST`.
    pub host: String,
    /// Env var: `MYSQL_PASSWORD`.
    pub password: String,
    /// Env var: `MYSQL_USER`.
    pub user: String,
    /// Server port (default 3306). Env var: `MYSQL_FORWARD_PORT`.
    pub port: u16,
    /// Outbox table (default `ram_events`). Env var: `MYSQL_EVENT_TABLE_NAME`.
    pub event_table_name: TableName,
    /// Event log table (default `ram_event_logs`). Env var: `MYSQL_EVENT_LOG_TABLE_NAME`.
    pub event_log_table_name: TableName,
}

impl MySqlConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::resolve(MySqlSettings::default())
    }

    pub fn resolve(explicit: MySqlSettings) -> Result<Self, ConfigError> {
        Self::resolve_with(explicit, |name| std::env::var(name).ok())
    }

    /// Resolve `explicit` against an arbitrary variable lookup instead of the
    /// process environment.
    pub fn resolve_with<F>(explicit: MySqlSettings, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |value: Option<String>, attribute: &'static str, env_var: &'static str| {
            value
                .or_else(|| lookup(env_var))
                .ok_or(ConfigError::Missing { attribute, env_var })
        };

        let database = required(explicit.database, "database", MYSQL_DATABASE)?;
        let host = required(explicit.host, "host", MYSQL_HOST)?;
        let password = required(explicit.password, "password", MYSQL_PASSWORD)?;
        let user = required(explicit.user, "user", MYSQL_USER)?;

        let port = match explicit.port {
            Some(port) => port,
            None => match lookup(MYSQL_FORWARD_PORT) {
                Some(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidPort {
                    env_var: MYSQL_FORWARD_PORT,
                    value: raw,
                })?,
                None => DEFAULT_PORT,
            },
        };

        let event_table_name = TableName::parse(
            explicit
                .event_table_name
                .or_else(|| lookup(MYSQL_EVENT_TABLE_NAME))
                .unwrap_or_else(|| DEFAULT_EVENT_TABLE_NAME.to_owned()),
        )?;
        let event_log_table_name = TableName::parse(
            explicit
                .event_log_table_name
                .or_else(|| lookup(MYSQL_EVENT_LOG_TABLE_NAME))
                .unwrap_or_else(|| DEFAULT_EVENT_LOG_TABLE_NAME.to_owned()),
        )?;

        Ok(Self {
            database,
            host,
            password,
            user,
            port,
            event_table_name,
            event_log_table_name,
        })
    }

    pub fn tables(&self) -> EventTables {
        EventTables {
            events: self.event_table_name.clone(),
            event_logs: self.event_log_table_name.clone(),
        }
    }

    /// Connection URL for `sea_orm::Database::connect`, with credentials
    /// percent-encoded.
    pub fn database_url(&self) -> Result<String, ConfigError> {
        let invalid = |what: &str| ConfigError::InvalidUrl(format!("{what} for host {}", self.host));
        let mut url = Url::parse(&format!("mysql://{}:{}", self.host, self.port))
            .map_err(|e| ConfigError::InvalidUrl(e.to_string()))?;
        url.set_username(&self.user)
            .map_err(|()| invalid("cannot set user"))?;
        url.set_password(Some(&self.password))
            .map_err(|()| invalid("cannot set password"))?;
        url.set_path(&format!("/{}", self.database));
        Ok(url.into())
    }
}

impl fmt::Debug for MySqlConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MySqlConfig")
            .field("database", &self.database)
            .field("host", &self.host)
            .field("password", &"<redacted>")
            .field("user", &self.user)
            .field("port", &self.port)
            .field("event_table_name", &self.event_table_name)
            .field("event_log_table_name", &self.event_log_table_name)
            .finish()
    }
}
