use std::collections::HashMap;

use anyhow::Context as _;
use chrono::{DateTime, TimeDelta, Utc};
use sea_orm::sea_query::SelectStatement;
use sea_orm::{ConnectionTrait, Database, DatabaseConnection};
use tracing::{debug, info};

use ram_core::{EventTables, MySqlConfig};
use ram_schema::events::{self, NewEventRow};

use crate::domain::types::{
    DEFAULT_EVENT_KEY, DEFAULT_PARENT_KEY, EVENT_TYPE, EventStatus, ensure_key_len,
};
use crate::error::RamError;
use crate::infra::bootstrap;
use crate::message::Message;

/// One event to enqueue.
#[derive(Debug, Clone, Default)]
pub struct NewEvent {
    /// Defaults to `"default"`.
    pub key: Option<String>,
    /// Falls back to the producer's key map, then to `"default"`.
    pub parent_key: Option<String>,
    /// Opaque reference for correlating the event with caller-side data.
    pub event_ref: String,
    pub message: Option<Message>,
    pub delay_milliseconds: i64,
}

impl NewEvent {
    pub fn new(key: impl Into<String>, message: impl Into<Message>) -> Self {
        Self {
            key: Some(key.into()),
            message: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn parent_key(mut self, parent_key: impl Into<String>) -> Self {
        self.parent_key = Some(parent_key.into());
        self
    }

    pub fn event_ref(mut self, event_ref: impl Into<String>) -> Self {
        self.event_ref = event_ref.into();
        self
    }

    pub fn delay_milliseconds(mut self, delay: i64) -> Self {
        self.delay_milliseconds = delay;
        self
    }
}

#[derive(Default)]
pub struct ProducerBuilder {
    mysql_config: Option<MySqlConfig>,
    connection: Option<DatabaseConnection>,
    map_key_with_parent: HashMap<String, String>,
}

impl ProducerBuilder {
    pub fn mysql_config(mut self, config: MySqlConfig) -> Self {
        self.mysql_config = Some(config);
        self
    }

    /// Default connection for [`RamProducer::send`] and schema bootstrap.
    pub fn connection(mut self, db: DatabaseConnection) -> Self {
        self.connection = Some(db);
        self
    }

    pub fn map_key_with_parent(mut self, map: HashMap<String, String>) -> Self {
        self.map_key_with_parent = map;
        self
    }

    pub fn key_parent(mut self, key: impl Into<String>, parent_key: impl Into<String>) -> Self {
        self.map_key_with_parent
            .insert(key.into(), parent_key.into());
        self
    }

    /// Validate the key map and provision the schema.
    ///
    /// Bootstrap runs on the default connection when one was given, otherwise
    /// on a short-lived connection opened from the MySQL config (resolved from
    /// the environment when none was given).
    pub async fn build(self) -> Result<RamProducer, RamError> {
        for (key, parent_key) in &self.map_key_with_parent {
            ensure_key_len("map_key_with_parent key", key)?;
            ensure_key_len("map_key_with_parent value", parent_key)?;
        }

        let config = match (self.mysql_config, &self.connection) {
            (Some(config), _) => Some(config),
            (None, Some(_)) => None,
            (None, None) => Some(MySqlConfig::from_env()?),
        };
        let tables = config.as_ref().map(MySqlConfig::tables).unwrap_or_default();

        match (&self.connection, &config) {
            (Some(db), _) => bootstrap::ensure_producer_schema(db, &tables).await?,
            (None, Some(config)) => {
                let db = Database::connect(config.database_url()?)
                    .await
                    .context("connect to MySQL")?;
                bootstrap::ensure_producer_schema(&db, &tables).await?;
                db.close().await.context("close bootstrap connection")?;
            }
            (None, None) => return Err(RamError::NoConnection),
        }

        info!(
            events = %tables.events,
            event_logs = %tables.event_logs,
            "producer ready"
        );
        Ok(RamProducer {
            connection: self.connection,
            tables,
            map_key_with_parent: self.map_key_with_parent,
        })
    }
}

/// Writes events into the outbox table.
pub struct RamProducer {
    connection: Option<DatabaseConnection>,
    tables: EventTables,
    map_key_with_parent: HashMap<String, String>,
}

impl RamProducer {
    pub fn builder() -> ProducerBuilder {
        ProducerBuilder::default()
    }

    pub fn tables(&self) -> &EventTables {
        &self.tables
    }

    /// Enqueue on the default connection. The insert autocommits.
    pub async fn send(&self, event: NewEvent) -> Result<i64, RamError> {
        let db = self.connection.as_ref().ok_or(RamError::NoConnection)?;
        self.send_on(db, event).await
    }

    /// Enqueue on `conn`. Pass the caller's transaction to commit the event
    /// together with the business write.
    pub async fn send_on<C: ConnectionTrait>(
        &self,
        conn: &C,
        event: NewEvent,
    ) -> Result<i64, RamError> {
        let row = self.prepare(event, Utc::now())?;
        let insert = events::insert(&self.tables.events, &row).context("build event insert")?;
        let stmt = conn.get_database_backend().build(&insert);
        let result = conn.execute(stmt).await.context("insert event")?;
        let id = i64::try_from(result.last_insert_id()).context("event id out of range")?;
        debug!(
            event_id = id,
            event_key = %row.key,
            parent_key = %row.parent_key,
            want_to_send_after = %row.want_to_send_after,
            "event queued"
        );
        Ok(id)
    }

    /// Bulk enqueue on the default connection.
    pub async fn send_by_select(&self, select: SelectStatement) -> Result<u64, RamError> {
        let db = self.connection.as_ref().ok_or(RamError::NoConnection)?;
        self.send_by_select_on(db, select).await
    }

    /// `INSERT INTO <events> (ref, parent_key, key, type, status, payload,
    /// want_to_send_after) <select>`. Returns the number of rows inserted.
    pub async fn send_by_select_on<C: ConnectionTrait>(
        &self,
        conn: &C,
        select: SelectStatement,
    ) -> Result<u64, RamError> {
        let insert = events::insert_from_select(&self.tables.events, select)
            .map_err(|e| RamError::InvalidSelect(e.to_string()))?;
        let stmt = conn.get_database_backend().build(&insert);
        let result = conn
            .execute(stmt)
            .await
            .context("insert events from select")?;
        debug!(rows = result.rows_affected(), "events queued from select");
        Ok(result.rows_affected())
    }

    fn prepare(&self, event: NewEvent, now: DateTime<Utc>) -> Result<NewEventRow, RamError> {
        let key = event
            .key
            .unwrap_or_else(|| DEFAULT_EVENT_KEY.to_owned());
        let message = match event.message {
            Some(message) if !message.is_empty() => message,
            _ => return Err(RamError::EmptyMessage),
        };
        ensure_key_len("event_key", &key)?;
        if let Some(parent_key) = &event.parent_key {
            ensure_key_len("event_parent_key", parent_key)?;
        }
        if event.delay_milliseconds < 0 {
            return Err(RamError::NegativeDelay(event.delay_milliseconds));
        }

        let payload = message.render()?;
        let parent_key = event
            .parent_key
            .or_else(|| self.map_key_with_parent.get(&key).cloned())
            .unwrap_or_else(|| DEFAULT_PARENT_KEY.to_owned());
        let want_to_send_after = TimeDelta::try_milliseconds(event.delay_milliseconds)
            .and_then(|delay| now.checked_add_signed(delay))
            .ok_or(RamError::DurationOutOfRange {
                field: "delay_milliseconds",
            })?;

        Ok(NewEventRow {
            event_ref: event.event_ref,
            parent_key,
            key,
            event_type: EVENT_TYPE,
            status: EventStatus::Created.as_str().to_owned(),
            payload,
            created_at: now,
            want_to_send_after,
        })
    }
}
