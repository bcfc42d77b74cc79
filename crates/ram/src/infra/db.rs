use anyhow::Context as _;
use chrono::{DateTime, Utc};
use sea_orm::{
    ConnectionTrait, DatabaseConnection, DbBackend, DbErr, FromQueryResult, TransactionTrait,
};

use ram_core::EventTables;
use ram_schema::event_logs::{self, EventLogFilter, EventLogRow, NewEventLogRow};
use ram_schema::events::{self, EventRow};

use crate::domain::repository::EventStore;
use crate::domain::types::{
    EventLogEntry, EventStatus, LogStatus, RamEvent, Settlement, StoredEventLog,
};
use crate::error::RamError;
use crate::infra::bootstrap;

#[derive(Clone)]
pub struct DbEventStore {
    pub db: DatabaseConnection,
    pub tables: EventTables,
}

impl DbEventStore {
    pub fn new(db: DatabaseConnection, tables: EventTables) -> Self {
        Self { db, tables }
    }

    fn backend(&self) -> DbBackend {
        self.db.get_database_backend()
    }

    /// Events still in the table, due or not, earliest first.
    pub async fn pending_events(
        &self,
        parent_key: Option<&str>,
        limit: u64,
    ) -> Result<Vec<RamEvent>, RamError> {
        let stmt = self
            .backend()
            .build(&events::select_pending(&self.tables.events, parent_key, limit));
        let rows = EventRow::find_by_statement(stmt)
            .all(&self.db)
            .await
            .context("select pending events")?;
        Ok(rows.into_iter().map(event_from_row).collect())
    }

    /// Most recent log entries first.
    pub async fn event_logs(
        &self,
        filter: &EventLogFilter,
    ) -> Result<Vec<StoredEventLog>, RamError> {
        let stmt = self
            .backend()
            .build(&event_logs::select(&self.tables.event_logs, filter));
        let rows = EventLogRow::find_by_statement(stmt)
            .all(&self.db)
            .await
            .context("select event logs")?;
        rows.into_iter().map(stored_log_from_row).collect()
    }
}

impl EventStore for DbEventStore {
    async fn verify_consumer_schema(&self) -> Result<(), RamError> {
        bootstrap::verify_consumer_schema(&self.db, &self.tables).await
    }

    async fn due_events(
        &self,
        parent_key: &str,
        keys: &[String],
        now: DateTime<Utc>,
    ) -> Result<Vec<RamEvent>, RamError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let stmt = self.backend().build(&events::select_due(
            &self.tables.events,
            parent_key,
            keys,
            now,
        ));
        let rows = EventRow::find_by_statement(stmt)
            .all(&self.db)
            .await
            .context("select due events")?;
        Ok(rows.into_iter().map(event_from_row).collect())
    }

    async fn claim(
        &self,
        event: &RamEvent,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
    ) -> Result<bool, RamError> {
        let stmt = self.backend().build(&events::claim(
            &self.tables.events,
            event.id,
            now,
            lease_until,
        ));
        let result = self.db.execute(stmt).await.context("claim event")?;
        Ok(result.rows_affected() == 1)
    }

    async fn settle(&self, log: &EventLogEntry, settlement: Settlement) -> Result<(), RamError> {
        self.db
            .transaction::<_, (), DbErr>(|txn| {
                let tables = self.tables.clone();
                let event_id = log.event.id;
                let insert = event_logs::insert(&tables.event_logs, &log_row_from_entry(log));
                Box::pin(async move {
                    let insert = insert.map_err(|e| DbErr::Custom(e.to_string()))?;
                    let backend = txn.get_database_backend();
                    txn.execute(backend.build(&insert)).await?;
                    let stmt = match settlement {
                        Settlement::Delete => {
                            backend.build(&events::delete_by_id(&tables.events, event_id))
                        }
                        Settlement::Reschedule {
                            retry_count,
                            want_to_send_after,
                        } => backend.build(&events::reschedule(
                            &tables.events,
                            event_id,
                            retry_count,
                            EventStatus::NeedRetry.as_str(),
                            want_to_send_after,
                        )),
                    };
                    txn.execute(stmt).await?;
                    Ok(())
                })
            })
            .await
            .context("settle event")?;
        Ok(())
    }
}

fn event_from_row(row: EventRow) -> RamEvent {
    RamEvent {
        id: row.id,
        event_ref: row.event_ref,
        parent_key: row.parent_key,
        key: row.key,
        event_type: row.event_type,
        status: row.status,
        retry_count: row.retry_count,
        payload: row.payload,
        created_at: row.created_at,
        updated_at: row.updated_at,
        want_to_send_after: row.want_to_send_after,
    }
}

fn log_row_from_entry(log: &EventLogEntry) -> NewEventLogRow {
    let event = &log.event;
    NewEventLogRow {
        event_id: event.id,
        event_ref: event.event_ref.clone(),
        event_parent_key: event.parent_key.clone(),
        event_key: event.key.clone(),
        event_type: event.event_type,
        event_status: event.status.clone(),
        event_retry_count: event.retry_count,
        event_payload: event.payload.clone(),
        event_created_at: event.created_at,
        event_updated_at: event.updated_at,
        event_want_to_send_after: event.want_to_send_after,
        status: log.status.as_str().to_owned(),
        error_message: log.error_message.clone(),
        start_timestamp: log.start_timestamp,
        finish_timestamp: log.finish_timestamp,
    }
}

fn stored_log_from_row(row: EventLogRow) -> Result<StoredEventLog, RamError> {
    let entry = row.entry;
    let status = match entry.status.as_str() {
        "success" => LogStatus::Success,
        "fail and retry" => LogStatus::FailAndRetry,
        "fail and done" => LogStatus::FailAndDone,
        other => {
            return Err(RamError::Internal(anyhow::anyhow!(
                "unknown event log status `{other}` in row {}",
                row.id
            )));
        }
    };
    Ok(StoredEventLog {
        id: row.id,
        entry: EventLogEntry {
            event: RamEvent {
                id: entry.event_id,
                event_ref: entry.event_ref,
                parent_key: entry.event_parent_key,
                key: entry.event_key,
                event_type: entry.event_type,
                status: entry.event_status,
                retry_count: entry.event_retry_count,
                payload: entry.event_payload,
                created_at: entry.event_created_at,
                updated_at: entry.event_updated_at,
                want_to_send_after: entry.event_want_to_send_after,
            },
            status,
            error_message: entry.error_message,
            start_timestamp: entry.start_timestamp,
            finish_timestamp: entry.finish_timestamp,
        },
        created_at: row.created_at,
    })
}
