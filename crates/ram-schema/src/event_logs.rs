use chrono::{DateTime, Utc};
use sea_orm::sea_query::{
    ColumnDef, Expr, Index, IndexCreateStatement, InsertStatement, Order, Query, SelectStatement,
    Table, TableCreateStatement,
};
use sea_orm::{DbBackend, DbErr, DeriveIden, FromQueryResult, QueryResult};

use ram_core::TableName;

/// Columns of the append-only event log table.
#[derive(Clone, Copy, DeriveIden)]
pub enum EventLogs {
    Id,
    EventId,
    EventRef,
    EventParentKey,
    EventKey,
    EventType,
    EventStatus,
    EventRetryCount,
    EventPayload,
    EventCreatedAt,
    EventUpdatedAt,
    EventWantToSendAfter,
    Status,
    ErrorMessage,
    StartTimestamp,
    FinishTimestamp,
    CreatedAt,
    UpdatedAt,
}

const ALL_COLUMNS: [EventLogs; 18] = [
    EventLogs::Id,
    EventLogs::EventId,
    EventLogs::EventRef,
    EventLogs::EventParentKey,
    EventLogs::EventKey,
    EventLogs::EventType,
    EventLogs::EventStatus,
    EventLogs::EventRetryCount,
    EventLogs::EventPayload,
    EventLogs::EventCreatedAt,
    EventLogs::EventUpdatedAt,
    EventLogs::EventWantToSendAfter,
    EventLogs::Status,
    EventLogs::ErrorMessage,
    EventLogs::StartTimestamp,
    EventLogs::FinishTimestamp,
    EventLogs::CreatedAt,
    EventLogs::UpdatedAt,
];

/// Snapshot of an event plus the outcome of one processing attempt.
#[derive(Clone, Debug, PartialEq)]
pub struct NewEventLogRow {
    pub event_id: i64,
    pub event_ref: Option<String>,
    pub event_parent_key: String,
    pub event_key: String,
    pub event_type: i32,
    pub event_status: String,
    pub event_retry_count: Option<i32>,
    pub event_payload: Option<String>,
    pub event_created_at: DateTime<Utc>,
    pub event_updated_at: DateTime<Utc>,
    pub event_want_to_send_after: DateTime<Utc>,
    pub status: String,
    pub error_message: Option<String>,
    pub start_timestamp: DateTime<Utc>,
    pub finish_timestamp: DateTime<Utc>,
}

/// A stored event log row.
#[derive(Clone, Debug, PartialEq)]
pub struct EventLogRow {
    pub id: i64,
    pub entry: NewEventLogRow,
    pub created_at: DateTime<Utc>,
}

impl FromQueryResult for EventLogRow {
    fn from_query_result(res: &QueryResult, pre: &str) -> Result<Self, DbErr> {
        Ok(Self {
            id: res.try_get(pre, "id")?,
            entry: NewEventLogRow {
                event_id: res.try_get(pre, "event_id")?,
                event_ref: res.try_get(pre, "event_ref")?,
                event_parent_key: res.try_get(pre, "event_parent_key")?,
                event_key: res.try_get(pre, "event_key")?,
                event_type: res.try_get(pre, "event_type")?,
                event_status: res.try_get(pre, "event_status")?,
                event_retry_count: res.try_get(pre, "event_retry_count")?,
                event_payload: res.try_get(pre, "event_payload")?,
                event_created_at: res.try_get(pre, "event_created_at")?,
                event_updated_at: res.try_get(pre, "event_updated_at")?,
                event_want_to_send_after: res.try_get(pre, "event_want_to_send_after")?,
                status: res.try_get(pre, "status")?,
                error_message: res.try_get(pre, "error_message")?,
                start_timestamp: res.try_get(pre, "start_timestamp")?,
                finish_timestamp: res.try_get(pre, "finish_timestamp")?,
            },
            created_at: res.try_get(pre, "created_at")?,
        })
    }
}

/// Narrowing options for operator queries over the log.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EventLogFilter {
    pub event_ref: Option<String>,
    pub event_key: Option<String>,
    pub limit: u64,
}

pub fn create_table(table: &TableName, backend: DbBackend) -> TableCreateStatement {
    let mut updated_at = ColumnDef::new(EventLogs::UpdatedAt);
    updated_at
        .timestamp()
        .not_null()
        .default(Expr::current_timestamp());
    if backend == DbBackend::MySql {
        updated_at.extra("ON UPDATE CURRENT_TIMESTAMP");
    }

    Table::create()
        .table(table.clone())
        .if_not_exists()
        .col(
            ColumnDef::new(EventLogs::Id)
                .big_integer()
                .not_null()
                .auto_increment()
                .primary_key(),
        )
        .col(ColumnDef::new(EventLogs::EventId).big_integer().not_null())
        .col(ColumnDef::new(EventLogs::EventRef).string_len(255).null())
        .col(
            ColumnDef::new(EventLogs::EventParentKey)
                .string_len(255)
                .not_null(),
        )
        .col(ColumnDef::new(EventLogs::EventKey).string_len(255).not_null())
        .col(ColumnDef::new(EventLogs::EventType).integer().not_null())
        .col(
            ColumnDef::new(EventLogs::EventStatus)
                .string_len(255)
                .not_null(),
        )
        .col(ColumnDef::new(EventLogs::EventRetryCount).integer().null())
        .col(ColumnDef::new(EventLogs::EventPayload).text().null())
        .col(
            ColumnDef::new(EventLogs::EventCreatedAt)
                .timestamp()
                .not_null(),
        )
        .col(
            ColumnDef::new(EventLogs::EventUpdatedAt)
                .timestamp()
                .not_null(),
        )
        .col(
            ColumnDef::new(EventLogs::EventWantToSendAfter)
                .timestamp()
                .not_null(),
        )
        .col(ColumnDef::new(EventLogs::Status).string_len(255).not_null())
        .col(ColumnDef::new(EventLogs::ErrorMessage).text().null())
        .col(
            ColumnDef::new(EventLogs::StartTimestamp)
                .timestamp()
                .not_null(),
        )
        .col(
            ColumnDef::new(EventLogs::FinishTimestamp)
                .timestamp()
                .not_null(),
        )
        .col(
            ColumnDef::new(EventLogs::CreatedAt)
                .timestamp()
                .not_null()
                .default(Expr::current_timestamp()),
        )
        .col(&mut updated_at)
        .to_owned()
}

/// Indexes for operator lookups: recent activity, per key, per ref.
pub fn create_indexes(table: &TableName) -> Vec<IndexCreateStatement> {
    vec![
        Index::create()
            .name(format!("idx_{table}_updated_at"))
            .table(table.clone())
            .col(EventLogs::UpdatedAt)
            .to_owned(),
        Index::create()
            .name(format!("idx_{table}_event_key_updated_at"))
            .table(table.clone())
            .col(EventLogs::EventKey)
            .col(EventLogs::UpdatedAt)
            .to_owned(),
        Index::create()
            .name(format!("idx_{table}_event_ref"))
            .table(table.clone())
            .col(EventLogs::EventRef)
            .to_owned(),
    ]
}

pub fn insert(
    table: &TableName,
    row: &NewEventLogRow,
) -> Result<InsertStatement, sea_orm::sea_query::error::Error> {
    let now = row.finish_timestamp;
    let mut insert = Query::insert();
    insert
        .into_table(table.clone())
        .columns([
            EventLogs::EventId,
            EventLogs::EventRef,
            EventLogs::EventParentKey,
            EventLogs::EventKey,
            EventLogs::EventType,
            EventLogs::EventStatus,
            EventLogs::EventRetryCount,
            EventLogs::EventPayload,
            EventLogs::EventCreatedAt,
            EventLogs::EventUpdatedAt,
            EventLogs::EventWantToSendAfter,
            EventLogs::Status,
            EventLogs::ErrorMessage,
            EventLogs::StartTimestamp,
            EventLogs::FinishTimestamp,
            EventLogs::CreatedAt,
            EventLogs::UpdatedAt,
        ])
        .values([
            row.event_id.into(),
            row.event_ref.clone().into(),
            row.event_parent_key.clone().into(),
            row.event_key.clone().into(),
            row.event_type.into(),
            row.event_status.clone().into(),
            row.event_retry_count.into(),
            row.event_payload.clone().into(),
            row.event_created_at.into(),
            row.event_updated_at.into(),
            row.event_want_to_send_after.into(),
            row.status.clone().into(),
            row.error_message.clone().into(),
            row.start_timestamp.into(),
            row.finish_timestamp.into(),
            now.into(),
            now.into(),
        ])?;
    Ok(insert)
}

/// Newest log rows first, narrowed by `filter`.
pub fn select(table: &TableName, filter: &EventLogFilter) -> SelectStatement {
    let mut select = Query::select();
    select.columns(ALL_COLUMNS).from(table.clone());
    if let Some(event_ref) = &filter.event_ref {
        select.and_where(Expr::col(EventLogs::EventRef).eq(event_ref.as_str()));
    }
    if let Some(event_key) = &filter.event_key {
        select.and_where(Expr::col(EventLogs::EventKey).eq(event_key.as_str()));
    }
    select
        .order_by(EventLogs::UpdatedAt, Order::Desc)
        .order_by(EventLogs::Id, Order::Desc)
        .limit(filter.limit)
        .to_owned()
}
