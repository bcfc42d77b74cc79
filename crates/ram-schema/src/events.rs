use chrono::{DateTime, Utc};
use sea_orm::sea_query::{
    ColumnDef, DeleteStatement, Expr, Index, IndexCreateStatement, InsertStatement, Order, Query,
    SelectStatement, Table, TableCreateStatement, UpdateStatement,
};
use sea_orm::{DbBackend, DbErr, DeriveIden, FromQueryResult, QueryResult};

use ram_core::TableName;

/// Columns of the event (outbox) table.
#[derive(Clone, Copy, DeriveIden)]
pub enum Events {
    Id,
    Ref,
    ParentKey,
    Key,
    Type,
    Status,
    RetryCount,
    Payload,
    CreatedAt,
    UpdatedAt,
    WantToSendAfter,
}

/// Columns a bulk `INSERT ... SELECT` fills, in positional order.
pub const SELECT_INSERT_COLUMNS: [Events; 7] = [
    Events::Ref,
    Events::ParentKey,
    Events::Key,
    Events::Type,
    Events::Status,
    Events::Payload,
    Events::WantToSendAfter,
];

const ALL_COLUMNS: [Events; 11] = [
    Events::Id,
    Events::Ref,
    Events::ParentKey,
    Events::Key,
    Events::Type,
    Events::Status,
    Events::RetryCount,
    Events::Payload,
    Events::CreatedAt,
    Events::UpdatedAt,
    Events::WantToSendAfter,
];

/// One row of the event table.
#[derive(Clone, Debug, PartialEq)]
pub struct EventRow {
    pub id: i64,
    pub event_ref: Option<String>,
    pub parent_key: String,
    pub key: String,
    pub event_type: i32,
    pub status: String,
    pub retry_count: Option<i32>,
    pub payload: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub want_to_send_after: DateTime<Utc>,
}

impl FromQueryResult for EventRow {
    fn from_query_result(res: &QueryResult, pre: &str) -> Result<Self, DbErr> {
        Ok(Self {
            id: res.try_get(pre, "id")?,
            event_ref: res.try_get(pre, "ref")?,
            parent_key: res.try_get(pre, "parent_key")?,
            key: res.try_get(pre, "key")?,
            event_type: res.try_get(pre, "type")?,
            status: res.try_get(pre, "status")?,
            retry_count: res.try_get(pre, "retry_count")?,
            payload: res.try_get(pre, "payload")?,
            created_at: res.try_get(pre, "created_at")?,
            updated_at: res.try_get(pre, "updated_at")?,
            want_to_send_after: res.try_get(pre, "want_to_send_after")?,
        })
    }
}

/// Values for a freshly produced event.
#[derive(Clone, Debug, PartialEq)]
pub struct NewEventRow {
    pub event_ref: String,
    pub parent_key: String,
    pub key: String,
    pub event_type: i32,
    pub status: String,
    pub payload: String,
    pub created_at: DateTime<Utc>,
    pub want_to_send_after: DateTime<Utc>,
}

pub fn create_table(table: &TableName, backend: DbBackend) -> TableCreateStatement {
    let mut updated_at = ColumnDef::new(Events::UpdatedAt);
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
            ColumnDef::new(Events::Id)
                .big_integer()
                .not_null()
                .auto_increment()
                .primary_key(),
        )
        .col(ColumnDef::new(Events::Ref).string_len(255).null())
        .col(ColumnDef::new(Events::ParentKey).string_len(255).not_null())
        .col(ColumnDef::new(Events::Key).string_len(255).not_null())
        .col(ColumnDef::new(Events::Type).integer().not_null())
        .col(ColumnDef::new(Events::Status).string_len(255).not_null())
        .col(ColumnDef::new(Events::RetryCount).integer().null())
        .col(ColumnDef::new(Events::Payload).text().null())
        .col(
            ColumnDef::new(Events::CreatedAt)
                .timestamp()
                .not_null()
                .default(Expr::current_timestamp()),
        )
        .col(&mut updated_at)
        .col(
            ColumnDef::new(Events::WantToSendAfter)
                .timestamp()
                .not_null()
                .default(Expr::current_timestamp()),
        )
        .to_owned()
}

/// Index backing the consumer poll query.
pub fn create_due_index(table: &TableName) -> IndexCreateStatement {
    Index::create()
        .name(format!("idx_{table}_parent_key_due"))
        .table(table.clone())
        .col(Events::ParentKey)
        .col(Events::WantToSendAfter)
        .to_owned()
}

pub fn insert(
    table: &TableName,
    row: &NewEventRow,
) -> Result<InsertStatement, sea_orm::sea_query::error::Error> {
    let mut insert = Query::insert();
    insert
        .into_table(table.clone())
        .columns([
            Events::Ref,
            Events::ParentKey,
            Events::Key,
            Events::Type,
            Events::Status,
            Events::Payload,
            Events::CreatedAt,
            Events::UpdatedAt,
            Events::WantToSendAfter,
        ])
        .values([
            row.event_ref.clone().into(),
            row.parent_key.clone().into(),
            row.key.clone().into(),
            row.event_type.into(),
            row.status.clone().into(),
            row.payload.clone().into(),
            row.created_at.into(),
            row.created_at.into(),
            row.want_to_send_after.into(),
        ])?;
    Ok(insert)
}

/// `INSERT INTO <table> (ref, parent_key, key, type, status, payload,
/// want_to_send_after) <select>`. Fails when `select` does not yield exactly
/// seven columns.
pub fn insert_from_select(
    table: &TableName,
    select: SelectStatement,
) -> Result<InsertStatement, sea_orm::sea_query::error::Error> {
    let mut insert = Query::insert();
    insert
        .into_table(table.clone())
        .columns(SELECT_INSERT_COLUMNS)
        .select_from(select)?;
    Ok(insert)
}

/// Rows under `parent_key` whose key is registered and whose
/// `want_to_send_after` lies before `now`, earliest first.
pub fn select_due(
    table: &TableName,
    parent_key: &str,
    keys: &[String],
    now: DateTime<Utc>,
) -> SelectStatement {
    Query::select()
        .columns(ALL_COLUMNS)
        .from(table.clone())
        .and_where(Expr::col(Events::ParentKey).eq(parent_key))
        .and_where(Expr::col(Events::Key).is_in(keys.iter().cloned()))
        .and_where(Expr::col(Events::WantToSendAfter).lt(now))
        .order_by(Events::WantToSendAfter, Order::Asc)
        .order_by(Events::Id, Order::Asc)
        .to_owned()
}

/// Pending rows regardless of due time, optionally narrowed to one parent key.
pub fn select_pending(table: &TableName, parent_key: Option<&str>, limit: u64) -> SelectStatement {
    let mut select = Query::select();
    select.columns(ALL_COLUMNS).from(table.clone());
    if let Some(parent_key) = parent_key {
        select.and_where(Expr::col(Events::ParentKey).eq(parent_key));
    }
    select
        .order_by(Events::WantToSendAfter, Order::Asc)
        .order_by(Events::Id, Order::Asc)
        .limit(limit)
        .to_owned()
}

pub fn delete_by_id(table: &TableName, id: i64) -> DeleteStatement {
    Query::delete()
        .from_table(table.clone())
        .and_where(Expr::col(Events::Id).eq(id))
        .to_owned()
}

pub fn reschedule(
    table: &TableName,
    id: i64,
    retry_count: i32,
    status: &str,
    want_to_send_after: DateTime<Utc>,
) -> UpdateStatement {
    Query::update()
        .table(table.clone())
        .values([
            (Events::RetryCount, retry_count.into()),
            (Events::Status, status.into()),
            (Events::WantToSendAfter, want_to_send_after.into()),
            (Events::UpdatedAt, Utc::now().into()),
        ])
        .and_where(Expr::col(Events::Id).eq(id))
        .to_owned()
}

/// Push a due row's `want_to_send_after` to `lease_until`. Affects zero rows
/// when another consumer already did so.
pub fn claim(
    table: &TableName,
    id: i64,
    now: DateTime<Utc>,
    lease_until: DateTime<Utc>,
) -> UpdateStatement {
    Query::update()
        .table(table.clone())
        .values([(Events::WantToSendAfter, lease_until.into())])
        .and_where(Expr::col(Events::Id).eq(id))
        .and_where(Expr::col(Events::WantToSendAfter).lt(now))
        .to_owned()
}
