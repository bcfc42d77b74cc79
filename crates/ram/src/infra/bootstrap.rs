//! Provisioning and verification of the version, event and event log tables.
//!
//! Producers create whatever is missing. Consumers only verify, so a consumer
//! deployed ahead of its producer fails fast instead of guessing the layout.

use anyhow::Context as _;
use sea_orm::{ConnectionTrait, DatabaseConnection, FromQueryResult};
use sea_orm_migration::SchemaManager;
use tracing::info;

use ram_core::EventTables;
use ram_schema::version::{self, VersionRow};
use ram_schema::{event_logs, events};

use crate::domain::types::PROTOCOL_VERSION;
use crate::error::RamError;

/// The recorded protocol version, or `None` when the version table is empty.
pub async fn get_version_in_database<C: ConnectionTrait>(
    conn: &C,
) -> Result<Option<String>, RamError> {
    let backend = conn.get_database_backend();
    let mut rows = VersionRow::find_by_statement(backend.build(&version::select_all()))
        .all(conn)
        .await
        .context("read ram_version")?;
    match rows.len() {
        0 | 1 => Ok(rows.pop().map(|row| row.version)),
        n => Err(RamError::CorruptVersionTable(n)),
    }
}

pub async fn create_version_table(db: &DatabaseConnection) -> Result<(), RamError> {
    SchemaManager::new(db)
        .create_table(version::create_table())
        .await
        .context("create ram_version table")?;
    info!(table = version::TABLE_NAME, "created version table");
    Ok(())
}

/// Create the event and event log tables (with their indexes) when absent.
pub async fn create_event_tables(
    db: &DatabaseConnection,
    tables: &EventTables,
) -> Result<(), RamError> {
    let manager = SchemaManager::new(db);
    let backend = db.get_database_backend();

    if !manager
        .has_table(tables.events.as_str())
        .await
        .context("look up event table")?
    {
        manager
            .create_table(events::create_table(&tables.events, backend))
            .await
            .context("create event table")?;
        manager
            .create_index(events::create_due_index(&tables.events))
            .await
            .context("create event due index")?;
        info!(table = %tables.events, "created event table");
    }

    if !manager
        .has_table(tables.event_logs.as_str())
        .await
        .context("look up event log table")?
    {
        manager
            .create_table(event_logs::create_table(&tables.event_logs, backend))
            .await
            .context("create event log table")?;
        for index in event_logs::create_indexes(&tables.event_logs) {
            manager
                .create_index(index)
                .await
                .context("create event log index")?;
        }
        info!(table = %tables.event_logs, "created event log table");
    }

    Ok(())
}

/// Producer-side bootstrap: create the version table and record
/// [`PROTOCOL_VERSION`] if needed, reject a foreign version, then create the
/// event tables.
pub async fn ensure_producer_schema(
    db: &DatabaseConnection,
    tables: &EventTables,
) -> Result<(), RamError> {
    let has_version_table = SchemaManager::new(db)
        .has_table(version::TABLE_NAME)
        .await
        .context("look up ram_version")?;
    if !has_version_table {
        create_version_table(db).await?;
    }

    match get_version_in_database(db).await? {
        None => {
            let insert = version::insert(PROTOCOL_VERSION).context("build version insert")?;
            db.execute(db.get_database_backend().build(&insert))
                .await
                .context("record protocol version")?;
            info!(version = PROTOCOL_VERSION, "recorded protocol version");
        }
        Some(found) if found == PROTOCOL_VERSION => {}
        Some(found) => {
            return Err(RamError::VersionMismatch {
                found,
                expected: PROTOCOL_VERSION,
            });
        }
    }

    create_event_tables(db, tables).await
}

/// Consumer-side check. Never creates anything.
pub async fn verify_consumer_schema(
    db: &DatabaseConnection,
    tables: &EventTables,
) -> Result<(), RamError> {
    let manager = SchemaManager::new(db);
    for table in [
        version::TABLE_NAME,
        tables.events.as_str(),
        tables.event_logs.as_str(),
    ] {
        let exists = manager
            .has_table(table)
            .await
            .with_context(|| format!("look up table {table}"))?;
        if !exists {
            return Err(RamError::MissingTable(table.to_owned()));
        }
    }

    match get_version_in_database(db).await? {
        Some(found) if found == PROTOCOL_VERSION => Ok(()),
        Some(found) => Err(RamError::VersionMismatch {
            found,
            expected: PROTOCOL_VERSION,
        }),
        None => Err(RamError::VersionMissing),
    }
}
