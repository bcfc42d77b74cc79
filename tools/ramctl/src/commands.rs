use anyhow::{Context, Result};
use sea_orm::{Database, DatabaseConnection};

use ram::infra::bootstrap;
use ram::{DbEventStore, EventLogFilter, Message, MySqlConfig, NewEvent, RamProducer};

use crate::Command;

pub(crate) async fn run(config: &MySqlConfig, command: Command) -> Result<()> {
    let db = connect(config).await?;
    match command {
        Command::Init => {
            bootstrap::ensure_producer_schema(&db, &config.tables()).await?;
            println!("schema ready");
        }
        Command::Version => match bootstrap::get_version_in_database(&db).await? {
            Some(version) => println!("{version}"),
            None => println!("no version recorded"),
        },
        Command::Send {
            key,
            parent_key,
            event_ref,
            delay_ms,
            json,
            text,
        } => {
            let message = match (json, text) {
                (Some(json), _) => Message::from(
                    serde_json::from_str::<serde_json::Value>(&json)
                        .context("--json is not valid JSON")?,
                ),
                (None, Some(text)) => Message::from(text),
                (None, None) => anyhow::bail!("one of --json or --text is required"),
            };
            let mut event = NewEvent::new(key, message)
                .event_ref(event_ref)
                .delay_milliseconds(delay_ms);
            event.parent_key = parent_key;

            let producer = RamProducer::builder()
                .mysql_config(config.clone())
                .connection(db)
                .build()
                .await?;
            let id = producer.send(event).await?;
            println!("{id}");
        }
        Command::Pending { parent_key, limit } => {
            let store = DbEventStore::new(db, config.tables());
            for event in store.pending_events(parent_key.as_deref(), limit).await? {
                println!("{}", serde_json::to_string(&event)?);
            }
        }
        Command::Logs {
            event_ref,
            key,
            limit,
        } => {
            let store = DbEventStore::new(db, config.tables());
            let filter = EventLogFilter {
                event_ref,
                event_key: key,
                limit,
            };
            for log in store.event_logs(&filter).await? {
                println!("{}", serde_json::to_string(&log)?);
            }
        }
    }
    Ok(())
}

async fn connect(config: &MySqlConfig) -> Result<DatabaseConnection> {
    tracing::debug!(config = ?config, "connecting");
    Database::connect(config.database_url()?)
        .await
        .with_context(|| format!("connect to MySQL at {}:{}", config.host, config.port))
}
