use std::sync::{Arc, Mutex};

use chrono::{TimeDelta, Utc};
use sea_orm::sea_query::{Alias, Expr, Query};
use sea_orm::{ConnectionTrait, DatabaseConnection, TransactionTrait};
use sea_orm_migration::SchemaManager;
use serde_json::json;

use ram::domain::repository::EventStore;
use ram::domain::types::{EventLogEntry, LogStatus, Settlement};
use ram::error::{HandlerError, RamError};
use ram::infra::bootstrap::get_version_in_database;
use ram::{DbEventStore, EventLogFilter, EventTables, NewEvent, RamConsumer, RamProducer};

use crate::helpers::{FailingHandler, sqlite};

async fn producer(db: &DatabaseConnection) -> RamProducer {
    RamProducer::builder()
        .connection(db.clone())
        .key_parent("order.created", "shop")
        .build()
        .await
        .unwrap()
}

fn store(db: &DatabaseConnection) -> DbEventStore {
    DbEventStore::new(db.clone(), EventTables::default())
}

async fn has_table(db: &DatabaseConnection, table: &str) -> bool {
    SchemaManager::new(db).has_table(table).await.unwrap()
}

#[tokio::test]
async fn should_provision_schema_once() {
    let db = sqlite().await;
    producer(&db).await;
    producer(&db).await;

    assert!(has_table(&db, "ram_version").await);
    assert!(has_table(&db, "ram_events").await);
    assert!(has_table(&db, "ram_event_logs").await);
    assert_eq!(
        get_version_in_database(&db).await.unwrap().as_deref(),
        Some("1.0")
    );
}

#[tokio::test]
async fn should_persist_sent_event() {
    let db = sqlite().await;
    let producer = producer(&db).await;

    let id = producer
        .send(NewEvent::new("order.created", json!({"id": 42})).event_ref("order-42"))
        .await
        .unwrap();

    let pending = store(&db).pending_events(None, 10).await.unwrap();
    assert_eq!(pending.len(), 1);
    let event = &pending[0];
    assert_eq!(event.id, id);
    assert_eq!(event.event_ref.as_deref(), Some("order-42"));
    assert_eq!(event.parent_key, "shop");
    assert_eq!(event.key, "order.created");
    assert_eq!(event.payload.as_deref(), Some(r#"{"id": 42}"#));
    assert_eq!(event.status, "CREATED");
    assert_eq!(event.event_type, 1);
    assert_eq!(event.retry_count, None);
}

#[tokio::test]
async fn should_insert_nothing_for_empty_message() {
    let db = sqlite().await;
    let producer = producer(&db).await;

    let err = producer
        .send(NewEvent {
            key: Some("order.created".to_owned()),
            ..NewEvent::default()
        })
        .await
        .unwrap_err();

    assert!(matches!(err, RamError::EmptyMessage));
    assert!(store(&db).pending_events(None, 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn should_commit_and_roll_back_with_caller_transaction() {
    let db = sqlite().await;
    let producer = producer(&db).await;

    let txn = db.begin().await.unwrap();
    producer
        .send_on(&txn, NewEvent::new("order.created", "rolled back"))
        .await
        .unwrap();
    txn.rollback().await.unwrap();
    assert!(store(&db).pending_events(None, 10).await.unwrap().is_empty());

    let txn = db.begin().await.unwrap();
    producer
        .send_on(&txn, NewEvent::new("order.created", "committed"))
        .await
        .unwrap();
    txn.commit().await.unwrap();
    let pending = store(&db).pending_events(None, 10).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].payload.as_deref(), Some("committed"));
}

#[tokio::test]
async fn should_bulk_insert_from_select() {
    let db = sqlite().await;
    let producer = producer(&db).await;
    db.execute_unprepared("CREATE TABLE orders (reference TEXT NOT NULL, body TEXT NOT NULL)")
        .await
        .unwrap();
    db.execute_unprepared(
        "INSERT INTO orders (reference, body) VALUES ('o-1', '{\"id\": 1}'), ('o-2', '{\"id\": 2}')",
    )
    .await
    .unwrap();

    let select = Query::select()
        .column(Alias::new("reference"))
        .expr(Expr::val("shop"))
        .expr(Expr::val("order.created"))
        .expr(Expr::val(1))
        .expr(Expr::val("CREATED"))
        .column(Alias::new("body"))
        .expr(Expr::val(Utc::now() - TimeDelta::seconds(1)))
        .from(Alias::new("orders"))
        .to_owned();
    let inserted = producer.send_by_select(select).await.unwrap();
    assert_eq!(inserted, 2);

    let pending = store(&db).pending_events(Some("shop"), 10).await.unwrap();
    let refs: Vec<_> = pending
        .iter()
        .map(|e| e.event_ref.clone().unwrap_or_default())
        .collect();
    assert_eq!(refs.len(), 2);
    assert!(refs.contains(&"o-1".to_owned()));
    assert!(refs.contains(&"o-2".to_owned()));
}

#[tokio::test]
async fn should_reject_select_with_wrong_shape() {
    let db = sqlite().await;
    let producer = producer(&db).await;

    let select = Query::select()
        .expr(Expr::val("only-ref"))
        .expr(Expr::val("shop"))
        .to_owned();
    let err = producer.send_by_select(select).await.unwrap_err();
    assert!(matches!(err, RamError::InvalidSelect(_)), "{err:?}");
}

#[tokio::test]
async fn should_refuse_foreign_version_before_creating_tables() {
    let db = sqlite().await;
    db.execute_unprepared("CREATE TABLE ram_version (version VARCHAR(255) NOT NULL)")
        .await
        .unwrap();
    db.execute_unprepared("INSERT INTO ram_version (version) VALUES ('0.9')")
        .await
        .unwrap();

    let err = RamProducer::builder()
        .connection(db.clone())
        .build()
        .await
        .err()
        .unwrap();

    assert!(
        matches!(&err, RamError::VersionMismatch { found, expected: "1.0" } if found == "0.9"),
        "{err:?}"
    );
    assert!(!has_table(&db, "ram_events").await);
    assert!(!has_table(&db, "ram_event_logs").await);
}

#[tokio::test]
async fn should_refuse_consumer_on_version_mismatch() {
    let db = sqlite().await;
    producer(&db).await;
    db.execute_unprepared("UPDATE ram_version SET version = '2.0'")
        .await
        .unwrap();

    let result = RamConsumer::builder()
        .handler("order.created", FailingHandler::default())
        .build_with_connection(db.clone(), EventTables::default())
        .await;

    assert!(matches!(
        result,
        Err(RamError::VersionMismatch { ref found, .. }) if found == "2.0"
    ));
}

#[tokio::test]
async fn should_refuse_consumer_on_missing_schema() {
    let db = sqlite().await;

    let result = RamConsumer::builder()
        .handler("order.created", FailingHandler::default())
        .build_with_connection(db.clone(), EventTables::default())
        .await;

    assert!(matches!(
        result,
        Err(RamError::MissingTable(ref table)) if table == "ram_version"
    ));
    assert!(!has_table(&db, "ram_version").await, "consumer must not create tables");
}

#[tokio::test]
async fn should_detect_corrupt_version_table() {
    let db = sqlite().await;
    producer(&db).await;
    db.execute_unprepared("INSERT INTO ram_version (version) VALUES ('1.0')")
        .await
        .unwrap();

    let err = get_version_in_database(&db).await.unwrap_err();
    assert!(matches!(err, RamError::CorruptVersionTable(2)), "{err:?}");
}

#[tokio::test]
async fn should_deliver_sent_event_end_to_end() {
    let db = sqlite().await;
    let producer = producer(&db).await;
    producer
        .send(
            NewEvent::new("order.created", json!({"id": 42}))
                .event_ref("order-42")
                .delay_milliseconds(0),
        )
        .await
        .unwrap();

    let ids = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&ids);
    let consumer = RamConsumer::builder()
        .parent_key("shop")
        .handler("order.created", move |payload: String| {
            let sink = Arc::clone(&sink);
            async move {
                match serde_json::from_str::<serde_json::Value>(&payload) {
                    Ok(value) => {
                        sink.lock().unwrap().push(value["id"].as_i64());
                        Ok(())
                    }
                    Err(e) => Err(HandlerError::stop_retry(e.to_string())),
                }
            }
        })
        .build_with_connection(db.clone(), EventTables::default())
        .await
        .unwrap();

    // Stored timestamps have sub-second precision; make sure the event is due.
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    assert_eq!(consumer.poll_once().await.unwrap(), 1);

    assert_eq!(*ids.lock().unwrap(), vec![Some(42)]);
    assert!(store(&db).pending_events(None, 10).await.unwrap().is_empty());
    let logs = store(&db)
        .event_logs(&EventLogFilter {
            event_ref: Some("order-42".to_owned()),
            limit: 10,
            ..EventLogFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].entry.status, LogStatus::Success);
    assert_eq!(logs[0].entry.error_message, None);
    assert_eq!(
        logs[0].entry.event.payload.as_deref(),
        Some(r#"{"id": 42}"#)
    );
}

#[tokio::test]
async fn should_reschedule_failed_event_in_database() {
    let db = sqlite().await;
    let producer = producer(&db).await;
    let id = producer
        .send(NewEvent::new("order.created", "{}"))
        .await
        .unwrap();

    let consumer = RamConsumer::builder()
        .parent_key("shop")
        .handler("order.created", FailingHandler::default())
        .max_retry_time(2)
        .delay_time_when_retries([1, 1])
        .build_with_connection(db.clone(), EventTables::default())
        .await
        .unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    assert_eq!(consumer.poll_once().await.unwrap(), 1);
    assert_eq!(consumer.poll_once().await.unwrap(), 0, "backoff not elapsed");

    let pending = store(&db).pending_events(None, 10).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, id);
    assert_eq!(pending[0].retry_count, Some(1));
    assert_eq!(pending[0].status, "NEED RETRY");
    assert!(pending[0].want_to_send_after > Utc::now() + TimeDelta::seconds(50));

    let logs = store(&db)
        .event_logs(&EventLogFilter {
            event_key: Some("order.created".to_owned()),
            limit: 10,
            ..EventLogFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].entry.status, LogStatus::FailAndRetry);
    assert_eq!(
        logs[0].entry.error_message.as_deref(),
        Some("downstream unavailable")
    );
    assert_eq!(logs[0].entry.event.retry_count, None);
}

#[tokio::test]
async fn should_let_only_one_claim_win() {
    let db = sqlite().await;
    let producer = producer(&db).await;
    producer
        .send(NewEvent::new("order.created", "{}"))
        .await
        .unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;

    let store = store(&db);
    let event = store.pending_events(None, 1).await.unwrap().remove(0);
    let now = Utc::now();
    let lease_until = now + TimeDelta::minutes(5);

    assert!(store.claim(&event, now, lease_until).await.unwrap());
    assert!(!store.claim(&event, now, lease_until).await.unwrap());
}

#[tokio::test]
async fn should_return_nothing_without_registered_keys() {
    let db = sqlite().await;
    let producer = producer(&db).await;
    producer
        .send(NewEvent::new("order.created", "{}"))
        .await
        .unwrap();

    let due = store(&db)
        .due_events("shop", &[], Utc::now() + TimeDelta::minutes(1))
        .await
        .unwrap();
    assert!(due.is_empty());
}

#[tokio::test]
async fn should_roll_back_log_when_settlement_fails() {
    let db = sqlite().await;
    let producer = producer(&db).await;
    let id = producer
        .send(NewEvent::new("order.created", "{}"))
        .await
        .unwrap();
    let store = store(&db);
    let event = store.pending_events(None, 1).await.unwrap().remove(0);

    // The log insert succeeds, the delete against the missing table does not.
    db.execute_unprepared("ALTER TABLE ram_events RENAME TO ram_events_parked")
        .await
        .unwrap();
    let now = Utc::now();
    let log = EventLogEntry {
        event,
        status: LogStatus::FailAndDone,
        error_message: Some("gave up".to_owned()),
        start_timestamp: now,
        finish_timestamp: now,
    };
    assert!(store.settle(&log, Settlement::Delete).await.is_err());
    db.execute_unprepared("ALTER TABLE ram_events_parked RENAME TO ram_events")
        .await
        .unwrap();

    let logs = store
        .event_logs(&EventLogFilter {
            limit: 10,
            ..EventLogFilter::default()
        })
        .await
        .unwrap();
    assert!(logs.is_empty(), "log row should roll back with the settlement");
    let pending = store.pending_events(None, 10).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, id);
}
