use std::any::Any;
use std::collections::BTreeMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, anyhow};
use chrono::{TimeDelta, Utc};
use futures::FutureExt;
use sea_orm::{Database, DatabaseConnection};
use tracing::{debug, error, info, warn};

use ram_core::{EventTables, MySqlConfig};

use crate::domain::repository::EventStore;
use crate::domain::types::{
    DEFAULT_DELAY_TIME_WHEN_RETRIES, DEFAULT_MAX_RETRY_TIME, DEFAULT_PARENT_KEY,
    DEFAULT_SLEEP_TIME_IF_NO_EVENT, ERROR_SLEEP_MULTIPLIER, EventLogEntry, LogStatus, RamEvent,
    Settlement, ensure_key_len,
};
use crate::error::{HandlerError, RamError};
use crate::handler::EventHandler;
use crate::infra::db::DbEventStore;
use crate::retry::RetryPolicy;

pub struct ConsumerBuilder {
    parent_key: String,
    handlers: BTreeMap<String, Arc<dyn EventHandler>>,
    max_retry_time: u32,
    delay_time_when_retries: Vec<u64>,
    repeat_time: Option<u64>,
    sleep_time_if_no_event: Duration,
    claim_lease: Option<Duration>,
}

impl Default for ConsumerBuilder {
    fn default() -> Self {
        Self {
            parent_key: DEFAULT_PARENT_KEY.to_owned(),
            handlers: BTreeMap::new(),
            max_retry_time: DEFAULT_MAX_RETRY_TIME,
            delay_time_when_retries: DEFAULT_DELAY_TIME_WHEN_RETRIES.to_vec(),
            repeat_time: None,
            sleep_time_if_no_event: DEFAULT_SLEEP_TIME_IF_NO_EVENT,
            claim_lease: None,
        }
    }
}

impl ConsumerBuilder {
    pub fn parent_key(mut self, parent_key: impl Into<String>) -> Self {
        self.parent_key = parent_key.into();
        self
    }

    /// Register the handler for `key`. A later registration for the same key
    /// replaces the earlier one.
    pub fn handler<H: EventHandler + 'static>(mut self, key: impl Into<String>, handler: H) -> Self {
        self.handlers.insert(key.into(), Arc::new(handler));
        self
    }

    pub fn max_retry_time(mut self, max_retry_time: u32) -> Self {
        self.max_retry_time = max_retry_time;
        self
    }

    /// Backoff in minutes per prior failure count. Needs one entry per attempt.
    pub fn delay_time_when_retries(mut self, minutes: impl IntoIterator<Item = u64>) -> Self {
        self.delay_time_when_retries = minutes.into_iter().collect();
        self
    }

    /// Stop after this many poll iterations. Unset means run forever.
    pub fn repeat_time(mut self, iterations: u64) -> Self {
        self.repeat_time = Some(iterations);
        self
    }

    pub fn sleep_time_if_no_event(mut self, sleep: Duration) -> Self {
        self.sleep_time_if_no_event = sleep;
        self
    }

    /// Before invoking a handler, push the event's `want_to_send_after` out by
    /// `lease` with a conditional update and skip the event when another
    /// consumer already did. Off by default.
    pub fn claim_lease(mut self, lease: Duration) -> Self {
        self.claim_lease = Some(lease);
        self
    }

    pub async fn connect(self, config: &MySqlConfig) -> Result<RamConsumer<DbEventStore>, RamError> {
        let db = Database::connect(config.database_url()?)
            .await
            .context("connect to MySQL")?;
        self.build_with_connection(db, config.tables()).await
    }

    pub async fn build_with_connection(
        self,
        db: DatabaseConnection,
        tables: EventTables,
    ) -> Result<RamConsumer<DbEventStore>, RamError> {
        self.build_with_store(DbEventStore::new(db, tables)).await
    }

    /// Validate settings, then verify the store's schema. Nothing is created.
    pub async fn build_with_store<S: EventStore>(self, store: S) -> Result<RamConsumer<S>, RamError> {
        ensure_key_len("parent_key", &self.parent_key)?;
        for key in self.handlers.keys() {
            ensure_key_len("event_key", key)?;
        }
        let retry = RetryPolicy::new(self.max_retry_time, &self.delay_time_when_retries)?;
        let claim_lease = self
            .claim_lease
            .map(|lease| {
                TimeDelta::from_std(lease)
                    .map_err(|_| RamError::DurationOutOfRange { field: "claim_lease" })
            })
            .transpose()?;

        store.verify_consumer_schema().await?;

        Ok(RamConsumer {
            store,
            event_keys: self.handlers.keys().cloned().collect(),
            parent_key: self.parent_key,
            handlers: self.handlers,
            retry,
            repeat_time: self.repeat_time,
            sleep_time_if_no_event: self.sleep_time_if_no_event,
            claim_lease,
        })
    }
}

/// Polls the event table and dispatches due events to their handlers.
///
/// One consumer runs on a single task and processes events strictly in
/// order. Run several consumers (with [`ConsumerBuilder::claim_lease`]) to
/// scale out.
pub struct RamConsumer<S = DbEventStore> {
    store: S,
    parent_key: String,
    handlers: BTreeMap<String, Arc<dyn EventHandler>>,
    event_keys: Vec<String>,
    retry: RetryPolicy,
    repeat_time: Option<u64>,
    sleep_time_if_no_event: Duration,
    claim_lease: Option<TimeDelta>,
}

impl RamConsumer<DbEventStore> {
    pub fn builder() -> ConsumerBuilder {
        ConsumerBuilder::default()
    }
}

impl<S: EventStore> RamConsumer<S> {
    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn parent_key(&self) -> &str {
        &self.parent_key
    }

    /// Registered event keys in ascending order.
    pub fn event_keys(&self) -> &[String] {
        &self.event_keys
    }

    /// Run until `repeat_time` iterations have elapsed, or forever.
    pub async fn start(&self) {
        self.start_with_shutdown(std::future::pending::<()>()).await
    }

    /// Like [`RamConsumer::start`], but also return once `shutdown` completes.
    /// The signal is checked between events and while sleeping; a running
    /// handler is never interrupted.
    pub async fn start_with_shutdown<F: Future<Output = ()>>(&self, shutdown: F) {
        tokio::pin!(shutdown);
        info!(
            parent_key = %self.parent_key,
            event_keys = ?self.event_keys,
            max_retry_time = self.retry.max_retry_time(),
            "consumer started"
        );

        let mut iteration: u64 = 0;
        let mut stop_requested = false;
        loop {
            if self.repeat_time.is_some_and(|limit| iteration >= limit) {
                break;
            }
            iteration += 1;

            let outcome = self
                .poll_batch(|| {
                    if !stop_requested {
                        stop_requested = shutdown.as_mut().now_or_never().is_some();
                    }
                    stop_requested
                })
                .await;
            if stop_requested {
                break;
            }

            let pause = match outcome {
                Ok(0) => self.sleep_time_if_no_event,
                Ok(_) => continue,
                Err(e) => {
                    error!(error = %e, kind = e.kind(), "event poll failed");
                    self.sleep_time_if_no_event * ERROR_SLEEP_MULTIPLIER
                }
            };

            tokio::select! {
                _ = tokio::time::sleep(pause) => {}
                _ = shutdown.as_mut() => {
                    stop_requested = true;
                }
            }
            if stop_requested {
                break;
            }
        }

        info!(parent_key = %self.parent_key, iterations = iteration, "consumer stopped");
    }

    /// One iteration without sleeping. Returns how many events were due.
    pub async fn poll_once(&self) -> Result<usize, RamError> {
        self.poll_batch(|| false).await
    }

    async fn poll_batch(&self, mut should_stop: impl FnMut() -> bool) -> Result<usize, RamError> {
        let batch = self
            .store
            .due_events(&self.parent_key, &self.event_keys, Utc::now())
            .await?;
        let due = batch.len();
        for event in batch {
            if should_stop() {
                break;
            }
            self.process(event).await?;
        }
        Ok(due)
    }

    async fn process(&self, event: RamEvent) -> Result<(), RamError> {
        let Some(handler) = self.handlers.get(&event.key) else {
            warn!(event_id = event.id, event_key = %event.key, "no handler registered");
            return Ok(());
        };

        if let Some(lease) = self.claim_lease {
            let now = Utc::now();
            let lease_until = now.checked_add_signed(lease).unwrap_or(now);
            if !self.store.claim(&event, now, lease_until).await? {
                debug!(event_id = event.id, "event claimed by another consumer");
                return Ok(());
            }
        }

        let start_timestamp = Utc::now();
        let payload = event.payload.clone().unwrap_or_default();
        // The call itself sits inside the guard: closures may panic before
        // returning their future.
        let invocation = async move { handler.handle(payload).await };
        let result = match AssertUnwindSafe(invocation).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => Err(HandlerError::Unexpected(anyhow!(
                "handler panicked: {}",
                panic_message(panic.as_ref())
            ))),
        };
        let finish_timestamp = Utc::now();

        let (status, error_message, settlement) = match &result {
            Ok(()) => (LogStatus::Success, None, Settlement::Delete),
            Err(err) => {
                let (status, settlement) =
                    self.retry
                        .on_failure(event.retry_count(), err.is_stop_retry(), finish_timestamp);
                (status, Some(err.log_message()), settlement)
            }
        };

        match &result {
            Ok(()) => info!(
                event_id = event.id,
                event_key = %event.key,
                parent_key = %event.parent_key,
                status = status.as_str(),
                "event delivered"
            ),
            Err(err) => warn!(
                event_id = event.id,
                event_key = %event.key,
                parent_key = %event.parent_key,
                retry_count = event.retry_count(),
                status = status.as_str(),
                error = %err,
                "event handler failed"
            ),
        }

        let log = EventLogEntry {
            event,
            status,
            error_message,
            start_timestamp,
            finish_timestamp,
        };
        self.store.settle(&log, settlement).await
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}
