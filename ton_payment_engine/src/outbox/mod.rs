//! The durable outbox / event bus.
//!
//! A single SQLite table acts as a mailbox for inter-process messages. Producers publish
//! (idempotently when they supply an event key), competing consumers claim batches, and every
//! claimed row is either acked (terminal) or failed with a backoff, after which it becomes
//! eligible for reclaim. The outbox is the single source of truth for cross-process
//! coordination; no other component touches the table.
mod db;

use chrono::{DateTime, Duration, Utc};
use log::*;
use serde::{de::DeserializeOwned, Serialize};
use sqlx::{sqlite::SqlitePoolOptions, FromRow, SqlitePool, Type};
use std::fmt::Display;
use thiserror::Error;

pub const MAX_CLAIM_BATCH: usize = 500;
pub const DEFAULT_CLAIM_BATCH: usize = 100;
pub const DEFAULT_FAIL_BACKOFF: Duration = Duration::seconds(60);

//--------------------------------------     EventStatus     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type)]
pub enum EventStatus {
    /// Inserted and waiting to be claimed.
    New,
    /// Claimed by a consumer and being worked on.
    Processing,
    /// Acknowledged. Terminal.
    Done,
    /// Failed; reclaimable once `available_at` passes.
    Failed,
}

impl Display for EventStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventStatus::New => write!(f, "New"),
            EventStatus::Processing => write!(f, "Processing"),
            EventStatus::Done => write!(f, "Done"),
            EventStatus::Failed => write!(f, "Failed"),
        }
    }
}

//--------------------------------------      EventRow       ---------------------------------------------------------
/// One unit of inter-process work. Owned exclusively by the outbox.
#[derive(Debug, Clone, FromRow)]
pub struct EventRow {
    pub id: i64,
    pub topic: String,
    /// JSON document, stored verbatim.
    pub payload: String,
    pub event_key: Option<String>,
    pub status: EventStatus,
    pub tries: i64,
    pub available_at: DateTime<Utc>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl EventRow {
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_str(&self.payload)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// A new row was inserted with this id.
    Published(i64),
    /// A row with the same (topic, event_key) already existed; nothing was inserted.
    AlreadyPublished,
}

impl PublishOutcome {
    pub fn was_published(&self) -> bool {
        matches!(self, PublishOutcome::Published(_))
    }
}

#[derive(Debug, Error)]
pub enum OutboxError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Could not serialize payload for topic '{topic}': {source}")]
    PayloadSerialization { topic: String, source: serde_json::Error },
}

//--------------------------------------       Outbox        ---------------------------------------------------------
#[derive(Clone)]
pub struct Outbox {
    url: String,
    pool: SqlitePool,
}

impl std::fmt::Debug for Outbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Outbox ({})", self.url)
    }
}

impl Outbox {
    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, OutboxError> {
        let pool = SqlitePoolOptions::new().max_connections(max_connections).connect(url).await?;
        Ok(Self { url: url.to_string(), pool })
    }

    pub fn url(&self) -> &str {
        self.url.as_str()
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Publishes a message on `topic`. A non-empty `event_key` makes the publish idempotent: if a
    /// row with the same `(topic, event_key)` already exists, nothing is inserted and
    /// [`PublishOutcome::AlreadyPublished`] is returned. The conditional insert is a single
    /// atomic statement, so concurrent publishers cannot both insert.
    pub async fn publish<P: Serialize>(
        &self,
        topic: &str,
        payload: &P,
        event_key: Option<&str>,
    ) -> Result<PublishOutcome, OutboxError> {
        let payload = serde_json::to_string(payload)
            .map_err(|e| OutboxError::PayloadSerialization { topic: topic.to_string(), source: e })?;
        let key = event_key.map(str::trim).filter(|k| !k.is_empty());
        let mut conn = self.pool.acquire().await?;
        let outcome = db::insert_event(topic, payload, key, &mut conn).await?;
        match &outcome {
            PublishOutcome::Published(id) => debug!("📬️ Published event {id} on '{topic}'"),
            PublishOutcome::AlreadyPublished => {
                debug!("📬️ Event on '{topic}' with key {key:?} already published. Nothing to do.")
            },
        }
        Ok(outcome)
    }

    /// Claims up to `batch` rows across `topics` that are ready for work (`New` or reclaimable
    /// `Failed`, with `available_at` in the past), atomically marking them `Processing` and
    /// incrementing their try counts. Rows are handed out in insertion order within the batch.
    /// Concurrent claimants never receive overlapping rows. `batch` is clamped to `[1, 500]`;
    /// zero selects the default of 100.
    pub async fn claim(&self, topics: &[&str], batch: usize) -> Result<Vec<EventRow>, OutboxError> {
        if topics.is_empty() {
            return Ok(Vec::new());
        }
        let batch = if batch == 0 { DEFAULT_CLAIM_BATCH } else { batch.min(MAX_CLAIM_BATCH) };
        let mut conn = self.pool.acquire().await?;
        let rows = db::claim_events(topics, batch, &mut conn).await?;
        if !rows.is_empty() {
            trace!("📬️ Claimed {} event(s) on {topics:?}", rows.len());
        }
        Ok(rows)
    }

    /// Acknowledges a row, transitioning it to `Done`. Terminal; re-acking is a no-op.
    pub async fn ack(&self, id: i64) -> Result<(), OutboxError> {
        let mut conn = self.pool.acquire().await?;
        db::ack_event(id, &mut conn).await
    }

    /// Records a failure for the row and pushes its retry clock forward by `backoff` (a
    /// non-positive backoff selects the default of one minute). The row becomes reclaimable once
    /// the backoff has elapsed; the bus itself never caps retries.
    pub async fn fail(&self, id: i64, error: &str, backoff: Duration) -> Result<(), OutboxError> {
        let backoff = if backoff <= Duration::zero() { DEFAULT_FAIL_BACKOFF } else { backoff };
        let mut conn = self.pool.acquire().await?;
        db::fail_event(id, error, backoff, &mut conn).await
    }

    pub async fn fetch_event(&self, id: i64) -> Result<Option<EventRow>, OutboxError> {
        let mut conn = self.pool.acquire().await?;
        db::fetch_event(id, &mut conn).await
    }

    /// All rows for a topic in insertion order. Used by tests and debug tooling.
    pub async fn events_for_topic(&self, topic: &str) -> Result<Vec<EventRow>, OutboxError> {
        let mut conn = self.pool.acquire().await?;
        db::fetch_events_for_topic(topic, &mut conn).await
    }

    /// Deletes acked rows older than `older_than`. Returns the number of rows removed.
    pub async fn sweep_done(&self, older_than: Duration) -> Result<u64, OutboxError> {
        let mut conn = self.pool.acquire().await?;
        let removed = db::sweep_done(older_than, &mut conn).await?;
        if removed > 0 {
            debug!("📬️ Swept {removed} completed event(s) from the outbox");
        }
        Ok(removed)
    }
}
