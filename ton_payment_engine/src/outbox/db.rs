//! Low-level outbox queries.
//!
//! Simple functions over a `&mut SqliteConnection` so callers can compose them inside pool
//! checkouts or transactions. Every state transition is a single atomic statement; SQLite's
//! single-writer model is what guarantees that two competing claimants never select the same
//! rows (the skip-locked equivalent for this backend).
use chrono::{Duration, Utc};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};

use super::{EventRow, OutboxError, PublishOutcome};

pub(super) async fn insert_event(
    topic: &str,
    payload: String,
    event_key: Option<&str>,
    conn: &mut SqliteConnection,
) -> Result<PublishOutcome, OutboxError> {
    let now = Utc::now();
    let outcome = match event_key {
        Some(key) => {
            let id: Option<(i64,)> = sqlx::query_as(
                r#"
                    INSERT INTO integration_events (topic, payload, event_key, status, available_at, created_at)
                    VALUES ($1, $2, $3, 'New', $4, $4)
                    ON CONFLICT (topic, event_key) WHERE event_key IS NOT NULL DO NOTHING
                    RETURNING id;
                "#,
            )
            .bind(topic)
            .bind(payload)
            .bind(key)
            .bind(now)
            .fetch_optional(conn)
            .await?;
            match id {
                Some((id,)) => PublishOutcome::Published(id),
                None => PublishOutcome::AlreadyPublished,
            }
        },
        None => {
            let (id,): (i64,) = sqlx::query_as(
                r#"
                    INSERT INTO integration_events (topic, payload, status, available_at, created_at)
                    VALUES ($1, $2, 'New', $3, $3)
                    RETURNING id;
                "#,
            )
            .bind(topic)
            .bind(payload)
            .bind(now)
            .fetch_one(conn)
            .await?;
            PublishOutcome::Published(id)
        },
    };
    Ok(outcome)
}

pub(super) async fn claim_events(
    topics: &[&str],
    batch: usize,
    conn: &mut SqliteConnection,
) -> Result<Vec<EventRow>, OutboxError> {
    let now = Utc::now();
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
        "UPDATE integration_events SET status = 'Processing', tries = tries + 1 \
         WHERE id IN ( \
            SELECT id FROM integration_events \
            WHERE status IN ('New', 'Failed') AND available_at <= ",
    );
    qb.push_bind(now);
    qb.push(" AND topic IN (");
    {
        let mut separated = qb.separated(", ");
        for topic in topics {
            separated.push_bind(*topic);
        }
    }
    qb.push(") ORDER BY id LIMIT ");
    qb.push_bind(batch as i64);
    qb.push(" ) RETURNING *");
    let rows = qb.build_query_as::<EventRow>().fetch_all(conn).await?;
    Ok(rows)
}

pub(super) async fn ack_event(id: i64, conn: &mut SqliteConnection) -> Result<(), OutboxError> {
    sqlx::query("UPDATE integration_events SET status = 'Done' WHERE id = $1").bind(id).execute(conn).await?;
    Ok(())
}

pub(super) async fn fail_event(
    id: i64,
    error: &str,
    backoff: Duration,
    conn: &mut SqliteConnection,
) -> Result<(), OutboxError> {
    let available_at = Utc::now() + backoff;
    sqlx::query("UPDATE integration_events SET status = 'Failed', last_error = $2, available_at = $3 WHERE id = $1")
        .bind(id)
        .bind(error)
        .bind(available_at)
        .execute(conn)
        .await?;
    Ok(())
}

pub(super) async fn fetch_event(id: i64, conn: &mut SqliteConnection) -> Result<Option<EventRow>, OutboxError> {
    let row = sqlx::query_as(r#"SELECT * FROM integration_events WHERE id = $1"#)
        .bind(id)
        .fetch_optional(conn)
        .await?;
    Ok(row)
}

pub(super) async fn fetch_events_for_topic(
    topic: &str,
    conn: &mut SqliteConnection,
) -> Result<Vec<EventRow>, OutboxError> {
    let rows = sqlx::query_as(r#"SELECT * FROM integration_events WHERE topic = $1 ORDER BY id"#)
        .bind(topic)
        .fetch_all(conn)
        .await?;
    Ok(rows)
}

pub(super) async fn sweep_done(older_than: Duration, conn: &mut SqliteConnection) -> Result<u64, OutboxError> {
    let cutoff = Utc::now() - older_than;
    let result = sqlx::query("DELETE FROM integration_events WHERE status = 'Done' AND created_at < $1")
        .bind(cutoff)
        .execute(conn)
        .await?;
    Ok(result.rows_affected())
}
