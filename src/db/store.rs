use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tracing::warn;

use crate::db::models::{format_ts, MatchRow};
use crate::error::Result;
use crate::types::{MatchRecord, UpsertOutcome};

/// Durable keyed storage for match records.
///
/// `upsert` is atomic per `match_id`: the incoming record replaces the stored
/// one whole, unless it would move `status` backwards, in which case nothing
/// is written and `UpsertOutcome::Stale` is returned.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn upsert(&self, record: &MatchRecord) -> Result<UpsertOutcome>;

    async fn get_all(&self) -> Result<Vec<MatchRecord>>;

    async fn get(&self, match_id: &str) -> Result<Option<MatchRecord>>;
}

/// SQLite-backed [`SnapshotStore`].
#[derive(Clone)]
pub struct SqliteStore {
    pool: sqlx::SqlitePool,
}

impl SqliteStore {
    /// Open (creating if missing) the database file and bring the schema up to date.
    pub async fn open(path: &str) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;
        Self::from_pool(pool).await
    }

    pub async fn from_pool(pool: sqlx::SqlitePool) -> Result<Self> {
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }
}

#[cfg(test)]
impl SqliteStore {
    /// Private throwaway database. A single connection, since every
    /// `sqlite::memory:` connection is its own database.
    pub async fn in_memory() -> Self {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        Self::from_pool(pool).await.unwrap()
    }
}

#[async_trait]
impl SnapshotStore for SqliteStore {
    async fn upsert(&self, record: &MatchRecord) -> Result<UpsertOutcome> {
        let start_time = record.start_time.map(format_ts);
        let status = record.status.as_str();
        let status_rank = i64::from(record.status.rank());
        let match_info = to_json_text(record.match_info.as_ref())?;
        let squads = to_json_text(record.squads.as_ref())?;
        let scorecard = to_json_text(record.scorecard.as_ref())?;
        let live_data = to_json_text(record.live_data.as_ref())?;
        let updated_at = format_ts(Utc::now());

        let result = sqlx::query(
            r#"
            INSERT INTO matches (
                match_id, series_name, match_description, start_time,
                status, status_rank, match_url,
                match_info, squads, scorecard, live_data, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(match_id) DO UPDATE SET
                series_name = excluded.series_name,
                match_description = excluded.match_description,
                start_time = excluded.start_time,
                status = excluded.status,
                status_rank = excluded.status_rank,
                match_url = excluded.match_url,
                match_info = excluded.match_info,
                squads = excluded.squads,
                scorecard = excluded.scorecard,
                live_data = excluded.live_data,
                updated_at = excluded.updated_at
            WHERE excluded.status_rank >= matches.status_rank
            "#,
        )
        .bind(&record.match_id)
        .bind(&record.series_name)
        .bind(&record.match_description)
        .bind(start_time)
        .bind(status)
        .bind(status_rank)
        .bind(&record.match_url)
        .bind(match_info)
        .bind(squads)
        .bind(scorecard)
        .bind(live_data)
        .bind(updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            Ok(UpsertOutcome::Stale)
        } else {
            Ok(UpsertOutcome::Applied)
        }
    }

    async fn get_all(&self) -> Result<Vec<MatchRecord>> {
        let rows: Vec<MatchRow> = sqlx::query_as(
            r#"
            SELECT match_id, series_name, match_description, start_time, status,
                   match_url, match_info, squads, scorecard, live_data, updated_at
            FROM matches
            ORDER BY start_time IS NULL, start_time, match_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        // One bad row must not blind reconciliation to every other match.
        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            match MatchRecord::try_from(row) {
                Ok(record) => records.push(record),
                Err(e) => warn!("Skipping unreadable match row: {e}"),
            }
        }
        Ok(records)
    }

    async fn get(&self, match_id: &str) -> Result<Option<MatchRecord>> {
        let row: Option<MatchRow> = sqlx::query_as(
            r#"
            SELECT match_id, series_name, match_description, start_time, status,
                   match_url, match_info, squads, scorecard, live_data, updated_at
            FROM matches
            WHERE match_id = ?
            "#,
        )
        .bind(match_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(MatchRecord::try_from).transpose()
    }
}

fn to_json_text(value: Option<&serde_json::Value>) -> Result<Option<String>> {
    Ok(value.map(serde_json::to_string).transpose()?)
}
