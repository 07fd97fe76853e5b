//! In-process [`SnapshotStore`] used by controller and API tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use crate::db::store::SnapshotStore;
use crate::error::{AppError, Result};
use crate::types::{MatchRecord, UpsertOutcome};

#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<String, MatchRecord>>,
    /// Served by `get` in place of the stored record, for reads that raced a write.
    lagging: Mutex<HashMap<String, MatchRecord>>,
    writes: AtomicUsize,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a record as if it had been persisted by a previous process.
    pub fn seed(&self, mut record: MatchRecord) {
        record.updated_at = Some(Utc::now());
        self.records
            .lock()
            .unwrap()
            .insert(record.match_id.clone(), record);
    }

    /// Number of applied writes so far.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make `get` return `record` while the stored row stays as it is, as if
    /// another job wrote between the caller's read and its write.
    pub fn lag_reads(&self, record: MatchRecord) {
        self.lagging
            .lock()
            .unwrap()
            .insert(record.match_id.clone(), record);
    }

    fn check_reads(&self) -> Result<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(AppError::Persistence(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }
}

#[async_trait]
impl SnapshotStore for MemoryStore {
    async fn upsert(&self, record: &MatchRecord) -> Result<UpsertOutcome> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(AppError::Persistence(sqlx::Error::PoolTimedOut));
        }
        let mut records = self.records.lock().unwrap();
        if let Some(existing) = records.get(&record.match_id) {
            if record.status.rank() < existing.status.rank() {
                return Ok(UpsertOutcome::Stale);
            }
        }
        let mut stored = record.clone();
        stored.updated_at = Some(Utc::now());
        records.insert(stored.match_id.clone(), stored);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(UpsertOutcome::Applied)
    }

    async fn get_all(&self) -> Result<Vec<MatchRecord>> {
        self.check_reads()?;
        let mut all: Vec<MatchRecord> = self.records.lock().unwrap().values().cloned().collect();
        all.sort_by(|a, b| a.match_id.cmp(&b.match_id));
        Ok(all)
    }

    async fn get(&self, match_id: &str) -> Result<Option<MatchRecord>> {
        self.check_reads()?;
        if let Some(lagging) = self.lagging.lock().unwrap().get(match_id) {
            return Ok(Some(lagging.clone()));
        }
        Ok(self.records.lock().unwrap().get(match_id).cloned())
    }
}
