use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

// ---------------------------------------------------------------------------
// Job identity
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// One-shot: first detail fetch for a match.
    StartTrigger,
    /// Recurring: re-fetch a live match until it reports finished.
    LivePoll,
    /// Recurring: discover fixtures.
    FixtureMonitor,
    /// Recurring: recreate missing live polls from persisted state.
    Reconcile,
}

/// Stable registry key: job kind plus, for per-match jobs, the match id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobKey {
    kind: JobKind,
    match_id: Option<String>,
}

impl JobKey {
    pub fn start(match_id: &str) -> Self {
        Self { kind: JobKind::StartTrigger, match_id: Some(match_id.to_string()) }
    }

    pub fn poll(match_id: &str) -> Self {
        Self { kind: JobKind::LivePoll, match_id: Some(match_id.to_string()) }
    }

    pub fn monitor() -> Self {
        Self { kind: JobKind::FixtureMonitor, match_id: None }
    }

    pub fn reconcile() -> Self {
        Self { kind: JobKind::Reconcile, match_id: None }
    }

    pub fn match_id(&self) -> Option<&str> {
        self.match_id.as_deref()
    }
}

impl std::fmt::Display for JobKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.kind, &self.match_id) {
            (JobKind::StartTrigger, Some(id)) => write!(f, "start_{id}"),
            (JobKind::LivePoll, Some(id)) => write!(f, "live_poll_{id}"),
            (JobKind::FixtureMonitor, _) => write!(f, "monitor"),
            (JobKind::Reconcile, _) => write!(f, "reconcile"),
            (kind, None) => write!(f, "{kind:?}"),
        }
    }
}

/// Handed to a job body when it is registered. `id` distinguishes this job
/// from any later job registered under the same key.
#[derive(Debug, Clone)]
pub struct JobTicket {
    pub key: JobKey,
    pub id: u64,
    pub cancel: CancellationToken,
}

struct JobEntry {
    id: u64,
    cancel: CancellationToken,
}

/// One active job, as reported by [`JobRegistry::snapshot`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobInfo {
    pub key: String,
    pub kind: JobKind,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct JobCounts {
    pub start_triggers: usize,
    pub live_polls: usize,
    pub fixture_monitor: usize,
    pub reconcile: usize,
}

// ---------------------------------------------------------------------------
// JobRegistry
// ---------------------------------------------------------------------------

/// Active jobs by key. At most one job exists per key; jobs are never
/// mutated, only registered and removed.
pub struct JobRegistry {
    jobs: DashMap<JobKey, JobEntry>,
    /// Parent of every job token; cancelled on close.
    root: CancellationToken,
    next_id: AtomicU64,
    closed: AtomicBool,
}

impl JobRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a job under `key` unless one is already active, then hand its
    /// ticket to `start`. Returns whether a job was created.
    ///
    /// The check and the insert happen under the key's shard lock, so racing
    /// callers (monitor and reconciliation seeing the same match) produce
    /// exactly one job. `start` runs after the lock is released.
    pub fn ensure<F>(&self, key: JobKey, start: F) -> bool
    where
        F: FnOnce(JobTicket),
    {
        if self.is_closed() {
            return false;
        }
        let ticket = match self.jobs.entry(key) {
            Entry::Occupied(_) => return false,
            Entry::Vacant(slot) => {
                let ticket = JobTicket {
                    key: slot.key().clone(),
                    id: self.next_id.fetch_add(1, Ordering::Relaxed),
                    cancel: self.root.child_token(),
                };
                slot.insert(JobEntry {
                    id: ticket.id,
                    cancel: ticket.cancel.clone(),
                });
                ticket
            }
        };
        start(ticket);
        true
    }

    /// Remove and stop the job under `key`. Absent keys are a no-op.
    /// Returns whether a job was removed.
    pub fn cancel(&self, key: &JobKey) -> bool {
        match self.jobs.remove(key) {
            Some((_, entry)) => {
                entry.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Self-removal by a job that reached its terminal condition. Only removes
    /// the entry if it still belongs to this ticket.
    pub fn retire(&self, ticket: &JobTicket) {
        if let Some((_, entry)) = self.jobs.remove_if(&ticket.key, |_, e| e.id == ticket.id) {
            entry.cancel.cancel();
        }
    }

    pub fn has(&self, key: &JobKey) -> bool {
        self.jobs.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn counts(&self) -> JobCounts {
        let mut counts = JobCounts::default();
        for entry in self.jobs.iter() {
            match entry.key().kind {
                JobKind::StartTrigger => counts.start_triggers += 1,
                JobKind::LivePoll => counts.live_polls += 1,
                JobKind::FixtureMonitor => counts.fixture_monitor += 1,
                JobKind::Reconcile => counts.reconcile += 1,
            }
        }
        counts
    }

    /// Active keys sorted by rendered name.
    pub fn snapshot(&self) -> Vec<JobInfo> {
        let mut jobs: Vec<JobInfo> = self
            .jobs
            .iter()
            .map(|entry| JobInfo {
                key: entry.key().to_string(),
                kind: entry.key().kind,
            })
            .collect();
        jobs.sort_by(|a, b| a.key.cmp(&b.key));
        jobs
    }

    /// Refuse new jobs and cancel the future firings of every active one.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.root.cancel();
        self.jobs.clear();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self {
            jobs: DashMap::new(),
            root: CancellationToken::new(),
            next_id: AtomicU64::new(1),
            closed: AtomicBool::new(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Barrier;

    #[test]
    fn concurrent_ensure_creates_exactly_one_job() {
        let registry = JobRegistry::new();
        let started = AtomicUsize::new(0);
        let callers = 16;
        let barrier = Barrier::new(callers);

        let created: usize = std::thread::scope(|s| {
            let handles: Vec<_> = (0..callers)
                .map(|_| {
                    s.spawn(|| {
                        barrier.wait();
                        registry.ensure(JobKey::poll("m1"), |_| {
                            started.fetch_add(1, Ordering::SeqCst);
                        })
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|h| usize::from(h.join().unwrap()))
                .sum()
        });

        assert_eq!(created, 1);
        assert_eq!(started.load(Ordering::SeqCst), 1);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn cancel_removes_and_stops_and_absent_is_noop() {
        let registry = JobRegistry::new();
        let mut token = None;
        registry.ensure(JobKey::start("m1"), |t| token = Some(t.cancel));
        let token = token.unwrap();

        assert!(registry.has(&JobKey::start("m1")));
        assert!(registry.cancel(&JobKey::start("m1")));
        assert!(token.is_cancelled());
        assert!(!registry.has(&JobKey::start("m1")));
        assert!(!registry.cancel(&JobKey::start("m1")));
    }

    #[test]
    fn retire_leaves_a_replacement_job_alone() {
        let registry = JobRegistry::new();
        let mut old = None;
        registry.ensure(JobKey::start("m1"), |t| old = Some(t));
        let old = old.unwrap();

        // Reschedule: cancel then recreate under the same key.
        registry.cancel(&JobKey::start("m1"));
        let mut new = None;
        assert!(registry.ensure(JobKey::start("m1"), |t| new = Some(t)));
        let new = new.unwrap();

        registry.retire(&old);
        assert!(registry.has(&JobKey::start("m1")));
        assert!(!new.cancel.is_cancelled());

        registry.retire(&new);
        assert!(!registry.has(&JobKey::start("m1")));
    }

    #[test]
    fn keys_are_scoped_by_kind() {
        let registry = JobRegistry::new();
        assert!(registry.ensure(JobKey::start("m1"), |_| {}));
        assert!(registry.ensure(JobKey::poll("m1"), |_| {}));
        assert!(registry.ensure(JobKey::monitor(), |_| {}));
        assert!(!registry.ensure(JobKey::monitor(), |_| {}));

        let counts = registry.counts();
        assert_eq!(counts.start_triggers, 1);
        assert_eq!(counts.live_polls, 1);
        assert_eq!(counts.fixture_monitor, 1);
        assert_eq!(JobKey::poll("m1").to_string(), "live_poll_m1");
        assert_eq!(JobKey::poll("m1").match_id(), Some("m1"));
        assert_eq!(JobKey::monitor().match_id(), None);

        let keys: Vec<String> = registry.snapshot().into_iter().map(|j| j.key).collect();
        assert_eq!(keys, ["live_poll_m1", "monitor", "start_m1"]);
    }

    #[test]
    fn closed_registry_rejects_new_jobs_and_cancels_existing() {
        let registry = JobRegistry::new();
        let mut token = None;
        registry.ensure(JobKey::reconcile(), |t| token = Some(t.cancel));

        registry.close();
        assert!(token.unwrap().is_cancelled());
        assert!(!registry.ensure(JobKey::start("m2"), |_| panic!("must not start")));
        assert_eq!(registry.len(), 0);
    }
}
