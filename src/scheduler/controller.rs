use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use tokio::time::{interval, interval_at, Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::api::health::HealthState;
use crate::api::latency::LatencyStats;
use crate::config::Config;
use crate::db::SnapshotStore;
use crate::error::{AppError, Result};
use crate::fetcher::MatchFetcher;
use crate::scheduler::policy::{jitter, retry_backoff, start_delay};
use crate::scheduler::registry::{JobKey, JobRegistry, JobTicket};
use crate::types::{MatchRecord, MatchSnapshot, MatchStatus, MatchStub, UpsertOutcome};

/// Everything the controller can schedule. Each variant maps to one job body.
#[derive(Debug, Clone)]
pub enum JobSpec {
    StartTrigger(MatchStub),
    LivePoll(MatchStub),
    FixtureMonitor,
    Reconcile,
}

impl JobSpec {
    pub fn key(&self) -> JobKey {
        match self {
            JobSpec::StartTrigger(stub) => JobKey::start(&stub.match_id),
            JobSpec::LivePoll(stub) => JobKey::poll(&stub.match_id),
            JobSpec::FixtureMonitor => JobKey::monitor(),
            JobSpec::Reconcile => JobKey::reconcile(),
        }
    }
}

/// Drives every match through Upcoming → Live → Finished.
///
/// Owns the job registry and the shared fetcher. Every job runs as its own
/// task on the tracker, so a slow fetch only ever delays its own job. The
/// fetcher is shared read-only; per-fetch state lives inside each call.
pub struct LifecycleController {
    cfg: Config,
    store: Arc<dyn SnapshotStore>,
    fetcher: Arc<dyn MatchFetcher>,
    registry: Arc<JobRegistry>,
    tracker: TaskTracker,
    health: Arc<HealthState>,
    latency: Arc<LatencyStats>,
}

impl LifecycleController {
    pub fn new(
        cfg: Config,
        store: Arc<dyn SnapshotStore>,
        fetcher: Arc<dyn MatchFetcher>,
        health: Arc<HealthState>,
        latency: Arc<LatencyStats>,
    ) -> Arc<Self> {
        Arc::new(Self {
            cfg,
            store,
            fetcher,
            registry: JobRegistry::new(),
            tracker: TaskTracker::new(),
            health,
            latency,
        })
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    /// One synchronous discovery pass, then the two background loops.
    pub async fn start(self: &Arc<Self>) {
        let scheduled = self.monitor_fixtures().await;
        info!("Bootstrap discovery complete: {scheduled} start trigger(s) armed");
        self.schedule(JobSpec::FixtureMonitor);
        self.schedule(JobSpec::Reconcile);
    }

    /// Stop accepting jobs, cancel future firings, and give in-flight bodies
    /// up to the configured grace period to finish.
    pub async fn shutdown(&self) {
        info!(active = self.registry.len(), "Lifecycle controller shutting down");
        self.registry.close();
        self.tracker.close();
        if tokio::time::timeout(self.cfg.shutdown_grace, self.tracker.wait())
            .await
            .is_err()
        {
            warn!(
                remaining = self.tracker.len(),
                "Jobs still running after {:?}; abandoning", self.cfg.shutdown_grace
            );
        } else {
            info!("All jobs stopped");
        }
    }

    /// Register `spec` unless a job with the same key is active.
    pub fn schedule(self: &Arc<Self>, spec: JobSpec) -> bool {
        let this = Arc::clone(self);
        self.registry.ensure(spec.key(), move |ticket| {
            let job = Arc::clone(&this).run_job(spec, ticket);
            this.tracker.spawn(job);
        })
    }

    fn run_job(self: Arc<Self>, spec: JobSpec, ticket: JobTicket) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            let body = AssertUnwindSafe(self.run_body(&spec, &ticket)).catch_unwind();
            if let Err(panic) = body.await {
                error!(
                    match_id = ticket.key.match_id().unwrap_or("-"),
                    job = %ticket.key,
                    "Job panicked: {}", panic_message(&*panic)
                );
            }
            // Retired on every exit, panics included, so reconciliation can
            // recreate the job under the same key.
            self.registry.retire(&ticket);
            debug!(job = %ticket.key, "Job ended");
        })
    }

    async fn run_body(self: &Arc<Self>, spec: &JobSpec, ticket: &JobTicket) {
        match spec {
            JobSpec::StartTrigger(stub) => self.run_start_trigger(stub, ticket).await,
            JobSpec::LivePoll(stub) => self.run_live_poll(stub, ticket).await,
            JobSpec::FixtureMonitor => {
                // The bootstrap pass already covered the first interval.
                let period = self.cfg.monitor_interval;
                let mut ticker = every(interval_at(Instant::now() + period, period));
                while wait_tick(&mut ticker, &ticket.cancel).await {
                    self.monitor_fixtures().await;
                }
            }
            JobSpec::Reconcile => {
                let mut ticker = every(interval(self.cfg.reconcile_interval));
                while wait_tick(&mut ticker, &ticket.cancel).await {
                    self.reconcile().await;
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Start trigger
    // -----------------------------------------------------------------------

    async fn run_start_trigger(self: &Arc<Self>, stub: &MatchStub, ticket: &JobTicket) {
        let delay = start_delay(stub.start_time, Utc::now(), self.cfg.start_grace);
        info!(match_id = %stub.match_id, job = %ticket.key, "Start trigger armed, fires in {delay:?}");
        if !sleep_or_cancel(delay, &ticket.cancel).await {
            return;
        }

        let attempts = self.cfg.start_retry_attempts.max(1);
        for attempt in 1..=attempts {
            match self.fetch_details(stub).await {
                Ok(snapshot) => {
                    self.on_first_snapshot(stub, snapshot, ticket).await;
                    return;
                }
                Err(e) if attempt < attempts => {
                    let backoff = retry_backoff(self.cfg.start_retry_backoff, attempt);
                    warn!(
                        match_id = %stub.match_id,
                        job = %ticket.key,
                        attempt,
                        "Start fetch failed, retrying in {backoff:?}: {e}"
                    );
                    if !sleep_or_cancel(backoff, &ticket.cancel).await {
                        return;
                    }
                }
                Err(e) => {
                    error!(
                        match_id = %stub.match_id,
                        job = %ticket.key,
                        attempts,
                        "Start fetch failed, giving up until the match is rediscovered: {e}"
                    );
                }
            }
        }
    }

    async fn on_first_snapshot(self: &Arc<Self>, stub: &MatchStub, snapshot: MatchSnapshot, ticket: &JobTicket) {
        let finished = snapshot.is_finished;
        let record = MatchRecord::from_snapshot(stub, snapshot);
        let outcome = self.persist(&record, &ticket.key).await;

        if finished {
            info!(match_id = %stub.match_id, "Match already finished at first fetch");
        } else if outcome == Some(UpsertOutcome::Stale) {
            debug!(match_id = %stub.match_id, "Stored record already finished; not polling");
        } else if self.schedule(JobSpec::LivePoll(stub.clone())) {
            info!(
                match_id = %stub.match_id,
                "Match live; polling every {:?}", self.cfg.poll_interval
            );
        }
    }

    // -----------------------------------------------------------------------
    // Live poll
    // -----------------------------------------------------------------------

    async fn run_live_poll(&self, stub: &MatchStub, ticket: &JobTicket) {
        let period = self.cfg.poll_interval;
        let first = period + jitter(self.cfg.poll_jitter);
        let mut ticker = every(interval_at(Instant::now() + first, period));

        while wait_tick(&mut ticker, &ticket.cancel).await {
            if self.poll_once(stub, ticket).await {
                break;
            }
        }
    }

    /// One poll tick. Returns true once the match is over, after the job has
    /// removed itself from the registry. A failed fetch leaves both the job
    /// and the stored snapshot untouched.
    async fn poll_once(&self, stub: &MatchStub, ticket: &JobTicket) -> bool {
        let snapshot = match self.fetch_details(stub).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(match_id = %stub.match_id, job = %ticket.key, "Live poll fetch failed: {e}");
                return false;
            }
        };

        let finished = snapshot.is_finished;
        let outcome = self.persist(&MatchRecord::from_snapshot(stub, snapshot), &ticket.key).await;

        if finished || outcome == Some(UpsertOutcome::Stale) {
            self.registry.retire(ticket);
            info!(match_id = %stub.match_id, job = %ticket.key, "Match finished; live poll stopped");
            return true;
        }
        debug!(match_id = %stub.match_id, "Live poll tick stored");
        false
    }

    // -----------------------------------------------------------------------
    // Fixture monitor
    // -----------------------------------------------------------------------

    /// Discover fixtures, write first sightings, and arm start triggers for
    /// matches not yet started. Returns how many triggers were armed.
    pub async fn monitor_fixtures(self: &Arc<Self>) -> usize {
        let discovered = tokio::time::timeout(
            self.cfg.fetch_timeout,
            self.fetcher.discover_fixtures(&self.cfg.fixtures_url),
        )
        .await
        .unwrap_or_else(|_| Err(AppError::Timeout(self.cfg.fetch_timeout)));

        let stubs = match discovered {
            Ok(stubs) => stubs,
            Err(e) => {
                self.health.inc_discovery_failures();
                warn!("Fixture discovery failed, retrying next tick: {e}");
                return 0;
            }
        };
        self.health.mark_discovery();
        info!("Fixture monitor found {} matches", stubs.len());

        let mut armed = 0;
        for stub in stubs {
            let key = JobKey::start(&stub.match_id);
            match self.store.get(&stub.match_id).await {
                Ok(None) => {
                    if self.persist(&MatchRecord::bare(&stub), &key).await != Some(UpsertOutcome::Stale) {
                        armed += usize::from(self.schedule(JobSpec::StartTrigger(stub)));
                    }
                }
                Ok(Some(existing)) if existing.status == MatchStatus::Upcoming => {
                    let changed = existing.start_time != stub.start_time
                        || existing.match_url != stub.match_url;
                    if changed {
                        // Stale: the match went live after our read.
                        if self.persist(&MatchRecord::bare(&stub), &key).await == Some(UpsertOutcome::Stale) {
                            continue;
                        }
                        if self.registry.cancel(&key) {
                            info!(match_id = %stub.match_id, "Fixture changed; re-arming start trigger");
                        }
                    }
                    // Also re-arms a trigger that gave up after failed fetches.
                    armed += usize::from(self.schedule(JobSpec::StartTrigger(stub)));
                }
                Ok(Some(_)) => {}
                Err(e) => {
                    self.health.inc_persistence_failures();
                    warn!(match_id = %stub.match_id, "Skipping fixture, store read failed: {e}");
                }
            }
        }
        armed
    }

    // -----------------------------------------------------------------------
    // Reconciliation
    // -----------------------------------------------------------------------

    /// Ensure every persisted Live match has a poll job. Only ever adds jobs.
    /// Returns how many were created.
    pub async fn reconcile(self: &Arc<Self>) -> usize {
        let records = match self.store.get_all().await {
            Ok(records) => records,
            Err(e) => {
                self.health.inc_persistence_failures();
                warn!("Reconciliation skipped, store read failed: {e}");
                return 0;
            }
        };
        self.health.mark_reconcile();

        let mut created = 0;
        for record in records.iter().filter(|r| r.status == MatchStatus::Live) {
            if self.schedule(JobSpec::LivePoll(record.stub())) {
                created += 1;
                info!(match_id = %record.match_id, "Reconciliation restored live poll");
            }
        }
        debug!(created, "Reconciliation pass complete");
        created
    }

    // -----------------------------------------------------------------------
    // Collaborator calls
    // -----------------------------------------------------------------------

    async fn fetch_details(&self, stub: &MatchStub) -> Result<MatchSnapshot> {
        let started = std::time::Instant::now();
        let result = tokio::time::timeout(
            self.cfg.fetch_timeout,
            self.fetcher.fetch_details(&stub.match_url),
        )
        .await
        .unwrap_or_else(|_| Err(AppError::Timeout(self.cfg.fetch_timeout)));

        match &result {
            Ok(_) => self.latency.record(started.elapsed()),
            Err(_) => self.health.inc_fetch_failures(),
        }
        result
    }

    /// Write through the store. Failures are logged and counted; the next
    /// scheduled occurrence writes again.
    async fn persist(&self, record: &MatchRecord, job: &JobKey) -> Option<UpsertOutcome> {
        match self.store.upsert(record).await {
            Ok(outcome) => {
                if outcome == UpsertOutcome::Stale {
                    debug!(
                        match_id = %record.match_id,
                        job = %job,
                        status = %record.status,
                        "Dropped write that would regress status"
                    );
                }
                Some(outcome)
            }
            Err(e) => {
                self.health.inc_persistence_failures();
                warn!(match_id = %record.match_id, job = %job, "Snapshot write failed: {e}");
                None
            }
        }
    }
}

/// Recurring single-instance timer: a tick that comes due while the previous
/// body is still running is skipped, never stacked.
fn every(mut ticker: Interval) -> Interval {
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker
}

async fn wait_tick(ticker: &mut Interval, cancel: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = ticker.tick() => !cancel.is_cancelled(),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

async fn sleep_or_cancel(delay: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}
