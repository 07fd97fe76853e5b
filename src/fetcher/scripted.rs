//! Scripted [`MatchFetcher`] for scheduler tests: canned responses per URL,
//! call counting and an overlap detector.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{AppError, Result};
use crate::fetcher::MatchFetcher;
use crate::types::{MatchSnapshot, MatchStub};

#[derive(Debug, Clone)]
pub enum Step {
    Snapshot { is_finished: bool, live: &'static str },
    Fail,
    /// The fetch panics, as a parser bug would.
    Panic,
}

impl Step {
    pub fn live(text: &'static str) -> Self {
        Step::Snapshot { is_finished: false, live: text }
    }

    pub fn finished(text: &'static str) -> Self {
        Step::Snapshot { is_finished: true, live: text }
    }
}

#[derive(Default)]
pub struct ScriptedFetcher {
    fixtures: Mutex<VecDeque<Result<Vec<MatchStub>>>>,
    details: Mutex<HashMap<String, VecDeque<Step>>>,
    calls: Mutex<HashMap<String, usize>>,
    discovery_calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    delay: Mutex<Option<Duration>>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the result of the next discovery call. An empty queue yields no fixtures.
    pub fn push_fixtures(&self, stubs: Vec<MatchStub>) {
        self.fixtures.lock().unwrap().push_back(Ok(stubs));
    }

    pub fn push_discovery_failure(&self) {
        self.fixtures
            .lock()
            .unwrap()
            .push_back(Err(AppError::Discovery("listing unavailable".to_string())));
    }

    /// Queue detail responses for a URL. Once drained, further calls fail.
    pub fn script(&self, url: &str, steps: impl IntoIterator<Item = Step>) {
        self.details
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .extend(steps);
    }

    /// Every detail fetch sleeps this long before answering.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn calls(&self, url: &str) -> usize {
        self.calls.lock().unwrap().get(url).copied().unwrap_or(0)
    }

    pub fn discovery_calls(&self) -> usize {
        self.discovery_calls.load(Ordering::SeqCst)
    }

    /// Highest number of detail fetches observed running at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MatchFetcher for ScriptedFetcher {
    async fn discover_fixtures(&self, _listing_url: &str) -> Result<Vec<MatchStub>> {
        self.discovery_calls.fetch_add(1, Ordering::SeqCst);
        self.fixtures
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn fetch_details(&self, match_url: &str) -> Result<MatchSnapshot> {
        *self.calls.lock().unwrap().entry(match_url.to_string()).or_default() += 1;
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let step = self
            .details
            .lock()
            .unwrap()
            .get_mut(match_url)
            .and_then(|q| q.pop_front());
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match step {
            Some(Step::Snapshot { is_finished, live }) => Ok(MatchSnapshot {
                match_info: serde_json::json!({"text": "info"}),
                squads: serde_json::json!({"text": "squads"}),
                scorecard: serde_json::json!({"text": "card"}),
                live_data: serde_json::json!({"text": live}),
                is_finished,
            }),
            Some(Step::Panic) => panic!("scripted panic fetching {match_url}"),
            Some(Step::Fail) | None => Err(AppError::Fetch {
                url: match_url.to_string(),
                reason: "scripted failure".to_string(),
            }),
        }
    }
}
