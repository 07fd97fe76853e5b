use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Lifecycle status
// ---------------------------------------------------------------------------

/// Persisted lifecycle state of a match. Only ever moves forward:
/// Upcoming → Live → Finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MatchStatus {
    Upcoming,
    Live,
    Finished,
}

impl MatchStatus {
    /// Position in the lifecycle; a write may never lower it.
    pub fn rank(self) -> u8 {
        match self {
            MatchStatus::Upcoming => 0,
            MatchStatus::Live => 1,
            MatchStatus::Finished => 2,
        }
    }

    /// Status implied by one detail fetch.
    pub fn from_finished(is_finished: bool) -> Self {
        if is_finished {
            MatchStatus::Finished
        } else {
            MatchStatus::Live
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MatchStatus::Upcoming => "Upcoming",
            MatchStatus::Live => "Live",
            MatchStatus::Finished => "Finished",
        }
    }

    /// Accepts the canonical names plus the lowercase spelling older rows used.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "upcoming" => Some(MatchStatus::Upcoming),
            "live" => Some(MatchStatus::Live),
            "finished" => Some(MatchStatus::Finished),
            _ => None,
        }
    }
}

impl std::fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Collaborator shapes
// ---------------------------------------------------------------------------

/// One fixture as seen on the listing page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchStub {
    pub match_id: String,
    /// None means "assume imminent".
    pub start_time: Option<DateTime<Utc>>,
    pub match_url: String,
    pub series_name: Option<String>,
    pub match_description: Option<String>,
}

impl MatchStub {
    pub fn new(match_id: impl Into<String>, match_url: impl Into<String>) -> Self {
        Self {
            match_id: match_id.into(),
            start_time: None,
            match_url: match_url.into(),
            series_name: None,
            match_description: None,
        }
    }

    /// Start times are kept to the millisecond, the precision the store
    /// persists, so a re-read record compares equal to the same listing.
    pub fn with_start_time(mut self, start_time: DateTime<Utc>) -> Self {
        self.start_time = Some(start_time.trunc_subsecs(3));
        self
    }
}

/// Result of one detail fetch. Payloads are opaque to the scheduler.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchSnapshot {
    pub match_info: serde_json::Value,
    pub squads: serde_json::Value,
    pub scorecard: serde_json::Value,
    pub live_data: serde_json::Value,
    pub is_finished: bool,
}

// ---------------------------------------------------------------------------
// MatchRecord: one persisted row per match
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRecord {
    pub match_id: String,
    pub start_time: Option<DateTime<Utc>>,
    pub match_url: String,
    pub series_name: Option<String>,
    pub match_description: Option<String>,
    pub status: MatchStatus,
    pub match_info: Option<serde_json::Value>,
    pub squads: Option<serde_json::Value>,
    pub scorecard: Option<serde_json::Value>,
    pub live_data: Option<serde_json::Value>,
    /// Stamped by the store on every applied write; None on records not yet written.
    pub updated_at: Option<DateTime<Utc>>,
}

impl MatchRecord {
    /// Record written on first sighting: listing metadata only, status Upcoming.
    pub fn bare(stub: &MatchStub) -> Self {
        Self {
            match_id: stub.match_id.clone(),
            start_time: stub.start_time,
            match_url: stub.match_url.clone(),
            series_name: stub.series_name.clone(),
            match_description: stub.match_description.clone(),
            status: MatchStatus::Upcoming,
            match_info: None,
            squads: None,
            scorecard: None,
            live_data: None,
            updated_at: None,
        }
    }

    /// Record written after a successful fetch. The snapshot replaces every
    /// payload field; status follows the fetch's finished signal.
    pub fn from_snapshot(stub: &MatchStub, snapshot: MatchSnapshot) -> Self {
        Self {
            status: MatchStatus::from_finished(snapshot.is_finished),
            match_info: Some(snapshot.match_info),
            squads: Some(snapshot.squads),
            scorecard: Some(snapshot.scorecard),
            live_data: Some(snapshot.live_data),
            ..Self::bare(stub)
        }
    }

    /// Listing view of this record, used to rebuild jobs from persisted state.
    pub fn stub(&self) -> MatchStub {
        MatchStub {
            match_id: self.match_id.clone(),
            start_time: self.start_time,
            match_url: self.match_url.clone(),
            series_name: self.series_name.clone(),
            match_description: self.match_description.clone(),
        }
    }
}

/// What the store did with an upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Applied,
    /// The write would have moved status backwards; the stored row is unchanged.
    Stale,
}
