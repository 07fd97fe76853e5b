use std::sync::Arc;

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::api::health::{HealthSnapshot, HealthState};
use crate::api::latency::{LatencyStats, LatencySummary};
use crate::db::SnapshotStore;
use crate::error::AppError;
use crate::scheduler::registry::{JobCounts, JobInfo, JobRegistry};
use crate::types::{MatchRecord, MatchStatus};

#[derive(Clone)]
pub struct ApiState {
    pub store: Arc<dyn SnapshotStore>,
    pub registry: Arc<JobRegistry>,
    pub health: Arc<HealthState>,
    pub latency: Arc<LatencyStats>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/matches", get(get_matches))
        .route("/api/matches/:id", get(get_match))
        .route("/api/matches/:id/live", get(get_match_live))
        .route("/health", get(get_health))
        .route("/stats/latency", get(get_stats_latency))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

/// Listing row: everything except the snapshot payloads.
#[derive(Serialize)]
pub struct MatchSummary {
    pub match_id: String,
    pub series_name: Option<String>,
    pub match_description: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub status: MatchStatus,
    pub match_url: String,
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<MatchRecord> for MatchSummary {
    fn from(r: MatchRecord) -> Self {
        Self {
            match_id: r.match_id,
            series_name: r.series_name,
            match_description: r.match_description,
            start_time: r.start_time,
            status: r.status,
            match_url: r.match_url,
            updated_at: r.updated_at,
        }
    }
}

#[derive(Serialize)]
pub struct LiveResponse {
    pub status: MatchStatus,
    pub live_data: Option<serde_json::Value>,
    pub scorecard: Option<serde_json::Value>,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub accepting_jobs: bool,
    pub jobs: JobCounts,
    pub active_jobs: Vec<JobInfo>,
    #[serde(flatten)]
    pub counters: HealthSnapshot,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn get_matches(State(state): State<ApiState>) -> Result<Json<Vec<MatchSummary>>, AppError> {
    let records = state.store.get_all().await?;
    Ok(Json(records.into_iter().map(MatchSummary::from).collect()))
}

async fn get_match(
    State(state): State<ApiState>,
    Path(match_id): Path<String>,
) -> Result<Json<MatchRecord>, AppError> {
    state
        .store
        .get(&match_id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("match {match_id}")))
}

async fn get_match_live(
    State(state): State<ApiState>,
    Path(match_id): Path<String>,
) -> Result<Json<LiveResponse>, AppError> {
    let record = state
        .store
        .get(&match_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("match {match_id}")))?;
    Ok(Json(LiveResponse {
        status: record.status,
        live_data: record.live_data,
        scorecard: record.scorecard,
    }))
}

async fn get_health(State(state): State<ApiState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        accepting_jobs: !state.registry.is_closed(),
        jobs: state.registry.counts(),
        active_jobs: state.registry.snapshot(),
        counters: state.health.snapshot(),
    })
}

async fn get_stats_latency(State(state): State<ApiState>) -> Json<LatencySummary> {
    Json(state.latency.summary())
}
