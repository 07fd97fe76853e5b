/// Row types for the `matches` table (see migrations/0001_create_matches.sql).
/// Timestamps are RFC 3339 text, payloads are JSON text.
use chrono::{DateTime, SecondsFormat, Utc};

use crate::error::{AppError, Result};
use crate::types::{MatchRecord, MatchStatus};

#[derive(Debug, sqlx::FromRow)]
pub struct MatchRow {
    pub match_id: String,
    pub series_name: Option<String>,
    pub match_description: Option<String>,
    pub start_time: Option<String>,
    pub status: String,
    pub match_url: String,
    pub match_info: Option<String>,
    pub squads: Option<String>,
    pub scorecard: Option<String>,
    pub live_data: Option<String>,
    pub updated_at: String,
}

impl TryFrom<MatchRow> for MatchRecord {
    type Error = AppError;

    fn try_from(row: MatchRow) -> Result<Self> {
        let status = MatchStatus::parse(&row.status).ok_or_else(|| {
            AppError::Corrupt(format!("match {}: unknown status {:?}", row.match_id, row.status))
        })?;
        // An unreadable start time degrades to "unknown" rather than hiding the row.
        let start_time = row.start_time.as_deref().and_then(parse_ts);
        let updated_at = parse_ts(&row.updated_at);

        Ok(MatchRecord {
            match_id: row.match_id,
            start_time,
            match_url: row.match_url,
            series_name: row.series_name,
            match_description: row.match_description,
            status,
            match_info: row.match_info.as_deref().map(parse_payload),
            squads: row.squads.as_deref().map(parse_payload),
            scorecard: row.scorecard.as_deref().map(parse_payload),
            live_data: row.live_data.as_deref().map(parse_payload),
            updated_at,
        })
    }
}

pub fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_ts(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Payload text that isn't valid JSON is surfaced as a plain string.
fn parse_payload(s: &str) -> serde_json::Value {
    serde_json::from_str(s).unwrap_or_else(|_| serde_json::Value::String(s.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(status: &str) -> MatchRow {
        MatchRow {
            match_id: "m1".to_string(),
            series_name: None,
            match_description: None,
            start_time: Some("2026-03-01T09:30:00.000Z".to_string()),
            status: status.to_string(),
            match_url: "https://example.test/match/m1".to_string(),
            match_info: Some("{\"text\":\"info\"}".to_string()),
            squads: Some("not json".to_string()),
            scorecard: None,
            live_data: None,
            updated_at: "2026-03-01T10:00:00.000Z".to_string(),
        }
    }

    #[test]
    fn row_converts_payloads_and_timestamps() {
        let record = MatchRecord::try_from(row("Live")).unwrap();
        assert_eq!(record.status, MatchStatus::Live);
        assert!(record.start_time.is_some());
        assert_eq!(record.match_info, Some(serde_json::json!({"text": "info"})));
        assert_eq!(record.squads, Some(serde_json::json!("not json")));
        assert_eq!(record.scorecard, None);
    }

    #[test]
    fn unknown_status_is_corrupt() {
        let err = MatchRecord::try_from(row("paused")).unwrap_err();
        assert!(matches!(err, AppError::Corrupt(_)));
    }
}
