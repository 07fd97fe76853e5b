use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, SubsecRound, Utc};
use reqwest::Url;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info};

use crate::error::{AppError, Result};
use crate::fetcher::MatchFetcher;
use crate::types::{MatchSnapshot, MatchStub};

/// Phrases that mark a match page as concluded.
const FINISHED_KEYWORDS: &[&str] = &[
    "won by",
    "match over",
    "match finished",
    "stumps",
    "completed",
    "result",
];

const MATCH_LINK: &str = "a[href*='/match/']";
const FIXTURE_CONTAINER: &[&str] = &["div", "li", "section", "article"];
const FIXTURE_TIME: &str = "time, .time, .start-time, .date";
const SERIES_NAME: &str = ".series, .series-name";

const INFO_PANEL: &str = "[data-tab='info'], #match-info, .match-info";
const SQUADS_PANEL: &str = "[data-tab='squads'], #squads, .squads";
const SCORECARD_PANEL: &str = "[data-tab='scorecard'], #scorecard, .scorecard";
const LIVE_PANEL: &str = "[data-tab='live'], #live, .live-feed, .commentary";

/// Plain-HTTP fetcher. The `reqwest::Client` (and its connection pool) is
/// shared by all jobs; each call issues its own request.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("match-tracker/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }

    async fn get_text(&self, url: &str) -> Result<String> {
        let body = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        Ok(body)
    }
}

#[async_trait]
impl MatchFetcher for HttpFetcher {
    async fn discover_fixtures(&self, listing_url: &str) -> Result<Vec<MatchStub>> {
        info!("Loading fixtures page: {listing_url}");
        let html = self
            .get_text(listing_url)
            .await
            .map_err(|e| AppError::Discovery(format!("{listing_url}: {e}")))?;
        let stubs = parse_fixture_list(&html, listing_url)?;
        debug!("Fixtures page yielded {} matches", stubs.len());
        Ok(stubs)
    }

    async fn fetch_details(&self, match_url: &str) -> Result<MatchSnapshot> {
        let html = self.get_text(match_url).await.map_err(|e| AppError::Fetch {
            url: match_url.to_string(),
            reason: e.to_string(),
        })?;
        parse_match_page(&html, match_url)
    }
}

// ---------------------------------------------------------------------------
// Extraction
// ---------------------------------------------------------------------------

fn selector(css: &str) -> std::result::Result<Selector, String> {
    Selector::parse(css).map_err(|e| format!("invalid selector {css:?}: {e:?}"))
}

fn listing_selector(css: &str) -> Result<Selector> {
    selector(css).map_err(AppError::Discovery)
}

fn detail_selector(css: &str, match_url: &str) -> Result<Selector> {
    selector(css).map_err(|reason| AppError::Fetch {
        url: match_url.to_string(),
        reason,
    })
}

/// Every distinct match link on a listing page, in page order.
pub fn parse_fixture_list(html: &str, base_url: &str) -> Result<Vec<MatchStub>> {
    let base = Url::parse(base_url).map_err(|e| AppError::Discovery(format!("{base_url}: {e}")))?;
    let link_sel = listing_selector(MATCH_LINK)?;
    let time_sel = listing_selector(FIXTURE_TIME)?;
    let series_sel = listing_selector(SERIES_NAME)?;
    let doc = Html::parse_document(html);

    let mut seen = HashSet::new();
    let mut stubs = Vec::new();

    for anchor in doc.select(&link_sel) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        let Ok(url) = base.join(href) else {
            continue;
        };
        let url = url.to_string();
        if !seen.insert(url.clone()) {
            continue;
        }

        let match_id = anchor
            .value()
            .attr("data-match-id")
            .map(str::to_string)
            .or_else(|| last_path_segment(&url));
        let Some(match_id) = match_id else {
            continue;
        };

        let text = collapse_text(anchor);
        let container = closest_container(anchor);
        let start_time = container
            .and_then(|c| c.select(&time_sel).next())
            .and_then(|t| {
                t.value()
                    .attr("datetime")
                    .and_then(parse_start_time)
                    .or_else(|| parse_start_time(&collapse_text(t)))
            })
            .or_else(|| parse_start_time(&text));
        let series_name = container
            .and_then(|c| c.select(&series_sel).next())
            .map(collapse_text)
            .filter(|s| !s.is_empty());

        stubs.push(MatchStub {
            match_id,
            start_time,
            match_url: url,
            series_name,
            match_description: Some(text).filter(|s| !s.is_empty()),
        });
    }

    Ok(stubs)
}

/// Structured snapshot of a match page. Missing panels become `{raw: null, text: null}`.
pub fn parse_match_page(html: &str, match_url: &str) -> Result<MatchSnapshot> {
    let doc = Html::parse_document(html);
    let panel = |css: &str| -> Result<serde_json::Value> {
        let sel = detail_selector(css, match_url)?;
        Ok(match doc.select(&sel).next() {
            Some(el) => serde_json::json!({ "raw": el.inner_html(), "text": collapse_text(el) }),
            None => serde_json::json!({ "raw": null, "text": null }),
        })
    };

    let match_info = panel(INFO_PANEL)?;
    let squads = panel(SQUADS_PANEL)?;
    let scorecard = panel(SCORECARD_PANEL)?;
    let live_data = panel(LIVE_PANEL)?;

    let status_text = format!("{} {}", panel_text(&match_info), panel_text(&live_data)).to_lowercase();
    let is_finished = FINISHED_KEYWORDS.iter().any(|kw| status_text.contains(kw));

    Ok(MatchSnapshot {
        match_info,
        squads,
        scorecard,
        live_data,
        is_finished,
    })
}

fn panel_text(panel: &serde_json::Value) -> &str {
    panel.get("text").and_then(|t| t.as_str()).unwrap_or("")
}

fn closest_container(el: ElementRef<'_>) -> Option<ElementRef<'_>> {
    el.ancestors()
        .filter_map(ElementRef::wrap)
        .find(|a| FIXTURE_CONTAINER.contains(&a.value().name()))
}

fn collapse_text(el: ElementRef<'_>) -> String {
    el.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

fn last_path_segment(url: &str) -> Option<String> {
    url.trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// RFC 3339, or a bare `YYYY-MM-DD HH:MM` taken as UTC. Truncated to the
/// millisecond so repeated listings compare equal to the stored value.
fn parse_start_time(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            ["%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S"]
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
                .map(|naive| naive.and_utc())
        })
        .map(|dt| dt.trunc_subsecs(3))
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = r#"
        <html><body>
          <ul>
            <li>
              <span class="series">Summer Cup</span>
              <a href="/match/abc-123">Lions vs Tigers</a>
              <time datetime="2026-06-01T14:00:00Z">1 June</time>
            </li>
            <li>
              <a href="https://example.test/match/def-456/" data-match-id="def456">Eagles vs Hawks</a>
            </li>
            <li><a href="/match/abc-123">duplicate link</a></li>
            <li><a href="/news/unrelated">News</a></li>
          </ul>
        </body></html>
    "#;

    #[test]
    fn fixture_list_extracts_distinct_match_links() {
        let stubs = parse_fixture_list(LISTING, "https://example.test/fixtures/match-list").unwrap();
        assert_eq!(stubs.len(), 2);

        let first = &stubs[0];
        assert_eq!(first.match_id, "abc-123");
        assert_eq!(first.match_url, "https://example.test/match/abc-123");
        assert_eq!(first.series_name.as_deref(), Some("Summer Cup"));
        assert_eq!(first.match_description.as_deref(), Some("Lions vs Tigers"));
        assert_eq!(
            first.start_time,
            Some(DateTime::parse_from_rfc3339("2026-06-01T14:00:00Z").unwrap().with_timezone(&Utc))
        );

        let second = &stubs[1];
        assert_eq!(second.match_id, "def456");
        assert_eq!(second.start_time, None);
    }

    #[test]
    fn match_page_detects_finished_keywords() {
        let live = r#"<div id="match-info">Final, day 2</div><div class="live-feed">Over 12: 4 runs</div>"#;
        let done = r#"<div id="match-info">Lions won by 6 wickets</div><div id="squads">XI</div>"#;

        let snap = parse_match_page(live, "https://example.test/match/m1").unwrap();
        assert!(!snap.is_finished);
        assert_eq!(snap.live_data["text"], "Over 12: 4 runs");
        assert!(snap.squads["raw"].is_null());

        let snap = parse_match_page(done, "https://example.test/match/m1").unwrap();
        assert!(snap.is_finished);
        assert_eq!(snap.squads["text"], "XI");
    }

    #[test]
    fn selector_errors_carry_the_calling_path() {
        assert!(matches!(listing_selector("a[["), Err(AppError::Discovery(_))));
        match detail_selector("a[[", "https://example.test/match/m1") {
            Err(AppError::Fetch { url, .. }) => assert_eq!(url, "https://example.test/match/m1"),
            other => panic!("expected a fetch error, got {other:?}"),
        }
    }

    #[test]
    fn start_time_accepts_naive_utc() {
        let t = parse_start_time("2026-06-01 09:30").unwrap();
        assert_eq!(t.to_rfc3339(), "2026-06-01T09:30:00+00:00");
        assert!(parse_start_time("tomorrow-ish").is_none());
    }

    #[test]
    fn start_time_drops_sub_millisecond_digits() {
        let t = parse_start_time("2099-06-01T14:00:00.123456Z").unwrap();
        assert_eq!(t.to_rfc3339(), "2099-06-01T14:00:00.123+00:00");
    }
}
