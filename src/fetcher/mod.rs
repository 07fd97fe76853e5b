pub mod http;
#[cfg(test)]
pub mod scripted;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{MatchSnapshot, MatchStub};

pub use http::HttpFetcher;

/// Remote side of the tracker: fixture discovery and per-match detail fetch.
///
/// One instance is shared by every job. Implementations must keep any
/// long-lived handle (client, session) read-only and build a fresh per-call
/// surface (request, page) inside each method, so concurrent jobs never touch
/// the same mutable fetch state.
#[async_trait]
pub trait MatchFetcher: Send + Sync {
    /// Zero or more fixtures from a listing page. An error means "nothing this tick".
    async fn discover_fixtures(&self, listing_url: &str) -> Result<Vec<MatchStub>>;

    /// One snapshot of a match. An error means only this attempt failed.
    async fn fetch_details(&self, match_url: &str) -> Result<MatchSnapshot>;
}
