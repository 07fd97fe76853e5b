//! How long match-page fetches take, for `/stats/latency`.

use std::sync::Mutex;
use std::time::Duration;

use hdrhistogram::Histogram;
use serde::Serialize;

/// Longest fetch the histogram can hold; anything slower is clamped to it.
const MAX_TRACKED_MS: u64 = 3_600_000;

/// Wall time of every successful detail fetch, written by start triggers and
/// live polls, read by the API.
pub struct LatencyStats {
    fetch_ms: Mutex<Histogram<u64>>,
}

/// Point-in-time view served by the API. Percentiles are absent until the
/// first fetch completes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LatencySummary {
    pub samples: u64,
    pub p50_ms: Option<u64>,
    pub p95_ms: Option<u64>,
    pub p99_ms: Option<u64>,
}

impl LatencyStats {
    pub fn new() -> Self {
        let histogram = Histogram::new_with_bounds(1, MAX_TRACKED_MS, 3)
            .expect("valid histogram bounds");
        Self {
            fetch_ms: Mutex::new(histogram),
        }
    }

    /// Fetches faster than a millisecond count as one.
    pub fn record(&self, elapsed: Duration) {
        let ms = elapsed.as_millis().clamp(1, u128::from(MAX_TRACKED_MS)) as u64;
        if let Ok(mut h) = self.fetch_ms.lock() {
            let _ = h.record(ms);
        }
    }

    pub fn summary(&self) -> LatencySummary {
        let Ok(h) = self.fetch_ms.lock() else {
            return LatencySummary::empty();
        };
        if h.len() == 0 {
            return LatencySummary::empty();
        }
        LatencySummary {
            samples: h.len(),
            p50_ms: Some(h.value_at_quantile(0.50)),
            p95_ms: Some(h.value_at_quantile(0.95)),
            p99_ms: Some(h.value_at_quantile(0.99)),
        }
    }
}

impl Default for LatencyStats {
    fn default() -> Self {
        Self::new()
    }
}

impl LatencySummary {
    fn empty() -> Self {
        Self {
            samples: 0,
            p50_ms: None,
            p95_ms: None,
            p99_ms: None,
        }
    }
}
