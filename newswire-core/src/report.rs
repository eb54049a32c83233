//! Per-feed run statistics and the verification predicate gating a run.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::error;

/// Counters for one feed: items parsed from the wire, and entries handed
/// to normalization.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct FeedStats {
    pub size_after_get: usize,
    pub size_after_insert: usize,
}

/// The sidecar report written next to the aggregated feed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunReport {
    pub feed_stats: HashMap<String, FeedStats>,
}

/// Validate a run report. Every kept feed must have downloaded at least one
/// item, inserted at least one entry, and never inserted more than it
/// downloaded. Violations are logged and fail the run.
pub fn check_report(report: &RunReport) -> bool {
    let mut success = true;
    for (feed, stats) in &report.feed_stats {
        if stats.size_after_insert > stats.size_after_get {
            error!(
                "logic error: inserted {} posts but only downloaded {}",
                stats.size_after_insert, stats.size_after_get
            );
            success = false;
        }
        if stats.size_after_get == 0 {
            error!("didn't get any posts from {feed}");
            success = false;
        }
        if stats.size_after_insert == 0 {
            error!("didn't insert any posts from {feed}");
            success = false;
        }
    }
    success
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report_with(stats: FeedStats) -> RunReport {
        let mut report = RunReport::default();
        report
            .feed_stats
            .insert("https://example.test/feed.xml".into(), stats);
        report
    }

    #[test]
    fn accepts_consistent_stats() {
        assert!(check_report(&report_with(FeedStats {
            size_after_get: 10,
            size_after_insert: 10,
        })));
        assert!(check_report(&report_with(FeedStats {
            size_after_get: 10,
            size_after_insert: 3,
        })));
    }

    #[test]
    fn rejects_zero_or_inverted_counts() {
        assert!(!check_report(&report_with(FeedStats {
            size_after_get: 0,
            size_after_insert: 0,
        })));
        assert!(!check_report(&report_with(FeedStats {
            size_after_get: 5,
            size_after_insert: 0,
        })));
        assert!(!check_report(&report_with(FeedStats {
            size_after_get: 3,
            size_after_insert: 5,
        })));
    }

    #[test]
    fn empty_report_passes() {
        assert!(check_report(&RunReport::default()));
    }
}
