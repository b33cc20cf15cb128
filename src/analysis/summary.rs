//! Summary statistics over per-source results.

use crate::error::SourceError;
use crate::models::{AggregateSummary, SourceResult, SourceStatus, VoteOption, VoteTally};
use chrono::Utc;
use std::collections::BTreeMap;
use tracing::warn;

/// Share of `count` in `total` as a percentage with one decimal place.
///
/// The divisor is `max(total, 1)`, so an empty tally yields 0.0 rather
/// than NaN.
pub fn percentage(count: u64, total: u64) -> f64 {
    let raw = count as f64 / total.max(1) as f64 * 100.0;
    (raw * 10.0).round() / 10.0
}

/// Combine per-source statuses into one summary.
///
/// Only healthy sources contribute to the totals. Unhealthy ones stay
/// visible in `per_source_status` so consumers can tell a degraded
/// total from a complete one. A source whose counts cannot be added to
/// the running totals without overflowing is reclassified as a protocol
/// error and excluded as well.
pub fn summarize<I>(statuses: I) -> AggregateSummary
where
    I: IntoIterator<Item = (String, SourceStatus)>,
{
    let mut per_source_status: BTreeMap<String, SourceStatus> = statuses.into_iter().collect();

    let mut totals_by_option = VoteTally::zeroed();
    for (id, status) in per_source_status.iter_mut() {
        let Some(tally) = status.detail.tally() else {
            continue;
        };
        match totals_by_option.checked_merge(tally) {
            Some(merged) => totals_by_option = merged,
            None => {
                warn!("Excluding source '{}': its counts overflow the totals", id);
                *status = SourceStatus::new(
                    status.kind,
                    status.latency_ms,
                    SourceResult::unhealthy(SourceError::protocol(
                        None,
                        "",
                        "count overflow while combining tallies",
                    )),
                );
            }
        }
    }

    let total_votes = totals_by_option.total();
    let percentage_by_option = VoteOption::ALL
        .iter()
        .map(|o| (*o, percentage(totals_by_option.get(*o), total_votes)))
        .collect();

    AggregateSummary {
        totals_by_option,
        total_votes,
        percentage_by_option,
        per_source_status,
        generated_at: Utc::now(),
    }
}
