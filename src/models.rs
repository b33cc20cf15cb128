//! Data models for vote aggregation.
//!
//! This module contains the core data structures shared by the vote
//! sources, the aggregator and the report renderers.

use crate::config::SourceKind;
use crate::error::SourceError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// One of the fixed, closed set of things a voter can pick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteOption {
    Cat,
    Dog,
}

impl VoteOption {
    /// Every known option, in display order.
    pub const ALL: [VoteOption; 2] = [VoteOption::Cat, VoteOption::Dog];

    /// Wire/storage name of the option.
    pub fn as_str(&self) -> &'static str {
        match self {
            VoteOption::Cat => "cat",
            VoteOption::Dog => "dog",
        }
    }

    /// Stable index into per-option arrays.
    pub fn index(&self) -> usize {
        match self {
            VoteOption::Cat => 0,
            VoteOption::Dog => 1,
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            VoteOption::Cat => "🐱",
            VoteOption::Dog => "🐶",
        }
    }

    /// Lenient parse used for peer payloads and stored rows.
    ///
    /// Accepts singular or plural forms in any case (`cat`, `Cats`, `DOG`).
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "cat" | "cats" => Some(VoteOption::Cat),
            "dog" | "dogs" => Some(VoteOption::Dog),
            _ => None,
        }
    }
}

impl fmt::Display for VoteOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VoteOption::Cat => write!(f, "Cat"),
            VoteOption::Dog => write!(f, "Dog"),
        }
    }
}

/// Per-option vote counts.
///
/// Always holds an entry for every [`VoteOption`]; options a source did
/// not report are stored as zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<VoteOption, u64>", into = "BTreeMap<VoteOption, u64>")]
pub struct VoteTally {
    counts: BTreeMap<VoteOption, u64>,
}

impl Default for VoteTally {
    fn default() -> Self {
        Self::zeroed()
    }
}

impl VoteTally {
    /// A tally with every option at zero.
    pub fn zeroed() -> Self {
        Self {
            counts: VoteOption::ALL.iter().map(|o| (*o, 0)).collect(),
        }
    }

    /// Build a tally from possibly sparse counts. Repeated options are summed.
    ///
    /// Sums saturate at `u64::MAX`; use [`VoteTally::try_from_counts`]
    /// for counts that come from outside the process.
    pub fn from_counts<I>(counts: I) -> Self
    where
        I: IntoIterator<Item = (VoteOption, u64)>,
    {
        let mut tally = Self::zeroed();
        for (option, count) in counts {
            let slot = tally.counts.entry(option).or_insert(0);
            *slot = slot.saturating_add(count);
        }
        tally
    }

    /// Like [`VoteTally::from_counts`], but `None` if any option or the
    /// grand total would not fit in a `u64`.
    pub fn try_from_counts<I>(counts: I) -> Option<Self>
    where
        I: IntoIterator<Item = (VoteOption, u64)>,
    {
        let mut tally = Self::zeroed();
        for (option, count) in counts {
            let slot = tally.counts.entry(option).or_insert(0);
            *slot = slot.checked_add(count)?;
        }
        tally.checked_total()?;
        Some(tally)
    }

    pub fn get(&self, option: VoteOption) -> u64 {
        self.counts.get(&option).copied().unwrap_or(0)
    }

    /// Sum over all options, saturating at `u64::MAX`.
    pub fn total(&self) -> u64 {
        self.counts.values().fold(0u64, |acc, c| acc.saturating_add(*c))
    }

    /// Sum over all options, `None` on overflow.
    pub fn checked_total(&self) -> Option<u64> {
        self.counts.values().try_fold(0u64, |acc, c| acc.checked_add(*c))
    }

    /// Option-by-option sum of two tallies, `None` if any count or the
    /// grand total overflows.
    pub fn checked_merge(&self, other: &VoteTally) -> Option<VoteTally> {
        let mut merged = self.clone();
        for (option, count) in &other.counts {
            let slot = merged.counts.entry(*option).or_insert(0);
            *slot = slot.checked_add(*count)?;
        }
        merged.checked_total()?;
        Some(merged)
    }

    pub fn iter(&self) -> impl Iterator<Item = (VoteOption, u64)> + '_ {
        self.counts.iter().map(|(o, c)| (*o, *c))
    }
}

impl From<BTreeMap<VoteOption, u64>> for VoteTally {
    fn from(counts: BTreeMap<VoteOption, u64>) -> Self {
        Self::from_counts(counts)
    }
}

impl From<VoteTally> for BTreeMap<VoteOption, u64> {
    fn from(tally: VoteTally) -> Self {
        tally.counts
    }
}

/// One recently recorded vote, as stored by a deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecentVote {
    pub option: VoteOption,
    /// Deployment that recorded the vote.
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

/// Everything a source reported in one successful fetch.
///
/// Only the tally takes part in aggregation. The recent votes and the
/// per-deployment counts are informational and empty when the source
/// keeps no such history.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VoteSnapshot {
    pub tally: VoteTally,
    /// Newest first, at most [`RECENT_VOTES_LIMIT`] entries.
    pub recent_votes: Vec<RecentVote>,
    /// Vote count per deployment that recorded into this source.
    pub by_deployment: BTreeMap<String, u64>,
}

/// How many recent votes a snapshot carries.
pub const RECENT_VOTES_LIMIT: usize = 10;

impl From<VoteTally> for VoteSnapshot {
    fn from(tally: VoteTally) -> Self {
        Self {
            tally,
            ..Self::default()
        }
    }
}

/// Outcome of querying one source during one aggregation.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status")]
pub enum SourceResult {
    #[serde(rename = "healthy")]
    Healthy {
        tally: VoteTally,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        recent_votes: Vec<RecentVote>,
        #[serde(skip_serializing_if = "BTreeMap::is_empty")]
        by_deployment: BTreeMap<String, u64>,
        observed_at: DateTime<Utc>,
    },
    #[serde(rename = "error")]
    Unhealthy {
        error: SourceError,
        observed_at: DateTime<Utc>,
    },
}

impl SourceResult {
    pub fn healthy(snapshot: impl Into<VoteSnapshot>) -> Self {
        let snapshot = snapshot.into();
        SourceResult::Healthy {
            tally: snapshot.tally,
            recent_votes: snapshot.recent_votes,
            by_deployment: snapshot.by_deployment,
            observed_at: Utc::now(),
        }
    }

    pub fn unhealthy(error: SourceError) -> Self {
        SourceResult::Unhealthy {
            error,
            observed_at: Utc::now(),
        }
    }

    pub fn is_healthy(&self) -> bool {
        matches!(self, SourceResult::Healthy { .. })
    }

    /// The tally, if the source answered.
    pub fn tally(&self) -> Option<&VoteTally> {
        match self {
            SourceResult::Healthy { tally, .. } => Some(tally),
            SourceResult::Unhealthy { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&SourceError> {
        match self {
            SourceResult::Healthy { .. } => None,
            SourceResult::Unhealthy { error, .. } => Some(error),
        }
    }
}

/// Status of one source as reported in a summary.
#[derive(Debug, Clone, Serialize)]
pub struct SourceStatus {
    pub healthy: bool,
    pub kind: SourceKind,
    pub latency_ms: u64,
    #[serde(flatten)]
    pub detail: SourceResult,
}

impl SourceStatus {
    pub fn new(kind: SourceKind, latency_ms: u64, detail: SourceResult) -> Self {
        Self {
            healthy: detail.is_healthy(),
            kind,
            latency_ms,
            detail,
        }
    }
}

/// Combined view over every configured source for one request.
#[derive(Debug, Clone, Serialize)]
pub struct AggregateSummary {
    /// Sum of the tallies of healthy sources only.
    pub totals_by_option: VoteTally,
    pub total_votes: u64,
    /// `count / max(total, 1) * 100`, one decimal place.
    pub percentage_by_option: BTreeMap<VoteOption, f64>,
    pub per_source_status: BTreeMap<String, SourceStatus>,
    pub generated_at: DateTime<Utc>,
}

impl AggregateSummary {
    pub fn percentage(&self, option: VoteOption) -> f64 {
        self.percentage_by_option.get(&option).copied().unwrap_or(0.0)
    }

    pub fn healthy_sources(&self) -> usize {
        self.per_source_status.values().filter(|s| s.healthy).count()
    }

    /// Ids of sources whose counts were left out of the totals.
    pub fn excluded_sources(&self) -> Vec<&str> {
        self.per_source_status
            .iter()
            .filter(|(_, s)| !s.healthy)
            .map(|(id, _)| id.as_str())
            .collect()
    }

    /// True when at least one source was excluded.
    pub fn is_degraded(&self) -> bool {
        self.healthy_sources() < self.per_source_status.len()
    }

    /// True when no source answered. Distinguishes "all down" from "no votes yet".
    pub fn all_unhealthy(&self) -> bool {
        self.healthy_sources() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vote_option_parse() {
        assert_eq!(VoteOption::parse("cat"), Some(VoteOption::Cat));
        assert_eq!(VoteOption::parse("Cats"), Some(VoteOption::Cat));
        assert_eq!(VoteOption::parse(" DOG "), Some(VoteOption::Dog));
        assert_eq!(VoteOption::parse("dogs"), Some(VoteOption::Dog));
        assert_eq!(VoteOption::parse("hamster"), None);
        assert_eq!(VoteOption::parse(""), None);
    }

    #[test]
    fn test_sparse_tally_is_completed() {
        let tally = VoteTally::from_counts([(VoteOption::Cat, 3)]);
        assert_eq!(tally.get(VoteOption::Cat), 3);
        assert_eq!(tally.get(VoteOption::Dog), 0);
        assert_eq!(tally.iter().count(), VoteOption::ALL.len());
    }

    #[test]
    fn test_tally_merge_and_total() {
        let a = VoteTally::from_counts([(VoteOption::Cat, 10), (VoteOption::Dog, 5)]);
        let b = VoteTally::from_counts([(VoteOption::Dog, 2)]);
        let merged = a.checked_merge(&b).unwrap();
        assert_eq!(merged.get(VoteOption::Cat), 10);
        assert_eq!(merged.get(VoteOption::Dog), 7);
        assert_eq!(merged.total(), 17);
        assert_eq!(merged.checked_total(), Some(17));
    }

    #[test]
    fn test_tally_arithmetic_never_overflows() {
        let huge = VoteTally::from_counts([(VoteOption::Cat, u64::MAX), (VoteOption::Dog, 1)]);
        assert_eq!(huge.total(), u64::MAX);
        assert_eq!(huge.checked_total(), None);

        assert!(VoteTally::try_from_counts([(VoteOption::Cat, u64::MAX), (VoteOption::Dog, 1)])
            .is_none());
        assert!(VoteTally::try_from_counts([(VoteOption::Cat, u64::MAX), (VoteOption::Cat, 1)])
            .is_none());
        assert!(VoteTally::try_from_counts([(VoteOption::Cat, u64::MAX)]).is_some());

        let max_cat = VoteTally::from_counts([(VoteOption::Cat, u64::MAX)]);
        let one_dog = VoteTally::from_counts([(VoteOption::Dog, 1)]);
        assert!(max_cat.checked_merge(&one_dog).is_none());
        assert!(max_cat.checked_merge(&VoteTally::zeroed()).is_some());
    }

    #[test]
    fn test_tally_json_shape() {
        let tally = VoteTally::from_counts([(VoteOption::Dog, 4)]);
        let json = serde_json::to_value(&tally).unwrap();
        assert_eq!(json, serde_json::json!({"cat": 0, "dog": 4}));

        let parsed: VoteTally = serde_json::from_str(r#"{"cat": 3}"#).unwrap();
        assert_eq!(parsed.get(VoteOption::Cat), 3);
        assert_eq!(parsed.get(VoteOption::Dog), 0);
    }

    #[test]
    fn test_source_result_serializes_status_tag() {
        let ok = SourceResult::healthy(VoteTally::zeroed());
        let json = serde_json::to_value(&ok).unwrap();
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["tally"]["cat"], 0);
        assert!(json.get("recent_votes").is_none());
        assert!(json.get("by_deployment").is_none());

        let detailed = SourceResult::healthy(VoteSnapshot {
            tally: VoteTally::from_counts([(VoteOption::Cat, 1)]),
            recent_votes: vec![RecentVote {
                option: VoteOption::Cat,
                source: "azure".to_string(),
                timestamp: Some("2024-05-01 12:00:00".to_string()),
            }],
            by_deployment: BTreeMap::from([("azure".to_string(), 1)]),
        });
        let json = serde_json::to_value(&detailed).unwrap();
        assert_eq!(json["recent_votes"][0]["option"], "cat");
        assert_eq!(json["recent_votes"][0]["source"], "azure");
        assert_eq!(json["by_deployment"]["azure"], 1);

        let bad = SourceResult::unhealthy(SourceError::Unreachable {
            detail: "connection refused".to_string(),
            timed_out: false,
        });
        let json = serde_json::to_value(&bad).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["error"]["kind"], "unreachable");
        assert!(!bad.is_healthy());
        assert!(bad.tally().is_none());
    }
}
