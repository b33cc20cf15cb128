//! Wire documents served to consumers and peers.

use crate::models::{
    AggregateSummary, RecentVote, SourceStatus, VoteOption, VoteSnapshot, VoteTally,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Body of `GET /analytics`.
#[derive(Debug, Clone, Serialize)]
pub struct AnalyticsResponse {
    pub summary: SummarySection,
    pub by_source: BTreeMap<String, SourceStatus>,
    /// `<id>_healthy` flags plus `total_sources` / `active_sources`.
    pub hybrid_status: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SummarySection {
    pub total_votes: u64,
    pub totals: VoteTally,
    /// `<option>_percentage` for every option.
    #[serde(flatten)]
    pub percentages: BTreeMap<String, f64>,
    pub excluded_sources: Vec<String>,
    pub generated_at: DateTime<Utc>,
}

impl From<&AggregateSummary> for AnalyticsResponse {
    fn from(summary: &AggregateSummary) -> Self {
        let percentages = VoteOption::ALL
            .iter()
            .map(|o| (format!("{}_percentage", o.as_str()), summary.percentage(*o)))
            .collect();

        let mut hybrid_status: BTreeMap<String, Value> = summary
            .per_source_status
            .iter()
            .map(|(id, status)| (format!("{}_healthy", id), Value::Bool(status.healthy)))
            .collect();
        hybrid_status.insert(
            "total_sources".to_string(),
            Value::from(summary.per_source_status.len()),
        );
        hybrid_status.insert(
            "active_sources".to_string(),
            Value::from(summary.healthy_sources()),
        );

        Self {
            summary: SummarySection {
                total_votes: summary.total_votes,
                totals: summary.totals_by_option.clone(),
                percentages,
                excluded_sources: summary
                    .excluded_sources()
                    .into_iter()
                    .map(String::from)
                    .collect(),
                generated_at: summary.generated_at,
            },
            by_source: summary.per_source_status.clone(),
            hybrid_status,
        }
    }
}

/// Body of `GET /api/results`, the shape peers parse.
#[derive(Debug, Clone, Serialize)]
pub struct ResultsResponse {
    pub votes: BTreeMap<VoteOption, OptionResult>,
    pub environment: String,
    pub total_votes: u64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub recent_votes: Vec<RecentVote>,
    /// Vote count per deployment that recorded into this store.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub by_source: BTreeMap<String, u64>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OptionResult {
    pub total: u64,
    pub percentage: f64,
}

impl ResultsResponse {
    pub fn new(environment: &str, snapshot: &VoteSnapshot) -> Self {
        let total_votes = snapshot.tally.total();
        let votes = snapshot
            .tally
            .iter()
            .map(|(option, count)| {
                (
                    option,
                    OptionResult {
                        total: count,
                        percentage: crate::analysis::percentage(count, total_votes),
                    },
                )
            })
            .collect();

        Self {
            votes,
            environment: environment.to_string(),
            total_votes,
            recent_votes: snapshot.recent_votes.clone(),
            by_source: snapshot.by_deployment.clone(),
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::summarize;
    use crate::config::SourceKind;
    use crate::error::SourceError;
    use crate::models::SourceResult;
    use crate::sources::remote::parse_results;

    fn sample_summary() -> AggregateSummary {
        let tally = VoteTally::from_counts([(VoteOption::Cat, 10), (VoteOption::Dog, 5)]);
        summarize(vec![
            (
                "onprem".to_string(),
                SourceStatus::new(SourceKind::Sqlite, 2, SourceResult::healthy(tally)),
            ),
            (
                "azure".to_string(),
                SourceStatus::new(
                    SourceKind::Remote,
                    5001,
                    SourceResult::unhealthy(SourceError::timeout(
                        std::time::Duration::from_secs(5),
                    )),
                ),
            ),
        ])
    }

    #[test]
    fn test_analytics_document_shape() {
        let response = AnalyticsResponse::from(&sample_summary());
        let json = serde_json::to_value(&response).unwrap();

        assert_eq!(json["summary"]["total_votes"], 15);
        assert_eq!(json["summary"]["totals"]["cat"], 10);
        assert_eq!(json["summary"]["totals"]["dog"], 5);
        assert_eq!(json["summary"]["cat_percentage"], 66.7);
        assert_eq!(json["summary"]["dog_percentage"], 33.3);
        assert_eq!(json["summary"]["excluded_sources"][0], "azure");

        assert_eq!(json["by_source"]["onprem"]["status"], "healthy");
        assert_eq!(json["by_source"]["azure"]["status"], "error");
        assert_eq!(json["by_source"]["azure"]["error"]["kind"], "timeout");

        assert_eq!(json["hybrid_status"]["onprem_healthy"], true);
        assert_eq!(json["hybrid_status"]["azure_healthy"], false);
        assert_eq!(json["hybrid_status"]["total_sources"], 2);
        assert_eq!(json["hybrid_status"]["active_sources"], 1);
    }

    #[test]
    fn test_results_document_is_readable_by_peers() {
        let snapshot = VoteSnapshot {
            tally: VoteTally::from_counts([(VoteOption::Cat, 4), (VoteOption::Dog, 1)]),
            recent_votes: vec![RecentVote {
                option: VoteOption::Dog,
                source: "onprem".to_string(),
                timestamp: Some("2025-06-01 12:00:00".to_string()),
            }],
            by_deployment: BTreeMap::from([("onprem".to_string(), 5)]),
        };
        let body = serde_json::to_string(&ResultsResponse::new("onprem", &snapshot)).unwrap();

        assert_eq!(parse_results(&body).unwrap(), snapshot);

        let json: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["environment"], "onprem");
        assert_eq!(json["votes"]["cat"]["percentage"], 80.0);
        assert_eq!(json["by_source"]["onprem"], 5);

        let bare = ResultsResponse::new("edge", &VoteSnapshot::default());
        let json = serde_json::to_value(&bare).unwrap();
        assert!(json.get("recent_votes").is_none());
        assert!(json.get("by_source").is_none());
    }
}
