//! Console and JSON rendering of aggregate summaries.

use super::analytics::AnalyticsResponse;
use crate::models::{AggregateSummary, SourceResult, VoteOption};
use anyhow::Result;
use std::io::Write;
use std::path::Path;

/// Generate a plain-text summary for the terminal.
pub fn generate_text_report(summary: &AggregateSummary) -> String {
    let mut output = String::new();

    output.push_str("Cross-Environment Vote Summary\n");
    output.push_str("==============================\n\n");

    output.push_str(&generate_totals_section(summary));
    output.push_str(&generate_sources_section(summary));
    output.push_str(&generate_health_line(summary));

    output
}

/// Generate the per-option totals.
fn generate_totals_section(summary: &AggregateSummary) -> String {
    let mut section = String::new();

    for option in VoteOption::ALL {
        section.push_str(&format!(
            "  {} {:<5} {:>8}  {:>5.1}%\n",
            option.emoji(),
            option.to_string(),
            summary.totals_by_option.get(option),
            summary.percentage(option)
        ));
    }
    section.push_str(&format!("     {:<5} {:>8}\n\n", "Total", summary.total_votes));

    section
}

/// Generate one line per source.
fn generate_sources_section(summary: &AggregateSummary) -> String {
    let mut section = String::new();

    section.push_str("Sources:\n");
    for (id, status) in &summary.per_source_status {
        let detail = match &status.detail {
            SourceResult::Healthy { tally, .. } => {
                let counts: Vec<String> = tally
                    .iter()
                    .map(|(option, count)| format!("{}={}", option.as_str(), count))
                    .collect();
                counts.join(" ")
            }
            SourceResult::Unhealthy { error, .. } => format!("EXCLUDED ({})", error),
        };
        section.push_str(&format!(
            "  {} {:<12} [{}] {:>5}ms  {}\n",
            if status.healthy { "✅" } else { "❌" },
            id,
            status.kind,
            status.latency_ms,
            detail
        ));
    }
    section.push('\n');

    section
}

fn generate_health_line(summary: &AggregateSummary) -> String {
    let healthy = summary.healthy_sources();
    let total = summary.per_source_status.len();

    if summary.all_unhealthy() {
        format!("⛔ All {} sources unreachable; totals are not meaningful.\n", total)
    } else if summary.is_degraded() {
        format!(
            "⚠️  Degraded: {}/{} sources healthy, totals exclude {}.\n",
            healthy,
            total,
            summary.excluded_sources().join(", ")
        )
    } else {
        format!("All {} sources healthy.\n", total)
    }
}

/// Generate the `/analytics` JSON document.
pub fn generate_json_report(summary: &AggregateSummary) -> Result<String> {
    serde_json::to_string_pretty(&AnalyticsResponse::from(summary)).map_err(Into::into)
}

/// Write rendered output to a file.
pub fn write_report(content: &str, path: &Path) -> Result<()> {
    let mut file = std::fs::File::create(path)?;
    file.write_all(content.as_bytes())?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::summarize;
    use crate::config::SourceKind;
    use crate::error::SourceError;
    use crate::models::{SourceStatus, VoteTally};

    fn status(result: SourceResult) -> SourceStatus {
        SourceStatus::new(SourceKind::Memory, 3, result)
    }

    #[test]
    fn test_generate_text_report() {
        let tally = VoteTally::from_counts([(VoteOption::Cat, 10), (VoteOption::Dog, 5)]);
        let summary = summarize(vec![
            ("azure".to_string(), status(SourceResult::healthy(tally))),
            (
                "onprem".to_string(),
                status(SourceResult::unhealthy(SourceError::QueryFailed(
                    "no such table: votes".to_string(),
                ))),
            ),
        ]);

        let text = generate_text_report(&summary);
        assert!(text.contains("66.7%"));
        assert!(text.contains("33.3%"));
        assert!(text.contains("EXCLUDED (query failed: no such table: votes)"));
        assert!(text.contains("Degraded: 1/2 sources healthy, totals exclude onprem."));
    }

    #[test]
    fn test_text_report_all_down() {
        let summary = summarize(vec![(
            "azure".to_string(),
            status(SourceResult::unhealthy(SourceError::timeout(
                std::time::Duration::from_secs(5),
            ))),
        )]);

        let text = generate_text_report(&summary);
        assert!(text.contains("All 1 sources unreachable"));
    }

    #[test]
    fn test_generate_json_report() {
        let summary = summarize(vec![(
            "local".to_string(),
            status(SourceResult::healthy(VoteTally::zeroed())),
        )]);

        let json = generate_json_report(&summary).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["summary"]["total_votes"], 0);
        assert_eq!(parsed["summary"]["cat_percentage"], 0.0);
        assert_eq!(parsed["hybrid_status"]["local_healthy"], true);
    }

    #[test]
    fn test_write_report() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("summary.txt");
        write_report("hello", &path).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "hello");
    }
}
