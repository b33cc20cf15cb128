//! Peer deployment reached over HTTP.
//!
//! Peers expose a read-only `GET /api/results` endpoint returning
//! `{"votes": {"<option>": {"total": n, ...}}}`. Bare integers in place
//! of the per-option objects are accepted as well. Peers that keep a
//! vote history may add `recent_votes` and a per-deployment `by_source`
//! count map; both are optional.

use super::VoteSource;
use crate::config::SourceKind;
use crate::error::SourceError;
use crate::models::{RecentVote, VoteOption, VoteSnapshot, VoteTally, RECENT_VOTES_LIMIT};
use futures::future::BoxFuture;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

/// Path of the results endpoint, relative to the peer base URL.
pub const RESULTS_PATH: &str = "/api/results";

pub struct RemoteSource {
    id: String,
    base_url: String,
    timeout: Duration,
    token: Option<String>,
    http_client: reqwest::Client,
}

impl RemoteSource {
    pub fn new(
        id: &str,
        base_url: &str,
        timeout: Duration,
        token: Option<String>,
    ) -> Result<Self, reqwest::Error> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()?;

        Ok(Self {
            id: id.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
            token,
            http_client,
        })
    }

    pub fn results_url(&self) -> String {
        format!("{}{}", self.base_url, RESULTS_PATH)
    }

    async fn fetch(&self) -> Result<VoteSnapshot, SourceError> {
        let url = self.results_url();
        debug!("Fetching peer results from {}", url);

        let mut request = self.http_client.get(&url);
        if let Some(ref token) = self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| self.transport_error(e))?;

        if !status.is_success() {
            return Err(SourceError::protocol(
                Some(status.as_u16()),
                &body,
                format!("peer returned {}", status),
            ));
        }

        parse_results(&body)
            .map_err(|detail| SourceError::protocol(Some(status.as_u16()), &body, detail))
    }

    fn transport_error(&self, e: reqwest::Error) -> SourceError {
        if e.is_timeout() {
            SourceError::timeout(self.timeout)
        } else if e.is_connect() {
            SourceError::Unreachable {
                detail: format!("cannot connect to {}: {}", self.base_url, e),
                timed_out: false,
            }
        } else {
            SourceError::Unreachable {
                detail: format!("request to {} failed: {}", self.base_url, e),
                timed_out: false,
            }
        }
    }
}

impl VoteSource for RemoteSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Remote
    }

    fn fetch_tally(&self) -> BoxFuture<'_, Result<VoteTally, SourceError>> {
        Box::pin(async move { self.fetch().await.map(|snapshot| snapshot.tally) })
    }

    fn fetch_snapshot(&self) -> BoxFuture<'_, Result<VoteSnapshot, SourceError>> {
        Box::pin(self.fetch())
    }
}

/// Parse a peer results body into a complete snapshot.
///
/// Options the peer omits count as zero and unknown options are
/// skipped. Two keys naming the same option (`cat` and `Cats`) and
/// counts that overflow are errors, as is anything else that does not
/// fit the expected shape. The optional history fields are read on a
/// best-effort basis and never fail the parse.
pub fn parse_results(body: &str) -> Result<VoteSnapshot, String> {
    let json: Value =
        serde_json::from_str(body).map_err(|e| format!("invalid JSON body: {}", e))?;

    let votes = json
        .get("votes")
        .and_then(Value::as_object)
        .ok_or_else(|| "missing 'votes' object".to_string())?;

    let mut counts: BTreeMap<VoteOption, u64> = BTreeMap::new();
    for (key, value) in votes {
        let Some(option) = VoteOption::parse(key) else {
            debug!("Ignoring unknown option '{}' from peer", key);
            continue;
        };
        if counts.insert(option, parse_count(key, value)?).is_some() {
            return Err(format!("duplicate counts for '{}'", option.as_str()));
        }
    }

    let tally = VoteTally::try_from_counts(counts).ok_or_else(|| "count overflow".to_string())?;

    Ok(VoteSnapshot {
        tally,
        recent_votes: json
            .get("recent_votes")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .map(parse_recent_votes)
            .unwrap_or_default(),
        by_deployment: json
            .get("by_source")
            .and_then(Value::as_object)
            .map(parse_by_deployment)
            .unwrap_or_default(),
    })
}

fn parse_count(key: &str, value: &Value) -> Result<u64, String> {
    let total = match value {
        Value::Object(fields) => match fields.get("total") {
            None | Some(Value::Null) => return Ok(0),
            Some(total) => total,
        },
        Value::Null => return Ok(0),
        other => other,
    };

    total
        .as_u64()
        .ok_or_else(|| format!("invalid count for '{}': {}", key, total))
}

fn parse_recent_votes(votes: &[Value]) -> Vec<RecentVote> {
    votes
        .iter()
        .filter_map(|entry| {
            let option = entry
                .get("option")
                .and_then(Value::as_str)
                .and_then(VoteOption::parse)?;
            let source = entry.get("source").and_then(Value::as_str)?;
            Some(RecentVote {
                option,
                source: source.to_string(),
                timestamp: entry
                    .get("timestamp")
                    .and_then(Value::as_str)
                    .map(String::from),
            })
        })
        .take(RECENT_VOTES_LIMIT)
        .collect()
}

fn parse_by_deployment(counts: &Map<String, Value>) -> BTreeMap<String, u64> {
    counts
        .iter()
        .filter_map(|(deployment, count)| Some((deployment.clone(), count.as_u64()?)))
        .collect()
}
