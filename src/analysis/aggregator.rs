//! Cross-source vote aggregation.
//!
//! The [`Aggregator`] fans one request out to every configured source
//! at once, bounds each query by that source's timeout, classifies the
//! outcomes and merges the healthy tallies. It keeps no state between
//! requests beyond the list of sources it was built with.

use super::summarize;
use crate::config::Config;
use crate::error::{ConfigError, SourceError};
use crate::models::{AggregateSummary, SourceResult, SourceStatus, VoteOption};
use crate::sources::{build_sources, VoteSource};
use futures::future::join_all;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// A source together with its query budget.
#[derive(Clone)]
pub struct SourceHandle {
    pub source: Arc<dyn VoteSource>,
    pub timeout: Duration,
}

impl SourceHandle {
    pub fn new(source: Arc<dyn VoteSource>, timeout: Duration) -> Self {
        Self { source, timeout }
    }
}

pub struct Aggregator {
    sources: Vec<SourceHandle>,
}

impl Aggregator {
    /// Create an aggregator over `sources`. At least one is required.
    pub fn new(sources: Vec<SourceHandle>) -> Result<Self, ConfigError> {
        if sources.is_empty() {
            return Err(ConfigError::NoSources);
        }
        Ok(Self { sources })
    }

    /// Build every configured source and wrap them in an aggregator.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        config.validate()?;

        let built = build_sources(config)?;
        let handles = built
            .into_iter()
            .zip(&config.sources)
            .map(|(source, cfg)| SourceHandle::new(source, config.timeout_for(cfg)))
            .collect();

        Self::new(handles)
    }

    pub fn sources(&self) -> impl Iterator<Item = &Arc<dyn VoteSource>> {
        self.sources.iter().map(|h| &h.source)
    }

    pub fn source(&self, id: &str) -> Option<&Arc<dyn VoteSource>> {
        self.sources().find(|s| s.id() == id)
    }

    /// The one source allowed to record votes, if any.
    pub fn writable_source(&self) -> Option<&Arc<dyn VoteSource>> {
        self.sources().find(|s| s.is_writable())
    }

    /// Query every source concurrently and combine the answers.
    ///
    /// Never fails as a whole: sources that error or time out are
    /// reported as unhealthy and left out of the totals.
    pub async fn aggregate(&self) -> AggregateSummary {
        let started = Instant::now();
        let statuses = join_all(self.sources.iter().map(query_source)).await;
        let summary = summarize(statuses);

        info!(
            "Aggregated {} votes from {}/{} healthy sources in {}ms",
            summary.total_votes,
            summary.healthy_sources(),
            summary.per_source_status.len(),
            started.elapsed().as_millis()
        );
        if summary.is_degraded() {
            warn!("Excluded sources: {}", summary.excluded_sources().join(", "));
        }

        summary
    }

    /// Record a vote through the writable source.
    ///
    /// Returns the id of the source that stored it. The write is awaited
    /// to completion so an error always means the vote was not stored;
    /// the source bounds its own wait.
    pub async fn record_vote(&self, option: VoteOption) -> Result<String, SourceError> {
        let source = self
            .writable_source()
            .ok_or_else(|| SourceError::ReadOnly("no writable source configured".to_string()))?;

        source.record_vote(option).await?;

        info!("Vote for {} recorded in '{}'", option, source.id());
        Ok(source.id().to_string())
    }
}

async fn query_source(handle: &SourceHandle) -> (String, SourceStatus) {
    let id = handle.source.id().to_string();
    let started = Instant::now();

    let result = match tokio::time::timeout(handle.timeout, handle.source.fetch_snapshot()).await {
        Ok(Ok(snapshot)) => SourceResult::healthy(snapshot),
        Ok(Err(e)) => SourceResult::unhealthy(e),
        Err(_) => SourceResult::unhealthy(SourceError::timeout(handle.timeout)),
    };
    let latency_ms = started.elapsed().as_millis() as u64;

    match result.error() {
        None => debug!("Source '{}' answered in {}ms", id, latency_ms),
        Some(e) => warn!("Source '{}' unhealthy after {}ms: {}", id, latency_ms, e),
    }

    let status = SourceStatus::new(handle.source.kind(), latency_ms, result);
    (id, status)
}
