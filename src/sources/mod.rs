//! Vote sources.
//!
//! A [`VoteSource`] is anything that can report the current tally for
//! the fixed option set: process-local counters, a local SQLite
//! database, or a peer deployment reached over HTTP. Which
//! implementation backs a source id is decided by configuration.

pub mod memory;
pub mod remote;
pub mod sqlite;

pub use memory::MemorySource;
pub use remote::RemoteSource;
pub use sqlite::SqliteSource;

use crate::config::{Config, SourceConfig, SourceKind};
use crate::error::{ConfigError, SourceError};
use crate::models::{VoteOption, VoteSnapshot, VoteTally};
use futures::future::BoxFuture;
use std::sync::Arc;
use tracing::{debug, info};

/// Read access to one source's tally, plus optional write authority.
pub trait VoteSource: Send + Sync {
    /// Id under which the source is reported.
    fn id(&self) -> &str;

    fn kind(&self) -> SourceKind;

    /// Fetch the complete current tally. Never mutates the source.
    fn fetch_tally(&self) -> BoxFuture<'_, Result<VoteTally, SourceError>>;

    /// Fetch the tally together with whatever vote history the source
    /// keeps. Sources without history report just the tally.
    fn fetch_snapshot(&self) -> BoxFuture<'_, Result<VoteSnapshot, SourceError>> {
        Box::pin(async move { self.fetch_tally().await.map(VoteSnapshot::from) })
    }

    /// Whether [`VoteSource::record_vote`] is allowed.
    fn is_writable(&self) -> bool {
        false
    }

    /// Record one vote. Sources without write authority refuse.
    ///
    /// Implementations bound their own wait and only return an error when
    /// the vote was not stored. Callers do not cancel a write in flight.
    fn record_vote(&self, _option: VoteOption) -> BoxFuture<'_, Result<(), SourceError>> {
        let id = self.id().to_string();
        Box::pin(async move { Err(SourceError::ReadOnly(id)) })
    }
}

/// Build the source described by one config entry.
pub fn build_source(
    source: &SourceConfig,
    config: &Config,
) -> Result<Arc<dyn VoteSource>, ConfigError> {
    let timeout = config.timeout_for(source);
    let invalid = |reason: String| ConfigError::InvalidSource {
        id: source.id.clone(),
        reason,
    };

    debug!(
        "Building {} source '{}' (timeout {}s)",
        source.kind,
        source.id,
        timeout.as_secs()
    );

    let built: Arc<dyn VoteSource> = match source.kind {
        SourceKind::Memory => Arc::new(MemorySource::new(&source.id, source.writable)),
        SourceKind::Sqlite => {
            let path = source
                .path
                .as_deref()
                .ok_or_else(|| invalid("sqlite sources need a `path`".to_string()))?;
            let db = SqliteSource::open(
                &source.id,
                path,
                &config.general.instance,
                timeout,
                source.writable,
            )
            .map_err(|e| invalid(e.to_string()))?;
            Arc::new(db)
        }
        SourceKind::Remote => {
            let url = source
                .url
                .as_deref()
                .ok_or_else(|| invalid("remote sources need a `url`".to_string()))?;
            let token = match source.token_env {
                Some(ref var) => Some(std::env::var(var).map_err(|_| {
                    invalid(format!("environment variable {} is not set", var))
                })?),
                None => None,
            };
            let remote = RemoteSource::new(&source.id, url, timeout, token)
                .map_err(|e| invalid(format!("failed to create HTTP client: {}", e)))?;
            Arc::new(remote)
        }
    };

    Ok(built)
}

/// Build every configured source, in config order.
pub fn build_sources(config: &Config) -> Result<Vec<Arc<dyn VoteSource>>, ConfigError> {
    if config.sources.is_empty() {
        return Err(ConfigError::NoSources);
    }

    let sources = config
        .sources
        .iter()
        .map(|s| build_source(s, config))
        .collect::<Result<Vec<_>, _>>()?;

    info!("Configured {} vote sources", sources.len());
    Ok(sources)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_default_methods() {
        struct Fixed;

        impl VoteSource for Fixed {
            fn id(&self) -> &str {
                "fixed"
            }

            fn kind(&self) -> SourceKind {
                SourceKind::Memory
            }

            fn fetch_tally(&self) -> BoxFuture<'_, Result<VoteTally, SourceError>> {
                Box::pin(async { Ok(VoteTally::zeroed()) })
            }
        }

        let source = Fixed;
        assert_eq!(
            source.fetch_snapshot().await.unwrap(),
            VoteSnapshot::from(VoteTally::zeroed())
        );
        assert!(!source.is_writable());
        assert_eq!(
            source.record_vote(VoteOption::Cat).await,
            Err(SourceError::ReadOnly("fixed".to_string()))
        );
    }

    #[test]
    fn test_build_sources_from_config() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.sources = vec![
            SourceConfig {
                id: "onprem".to_string(),
                kind: SourceKind::Sqlite,
                path: Some(dir.path().join("votes.db")),
                url: None,
                timeout_seconds: None,
                writable: true,
                token_env: None,
            },
            SourceConfig {
                id: "azure".to_string(),
                kind: SourceKind::Remote,
                path: None,
                url: Some("http://127.0.0.1:9".to_string()),
                timeout_seconds: Some(1),
                writable: false,
                token_env: None,
            },
        ];

        let sources = build_sources(&config).unwrap();
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0].id(), "onprem");
        assert_eq!(sources[0].kind(), SourceKind::Sqlite);
        assert!(sources[0].is_writable());
        assert_eq!(sources[1].kind(), SourceKind::Remote);
        assert!(!sources[1].is_writable());
    }

    #[test]
    fn test_missing_token_env_is_config_error() {
        let mut config = Config::default();
        config.sources = vec![SourceConfig {
            id: "peer".to_string(),
            kind: SourceKind::Remote,
            path: None,
            url: Some("http://127.0.0.1:9".to_string()),
            timeout_seconds: None,
            writable: false,
            token_env: Some("CROSSVOTE_TEST_TOKEN_THAT_IS_NEVER_SET".to_string()),
        }];

        assert!(matches!(
            build_sources(&config),
            Err(ConfigError::InvalidSource { .. })
        ));
    }
}
