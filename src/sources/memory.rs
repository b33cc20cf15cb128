//! Process-local vote counters.

use super::VoteSource;
use crate::config::SourceKind;
use crate::error::SourceError;
use crate::models::{VoteOption, VoteTally};
use futures::future::BoxFuture;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// Counters held in memory, one atomic per option.
///
/// Counts start at zero and are lost when the process exits.
pub struct MemorySource {
    id: String,
    writable: bool,
    counts: [AtomicU64; VoteOption::ALL.len()],
}

impl MemorySource {
    pub fn new(id: &str, writable: bool) -> Self {
        Self {
            id: id.to_string(),
            writable,
            counts: Default::default(),
        }
    }

    /// Seed the counters with a fixed tally.
    #[cfg(test)]
    pub fn with_tally(id: &str, writable: bool, tally: &VoteTally) -> Self {
        let source = Self::new(id, writable);
        for (option, count) in tally.iter() {
            source.counts[option.index()].store(count, Ordering::Relaxed);
        }
        source
    }

    fn snapshot(&self) -> VoteTally {
        VoteTally::from_counts(
            VoteOption::ALL
                .iter()
                .map(|o| (*o, self.counts[o.index()].load(Ordering::Relaxed))),
        )
    }
}

impl VoteSource for MemorySource {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Memory
    }

    fn fetch_tally(&self) -> BoxFuture<'_, Result<VoteTally, SourceError>> {
        let tally = self.snapshot();
        Box::pin(async move { Ok(tally) })
    }

    fn is_writable(&self) -> bool {
        self.writable
    }

    fn record_vote(&self, option: VoteOption) -> BoxFuture<'_, Result<(), SourceError>> {
        Box::pin(async move {
            if !self.writable {
                return Err(SourceError::ReadOnly(self.id.clone()));
            }
            let now = self.counts[option.index()].fetch_add(1, Ordering::Relaxed) + 1;
            debug!("Recorded vote for {} in '{}' (now {})", option, self.id, now);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_starts_at_zero() {
        let source = MemorySource::new("local", true);
        let tally = source.fetch_tally().await.unwrap();
        assert_eq!(tally, VoteTally::zeroed());
    }

    #[tokio::test]
    async fn test_record_vote_increments() {
        let source = MemorySource::new("local", true);
        source.record_vote(VoteOption::Cat).await.unwrap();
        source.record_vote(VoteOption::Cat).await.unwrap();
        source.record_vote(VoteOption::Dog).await.unwrap();

        let tally = source.fetch_tally().await.unwrap();
        assert_eq!(tally.get(VoteOption::Cat), 2);
        assert_eq!(tally.get(VoteOption::Dog), 1);
    }

    #[tokio::test]
    async fn test_read_only_refuses_votes() {
        let seeded = VoteTally::from_counts([(VoteOption::Dog, 7)]);
        let source = MemorySource::with_tally("mirror", false, &seeded);

        let result = source.record_vote(VoteOption::Dog).await;
        tokio_test::assert_err!(result);
        assert_eq!(source.fetch_tally().await.unwrap(), seeded);
    }

    #[tokio::test]
    async fn test_concurrent_votes_are_not_lost() {
        let source = Arc::new(MemorySource::new("local", true));
        let mut handles = Vec::new();
        for i in 0..50 {
            let source = Arc::clone(&source);
            handles.push(tokio::spawn(async move {
                let option = if i % 2 == 0 { VoteOption::Cat } else { VoteOption::Dog };
                source.record_vote(option).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let tally = source.fetch_tally().await.unwrap();
        assert_eq!(tally.get(VoteOption::Cat), 25);
        assert_eq!(tally.get(VoteOption::Dog), 25);
    }
}
