//! SQLite-backed vote store.
//!
//! Each vote is one row in `votes`, tagged with the deployment that
//! recorded it. Tallies are computed with a `GROUP BY` over that table.
//! All database work happens on blocking threads with a pooled
//! connection that is returned to the pool when the closure finishes.
//! Reads are abandoned after the source timeout. Writes always run to
//! completion so the caller learns whether the row was committed; their
//! wait is bounded by the pool checkout and SQLite's busy timeout.

use super::VoteSource;
use crate::config::SourceKind;
use crate::error::SourceError;
use crate::models::{RecentVote, VoteOption, VoteSnapshot, VoteTally, RECENT_VOTES_LIMIT};
use futures::future::BoxFuture;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

pub type DbPool = Pool<SqliteConnectionManager>;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS votes (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        vote_choice TEXT NOT NULL CHECK(vote_choice IN ('cat','dog')),
        vote_source TEXT NOT NULL,
        created_at TEXT NOT NULL DEFAULT (datetime('now'))
    );

    CREATE INDEX IF NOT EXISTS idx_votes_choice ON votes(vote_choice);
    CREATE INDEX IF NOT EXISTS idx_votes_source ON votes(vote_source);
";

pub struct SqliteSource {
    id: String,
    instance: String,
    pool: DbPool,
    timeout: Duration,
    writable: bool,
}

impl SqliteSource {
    /// Open (creating if needed) the database at `path` and bootstrap the schema.
    ///
    /// `instance` is written into `vote_source` for every recorded vote.
    pub fn open(
        id: &str,
        path: &Path,
        instance: &str,
        timeout: Duration,
        writable: bool,
    ) -> Result<Self, SourceError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| SourceError::Unreachable {
                    detail: format!("cannot create {}: {}", parent.display(), e),
                    timed_out: false,
                })?;
            }
        }

        let manager =
            SqliteConnectionManager::file(path).with_init(move |conn| conn.busy_timeout(timeout));
        let pool = Pool::builder()
            .max_size(4)
            .connection_timeout(timeout)
            .build(manager)
            .map_err(|e| SourceError::Unreachable {
                detail: format!("cannot open {}: {}", path.display(), e),
                timed_out: false,
            })?;

        let conn = pool.get().map_err(unreachable)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")
            .and_then(|_| conn.execute_batch(SCHEMA))
            .map_err(|e| SourceError::QueryFailed(format!("schema bootstrap failed: {}", e)))?;

        debug!("Opened vote database {} for '{}'", path.display(), id);

        Ok(Self {
            id: id.to_string(),
            instance: instance.to_string(),
            pool,
            timeout,
            writable,
        })
    }

    /// Run `work` on a blocking thread, bounded by the source timeout.
    async fn run_blocking<T, F>(&self, work: F) -> Result<T, SourceError>
    where
        T: Send + 'static,
        F: FnOnce(&DbPool) -> Result<T, SourceError> + Send + 'static,
    {
        let pool = self.pool.clone();
        let task = tokio::task::spawn_blocking(move || work(&pool));

        match tokio::time::timeout(self.timeout, task).await {
            Ok(joined) => joined.map_err(task_failed)?,
            Err(_) => {
                warn!("Database query for '{}' timed out", self.id);
                Err(SourceError::timeout(self.timeout))
            }
        }
    }

    /// Run `work` on a blocking thread and wait for it to finish.
    async fn run_to_completion<T, F>(&self, work: F) -> Result<T, SourceError>
    where
        T: Send + 'static,
        F: FnOnce(&DbPool) -> Result<T, SourceError> + Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || work(&pool))
            .await
            .map_err(task_failed)?
    }
}

fn task_failed(e: tokio::task::JoinError) -> SourceError {
    SourceError::QueryFailed(format!("database task failed: {}", e))
}

fn unreachable(e: r2d2::Error) -> SourceError {
    SourceError::Unreachable {
        detail: format!("no database connection: {}", e),
        timed_out: false,
    }
}

fn query_failed(e: rusqlite::Error) -> SourceError {
    SourceError::QueryFailed(e.to_string())
}

fn query_tally(pool: &DbPool) -> Result<VoteTally, SourceError> {
    let conn = pool.get().map_err(unreachable)?;
    tally_on(&conn)
}

fn query_snapshot(pool: &DbPool) -> Result<VoteSnapshot, SourceError> {
    let conn = pool.get().map_err(unreachable)?;
    Ok(VoteSnapshot {
        tally: tally_on(&conn)?,
        recent_votes: recent_votes_on(&conn)?,
        by_deployment: by_deployment_on(&conn)?,
    })
}

fn tally_on(conn: &Connection) -> Result<VoteTally, SourceError> {
    let mut stmt = conn
        .prepare("SELECT vote_choice, COUNT(*) FROM votes GROUP BY vote_choice")
        .map_err(query_failed)?;

    let rows = stmt
        .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))
        .map_err(query_failed)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(query_failed)?;

    let mut counts = Vec::with_capacity(rows.len());
    for (choice, count) in rows {
        match VoteOption::parse(&choice) {
            Some(option) => counts.push((option, count.max(0) as u64)),
            None => debug!("Ignoring unknown vote choice '{}' in database", choice),
        }
    }

    VoteTally::try_from_counts(counts)
        .ok_or_else(|| SourceError::QueryFailed("vote counts overflow".to_string()))
}

fn recent_votes_on(conn: &Connection) -> Result<Vec<RecentVote>, SourceError> {
    let mut stmt = conn
        .prepare(
            "SELECT vote_choice, vote_source, created_at FROM votes
             ORDER BY created_at DESC, id DESC LIMIT ?1",
        )
        .map_err(query_failed)?;

    let rows = stmt
        .query_map([RECENT_VOTES_LIMIT as i64], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
            ))
        })
        .map_err(query_failed)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(query_failed)?;

    Ok(rows
        .into_iter()
        .filter_map(|(choice, source, timestamp)| {
            VoteOption::parse(&choice).map(|option| RecentVote {
                option,
                source,
                timestamp,
            })
        })
        .collect())
}

fn by_deployment_on(conn: &Connection) -> Result<BTreeMap<String, u64>, SourceError> {
    let mut stmt = conn
        .prepare("SELECT vote_source, COUNT(*) FROM votes GROUP BY vote_source")
        .map_err(query_failed)?;

    let rows = stmt
        .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))
        .map_err(query_failed)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(query_failed)?;

    Ok(rows
        .into_iter()
        .map(|(source, count)| (source, count.max(0) as u64))
        .collect())
}

impl VoteSource for SqliteSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Sqlite
    }

    fn fetch_tally(&self) -> BoxFuture<'_, Result<VoteTally, SourceError>> {
        Box::pin(self.run_blocking(query_tally))
    }

    fn fetch_snapshot(&self) -> BoxFuture<'_, Result<VoteSnapshot, SourceError>> {
        Box::pin(self.run_blocking(query_snapshot))
    }

    fn is_writable(&self) -> bool {
        self.writable
    }

    fn record_vote(&self, option: VoteOption) -> BoxFuture<'_, Result<(), SourceError>> {
        Box::pin(async move {
            if !self.writable {
                return Err(SourceError::ReadOnly(self.id.clone()));
            }

            let instance = self.instance.clone();
            self.run_to_completion(move |pool| {
                let conn = pool.get().map_err(unreachable)?;
                conn.execute(
                    "INSERT INTO votes (vote_choice, vote_source) VALUES (?1, ?2)",
                    (option.as_str(), instance.as_str()),
                )
                .map_err(query_failed)?;
                Ok(())
            })
            .await?;

            debug!("Recorded vote for {} in '{}'", option, self.id);
            Ok(())
        })
    }
}
