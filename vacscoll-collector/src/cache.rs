//! Persistent record of vacancy ids already delivered.
//!
//! One SQLite file holds `seen_ids(id, first_seen)`. Entries older than
//! `max_age` are evicted lazily whenever the set is loaded. A connection is
//! opened for each operation and closed before it returns, so nothing is held
//! open across a collection run and several processes may share one file.
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection};
use sqlx::{Connection, Row};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::errors::StorageError;
use crate::record::VacancyRecord;

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

#[derive(Debug, Clone)]
pub struct DedupeCache {
    path: PathBuf,
    max_age: Duration,
}

/// Seconds since the Unix epoch with sub-second precision.
pub fn unix_now() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

impl DedupeCache {
    /// Create the parent directory and the table if missing. Safe to call
    /// repeatedly on the same path.
    pub async fn open(path: impl AsRef<Path>, max_age_days: u32) -> Result<Self, StorageError> {
        let cache = Self {
            path: path.as_ref().to_path_buf(),
            max_age: Duration::from_secs(u64::from(max_age_days) * SECONDS_PER_DAY),
        };
        if let Some(parent) = cache.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| StorageError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let mut conn = cache.connect().await?;
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS seen_ids (
              id         TEXT PRIMARY KEY NOT NULL,
              first_seen REAL NOT NULL
            )
            "#,
        )
        .execute(&mut conn)
        .await
        .map_err(|e| cache.sqlite_err(e))?;
        cache.close(conn).await?;

        info!(path=%cache.path.display(), max_age_days, "cache.open");
        Ok(cache)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    /// Evict expired entries, then return every id still valid now.
    pub async fn load(&self) -> Result<HashSet<String>, StorageError> {
        self.load_at(unix_now()).await
    }

    /// [`load`](Self::load) against an explicit clock value. An entry exactly
    /// `max_age` old is still valid.
    pub async fn load_at(&self, now: f64) -> Result<HashSet<String>, StorageError> {
        let cutoff = now - self.max_age.as_secs_f64();
        let mut conn = self.connect().await?;

        let evicted = sqlx::query("DELETE FROM seen_ids WHERE first_seen < ?")
            .bind(cutoff)
            .execute(&mut conn)
            .await
            .map_err(|e| self.sqlite_err(e))?
            .rows_affected();

        let rows = sqlx::query("SELECT id FROM seen_ids")
            .fetch_all(&mut conn)
            .await
            .map_err(|e| self.sqlite_err(e))?;
        self.close(conn).await?;

        let ids: HashSet<String> = rows
            .iter()
            .map(|row| row.try_get::<String, _>("id"))
            .collect::<Result<_, _>>()
            .map_err(|e| self.sqlite_err(e))?;

        debug!(evicted, valid = ids.len(), "cache.load");
        Ok(ids)
    }

    /// Record ids as seen now. Ids already present keep their original
    /// `first_seen`.
    pub async fn save<I, S>(&self, ids: I) -> Result<(), StorageError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.save_at(ids, unix_now()).await
    }

    pub async fn save_at<I, S>(&self, ids: I, now: f64) -> Result<(), StorageError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut conn = self.connect().await?;
        let mut tx = conn.begin().await.map_err(|e| self.sqlite_err(e))?;

        let mut inserted = 0u64;
        for id in ids {
            inserted += sqlx::query("INSERT OR IGNORE INTO seen_ids (id, first_seen) VALUES (?, ?)")
                .bind(id.as_ref())
                .bind(now)
                .execute(&mut *tx)
                .await
                .map_err(|e| self.sqlite_err(e))?
                .rows_affected();
        }

        tx.commit().await.map_err(|e| self.sqlite_err(e))?;
        self.close(conn).await?;

        debug!(inserted, "cache.save");
        Ok(())
    }

    /// Keep only records not delivered before, in input order. Every candidate
    /// id is recorded as seen afterwards; repeats inside `candidates` count as
    /// seen after their first occurrence.
    pub async fn sift(
        &self,
        candidates: Vec<VacancyRecord>,
    ) -> Result<Vec<VacancyRecord>, StorageError> {
        let mut seen = self.load().await?;
        let candidate_ids: Vec<String> = candidates.iter().map(|r| r.id().to_string()).collect();
        let total = candidates.len();

        let fresh: Vec<VacancyRecord> = candidates
            .into_iter()
            .filter(|r| seen.insert(r.id().to_string()))
            .collect();

        self.save(&candidate_ids).await?;

        info!(candidates = total, fresh = fresh.len(), "cache.sift");
        Ok(fresh)
    }

    /// Number of stored entries, expired or not.
    pub async fn len(&self) -> Result<usize, StorageError> {
        let mut conn = self.connect().await?;
        let count: i64 = sqlx::query("SELECT COUNT(*) AS n FROM seen_ids")
            .fetch_one(&mut conn)
            .await
            .and_then(|row| row.try_get("n"))
            .map_err(|e| self.sqlite_err(e))?;
        self.close(conn).await?;
        Ok(count.max(0) as usize)
    }

    pub async fn is_empty(&self) -> Result<bool, StorageError> {
        Ok(self.len().await? == 0)
    }

    async fn connect(&self) -> Result<SqliteConnection, StorageError> {
        let opts = SqliteConnectOptions::new()
            .filename(&self.path)
            .create_if_missing(true);
        SqliteConnection::connect_with(&opts)
            .await
            .map_err(|e| self.sqlite_err(e))
    }

    async fn close(&self, conn: SqliteConnection) -> Result<(), StorageError> {
        conn.close().await.map_err(|e| self.sqlite_err(e))
    }

    fn sqlite_err(&self, source: sqlx::Error) -> StorageError {
        StorageError::Sqlite {
            path: self.path.clone(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    const DAY: f64 = SECONDS_PER_DAY as f64;

    fn record(id: &str) -> VacancyRecord {
        VacancyRecord::from_item(&json!({ "id": id, "name": format!("job {id}") })).unwrap()
    }

    async fn fresh_cache(max_age_days: u32) -> (TempDir, DedupeCache) {
        let tmp = TempDir::new().unwrap();
        let cache = DedupeCache::open(tmp.path().join("nested/dir/seen.db"), max_age_days)
            .await
            .unwrap();
        (tmp, cache)
    }

    #[tokio::test]
    async fn open_is_idempotent() {
        let (_tmp, cache) = fresh_cache(7).await;
        cache.save(["a"]).await.unwrap();

        let again = DedupeCache::open(cache.path(), 7).await.unwrap();
        assert_eq!(again.len().await.unwrap(), 1);
        assert!(again.load().await.unwrap().contains("a"));
    }

    #[tokio::test]
    async fn sift_twice_returns_nothing_new() {
        let (_tmp, cache) = fresh_cache(7).await;
        let batch = || vec![record("1"), record("2"), record("3")];

        let first = cache.sift(batch()).await.unwrap();
        assert_eq!(
            first.iter().map(|r| r.id()).collect::<Vec<_>>(),
            vec!["1", "2", "3"]
        );

        let second = cache.sift(batch()).await.unwrap();
        assert!(second.is_empty());
    }

    #[tokio::test]
    async fn sift_keeps_first_occurrence_in_batch() {
        let (_tmp, cache) = fresh_cache(7).await;
        cache.save(["2"]).await.unwrap();

        let out = cache
            .sift(vec![record("3"), record("1"), record("2"), record("3")])
            .await
            .unwrap();
        assert_eq!(out.iter().map(|r| r.id()).collect::<Vec<_>>(), vec!["3", "1"]);
        assert_eq!(cache.len().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn entries_expire_after_max_age() {
        let (_tmp, cache) = fresh_cache(7).await;
        let t0 = 1_700_000_000.0;
        cache.save_at(["old"], t0).await.unwrap();

        let within = cache.load_at(t0 + 6.0 * DAY).await.unwrap();
        assert!(within.contains("old"));

        let exactly = cache.load_at(t0 + 7.0 * DAY).await.unwrap();
        assert!(exactly.contains("old"));

        let past = cache.load_at(t0 + 8.0 * DAY).await.unwrap();
        assert!(!past.contains("old"));
        assert_eq!(cache.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn resaving_keeps_original_first_seen() {
        let (_tmp, cache) = fresh_cache(1).await;
        let t0 = 1_700_000_000.0;
        cache.save_at(["x"], t0).await.unwrap();
        cache.save_at(["x"], t0 + 0.9 * DAY).await.unwrap();

        // Had the second save refreshed the timestamp, "x" would survive.
        let later = cache.load_at(t0 + 1.5 * DAY).await.unwrap();
        assert!(!later.contains("x"));
    }

    #[tokio::test]
    async fn expired_ids_are_new_again() {
        let (_tmp, cache) = fresh_cache(1).await;
        cache.save_at(["9"], unix_now() - 2.0 * DAY).await.unwrap();

        let out = cache.sift(vec![record("9")]).await.unwrap();
        assert_eq!(out.len(), 1);
    }

    #[tokio::test]
    async fn unwritable_location_is_a_storage_error() {
        let tmp = TempDir::new().unwrap();
        let blocker = tmp.path().join("file");
        std::fs::write(&blocker, b"not a dir").unwrap();

        let err = DedupeCache::open(blocker.join("seen.db"), 7)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Io { .. }));
    }
}
