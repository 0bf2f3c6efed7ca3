use crate::types::Result;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub total: i64,
    pub expired: i64,
}

/// Durable key/value store with per-entry expiry, backed by SQLite.
pub struct ResultCache {
    pool: SqlitePool,
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl ResultCache {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_sweep(path, DEFAULT_SWEEP_INTERVAL).await
    }

    pub async fn open_with_sweep(path: impl AsRef<Path>, sweep_every: Duration) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let options = SqliteConnectOptions::new().filename(path).create_if_missing(true);
        let pool = SqlitePoolOptions::new().max_connections(4).connect_with(options).await?;
        info!(path = %path.display(), "Opened result cache");
        Self::from_pool(pool, sweep_every).await
    }

    /// Private in-memory database. A single connection that never recycles, so
    /// the data lives as long as the cache.
    pub async fn in_memory() -> Result<Self> {
        Self::in_memory_with_sweep(DEFAULT_SWEEP_INTERVAL).await
    }

    pub async fn in_memory_with_sweep(sweep_every: Duration) -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        Self::from_pool(pool, sweep_every).await
    }

    async fn from_pool(pool: SqlitePool, sweep_every: Duration) -> Result<Self> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS cache (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                expires_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_cache_expires_at ON cache (expires_at)")
            .execute(&pool)
            .await?;

        let sweeper = spawn_sweeper(pool.clone(), sweep_every);
        Ok(Self {
            pool,
            locks: Mutex::new(HashMap::new()),
            sweeper: Mutex::new(Some(sweeper)),
        })
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get_raw(key).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Stored JSON for `key`, if present and unexpired. Expired rows are removed on the way.
    pub async fn get_raw(&self, key: &str) -> Result<Option<String>> {
        let now = Utc::now().timestamp_millis();
        let row = sqlx::query("SELECT value, expires_at FROM cache WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let expires_at: i64 = row.try_get("expires_at")?;
        if expires_at <= now {
            // Conditional so a concurrent fresh write survives
            sqlx::query("DELETE FROM cache WHERE key = ? AND expires_at <= ?")
                .bind(key)
                .bind(now)
                .execute(&self.pool)
                .await?;
            debug!(key, "Evicted expired cache entry");
            return Ok(None);
        }
        Ok(Some(row.try_get("value")?))
    }

    pub async fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T, ttl: Duration) -> Result<()> {
        let value = serde_json::to_string(value)?;
        let created_at = Utc::now().timestamp_millis();
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX).max(1);
        let expires_at = created_at.saturating_add(ttl_ms);

        sqlx::query(
            r#"
            INSERT INTO cache (key, value, created_at, expires_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                created_at = excluded.created_at,
                expires_at = excluded.expires_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(created_at)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn delete(&self, key: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM cache WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn clear(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM cache").execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    /// Removes every expired row now.
    pub async fn sweep(&self) -> Result<u64> {
        sweep_expired(&self.pool).await
    }

    pub async fn stats(&self) -> Result<CacheStats> {
        let now = Utc::now().timestamp_millis();
        let row = sqlx::query(
            "SELECT COUNT(*) AS total, COALESCE(SUM(CASE WHEN expires_at <= ? THEN 1 ELSE 0 END), 0) AS expired FROM cache",
        )
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        Ok(CacheStats {
            total: row.try_get("total")?,
            expired: row.try_get("expired")?,
        })
    }

    /// Exclusive hold on one key. Callers keep the guard across miss-then-fill.
    pub async fn lock_key(&self, key: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks.entry(key.to_string()).or_default().clone()
        };
        lock.lock_owned().await
    }

    pub async fn close(&self) {
        let sweeper = self.sweeper.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(handle) = sweeper {
            handle.abort();
        }
        self.pool.close().await;
        info!("Closed result cache");
    }
}

async fn sweep_expired(pool: &SqlitePool) -> Result<u64> {
    let now = Utc::now().timestamp_millis();
    let result = sqlx::query("DELETE FROM cache WHERE expires_at <= ?")
        .bind(now)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

fn spawn_sweeper(pool: SqlitePool, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + every, every);
        loop {
            ticker.tick().await;
            if pool.is_closed() {
                break;
            }
            match sweep_expired(&pool).await {
                Ok(0) => {}
                Ok(removed) => debug!(removed, "Swept expired cache entries"),
                Err(e) => warn!(error = %e, "Cache sweep failed"),
            }
        }
    })
}
