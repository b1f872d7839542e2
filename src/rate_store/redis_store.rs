//! Redis-backed counter store.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, IntoConnectionInfo};
use tracing::{debug, info, instrument};

use super::{RateStore, StoreError, StoreResult};

/// Counter store backed by Redis (or any server speaking the Redis protocol).
///
/// Cloning is cheap: the `ConnectionManager` multiplexes one connection and
/// reconnects on its own after the initial connection succeeds.
#[derive(Clone)]
pub struct RedisRateStore {
    conn: ConnectionManager,
}

impl RedisRateStore {
    /// Connect to the store.
    ///
    /// # Arguments
    ///
    /// * `url` - `redis://` or `rediss://` URL
    /// * `token` - Optional access token, sent as the connection password.
    ///   Overrides any password embedded in the URL.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Connection` if the URL is invalid or the server
    /// cannot be reached.
    #[instrument(skip_all)]
    pub async fn connect(url: &str, token: Option<&str>) -> StoreResult<Self> {
        let mut info = url
            .into_connection_info()
            .map_err(|e| StoreError::Connection(format!("invalid store URL: {e}")))?;

        if let Some(token) = token {
            debug!("Applying access token as store password");
            info.redis.password = Some(token.to_string());
        }

        let client = Client::open(info).map_err(|e| StoreError::Connection(e.to_string()))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        info!("Connected to rate store");
        Ok(Self { conn })
    }
}

#[async_trait]
impl RateStore for RedisRateStore {
    async fn incr(&self, key: &str) -> StoreResult<i64> {
        let mut conn = self.conn.clone();
        let count: i64 = conn
            .incr(key, 1i64)
            .await
            .map_err(|e| StoreError::command("INCR", e))?;
        Ok(count)
    }

    async fn expire(&self, key: &str, seconds: u64) -> StoreResult<bool> {
        let mut conn = self.conn.clone();
        let seconds = i64::try_from(seconds).unwrap_or(i64::MAX);
        let applied: bool = conn
            .expire(key, seconds)
            .await
            .map_err(|e| StoreError::command("EXPIRE", e))?;
        Ok(applied)
    }

    async fn ping(&self) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let _pong: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| StoreError::command("PING", e))?;
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "redis"
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    // Live-server behaviour is covered by tests/integration_tests.rs.

    #[tokio::test]
    async fn test_connect_rejects_invalid_url() {
        let result = RedisRateStore::connect("not a url", None).await;
        assert!(matches!(result, Err(StoreError::Connection(_))));
    }

    #[tokio::test]
    async fn test_connect_rejects_unsupported_scheme() {
        let result = RedisRateStore::connect("http://localhost:6379", Some("token")).await;
        assert!(matches!(result, Err(StoreError::Connection(_))));
    }
}
