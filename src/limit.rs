use axum::async_trait;
use axum::http::HeaderMap;
use redis::{aio::ConnectionManager, AsyncCommands};

/// Fixed-window quota check, consumed as a plain allow/deny signal.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Returns false once the caller exhausted the current window.
    async fn allow(&self, key: &str) -> anyhow::Result<bool>;
}

pub struct RedisLimiter {
    conn: ConnectionManager,
    limit: u32,
    window_secs: i64,
}

impl RedisLimiter {
    pub fn new(conn: ConnectionManager, limit: u32, window_secs: i64) -> Self {
        Self {
            conn,
            limit,
            window_secs,
        }
    }
}

#[async_trait]
impl RateLimiter for RedisLimiter {
    async fn allow(&self, key: &str) -> anyhow::Result<bool> {
        let mut conn = self.conn.clone();
        let bucket = format!("rl:{key}");
        let count: i64 = conn.incr(&bucket, 1).await?;
        if count == 1 {
            let _: bool = conn.expire(&bucket, self.window_secs).await?;
        }
        Ok(count <= self.limit as i64)
    }
}

/// Quota key for a request: first address in X-Forwarded-For when present.
pub fn client_key(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "unknown".into())
}
