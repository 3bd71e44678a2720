use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use redis::{aio::ConnectionManager, Client};

/// Registry of revoked access-token identifiers.
///
/// Only the token's `jti` and its natural expiry are stored; an entry past
/// its expiry is harmless since the token would fail the expiry check
/// anyway, so pruning can stay lazy.
#[async_trait]
pub trait TokenBlacklist: Send + Sync {
    /// Record `jti` as revoked until `expires_at_ms` (Unix millis).
    /// Revoking the same id twice is indistinguishable from once.
    async fn revoke(&self, jti: &str, expires_at_ms: i64) -> Result<(), anyhow::Error>;

    /// True if `jti` was revoked and its entry has not yet lapsed.
    async fn is_revoked(&self, jti: &str) -> Result<bool, anyhow::Error>;
}

/// Process-wide in-memory registry. Entries self-expire; a sweep of lapsed
/// entries piggybacks on every write so the map stays bounded by the number
/// of revocations inside one access-token lifetime.
///
/// In a multi-process deployment revocations do not replicate; swap in
/// [`RedisBlacklist`] for a shared registry without touching callers.
#[derive(Default)]
pub struct MemoryBlacklist {
    entries: DashMap<String, i64>,
}

impl MemoryBlacklist {
    pub fn new() -> Self {
        Self::default()
    }

    fn sweep(&self, now_ms: i64) {
        self.entries.retain(|_, expires_at_ms| *expires_at_ms > now_ms);
    }
}

#[async_trait]
impl TokenBlacklist for MemoryBlacklist {
    async fn revoke(&self, jti: &str, expires_at_ms: i64) -> Result<(), anyhow::Error> {
        let now_ms = Utc::now().timestamp_millis();
        self.sweep(now_ms);
        self.entries.insert(jti.to_string(), expires_at_ms);
        Ok(())
    }

    async fn is_revoked(&self, jti: &str) -> Result<bool, anyhow::Error> {
        let now_ms = Utc::now().timestamp_millis();
        Ok(self
            .entries
            .get(jti)
            .map(|entry| *entry.value() > now_ms)
            .unwrap_or(false))
    }
}

/// Redis-backed registry for clustered deployments. Keys carry their own
/// TTL, so there is no sweep to run.
#[derive(Clone)]
pub struct RedisBlacklist {
    manager: ConnectionManager,
}

impl RedisBlacklist {
    pub async fn connect(url: &str) -> Result<Self, anyhow::Error> {
        tracing::info!(url = %url, "Connecting to Redis for token revocation");
        let client = Client::open(url)?;

        let manager = client.get_connection_manager().await.map_err(|e| {
            anyhow::anyhow!("Failed to connect to Redis: {}", e)
        })?;

        Ok(Self { manager })
    }
}

#[async_trait]
impl TokenBlacklist for RedisBlacklist {
    async fn revoke(&self, jti: &str, expires_at_ms: i64) -> Result<(), anyhow::Error> {
        let remaining_seconds = (expires_at_ms - Utc::now().timestamp_millis()) / 1000;
        if remaining_seconds <= 0 {
            return Ok(());
        }

        let mut conn = self.manager.clone();
        let key = format!("blacklist:{}", jti);

        redis::cmd("SET")
            .arg(&key)
            .arg("revoked")
            .arg("EX")
            .arg(remaining_seconds)
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to blacklist token: {}", e))
    }

    async fn is_revoked(&self, jti: &str) -> Result<bool, anyhow::Error> {
        let mut conn = self.manager.clone();
        let key = format!("blacklist:{}", jti);

        let exists: bool = redis::cmd("EXISTS")
            .arg(&key)
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to check blacklist: {}", e))?;

        Ok(exists)
    }
}
