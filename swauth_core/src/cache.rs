//! C3 TokenCache: read-through cache of `token -> (expiry, groupString)`
//! backed by an external shared cache (spec §4.3).

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::CoreError;

/// Minimal external TTL key/value store interface. The shared cache itself
/// is out of scope (spec §1); this trait is the seam a Redis-backed
/// implementation plugs into.
#[async_trait]
pub trait SharedCache: Send + Sync {
  async fn get_string(&self, key: &str) -> Result<Option<String>, CoreError>;
  async fn set_string_ex(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<(), CoreError>;
  async fn del(&self, key: &str) -> Result<(), CoreError>;
}

/// Redis-backed `SharedCache`, following the multiplexed-connection +
/// key-prefixing pattern used for this codebase's other external caches.
pub struct RedisSharedCache {
  conn: Arc<RwLock<MultiplexedConnection>>,
  prefix: String,
}

impl RedisSharedCache {
  pub async fn new(url: &str, prefix: impl Into<String>) -> Result<Self, CoreError> {
    let client = redis::Client::open(url)
      .map_err(|e| CoreError::Configuration(format!("invalid shared cache url: {e}")))?;
    let conn = client.get_multiplexed_async_connection().await?;
    Ok(Self {
      conn: Arc::new(RwLock::new(conn)),
      prefix: prefix.into(),
    })
  }

  fn make_key(&self, key: &str) -> String {
    format!("{}:{}", self.prefix, key)
  }
}

#[async_trait]
impl SharedCache for RedisSharedCache {
  async fn get_string(&self, key: &str) -> Result<Option<String>, CoreError> {
    let mut conn = self.conn.write().await;
    let value: Option<String> = conn.get(self.make_key(key)).await?;
    Ok(value)
  }

  async fn set_string_ex(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<(), CoreError> {
    let mut conn = self.conn.write().await;
    let ttl = ttl_seconds.max(1);
    conn
      .set_ex::<_, _, ()>(self.make_key(key), value, ttl)
      .await?;
    Ok(())
  }

  async fn del(&self, key: &str) -> Result<(), CoreError> {
    let mut conn = self.conn.write().await;
    conn.del::<_, ()>(self.make_key(key)).await?;
    Ok(())
  }
}

#[async_trait]
impl<C: SharedCache + ?Sized> SharedCache for Arc<C> {
  async fn get_string(&self, key: &str) -> Result<Option<String>, CoreError> {
    (**self).get_string(key).await
  }

  async fn set_string_ex(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<(), CoreError> {
    (**self).set_string_ex(key, value, ttl_seconds).await
  }

  async fn del(&self, key: &str) -> Result<(), CoreError> {
    (**self).del(key).await
  }
}

/// Key under which `TokenCache` stores entries, shared with the internal
/// token's own cache writes (spec §4.2).
fn token_cache_key(token: &str) -> String {
  format!("token/{token}")
}

/// Read-through cache of validated token state. A cached entry never
/// survives a revocation or an observed-expired validation (spec §4.3).
pub struct TokenCache<C: SharedCache> {
  cache: C,
}

impl<C: SharedCache> TokenCache<C> {
  pub fn new(cache: C) -> Self {
    Self { cache }
  }

  /// Returns `(expires, group_string)` for `token`, or `None` on a cache
  /// miss or an entry whose `expires` has already passed (spec §4.3 "On
  /// read: if cache entry exists but expiry < now, treat as miss").
  pub async fn get(&self, token: &str) -> Result<Option<(DateTime<Utc>, String)>, CoreError> {
    let Some(raw) = self.cache.get_string(&token_cache_key(token)).await? else {
      return Ok(None);
    };
    let Some((expiry_str, groups)) = raw.split_once('|') else {
      return Ok(None);
    };
    let Ok(expiry_epoch) = expiry_str.parse::<i64>() else {
      return Ok(None);
    };
    let Some(expires) = Utc.timestamp_opt(expiry_epoch, 0).single() else {
      return Ok(None);
    };
    if expires <= Utc::now() {
      return Ok(None);
    }
    Ok(Some((expires, groups.to_string())))
  }

  /// Writes `groups` for `token` with TTL equal to its remaining lifetime.
  pub async fn put(&self, token: &str, expires: DateTime<Utc>, groups: &str) -> Result<(), CoreError> {
    let remaining = (expires - Utc::now()).num_seconds();
    if remaining <= 0 {
      return Ok(());
    }
    let value = format!("{}|{}", expires.timestamp(), groups);
    self
      .cache
      .set_string_ex(&token_cache_key(token), &value, remaining as u64)
      .await
  }

  pub async fn invalidate(&self, token: &str) -> Result<(), CoreError> {
    self.cache.del(&token_cache_key(token)).await
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::testing::InMemorySharedCache;
  use chrono::Duration as ChronoDuration;

  #[tokio::test]
  async fn put_then_get_round_trips() {
    let cache = TokenCache::new(InMemorySharedCache::default());
    let expires = Utc::now() + ChronoDuration::seconds(60);
    cache.put("R_tkabc", expires, "a:u,a").await.unwrap();
    let (got_expires, groups) = cache.get("R_tkabc").await.unwrap().unwrap();
    assert_eq!(groups, "a:u,a");
    assert_eq!(got_expires.timestamp(), expires.timestamp());
  }

  #[tokio::test]
  async fn expired_entry_reads_as_miss() {
    let cache = TokenCache::new(InMemorySharedCache::default());
    let expired = Utc::now() - ChronoDuration::seconds(5);
    // bypass put()'s remaining<=0 skip by writing the raw cache directly
    cache
      .cache
      .set_string_ex("token/R_tkold", &format!("{}|a:u,a", expired.timestamp()), 60)
      .await
      .unwrap();
    assert!(cache.get("R_tkold").await.unwrap().is_none());
  }

  #[tokio::test]
  async fn invalidate_removes_entry() {
    let cache = TokenCache::new(InMemorySharedCache::default());
    let expires = Utc::now() + ChronoDuration::seconds(60);
    cache.put("R_tkabc", expires, "a:u,a").await.unwrap();
    cache.invalidate("R_tkabc").await.unwrap();
    assert!(cache.get("R_tkabc").await.unwrap().is_none());
  }

  #[tokio::test]
  async fn put_skips_already_expired_expiry() {
    let cache = TokenCache::new(InMemorySharedCache::default());
    let expired = Utc::now() - ChronoDuration::seconds(5);
    cache.put("R_tkold", expired, "a:u,a").await.unwrap();
    assert!(cache.get("R_tkold").await.unwrap().is_none());
  }
}
