//! The process-wide internal token `I` (spec §4.2, §5, §9). Ownership is
//! exclusive to this process; peers learn of each other's `I` only via the
//! shared cache, never directly.

use std::sync::Mutex;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rand::RngCore;

use super::INTERNAL_TOKEN_PREFIX;
use crate::cache::SharedCache;
use crate::error::CoreError;

/// Group string written to the shared cache under the internal token's
/// cache key so peer instances validating `I` accept it without a
/// backing-store round trip (spec §4.2).
const INTERNAL_TOKEN_GROUPS: &str = ".auth,.reseller_admin,R_.auth";

pub struct InternalTokenState {
  current: Mutex<Option<(String, DateTime<Utc>)>>,
}

impl Default for InternalTokenState {
  fn default() -> Self {
    Self::new()
  }
}

impl InternalTokenState {
  pub fn new() -> Self {
    Self {
      current: Mutex::new(None),
    }
  }

  /// Returns the current `I` if present and unexpired, without minting.
  pub fn peek(&self) -> Option<String> {
    let guard = self.current.lock().unwrap();
    guard
      .as_ref()
      .filter(|(_, expires)| *expires > Utc::now())
      .map(|(token, _)| token.clone())
  }

  /// Mints a fresh `I` if absent, expired, or `force` is set, publishing it
  /// to the shared cache under its standard token-cache key so other
  /// instances accept it. A lost race under contention is tolerated by
  /// design (spec §5, §9): whichever mint lands last in the cache wins,
  /// and both tokens remain independently valid for their lifetime.
  pub async fn mint_if_needed<C: SharedCache>(
    &self,
    cache: &C,
    force: bool,
    token_life_seconds: i64,
  ) -> Result<String, CoreError> {
    if !force {
      if let Some(token) = self.peek() {
        return Ok(token);
      }
    }

    let token = format!("{INTERNAL_TOKEN_PREFIX}{}", random_hex(32));
    let expires = Utc::now() + ChronoDuration::seconds(token_life_seconds);

    cache
      .set_string_ex(
        &cache_key(&token),
        &format!("{}|{}", expires.timestamp(), INTERNAL_TOKEN_GROUPS),
        token_life_seconds.max(1) as u64,
      )
      .await?;

    *self.current.lock().unwrap() = Some((token.clone(), expires));
    Ok(token)
  }
}

fn cache_key(token: &str) -> String {
  format!("token/{token}")
}

fn random_hex(bytes: usize) -> String {
  let mut buf = vec![0u8; bytes];
  rand::thread_rng().fill_bytes(&mut buf);
  hex::encode(buf)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::testing::InMemorySharedCache;

  #[tokio::test]
  async fn mints_when_absent() {
    let state = InternalTokenState::new();
    let cache = InMemorySharedCache::default();
    let token = state.mint_if_needed(&cache, false, 3600).await.unwrap();
    assert!(token.starts_with(INTERNAL_TOKEN_PREFIX));
    assert_eq!(state.peek(), Some(token));
  }

  #[tokio::test]
  async fn reuses_unexpired_token_without_force() {
    let state = InternalTokenState::new();
    let cache = InMemorySharedCache::default();
    let first = state.mint_if_needed(&cache, false, 3600).await.unwrap();
    let second = state.mint_if_needed(&cache, false, 3600).await.unwrap();
    assert_eq!(first, second);
  }

  #[tokio::test]
  async fn force_mints_a_new_token() {
    let state = InternalTokenState::new();
    let cache = InMemorySharedCache::default();
    let first = state.mint_if_needed(&cache, false, 3600).await.unwrap();
    let second = state.mint_if_needed(&cache, true, 3600).await.unwrap();
    assert_ne!(first, second);
  }
}
