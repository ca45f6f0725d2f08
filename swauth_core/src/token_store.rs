//! C4 TokenStore: durable token lifecycle on the backing store (spec §4.4).

use bytes::Bytes;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rand::RngCore;
use sha2::{Digest, Sha512};
use tracing::warn;

use crate::backing::BackingClient;
use crate::cache::{SharedCache, TokenCache};
use crate::error::CoreError;
use crate::models::{IssuedToken, ServicesDoc, TokenRecord, TokenValidation, group_string};

pub const TOKEN_PREFIX_SUFFIX: &str = "tk";

/// Caller-supplied overrides for `TokenStore::issue` (spec §4.4 step 2).
#[derive(Debug, Clone, Default)]
pub struct IssueOptions {
  pub force_new: bool,
  pub requested_lifetime: Option<i64>,
}

pub struct TokenStore<B: BackingClient, C: SharedCache> {
  backing: B,
  cache: TokenCache<C>,
  auth_account: String,
  reseller_prefix: String,
  hash_path_prefix: String,
  hash_path_suffix: String,
  token_life: i64,
  max_token_life: i64,
}

impl<B: BackingClient, C: SharedCache> TokenStore<B, C> {
  #[allow(clippy::too_many_arguments)]
  pub fn new(
    backing: B,
    cache: TokenCache<C>,
    reseller_prefix: impl Into<String>,
    hash_path_prefix: impl Into<String>,
    hash_path_suffix: impl Into<String>,
    token_life: i64,
    max_token_life: i64,
  ) -> Self {
    let reseller_prefix = reseller_prefix.into();
    let auth_account = format!("{reseller_prefix}.auth");
    Self {
      backing,
      cache,
      auth_account,
      reseller_prefix,
      hash_path_prefix: hash_path_prefix.into(),
      hash_path_suffix: hash_path_suffix.into(),
      token_life,
      max_token_life,
    }
  }

  /// `SHA-512(prefix ":" token ":" suffix)` rendered as lowercase hex; the
  /// raw token value never appears in the derived name (spec §3).
  pub fn derive_object_name(token: &str, hash_prefix: &str, hash_suffix: &str) -> String {
    let input = format!("{hash_prefix}:{token}:{hash_suffix}");
    hex::encode(Sha512::digest(input.as_bytes()))
  }

  /// The 16-way sharding container for a derived object name: the last hex
  /// nibble selects `.token_<x>` (spec §3, on-disk contract per spec §6).
  pub fn shard_container(object_name: &str) -> String {
    let nibble = object_name.chars().last().unwrap_or('0');
    format!(".token_{nibble}")
  }

  fn token_path(&self, token: &str) -> String {
    let name = Self::derive_object_name(token, &self.hash_path_prefix, &self.hash_path_suffix);
    let shard = Self::shard_container(&name);
    format!("{}/{}/{}", self.auth_account, shard, name)
  }

  fn user_path(&self, account: &str, user: &str) -> String {
    format!("{}/{}/{}", self.auth_account, account, user)
  }

  fn random_token(&self) -> String {
    let mut buf = [0u8; 20];
    rand::thread_rng().fill_bytes(&mut buf);
    format!("{}{}{}", self.reseller_prefix, TOKEN_PREFIX_SUFFIX, hex::encode(buf))
  }

  /// Looks up and validates a token, consulting the cache first.
  pub async fn validate(&self, token: &str) -> Result<TokenValidation, CoreError> {
    if let Some((expires, groups)) = self.cache.get(token).await? {
      let ttl = (expires - Utc::now()).num_seconds().max(0);
      return Ok(TokenValidation {
        groups: groups.split(',').map(str::to_string).collect(),
        ttl_seconds: ttl,
      });
    }

    let path = self.token_path(token);
    let resp = self.backing.get(&path, &[]).await?;
    if resp.is_not_found() {
      return Err(CoreError::Unauthorized("no such token".to_string()));
    }
    if !resp.is_success() {
      return Err(CoreError::Internal(format!(
        "unexpected status {} reading token object",
        resp.status
      )));
    }

    let record: TokenRecord = serde_json::from_slice(&resp.body)?;
    if record.expires <= Utc::now() {
      if let Err(err) = self.backing.delete(&path, &[]).await {
        warn!(%token, %err, "best-effort delete of expired token object failed");
      }
      return Err(CoreError::Unauthorized("token expired".to_string()));
    }

    let mut groups = record.groups.clone();
    if let Some(pos) = groups.iter().position(|g| g == ".admin") {
      groups.remove(pos);
      groups.push(record.account_id.clone());
    }
    let group_str = groups.join(",");
    let ttl = (record.expires - Utc::now()).num_seconds().max(0);
    self.cache.put(token, record.expires, &group_str).await?;

    Ok(TokenValidation {
      groups,
      ttl_seconds: ttl,
    })
  }

  /// Issues or reuses a token for `(account, user)`. Caller must have
  /// already verified the user's credential (spec §4.4).
  pub async fn issue(
    &self,
    account: &str,
    user: &str,
    user_groups: &[String],
    services: ServicesDoc,
    account_id: &str,
    opts: IssueOptions,
  ) -> Result<IssuedToken, CoreError> {
    let user_path = self.user_path(account, user);
    let user_resp = self.backing.get(&user_path, &[]).await?;
    if user_resp.is_not_found() {
      return Err(CoreError::Unauthorized("no such user".to_string()));
    }
    if !user_resp.is_success() {
      return Err(CoreError::Internal(format!(
        "unexpected status {} reading user record",
        user_resp.status
      )));
    }

    let existing_token = user_resp.header("auth-token").map(str::to_string);

    if let Some(existing) = &existing_token {
      let existing_path = self.token_path(existing);
      let existing_obj = self.backing.get(&existing_path, &[]).await?;
      let is_live = if existing_obj.is_success() {
        serde_json::from_slice::<TokenRecord>(&existing_obj.body)
          .map(|r| r.expires > Utc::now())
          .unwrap_or(false)
      } else {
        false
      };

      if opts.force_new || !is_live {
        if let Err(err) = self.backing.delete(&existing_path, &[]).await {
          warn!(token = %existing, %err, "best-effort delete of stale token object failed");
        }
        self.cache.invalidate(existing).await.ok();
      } else {
        let record: TokenRecord = serde_json::from_slice(&existing_obj.body)?;
        let storage_url = services.default_storage_url().unwrap_or_default().to_string();
        return Ok(IssuedToken {
          token: existing.clone(),
          expires: record.expires,
          services,
          storage_url,
        });
      }
    }

    let lifetime = opts
      .requested_lifetime
      .unwrap_or(self.token_life)
      .min(self.max_token_life);
    let expires = Utc::now() + ChronoDuration::seconds(lifetime);
    let token = self.random_token();

    let record = TokenRecord {
      account: account.to_string(),
      user: user.to_string(),
      account_id: account_id.to_string(),
      groups: user_groups.to_vec(),
      expires,
    };
    let body = Bytes::from(serde_json::to_vec(&record)?);
    let put_resp = self.backing.put(&self.token_path(&token), &[], body).await?;
    if !put_resp.is_success() {
      return Err(CoreError::Internal(format!(
        "failed to write token object: status {}",
        put_resp.status
      )));
    }

    let back_ref = [("x-object-meta-auth-token", token.as_str())];
    if let Err(err) = self.backing.post(&user_path, &back_ref, Bytes::new()).await {
      warn!(%err, "failed to write user auth-token back-reference");
    }

    let group_str = group_string(user_groups, account_id);
    self.cache.put(&token, expires, &group_str).await?;

    let storage_url = services.default_storage_url().unwrap_or_default().to_string();
    Ok(IssuedToken {
      token,
      expires,
      services,
      storage_url,
    })
  }

  pub async fn revoke(&self, token: &str) -> Result<(), CoreError> {
    let path = self.token_path(token);
    let resp = self.backing.delete(&path, &[]).await?;
    if !resp.is_success() && !resp.is_not_found() {
      warn!(%token, status = resp.status, "revoke: unexpected status from backing store, ignoring");
    }
    self.cache.invalidate(token).await
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::testing::{InMemoryBackingClient, InMemorySharedCache};

  fn store() -> TokenStore<InMemoryBackingClient, InMemorySharedCache> {
    TokenStore::new(
      InMemoryBackingClient::new(),
      TokenCache::new(InMemorySharedCache::default()),
      "AUTH_",
      "prefix",
      "suffix",
      86400,
      86400,
    )
  }

  #[test]
  fn derive_object_name_is_deterministic_and_hex() {
    let a = TokenStore::<InMemoryBackingClient, InMemorySharedCache>::derive_object_name(
      "R_tkabc", "p", "s",
    );
    let b = TokenStore::<InMemoryBackingClient, InMemorySharedCache>::derive_object_name(
      "R_tkabc", "p", "s",
    );
    assert_eq!(a, b);
    assert_eq!(a.len(), 128);
    assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
  }

  #[test]
  fn shard_container_uses_last_nibble() {
    assert_eq!(TokenStore::<InMemoryBackingClient, InMemorySharedCache>::shard_container("...a"), ".token_a");
    assert_eq!(TokenStore::<InMemoryBackingClient, InMemorySharedCache>::shard_container("...0"), ".token_0");
  }

  #[tokio::test]
  async fn validate_unknown_token_is_unauthorized() {
    let store = store();
    let err = store.validate("R_tknope").await.unwrap_err();
    assert!(matches!(err, CoreError::Unauthorized(_)));
  }

  #[tokio::test]
  async fn issue_fails_when_user_missing() {
    let store = store();
    let err = store
      .issue("act", "usr", &["act:usr".into(), "act".into()], ServicesDoc::default(), "AUTH_cfa", IssueOptions::default())
      .await
      .unwrap_err();
    assert!(matches!(err, CoreError::Unauthorized(_)));
  }

  #[tokio::test]
  async fn issue_then_validate_round_trips() {
    let store = store();
    let user_path = store.user_path("act", "usr");
    store.backing.put(&user_path, &[], Bytes::new()).await.unwrap();

    let issued = store
      .issue(
        "act",
        "usr",
        &["act:usr".into(), "act".into()],
        ServicesDoc::default(),
        "AUTH_cfa",
        IssueOptions::default(),
      )
      .await
      .unwrap();
    assert!(issued.token.starts_with("AUTH_tk"));

    let validation = store.validate(&issued.token).await.unwrap();
    assert!(validation.groups.contains(&"act:usr".to_string()));
  }

  #[tokio::test]
  async fn reissue_without_force_reuses_token() {
    let store = store();
    let user_path = store.user_path("act", "usr");
    store.backing.put(&user_path, &[], Bytes::new()).await.unwrap();

    let first = store
      .issue(
        "act",
        "usr",
        &["act:usr".into(), "act".into()],
        ServicesDoc::default(),
        "AUTH_cfa",
        IssueOptions::default(),
      )
      .await
      .unwrap();
    let second = store
      .issue(
        "act",
        "usr",
        &["act:usr".into(), "act".into()],
        ServicesDoc::default(),
        "AUTH_cfa",
        IssueOptions::default(),
      )
      .await
      .unwrap();
    assert_eq!(first.token, second.token);
  }

  #[tokio::test]
  async fn force_new_issues_a_different_token() {
    let store = store();
    let user_path = store.user_path("act", "usr");
    store.backing.put(&user_path, &[], Bytes::new()).await.unwrap();

    let first = store
      .issue(
        "act",
        "usr",
        &["act:usr".into(), "act".into()],
        ServicesDoc::default(),
        "AUTH_cfa",
        IssueOptions::default(),
      )
      .await
      .unwrap();
    let second = store
      .issue(
        "act",
        "usr",
        &["act:usr".into(), "act".into()],
        ServicesDoc::default(),
        "AUTH_cfa",
        IssueOptions {
          force_new: true,
          requested_lifetime: None,
        },
      )
      .await
      .unwrap();
    assert_ne!(first.token, second.token);

    let err = store.validate(&first.token).await.unwrap_err();
    assert!(matches!(err, CoreError::Unauthorized(_)));
  }

  #[tokio::test]
  async fn revoke_invalidates_cache_and_object() {
    let store = store();
    let user_path = store.user_path("act", "usr");
    store.backing.put(&user_path, &[], Bytes::new()).await.unwrap();
    let issued = store
      .issue(
        "act",
        "usr",
        &["act:usr".into(), "act".into()],
        ServicesDoc::default(),
        "AUTH_cfa",
        IssueOptions::default(),
      )
      .await
      .unwrap();

    store.revoke(&issued.token).await.unwrap();
    let err = store.validate(&issued.token).await.unwrap_err();
    assert!(matches!(err, CoreError::Unauthorized(_)));
  }
}
