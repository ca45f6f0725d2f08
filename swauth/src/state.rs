//! Wires the library crate's components into one shared, cloneable handle
//! used by every handler and middleware (the grounding codebase's
//! `AppState` shape).

use std::sync::Arc;
use std::time::Duration;

use swauth_core::{
  AdminGate, HttpBackingClient, IdentityStore, InternalTokenState, PreAuthClient, RedisSharedCache,
  S3CompatAdapter, TokenCache, TokenStore, TokenValidation,
};

use crate::config::AppConfig;
use crate::error::AppError;

pub type Backing = PreAuthClient<HttpBackingClient>;

#[derive(Clone)]
pub struct AppState {
  pub config: Arc<AppConfig>,
  pub external: Arc<HttpBackingClient>,
  pub cache: Arc<RedisSharedCache>,
  pub token_store: Arc<TokenStore<Backing, Arc<RedisSharedCache>>>,
  pub identity: Arc<IdentityStore<Backing>>,
  pub admin_gate: Arc<AdminGate<Backing>>,
  pub s3_adapter: Option<Arc<S3CompatAdapter<Backing>>>,
  pub internal_token: Arc<InternalTokenState>,
  /// Set when `swauth_remote` delegates token validation elsewhere; in that
  /// mode the admin API and S3 support are both disabled (spec §6, §9).
  pub remote_client: Option<reqwest::Client>,
}

impl AppState {
  pub async fn try_new(config: AppConfig) -> Result<Self, AppError> {
    let reseller_prefix = config.auth.normalized_reseller_prefix();
    let node_timeout = config.server.node_timeout();
    let default_cluster = config
      .backing
      .default_cluster()
      .map_err(|e| AppError::Configuration(e.to_string()))?;

    // The auth account lives on the same cluster as everything else this
    // instance guards, so the "pre-authorized in-process" call style
    // (spec §4.2) is an `HttpBackingClient` pointed at the default cluster
    // and marked with the sentinel header by `PreAuthClient`.
    let auth_http = HttpBackingClient::new(&default_cluster.public_url, node_timeout)
      .map_err(|e| AppError::Configuration(e.to_string()))?;
    let auth_backing = PreAuthClient::new(auth_http.clone());
    let external: Arc<HttpBackingClient> = Arc::new(auth_http);

    let cache = Arc::new(
      RedisSharedCache::new(&config.cache.redis_url, config.cache.key_prefix.clone())
        .await
        .map_err(|e| AppError::Configuration(e.to_string()))?,
    );

    let identity = Arc::new(IdentityStore::new(
      auth_backing.clone(),
      external.clone() as Arc<dyn swauth_core::BackingClient>,
      reseller_prefix.clone(),
      default_cluster,
      config.backing.default_storage_policy.clone(),
    ));

    let token_store = Arc::new(TokenStore::new(
      auth_backing.clone(),
      TokenCache::new(cache.clone()),
      reseller_prefix.clone(),
      crate::config::hash_path_prefix(),
      crate::config::hash_path_suffix(),
      config.auth.token_life,
      config.auth.max_token_life,
    ));

    let admin_gate = Arc::new(AdminGate::new(identity.clone(), config.auth.super_admin_key.clone()));

    let credential_type = config
      .auth
      .credential_type()
      .map_err(|e| AppError::Configuration(e.to_string()))?;
    let s3_adapter = if config.auth.s3_support {
      let adapter = S3CompatAdapter::new(identity.clone(), config.auth.auth_type_salt.clone());
      if !adapter.viable_for(credential_type) {
        return Err(AppError::Configuration(
          "s3_support requires auth_type_salt when auth_type is not Plaintext".to_string(),
        ));
      }
      Some(Arc::new(adapter))
    } else {
      None
    };

    let remote_client = config
      .remote
      .swauth_remote
      .as_ref()
      .map(|_| {
        reqwest::Client::builder()
          .timeout(Duration::from_millis(config.remote.swauth_remote_timeout_ms))
          .build()
          .map_err(|e| AppError::Configuration(format!("failed to build remote validation client: {e}")))
      })
      .transpose()?;

    Ok(Self {
      config: Arc::new(config),
      external,
      cache,
      token_store,
      identity,
      admin_gate,
      s3_adapter,
      internal_token: Arc::new(InternalTokenState::new()),
      remote_client,
    })
  }

  /// Delegates token validation to `swauth_remote` over HTTP instead of the
  /// local backing-store lookup (spec §6 `swauth_remote`).
  pub async fn validate_token_remote(&self, token: &str) -> Result<TokenValidation, AppError> {
    let client = self
      .remote_client
      .as_ref()
      .ok_or_else(|| AppError::Internal("validate_token_remote called without swauth_remote configured".to_string()))?;
    let base = self
      .config
      .remote
      .swauth_remote
      .as_deref()
      .ok_or_else(|| AppError::Internal("swauth_remote not configured".to_string()))?;

    let resp = client
      .get(format!("{}/v2/.token/{}", base.trim_end_matches('/'), token))
      .send()
      .await
      .map_err(|e| AppError::Internal(format!("remote token validation request failed: {e}")))?;

    if resp.status() == reqwest::StatusCode::NOT_FOUND || resp.status() == reqwest::StatusCode::UNAUTHORIZED {
      return Err(AppError::Unauthorized("no such token".to_string()));
    }
    if !resp.status().is_success() {
      return Err(AppError::Internal(format!(
        "remote token validation returned status {}",
        resp.status()
      )));
    }

    let ttl_seconds = resp
      .headers()
      .get("x-auth-ttl")
      .and_then(|v| v.to_str().ok())
      .and_then(|v| v.parse().ok())
      .unwrap_or(0);
    let groups = resp
      .headers()
      .get("x-auth-groups")
      .and_then(|v| v.to_str().ok())
      .unwrap_or_default()
      .split(',')
      .filter(|s| !s.is_empty())
      .map(str::to_string)
      .collect();

    Ok(TokenValidation { groups, ttl_seconds })
  }

  /// Mints (or reuses) the process-wide internal token `I` (spec §4.2).
  pub async fn internal_token(&self, force: bool) -> Result<String, AppError> {
    self
      .internal_token
      .mint_if_needed(self.cache.as_ref(), force, self.config.auth.token_life)
      .await
      .map_err(AppError::from)
  }

  pub fn node_timeout(&self) -> Duration {
    self.config.server.node_timeout()
  }
}
