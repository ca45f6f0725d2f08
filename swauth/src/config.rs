//! Unified configuration, loaded from YAML with an environment-variable
//! override for the config path (SPEC_FULL §1.3), matching the grounding
//! codebase's `AppConfig::load()` shape (env var first, then a short list
//! of conventional search paths, then a descriptive error).

use std::{env, path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};
use swauth_core::{ClusterEndpoint, CredentialType};
use thiserror::Error;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
  pub server: ServerConfig,
  pub auth: AuthConfig,
  pub backing: BackingConfig,
  pub remote: RemoteConfig,
  pub cache: CacheConfig,
}

/// Bind address and remote-call timeout (spec §6 `node_timeout`).
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ServerConfig {
  pub bind_address: String,
  pub port: u16,
  #[serde(default = "default_node_timeout_ms")]
  pub node_timeout_ms: u64,
}

fn default_node_timeout_ms() -> u64 {
  10_000
}

impl ServerConfig {
  pub fn node_timeout(&self) -> Duration {
    Duration::from_millis(self.node_timeout_ms)
  }
}

/// Auth surface configuration (spec §6 "Configuration (enumerated)").
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AuthConfig {
  pub super_admin_key: Option<String>,
  #[serde(default = "default_reseller_prefix")]
  pub reseller_prefix: String,
  #[serde(default = "default_auth_prefix")]
  pub auth_prefix: String,
  #[serde(default = "default_auth_type")]
  pub auth_type: String,
  pub auth_type_salt: Option<String>,
  #[serde(default = "default_token_life")]
  pub token_life: i64,
  #[serde(default = "default_max_token_life")]
  pub max_token_life: i64,
  #[serde(default)]
  pub s3_support: bool,
  #[serde(default)]
  pub allow_overrides: bool,
  #[serde(default)]
  pub allowed_sync_hosts: Vec<String>,
}

fn default_reseller_prefix() -> String {
  "AUTH".to_string()
}

fn default_auth_prefix() -> String {
  "/auth/".to_string()
}

fn default_auth_type() -> String {
  "Plaintext".to_string()
}

fn default_token_life() -> i64 {
  86_400
}

fn default_max_token_life() -> i64 {
  86_400
}

impl AuthConfig {
  /// `reseller_prefix` with the trailing `_` appended if missing; empty
  /// stays empty (spec §3 invariant 5, §6).
  pub fn normalized_reseller_prefix(&self) -> String {
    if self.reseller_prefix.is_empty() || self.reseller_prefix.ends_with('_') {
      self.reseller_prefix.clone()
    } else {
      format!("{}_", self.reseller_prefix)
    }
  }

  pub fn credential_type(&self) -> Result<CredentialType, ConfigError> {
    match self.auth_type.to_ascii_lowercase().as_str() {
      "plaintext" => Ok(CredentialType::Plaintext),
      "sha1" => Ok(CredentialType::Sha1),
      "sha512" => Ok(CredentialType::Sha512),
      other => Err(ConfigError::InvalidValue {
        field: "auth.auth_type".to_string(),
        value: other.to_string(),
      }),
    }
  }
}

/// The backing object-storage cluster this instance talks to (spec §6
/// `default_swift_cluster`, `default_storage_policy`).
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BackingConfig {
  /// `name#publicUrl[#privateUrl]`; only `name` and `publicUrl` are used.
  pub default_swift_cluster: String,
  pub default_storage_policy: Option<String>,
}

impl BackingConfig {
  pub fn default_cluster(&self) -> Result<ClusterEndpoint, ConfigError> {
    let mut parts = self.default_swift_cluster.splitn(3, '#');
    let name = parts.next().filter(|s| !s.is_empty()).ok_or_else(|| ConfigError::InvalidValue {
      field: "backing.default_swift_cluster".to_string(),
      value: self.default_swift_cluster.clone(),
    })?;
    let public_url = parts.next().filter(|s| !s.is_empty()).ok_or_else(|| ConfigError::InvalidValue {
      field: "backing.default_swift_cluster".to_string(),
      value: self.default_swift_cluster.clone(),
    })?;
    Ok(ClusterEndpoint {
      name: name.to_string(),
      public_url: public_url.to_string(),
    })
  }
}

/// Remote token-validation delegation (spec §6 `swauth_remote`); when set,
/// the admin API is disabled and S3 is unsupported (§9 Open Question).
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct RemoteConfig {
  pub swauth_remote: Option<String>,
  #[serde(default = "default_remote_timeout_ms")]
  pub swauth_remote_timeout_ms: u64,
}

fn default_remote_timeout_ms() -> u64 {
  10_000
}

/// Connection to the external shared TTL cache (spec §1.3: out of scope as
/// a component, but the middleware still needs a URL/handle to reach it).
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CacheConfig {
  pub redis_url: String,
  #[serde(default = "default_cache_prefix")]
  pub key_prefix: String,
}

fn default_cache_prefix() -> String {
  "swauth".to_string()
}

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("missing required environment variable: {0}")]
  MissingEnvVar(String),
  #[error("invalid value for {field}: {value}")]
  InvalidValue { field: String, value: String },
  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
  #[error("YAML parsing error: {0}")]
  YamlParse(#[from] serde_yaml::Error),
}

impl AppConfig {
  /// `SWAUTH_CONFIG` wins if set; otherwise a short list of conventional
  /// locations is tried in order, then a descriptive error.
  pub fn load() -> Result<Self, ConfigError> {
    if let Ok(path) = env::var("SWAUTH_CONFIG") {
      return Self::from_file(&path);
    }

    for path in Self::search_locations() {
      if path.exists() {
        return Self::from_file(path.to_str().unwrap_or_default());
      }
    }

    Err(ConfigError::MissingEnvVar("SWAUTH_CONFIG".to_string()))
  }

  fn search_locations() -> Vec<PathBuf> {
    let mut locations = vec![PathBuf::from("./swauth.yml"), PathBuf::from("./swauth.yaml")];
    if let Ok(cwd) = env::current_dir() {
      locations.push(cwd.join("config").join("swauth.yml"));
    }
    locations.push(PathBuf::from("/etc/swauth/swauth.yml"));
    locations
  }

  pub fn from_file(path: &str) -> Result<Self, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_yaml::from_str(&content)?)
  }
}

/// Mixed into the token-name derivation (spec §3); read directly from the
/// process environment, not the YAML file (spec §6 "Environment variables").
pub fn hash_path_prefix() -> String {
  env::var("HASH_PATH_PREFIX").unwrap_or_default()
}

pub fn hash_path_suffix() -> String {
  env::var("HASH_PATH_SUFFIX").unwrap_or_default()
}
