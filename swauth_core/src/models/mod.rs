//! Entities persisted by swauth inside the backing store's auth account
//! (`R_.auth`, spec §3). Every object/container body lives here as a plain
//! serde type; nothing in this module talks to the backing store directly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A user's membership record: one name per group, the principal's own
/// `a:u` group first, `a` second (spec §3 invariant 2).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupEntry {
  pub name: String,
}

impl GroupEntry {
  pub fn new(name: impl Into<String>) -> Self {
    Self { name: name.into() }
  }
}

/// Body of a user object `R_.auth/a/u`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
  pub auth: String,
  pub groups: Vec<GroupEntry>,
}

impl UserRecord {
  pub fn group_names(&self) -> Vec<String> {
    self.groups.iter().map(|g| g.name.clone()).collect()
  }

  pub fn is_account_admin(&self) -> bool {
    self.groups.iter().any(|g| g.name == ".admin")
  }

  pub fn is_reseller_admin(&self) -> bool {
    self.groups.iter().any(|g| g.name == ".reseller_admin")
  }
}

/// Body of the reserved `.services` object `R_.auth/a/.services`.
///
/// `storage` always carries at least a `default` selector naming one of its
/// own keys.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServicesDoc {
  #[serde(flatten)]
  pub services: BTreeMap<String, ServiceEndpoints>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceEndpoints {
  #[serde(flatten)]
  pub endpoints: BTreeMap<String, String>,
}

impl ServicesDoc {
  pub fn storage(&self) -> Option<&ServiceEndpoints> {
    self.services.get("storage")
  }

  /// Resolves `storage.<default>`, per spec §4.4 step 5 / §4.8 token grant.
  pub fn default_storage_url(&self) -> Option<&str> {
    let storage = self.storage()?;
    let default_name = storage.endpoints.get("default")?;
    storage.endpoints.get(default_name).map(String::as_str)
  }

  /// Merges `patch` into `self`, top-level keys merged, inner maps merged
  /// with per-key overwrite (spec §4.5 "Set services").
  pub fn merge(&mut self, patch: ServicesDoc) {
    for (svc, endpoints) in patch.services {
      self
        .services
        .entry(svc)
        .or_default()
        .endpoints
        .extend(endpoints.endpoints);
    }
  }
}

/// Body of a token object under `R_.auth/.token_<x>/<derivedName>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenRecord {
  pub account: String,
  pub user: String,
  pub account_id: String,
  pub groups: Vec<String>,
  pub expires: DateTime<Utc>,
}

/// Result of a successful `TokenStore::validate` call.
#[derive(Debug, Clone)]
pub struct TokenValidation {
  pub groups: Vec<String>,
  pub ttl_seconds: i64,
}

/// Result of a successful `TokenStore::issue` call.
#[derive(Debug, Clone)]
pub struct IssuedToken {
  pub token: String,
  pub expires: DateTime<Utc>,
  pub services: ServicesDoc,
  pub storage_url: String,
}

/// View returned by `IdentityStore::get_account`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountView {
  pub account_id: String,
  pub services: ServicesDoc,
  pub users: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct AccountCreated {
  pub account_id: String,
  pub services: ServicesDoc,
}

/// Inputs to `IdentityStore::put_user` (spec §4.5 "Create/update user").
#[derive(Debug, Clone)]
pub struct PutUserInput {
  pub key: Option<String>,
  pub prehashed: Option<String>,
  pub admin: bool,
  pub reseller_admin: bool,
}

/// Canonicalizes a list of group names into the wire format described in
/// spec §3: `"g1,g2,...,gN"`, substituting `account_id` for the literal
/// `.admin` marker.
pub fn group_string(groups: &[String], account_id: &str) -> String {
  groups
    .iter()
    .map(|g| if g == ".admin" { account_id } else { g.as_str() })
    .collect::<Vec<_>>()
    .join(",")
}

/// True for the handful of names the data model reserves: containers and
/// objects beginning with `.`, except the listing pseudo-user `.groups` and
/// the services object `.services` which callers check for explicitly.
pub fn is_reserved_name(name: &str) -> bool {
  name.starts_with('.')
}

pub fn is_valid_account_or_user_name(name: &str) -> bool {
  !name.is_empty() && !is_reserved_name(name)
}
