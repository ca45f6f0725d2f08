//! C5 IdentityStore: CRUD over resellers/accounts/users/services (spec §4.5).

use std::sync::Arc;

use bytes::Bytes;
use rand::RngCore;
use tracing::{info, warn};

use crate::backing::BackingClient;
use crate::credential::{self, CredentialType};
use crate::error::CoreError;
use crate::models::{
  AccountCreated, AccountView, GroupEntry, PutUserInput, ServiceEndpoints, ServicesDoc, UserRecord,
  is_valid_account_or_user_name,
};

/// The cluster this instance creates new storage accounts on
/// (`default_swift_cluster`, spec §6).
#[derive(Debug, Clone)]
pub struct ClusterEndpoint {
  pub name: String,
  pub public_url: String,
}

pub struct IdentityStore<B: BackingClient> {
  backing: B,
  external: Arc<dyn BackingClient>,
  auth_account: String,
  reseller_prefix: String,
  default_cluster: ClusterEndpoint,
  default_storage_policy: Option<String>,
  internal_token_header: &'static str,
}

impl<B: BackingClient> IdentityStore<B> {
  pub fn new(
    backing: B,
    external: Arc<dyn BackingClient>,
    reseller_prefix: impl Into<String>,
    default_cluster: ClusterEndpoint,
    default_storage_policy: Option<String>,
  ) -> Self {
    let reseller_prefix = reseller_prefix.into();
    Self {
      backing,
      external,
      auth_account: format!("{reseller_prefix}.auth"),
      reseller_prefix,
      default_cluster,
      default_storage_policy,
      internal_token_header: "auth-token",
    }
  }

  fn external_headers<'a>(&'a self, internal_token: &'a str) -> Vec<(&'a str, &'a str)> {
    let mut headers = vec![(self.internal_token_header, internal_token)];
    if let Some(policy) = &self.default_storage_policy {
      headers.push(("x-storage-policy", policy.as_str()));
    }
    headers
  }

  fn account_path(&self, account: &str) -> String {
    format!("{}/{}", self.auth_account, account)
  }

  fn user_path(&self, account: &str, user: &str) -> String {
    format!("{}/{}/{}", self.auth_account, account, user)
  }

  fn services_path(&self, account: &str) -> String {
    format!("{}/{}/.services", self.auth_account, account)
  }

  fn account_id_path(&self, account_id: &str) -> String {
    format!("{}/.account_id/{}", self.auth_account, account_id)
  }

  /// Reseller init: creates the auth account, the account-id index
  /// container, and the 16 token-shard containers. Idempotent on 2xx
  /// re-puts (spec §4.5).
  pub async fn prep(&self) -> Result<(), CoreError> {
    self.put_container(&self.auth_account).await?;
    self.put_container(&format!("{}/.account_id", self.auth_account)).await?;
    for nibble in "0123456789abcdef".chars() {
      self
        .put_container(&format!("{}/.token_{}", self.auth_account, nibble))
        .await?;
    }
    info!(reseller_prefix = %self.reseller_prefix, "reseller prep completed");
    Ok(())
  }

  async fn put_container(&self, path: &str) -> Result<(), CoreError> {
    let resp = self.backing.put(path, &[], Bytes::new()).await?;
    if !resp.is_success() {
      return Err(CoreError::Internal(format!(
        "failed to create container {path}: status {}",
        resp.status
      )));
    }
    Ok(())
  }

  pub async fn list_accounts(&self) -> Result<Vec<String>, CoreError> {
    let resp = self.backing.get(&self.auth_account, &[]).await?;
    if !resp.is_success() {
      return Err(CoreError::Internal(format!(
        "failed to list accounts: status {}",
        resp.status
      )));
    }
    let names: Vec<String> = serde_json::from_slice(&resp.body).unwrap_or_default();
    Ok(names.into_iter().filter(|n| !n.starts_with('.')).collect())
  }

  pub async fn get_account(&self, account: &str) -> Result<AccountView, CoreError> {
    let services_resp = self.backing.get(&self.services_path(account), &[]).await?;
    if services_resp.is_not_found() {
      return Err(CoreError::NotFound(format!("account {account} not found")));
    }
    if !services_resp.is_success() {
      return Err(CoreError::Internal(format!(
        "failed to read services document: status {}",
        services_resp.status
      )));
    }
    let services: ServicesDoc = serde_json::from_slice(&services_resp.body)?;

    let head_resp = self.backing.head(&self.account_path(account), &[]).await?;
    let account_id = head_resp
      .header("account-id")
      .map(str::to_string)
      .ok_or_else(|| CoreError::Internal("account container missing account-id metadata".to_string()))?;

    let listing_resp = self.backing.get(&self.account_path(account), &[]).await?;
    let names: Vec<String> = serde_json::from_slice(&listing_resp.body).unwrap_or_default();
    let users = names.into_iter().filter(|n| !n.starts_with('.')).collect();

    Ok(AccountView {
      account_id,
      services,
      users,
    })
  }

  /// Create account `a`, per the multi-step commit protocol in spec §4.5.
  /// The container's `account-id` metadatum is the commit marker: its
  /// presence after step 1's HEAD is what makes create idempotent.
  pub async fn create_account(
    &self,
    account: &str,
    suffix: Option<String>,
    internal_token: &str,
  ) -> Result<AccountCreated, CoreError> {
    if !is_valid_account_or_user_name(account) {
      return Err(CoreError::BadRequest(format!("invalid account name: {account}")));
    }

    let account_path = self.account_path(account);
    let head_resp = self.backing.head(&account_path, &[]).await?;
    let already_completed = head_resp.is_success() && head_resp.header("account-id").is_some();
    if already_completed {
      let account_id = head_resp.header("account-id").unwrap().to_string();
      let services = self.get_account(account).await?.services;
      return Ok(AccountCreated { account_id, services });
    }
    let needs_container = !head_resp.is_success();

    let suffix = suffix.unwrap_or_else(random_suffix);
    let account_id = format!("{}{}", self.reseller_prefix, suffix);

    let external_resp = self
      .external
      .put(&account_id, &self.external_headers(internal_token), Bytes::new())
      .await?;
    if !external_resp.is_success() {
      return Err(CoreError::Internal(format!(
        "failed to create storage account {account_id}: status {}",
        external_resp.status
      )));
    }

    if needs_container {
      self.put_container(&account_path).await?;
    }

    self
      .backing
      .put(&self.account_id_path(&account_id), &[], Bytes::from(account.to_string()))
      .await?;

    let public_url = format!("{}/v1/{}", self.default_cluster.public_url.trim_end_matches('/'), account_id);
    let mut storage_endpoints = ServiceEndpoints::default();
    storage_endpoints.endpoints.insert(self.default_cluster.name.clone(), public_url);
    storage_endpoints.endpoints.insert("default".to_string(), self.default_cluster.name.clone());
    let mut services = ServicesDoc::default();
    services.services.insert("storage".to_string(), storage_endpoints);
    let services_body = Bytes::from(serde_json::to_vec(&services)?);
    self.backing.put(&self.services_path(account), &[], services_body).await?;

    let meta_header = [("x-container-meta-account-id", account_id.as_str())];
    self.backing.post(&account_path, &meta_header, Bytes::new()).await?;

    info!(%account, %account_id, "account created");
    Ok(AccountCreated { account_id, services })
  }

  pub async fn delete_account(&self, account: &str, internal_token: &str) -> Result<(), CoreError> {
    let listing_resp = self.backing.get(&self.account_path(account), &[]).await?;
    if listing_resp.is_not_found() {
      return Err(CoreError::NotFound(format!("account {account} not found")));
    }
    let names: Vec<String> = serde_json::from_slice(&listing_resp.body).unwrap_or_default();
    if names.iter().any(|n| !n.starts_with('.')) {
      return Err(CoreError::Conflict(format!("account {account} is not empty")));
    }

    let services_resp = self.backing.get(&self.services_path(account), &[]).await?;
    let account_id_for_cleanup = self.backing.head(&self.account_path(account), &[]).await?
      .header("account-id")
      .map(str::to_string);

    if services_resp.is_success() {
      let services: ServicesDoc = serde_json::from_slice(&services_resp.body)?;
      if let Some(storage) = services.storage() {
        let default_name = storage.endpoints.get("default").cloned();
        let mut first_cluster_deleted = false;
        let mut first_cluster_seen = false;
        for (cluster_name, _url) in storage.endpoints.iter() {
          if Some(cluster_name) == default_name.as_ref() || cluster_name == "default" {
            continue;
          }
          let is_first = !first_cluster_seen;
          first_cluster_seen = true;
          if let Some(account_id) = &account_id_for_cleanup {
            let resp = self
              .external
              .delete(account_id, &self.external_headers(internal_token))
              .await?;
            if resp.status == 409 {
              if is_first {
                return Err(CoreError::Conflict(format!(
                  "primary cluster {cluster_name} refused account delete"
                )));
              } else {
                return Err(CoreError::Internal(format!(
                  "cluster {cluster_name} refused account delete after prior cluster succeeded"
                )));
              }
            }
            if resp.is_success() || resp.is_not_found() {
              first_cluster_deleted = true;
            } else if !resp.is_success() {
              return Err(CoreError::Internal(format!(
                "cluster {cluster_name} delete failed: status {}",
                resp.status
              )));
            }
          }
        }
        let _ = first_cluster_deleted;
      }
    }

    self.delete_tolerating_404(&self.services_path(account)).await?;
    if let Some(account_id) = account_id_for_cleanup {
      self.delete_tolerating_404(&self.account_id_path(&account_id)).await?;
    }
    self.delete_tolerating_404(&self.account_path(account)).await?;

    info!(%account, "account deleted");
    Ok(())
  }

  async fn delete_tolerating_404(&self, path: &str) -> Result<(), CoreError> {
    let resp = self.backing.delete(path, &[]).await?;
    if !resp.is_success() && !resp.is_not_found() {
      warn!(%path, status = resp.status, "unexpected status during best-effort delete");
    }
    Ok(())
  }

  /// Reseller-admin only (enforced by caller via AdminGate). Merges
  /// `patch` into the stored services document (spec §4.5).
  pub async fn set_services(&self, account: &str, patch: ServicesDoc) -> Result<ServicesDoc, CoreError> {
    let resp = self.backing.get(&self.services_path(account), &[]).await?;
    if resp.is_not_found() {
      return Err(CoreError::NotFound(format!("account {account} not found")));
    }
    if !resp.is_success() {
      return Err(CoreError::Internal(format!(
        "failed to read services document: status {}",
        resp.status
      )));
    }
    let mut services: ServicesDoc = serde_json::from_slice(&resp.body)?;
    services.merge(patch);

    let body = Bytes::from(serde_json::to_vec(&services)?);
    let put_resp = self.backing.put(&self.services_path(account), &[], body).await?;
    if !put_resp.is_success() {
      return Err(CoreError::Internal(format!(
        "failed to write services document: status {}",
        put_resp.status
      )));
    }
    Ok(services)
  }

  /// Resolves an account's `account-id` container metadatum (spec §4.9 step 2).
  pub async fn account_id(&self, account: &str) -> Result<String, CoreError> {
    let resp = self.backing.head(&self.account_path(account), &[]).await?;
    if resp.is_not_found() {
      return Err(CoreError::NotFound(format!("account {account} not found")));
    }
    resp
      .header("account-id")
      .map(str::to_string)
      .ok_or_else(|| CoreError::Internal("account container missing account-id metadata".to_string()))
  }

  pub async fn get_user(&self, account: &str, user: &str) -> Result<UserRecord, CoreError> {
    let resp = self.backing.get(&self.user_path(account, user), &[]).await?;
    if resp.is_not_found() {
      return Err(CoreError::NotFound(format!("user {account}:{user} not found")));
    }
    if !resp.is_success() {
      return Err(CoreError::Internal(format!(
        "failed to read user record: status {}",
        resp.status
      )));
    }
    Ok(serde_json::from_slice(&resp.body)?)
  }

  pub async fn put_user(&self, account: &str, user: &str, input: PutUserInput) -> Result<(), CoreError> {
    if !is_valid_account_or_user_name(user) {
      return Err(CoreError::BadRequest(format!("invalid user name: {user}")));
    }
    let account_head = self.backing.head(&self.account_path(account), &[]).await?;
    if account_head.is_not_found() {
      return Err(CoreError::NotFound(format!("account {account} not found")));
    }

    let auth_value = match (&input.key, &input.prehashed) {
      (_, Some(prehashed)) => {
        credential::parse(prehashed)?;
        prehashed.clone()
      }
      (Some(key), None) => credential::encode(CredentialType::Plaintext, key, None),
      (None, None) => {
        return Err(CoreError::BadRequest("either a key or a pre-hashed credential is required".to_string()))
      }
    };

    let mut groups = vec![
      GroupEntry::new(format!("{account}:{user}")),
      GroupEntry::new(account.to_string()),
    ];
    if input.reseller_admin {
      groups.push(GroupEntry::new(".admin"));
      groups.push(GroupEntry::new(".reseller_admin"));
    } else if input.admin {
      groups.push(GroupEntry::new(".admin"));
    }

    let record = UserRecord {
      auth: auth_value,
      groups,
    };
    let body = Bytes::from(serde_json::to_vec(&record)?);
    let account_id_header = account_head.header("account-id").map(str::to_string);
    let mut headers = vec![];
    if let Some(id) = &account_id_header {
      headers.push(("x-object-meta-account-id", id.as_str()));
    }
    let resp = self.backing.put(&self.user_path(account, user), &headers, body).await?;
    if !resp.is_success() {
      return Err(CoreError::Internal(format!(
        "failed to write user record: status {}",
        resp.status
      )));
    }
    Ok(())
  }

  /// `caller_is_super_admin` gates deletion of reseller admins (spec §4.5).
  /// Returns the user's live raw token, if any, so the caller can revoke it
  /// through `TokenStore::revoke` (spec §3 "revoked on ... user deletion");
  /// `IdentityStore` has no `hash_path_prefix`/`hash_path_suffix` and so
  /// cannot derive or invalidate the token's backing-store object itself.
  pub async fn delete_user(&self, account: &str, user: &str, caller_is_super_admin: bool) -> Result<Option<String>, CoreError> {
    let record = self.get_user(account, user).await?;
    if record.is_reseller_admin() && !caller_is_super_admin {
      return Err(CoreError::Forbidden("only the super-admin may delete a reseller admin".to_string()));
    }

    let user_path = self.user_path(account, user);
    let head_resp = self.backing.head(&user_path, &[]).await?;
    let auth_token = head_resp.header("auth-token").map(str::to_string);

    let resp = self.backing.delete(&user_path, &[]).await?;
    if resp.is_not_found() {
      return Err(CoreError::NotFound(format!("user {account}:{user} not found")));
    }
    if !resp.is_success() {
      return Err(CoreError::Internal(format!(
        "failed to delete user record: status {}",
        resp.status
      )));
    }
    Ok(auth_token)
  }

  /// The `.groups` pseudo-user: union of every user's group names (spec §4.5).
  pub async fn list_group_names(&self, account: &str) -> Result<Vec<String>, CoreError> {
    let listing_resp = self.backing.get(&self.account_path(account), &[]).await?;
    if listing_resp.is_not_found() {
      return Err(CoreError::NotFound(format!("account {account} not found")));
    }
    let names: Vec<String> = serde_json::from_slice(&listing_resp.body).unwrap_or_default();

    let mut all_groups = std::collections::BTreeSet::new();
    for user in names.into_iter().filter(|n| !n.starts_with('.')) {
      let record = self.get_user(account, &user).await?;
      all_groups.extend(record.group_names());
    }
    Ok(all_groups.into_iter().collect())
  }
}

fn random_suffix() -> String {
  let mut buf = [0u8; 16];
  rand::thread_rng().fill_bytes(&mut buf);
  hex::encode(buf)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::testing::InMemoryBackingClient;

  fn store() -> IdentityStore<InMemoryBackingClient> {
    IdentityStore::new(
      InMemoryBackingClient::new(),
      Arc::new(InMemoryBackingClient::new()),
      "AUTH_",
      ClusterEndpoint {
        name: "local".to_string(),
        public_url: "http://127.0.0.1:8080".to_string(),
      },
      None,
    )
  }

  #[tokio::test]
  async fn prep_creates_auth_account_and_shards() {
    let store = store();
    store.prep().await.unwrap();
    let resp = store.backing.head(&store.auth_account, &[]).await.unwrap();
    assert!(resp.is_success());
    let shard = store.backing.head(&format!("{}/.token_a", store.auth_account), &[]).await.unwrap();
    assert!(shard.is_success());
  }

  #[tokio::test]
  async fn create_account_is_idempotent() {
    let store = store();
    store.prep().await.unwrap();
    let first = store
      .create_account("act", Some("test-suffix".to_string()), "R_itktoken")
      .await
      .unwrap();
    let second = store
      .create_account("act", Some("ignored".to_string()), "R_itktoken")
      .await
      .unwrap();
    assert_eq!(first.account_id, second.account_id);
    assert_eq!(first.account_id, "AUTH_test-suffix");
  }

  #[tokio::test]
  async fn create_account_writes_services_default() {
    let store = store();
    store.prep().await.unwrap();
    let created = store
      .create_account("act", Some("test-suffix".to_string()), "R_itktoken")
      .await
      .unwrap();
    assert_eq!(
      created.services.default_storage_url(),
      Some("http://127.0.0.1:8080/v1/AUTH_test-suffix")
    );
  }

  #[tokio::test]
  async fn delete_account_refuses_when_non_empty() {
    let store = store();
    store.prep().await.unwrap();
    store
      .create_account("act", Some("s".to_string()), "R_itktoken")
      .await
      .unwrap();
    store
      .put_user(
        "act",
        "usr",
        PutUserInput {
          key: Some("key".to_string()),
          prehashed: None,
          admin: false,
          reseller_admin: false,
        },
      )
      .await
      .unwrap();

    let err = store.delete_account("act", "R_itktoken").await.unwrap_err();
    assert!(matches!(err, CoreError::Conflict(_)));
  }

  #[tokio::test]
  async fn put_and_get_user_round_trips() {
    let store = store();
    store.prep().await.unwrap();
    store
      .create_account("act", Some("s".to_string()), "R_itktoken")
      .await
      .unwrap();
    store
      .put_user(
        "act",
        "usr",
        PutUserInput {
          key: Some("key".to_string()),
          prehashed: None,
          admin: true,
          reseller_admin: false,
        },
      )
      .await
      .unwrap();

    let record = store.get_user("act", "usr").await.unwrap();
    assert!(record.is_account_admin());
    assert!(credential::verify("key", &record.auth).unwrap());
  }

  #[tokio::test]
  async fn delete_user_rejects_reseller_admin_without_super_admin() {
    let store = store();
    store.prep().await.unwrap();
    store
      .create_account("act", Some("s".to_string()), "R_itktoken")
      .await
      .unwrap();
    store
      .put_user(
        "act",
        "usr",
        PutUserInput {
          key: Some("key".to_string()),
          prehashed: None,
          admin: false,
          reseller_admin: true,
        },
      )
      .await
      .unwrap();

    let err = store.delete_user("act", "usr", false).await.unwrap_err();
    assert!(matches!(err, CoreError::Forbidden(_)));

    store.delete_user("act", "usr", true).await.unwrap();
  }

  #[tokio::test]
  async fn list_group_names_unions_across_users() {
    let store = store();
    store.prep().await.unwrap();
    store
      .create_account("act", Some("s".to_string()), "R_itktoken")
      .await
      .unwrap();
    store
      .put_user(
        "act",
        "usr1",
        PutUserInput {
          key: Some("key".to_string()),
          prehashed: None,
          admin: true,
          reseller_admin: false,
        },
      )
      .await
      .unwrap();
    store
      .put_user(
        "act",
        "usr2",
        PutUserInput {
          key: Some("key".to_string()),
          prehashed: None,
          admin: false,
          reseller_admin: false,
        },
      )
      .await
      .unwrap();

    let groups = store.list_group_names("act").await.unwrap();
    assert!(groups.contains(&"act".to_string()));
    assert!(groups.contains(&".admin".to_string()));
    assert!(groups.contains(&"act:usr1".to_string()));
    assert!(groups.contains(&"act:usr2".to_string()));
  }
}
