//! Driving the core lifecycle end to end against the in-memory backing
//! fakes, matching the concrete scenarios described for this system:
//! prep, account creation, token grant/reuse, forced re-mint, and the
//! authorization decision tree's reseller/cross-reseller/sync-key cases.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use http::Method;

use swauth_core::testing::{InMemoryBackingClient, InMemorySharedCache};
use swauth_core::{
  Acl, AdminGate, AuthRequest, BackingClient, BackingResponse, ClusterEndpoint, CoreError, Decision,
  DenyReason, IdentityStore, IssueOptions, PutUserInput, TokenCache, TokenStore, authorize,
};

/// Lets `IdentityStore` and `TokenStore` share one in-memory auth account
/// in these tests, the way two independent backing clients in production
/// point at the same HTTP cluster.
#[derive(Clone)]
struct SharedBacking(Arc<InMemoryBackingClient>);

#[async_trait]
impl BackingClient for SharedBacking {
  async fn get(&self, path: &str, headers: &[(&str, &str)]) -> Result<BackingResponse, CoreError> {
    self.0.get(path, headers).await
  }
  async fn head(&self, path: &str, headers: &[(&str, &str)]) -> Result<BackingResponse, CoreError> {
    self.0.head(path, headers).await
  }
  async fn put(&self, path: &str, headers: &[(&str, &str)], body: Bytes) -> Result<BackingResponse, CoreError> {
    self.0.put(path, headers, body).await
  }
  async fn post(&self, path: &str, headers: &[(&str, &str)], body: Bytes) -> Result<BackingResponse, CoreError> {
    self.0.post(path, headers, body).await
  }
  async fn delete(&self, path: &str, headers: &[(&str, &str)]) -> Result<BackingResponse, CoreError> {
    self.0.delete(path, headers).await
  }
}

fn cluster() -> ClusterEndpoint {
  ClusterEndpoint {
    name: "local".to_string(),
    public_url: "http://127.0.0.1:8080".to_string(),
  }
}

fn identity_over(backing: SharedBacking) -> IdentityStore<SharedBacking> {
  IdentityStore::new(
    backing,
    Arc::new(InMemoryBackingClient::new()),
    "AUTH_",
    cluster(),
    None,
  )
}

fn token_store_over(backing: SharedBacking) -> TokenStore<SharedBacking, InMemorySharedCache> {
  TokenStore::new(
    backing,
    TokenCache::new(InMemorySharedCache::default()),
    "AUTH_",
    "prefix",
    "suffix",
    86_400,
    86_400,
  )
}

#[tokio::test]
async fn prep_creates_auth_scaffolding() {
  let backing = SharedBacking(Arc::new(InMemoryBackingClient::new()));
  let identity = identity_over(backing);
  identity.prep().await.unwrap();
  // idempotent: a second prep against already-created containers succeeds.
  identity.prep().await.unwrap();
}

#[tokio::test]
async fn create_account_then_put_user_then_grant_and_reuse_token() {
  let backing = SharedBacking(Arc::new(InMemoryBackingClient::new()));
  let identity = identity_over(backing.clone());
  identity.prep().await.unwrap();

  let created = identity
    .create_account("act", Some("test-suffix".to_string()), "R_itk-internal")
    .await
    .unwrap();
  assert_eq!(created.account_id, "AUTH_test-suffix");
  assert_eq!(
    created.services.default_storage_url(),
    Some("http://127.0.0.1:8080/v1/AUTH_test-suffix")
  );

  identity
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

  let record = identity.get_user("act", "usr").await.unwrap();
  assert!(swauth_core::credential::verify("key", &record.auth).unwrap());

  let view = identity.get_account("act").await.unwrap();
  let store = token_store_over(backing);

  let first = store
    .issue(
      "act",
      "usr",
      &record.group_names(),
      view.services.clone(),
      &view.account_id,
      IssueOptions::default(),
    )
    .await
    .unwrap();
  assert!(first.token.starts_with("AUTH_tk"));

  let second = store
    .issue(
      "act",
      "usr",
      &record.group_names(),
      view.services.clone(),
      &view.account_id,
      IssueOptions::default(),
    )
    .await
    .unwrap();
  assert_eq!(first.token, second.token, "reuse within lifetime returns the same token");

  let forced = store
    .issue(
      "act",
      "usr",
      &record.group_names(),
      view.services,
      &view.account_id,
      IssueOptions {
        force_new: true,
        requested_lifetime: None,
      },
    )
    .await
    .unwrap();
  assert_ne!(forced.token, first.token, "forcing a new token mints a different value");

  assert!(store.validate(&first.token).await.is_err(), "the prior token is revoked");
  assert!(store.validate(&forced.token).await.is_ok());
}

#[tokio::test]
async fn admin_gate_blocks_self_key_change_from_escalating() {
  let backing = SharedBacking(Arc::new(InMemoryBackingClient::new()));
  let identity = Arc::new(identity_over(backing));
  identity.prep().await.unwrap();
  identity
    .create_account("act", Some("s".to_string()), "R_itk-internal")
    .await
    .unwrap();
  identity
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

  let gate = AdminGate::new(identity, None);
  let mut headers = http::HeaderMap::new();
  headers.insert("x-auth-admin-user", "act:usr".parse().unwrap());
  headers.insert("x-auth-admin-key", "key".parse().unwrap());

  let level = gate.classify(&headers, Some(("act", "usr"))).await.unwrap();
  assert_eq!(level, swauth_core::AdminLevel::Self_);

  let escalate = swauth_core::Escalation {
    grant_admin: true,
    grant_reseller_admin: false,
  };
  assert!(!AdminGate::<InMemoryBackingClient>::is_self_key_change(&level, &escalate));
}

#[test]
fn cross_reseller_request_is_forbidden() {
  let acl = Acl::parse("act");
  let groups = vec!["act".to_string()];
  let req = AuthRequest {
    account: "OTHER_cfa",
    container: None,
    object: None,
    method: &Method::GET,
    acl: &acl,
    principal_groups: &groups,
    referer: None,
    sync_key_header: None,
    configured_sync_key: None,
    timestamp_header: None,
    remote_addr: "127.0.0.1",
    reseller_prefix: "AUTH_",
    sync_hosts: &[],
  };
  assert_eq!(authorize(&req), Decision::Deny(DenyReason::Forbidden));
}

#[test]
fn container_sync_with_matching_key_and_host_is_allowed() {
  let acl = Acl::default();
  let groups: Vec<String> = vec![];
  let sync_hosts = vec!["127.0.0.1".to_string()];
  let req = AuthRequest {
    account: "AUTH_cfa",
    container: Some("c"),
    object: Some("o"),
    method: &Method::DELETE,
    acl: &acl,
    principal_groups: &groups,
    referer: None,
    sync_key_header: Some("secret"),
    configured_sync_key: Some("secret"),
    timestamp_header: Some("123.456"),
    remote_addr: "127.0.0.1",
    reseller_prefix: "AUTH_",
    sync_hosts: &sync_hosts,
  };
  assert!(matches!(authorize(&req), Decision::Allow { .. }));
}
