//! C9 S3CompatAdapter: translates an S3-style signed request into a user
//! lookup and HMAC verification (spec §4.9).

use std::sync::Arc;

use base64::Engine;
use hmac::{Hmac, Mac};
use sha1::Sha1;

use crate::backing::BackingClient;
use crate::credential::{self, CredentialType};
use crate::error::CoreError;
use crate::identity::IdentityStore;
use crate::models::group_string;

type HmacSha1 = Hmac<Sha1>;

/// Signature details an upstream S3 translator has already parsed out of
/// the request's `Authorization` header.
#[derive(Debug, Clone)]
pub struct S3AuthDetails {
  pub access_key: String,
  pub signature: String,
  pub string_to_sign: String,
  pub path_info: String,
}

#[derive(Debug, Clone)]
pub struct S3Authenticated {
  pub groups: Vec<String>,
  pub rewritten_path: String,
}

pub struct S3CompatAdapter<B: BackingClient> {
  identity: Arc<IdentityStore<B>>,
  auth_type_salt: Option<String>,
}

impl<B: BackingClient> S3CompatAdapter<B> {
  pub fn new(identity: Arc<IdentityStore<B>>, auth_type_salt: Option<String>) -> Self {
    Self {
      identity,
      auth_type_salt,
    }
  }

  /// Startup-time guard (spec §4.1, §4.9): S3 is disabled when a non-
  /// plaintext codec is configured without a fixed salt.
  pub fn viable_for(&self, configured_type: CredentialType) -> bool {
    credential::s3_mode_is_viable(configured_type, self.auth_type_salt.as_deref())
  }

  pub async fn authenticate(&self, details: &S3AuthDetails) -> Result<S3Authenticated, CoreError> {
    let Some((account, user)) = details.access_key.split_once(':') else {
      return Err(CoreError::BadRequest("access key must be account:user".to_string()));
    };

    let record = self.identity.get_user(account, user).await?;
    let stored = credential::parse(&record.auth)?;
    let account_id = self.identity.account_id(account).await?;

    let rewritten_path = details.path_info.replacen(&details.access_key, &account_id, 1);

    let key_material = stored.key_material_for_s3();
    let mut mac = HmacSha1::new_from_slice(key_material.as_bytes())
      .map_err(|e| CoreError::Internal(format!("hmac key error: {e}")))?;
    mac.update(details.string_to_sign.as_bytes());
    let computed = base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes());

    if computed != details.signature {
      return Err(CoreError::Unauthorized("S3 signature mismatch".to_string()));
    }

    Ok(S3Authenticated {
      groups: record
        .group_names()
        .iter()
        .map(|g| if g == ".admin" { account_id.clone() } else { g.clone() })
        .collect(),
      rewritten_path,
    })
  }
}

/// Convenience used by callers that already have a `(groups, account_id)`
/// pair and just need the canonical substitution (kept alongside the
/// adapter since it is the same rule applied in §3/§4.4/§4.9).
pub fn canonical_groups(groups: &[String], account_id: &str) -> String {
  group_string(groups, account_id)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::identity::ClusterEndpoint;
  use crate::models::PutUserInput;
  use crate::testing::InMemoryBackingClient;

  async fn setup() -> (IdentityStore<InMemoryBackingClient>, &'static str) {
    let store = IdentityStore::new(
      InMemoryBackingClient::new(),
      Arc::new(InMemoryBackingClient::new()),
      "AUTH_",
      ClusterEndpoint {
        name: "local".to_string(),
        public_url: "http://127.0.0.1:8080".to_string(),
      },
      None,
    );
    store.prep().await.unwrap();
    store.create_account("act", Some("cfa".to_string()), "R_itktoken").await.unwrap();
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
    (store, "act:usr")
  }

  #[tokio::test]
  async fn valid_signature_authenticates_and_rewrites_path() {
    let (store, access_key) = setup().await;
    let adapter = S3CompatAdapter::new(Arc::new(store), None);

    let string_to_sign = "GET\n\n\n0\n/act:usr/c1";
    let mut mac = HmacSha1::new_from_slice(b"key").unwrap();
    mac.update(string_to_sign.as_bytes());
    let signature = base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes());

    let details = S3AuthDetails {
      access_key: access_key.to_string(),
      signature,
      string_to_sign: string_to_sign.to_string(),
      path_info: "/v1/act:usr/c1".to_string(),
    };

    let result = adapter.authenticate(&details).await.unwrap();
    assert_eq!(result.rewritten_path, "/v1/AUTH_cfa/c1");
    assert!(result.groups.contains(&"act:usr".to_string()));
  }

  #[tokio::test]
  async fn wrong_signature_is_unauthorized() {
    let (store, access_key) = setup().await;
    let adapter = S3CompatAdapter::new(Arc::new(store), None);

    let details = S3AuthDetails {
      access_key: access_key.to_string(),
      signature: "bogus".to_string(),
      string_to_sign: "GET\n\n\n0\n/act:usr/c1".to_string(),
      path_info: "/v1/act:usr/c1".to_string(),
    };

    let err = adapter.authenticate(&details).await.unwrap_err();
    assert!(matches!(err, CoreError::Unauthorized(_)));
  }

  #[test]
  fn viable_for_respects_fixed_salt_requirement() {
    let store = IdentityStore::new(
      InMemoryBackingClient::new(),
      Arc::new(InMemoryBackingClient::new()),
      "AUTH_",
      ClusterEndpoint {
        name: "local".to_string(),
        public_url: "http://127.0.0.1:8080".to_string(),
      },
      None,
    );
    let adapter = S3CompatAdapter::new(Arc::new(store), None);
    assert!(!adapter.viable_for(CredentialType::Sha1));
    assert!(adapter.viable_for(CredentialType::Plaintext));
  }
}
