//! C1 CredentialCodec: encodes and verifies the `type:payload` credential
//! strings stored on user records (spec §4.1).

use base64::Engine;
use rand::RngCore;
use sha1::Sha1;
use sha2::{Digest, Sha512};

use crate::error::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialType {
  Plaintext,
  Sha1,
  Sha512,
}

impl CredentialType {
  fn tag(self) -> &'static str {
    match self {
      CredentialType::Plaintext => "plaintext",
      CredentialType::Sha1 => "sha1",
      CredentialType::Sha512 => "sha512",
    }
  }

  fn hex_len(self) -> usize {
    match self {
      CredentialType::Plaintext => 0,
      CredentialType::Sha1 => 40,
      CredentialType::Sha512 => 128,
    }
  }
}

/// A parsed stored credential. For `Plaintext`, `salt` is `None` and
/// `hash_or_key` holds the cleartext key. For salted variants, `salt` and
/// `hash_or_key` (lowercase hex) are both populated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredCredential {
  pub kind: CredentialType,
  pub salt: Option<String>,
  pub hash_or_key: String,
}

impl StoredCredential {
  /// The raw key material an S3 signer would have used as the HMAC key
  /// (spec §4.1 "S3 verification").
  pub fn key_material_for_s3(&self) -> &str {
    &self.hash_or_key
  }

  pub fn to_stored_string(&self) -> String {
    match self.salt {
      Some(ref salt) => format!("{}:{}${}", self.kind.tag(), salt, self.hash_or_key),
      None => format!("{}:{}", self.kind.tag(), self.hash_or_key),
    }
  }
}

/// Encodes `key` into a stored credential string. `fixed_salt` is the
/// configured `auth_type_salt`; when absent for a salted variant a fresh
/// 32-byte random salt is generated and base64-encoded without padding.
pub fn encode(kind: CredentialType, key: &str, fixed_salt: Option<&str>) -> String {
  match kind {
    CredentialType::Plaintext => format!("plaintext:{key}"),
    CredentialType::Sha1 | CredentialType::Sha512 => {
      let salt = fixed_salt.map(str::to_string).unwrap_or_else(random_salt);
      let hash = hash_with_salt(kind, &salt, key);
      format!("{}:{}${}", kind.tag(), salt, hash)
    }
  }
}

fn random_salt() -> String {
  let mut bytes = [0u8; 32];
  rand::thread_rng().fill_bytes(&mut bytes);
  base64::engine::general_purpose::STANDARD
    .encode(bytes)
    .trim_end_matches('=')
    .to_string()
}

fn hash_with_salt(kind: CredentialType, salt: &str, key: &str) -> String {
  let input = format!("{salt}{key}");
  match kind {
    CredentialType::Sha1 => hex::encode(Sha1::digest(input.as_bytes())),
    CredentialType::Sha512 => hex::encode(Sha512::digest(input.as_bytes())),
    CredentialType::Plaintext => unreachable!("plaintext has no salted hash"),
  }
}

/// Parses a stored credential string, per the grammar in spec §4.1.
pub fn parse(stored: &str) -> Result<StoredCredential, CoreError> {
  let (tag, rest) = stored
    .split_once(':')
    .ok_or_else(|| CoreError::InvalidCredential("missing ':' separator".to_string()))?;

  match tag {
    "plaintext" => {
      if rest.is_empty() {
        return Err(CoreError::InvalidCredential("empty plaintext key".to_string()));
      }
      Ok(StoredCredential {
        kind: CredentialType::Plaintext,
        salt: None,
        hash_or_key: rest.to_string(),
      })
    }
    "sha1" | "sha512" => {
      let kind = if tag == "sha1" {
        CredentialType::Sha1
      } else {
        CredentialType::Sha512
      };
      let (salt, hash) = rest
        .split_once('$')
        .ok_or_else(|| CoreError::InvalidCredential("missing '$' separator".to_string()))?;
      if salt.is_empty() {
        return Err(CoreError::InvalidCredential("empty salt".to_string()));
      }
      if hash.len() != kind.hex_len() {
        return Err(CoreError::InvalidCredential(format!(
          "expected {} hex chars, got {}",
          kind.hex_len(),
          hash.len()
        )));
      }
      if !hash.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(CoreError::InvalidCredential("hash is not hexadecimal".to_string()));
      }
      Ok(StoredCredential {
        kind,
        salt: Some(salt.to_string()),
        hash_or_key: hash.to_string(),
      })
    }
    other => Err(CoreError::InvalidCredential(format!("unknown credential type: {other}"))),
  }
}

/// Verifies `key` against a previously stored credential string.
pub fn verify(key: &str, stored: &str) -> Result<bool, CoreError> {
  let parsed = parse(stored)?;
  Ok(match parsed.kind {
    CredentialType::Plaintext => parsed.hash_or_key == key,
    CredentialType::Sha1 | CredentialType::Sha512 => {
      let salt = parsed.salt.as_deref().unwrap_or_default();
      hash_with_salt(parsed.kind, salt, key) == parsed.hash_or_key
    }
  })
}

/// Startup check for spec §4.1: S3 mode requires a configured fixed salt
/// when a salted codec is in use, because the server never retains the
/// cleartext key.
pub fn s3_mode_is_viable(kind: CredentialType, fixed_salt: Option<&str>) -> bool {
  match kind {
    CredentialType::Plaintext => true,
    CredentialType::Sha1 | CredentialType::Sha512 => fixed_salt.is_some(),
  }
}
