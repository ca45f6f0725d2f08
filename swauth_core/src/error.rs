use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Transport-agnostic domain error. The binary crate's `AppError` maps each
/// variant to an HTTP status and short text body; nothing in this crate
/// knows about axum responses.
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
pub enum CoreError {
  /// Malformed input: unknown paths, oversize tokens, invalid JSON bodies,
  /// reserved names, wrong method on a known endpoint.
  #[error("bad request: {0}")]
  BadRequest(String),

  /// Missing/expired/unknown token, wrong password, failed S3 signature,
  /// anonymous access not permitted by a referrer rule, unknown admin user.
  #[error("unauthorized: {0}")]
  Unauthorized(String),

  /// Principal established but lacking privilege for this path/method.
  #[error("forbidden: {0}")]
  Forbidden(String),

  /// Target entity does not exist, or the admin surface is disabled.
  #[error("not found: {0}")]
  NotFound(String),

  /// Non-empty account delete, or a cross-cluster delete conflict on the
  /// first cluster.
  #[error("conflict: {0}")]
  Conflict(String),

  /// A stored credential string failed to parse (§4.1 InvalidCredential).
  #[error("invalid credential: {0}")]
  InvalidCredential(String),

  /// The middleware cannot perform an operation because a required
  /// collaborator (shared cache, backing cluster) was not configured.
  #[error("configuration error: {0}")]
  Configuration(String),

  /// Any non-2xx, non-explicitly-handled backing response, or a remote-call
  /// timeout. The failing URL is logged by the caller, never carried here.
  #[error("internal error: {0}")]
  Internal(String),
}

impl CoreError {
  pub fn is_retryable(&self) -> bool {
    matches!(self, CoreError::Internal(_))
  }
}

impl From<reqwest::Error> for CoreError {
  fn from(err: reqwest::Error) -> Self {
    if err.is_timeout() || err.is_connect() {
      CoreError::Internal(format!("backing store unreachable: {err}"))
    } else {
      CoreError::Internal(err.to_string())
    }
  }
}

impl From<redis::RedisError> for CoreError {
  fn from(err: redis::RedisError) -> Self {
    CoreError::Internal(format!("shared cache error: {err}"))
  }
}

impl From<serde_json::Error> for CoreError {
  fn from(err: serde_json::Error) -> Self {
    CoreError::Internal(format!("json error: {err}"))
  }
}

/// Maps a `CoreError` into a crate-local, presentation-layer error type.
/// The binary crate implements this for its `AppError`.
pub trait ErrorMapper {
  type Error;

  fn map_error(error: CoreError) -> Self::Error;
}
