//! Presentation-layer error type. Maps the library's transport-agnostic
//! `CoreError` to an HTTP status and a short JSON body, mirroring the
//! grounding codebase's `AppError`/`ErrorMapper` split (SPEC_FULL §1.2).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::error;

use swauth_core::{CoreError, ErrorMapper};

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorOutput {
  pub code: u16,
  pub error: String,
}

#[derive(Error, Debug)]
pub enum AppError {
  #[error("bad request: {0}")]
  BadRequest(String),
  #[error("unauthorized: {0}")]
  Unauthorized(String),
  #[error("forbidden: {0}")]
  Forbidden(String),
  #[error("not found: {0}")]
  NotFound(String),
  #[error("conflict: {0}")]
  Conflict(String),
  #[error("invalid credential: {0}")]
  InvalidCredential(String),
  #[error("configuration error: {0}")]
  Configuration(String),
  #[error("internal error")]
  Internal(String),
}

impl ErrorMapper for AppError {
  type Error = AppError;

  fn map_error(error: CoreError) -> Self::Error {
    match error {
      CoreError::BadRequest(e) => AppError::BadRequest(e),
      CoreError::Unauthorized(e) => AppError::Unauthorized(e),
      CoreError::Forbidden(e) => AppError::Forbidden(e),
      CoreError::NotFound(e) => AppError::NotFound(e),
      CoreError::Conflict(e) => AppError::Conflict(e),
      CoreError::InvalidCredential(e) => AppError::InvalidCredential(e),
      CoreError::Configuration(e) => AppError::Configuration(e),
      CoreError::Internal(e) => AppError::Internal(e),
    }
  }
}

impl From<CoreError> for AppError {
  fn from(err: CoreError) -> Self {
    Self::map_error(err)
  }
}

impl IntoResponse for AppError {
  fn into_response(self) -> Response {
    // spec §7: internal errors never leak the failing backing URL to the
    // caller; the detail is logged here and replaced with a generic body.
    let (status, message) = match &self {
      AppError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
      AppError::Unauthorized(m) => (StatusCode::UNAUTHORIZED, m.clone()),
      AppError::Forbidden(m) => (StatusCode::FORBIDDEN, m.clone()),
      AppError::NotFound(m) => (StatusCode::NOT_FOUND, m.clone()),
      AppError::Conflict(m) => (StatusCode::CONFLICT, m.clone()),
      AppError::InvalidCredential(m) => (StatusCode::BAD_REQUEST, m.clone()),
      AppError::Configuration(m) => (StatusCode::INTERNAL_SERVER_ERROR, m.clone()),
      AppError::Internal(detail) => {
        error!(%detail, "internal error surfaced to caller");
        (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
      }
    };

    let body = Json(ErrorOutput {
      code: status.as_u16(),
      error: message,
    });
    (status, body).into_response()
  }
}
