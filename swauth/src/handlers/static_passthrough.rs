//! Static asset passthrough for a web admin UI, mounted under the admin
//! prefix for any path the route table above doesn't otherwise claim
//! (spec §4.8, "static passthrough to `.webadmin` container").

use axum::extract::{Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use swauth_core::BackingClient;

use crate::error::AppError;
use crate::state::AppState;

pub async fn fallback(State(state): State<AppState>, req: Request) -> Result<Response, AppError> {
  if req.method() != axum::http::Method::GET && req.method() != axum::http::Method::HEAD {
    return Ok(StatusCode::METHOD_NOT_ALLOWED.into_response());
  }

  let admin_prefix = state.config.auth.auth_prefix.clone();
  let remainder = req
    .uri()
    .path()
    .strip_prefix(admin_prefix.trim_end_matches('/'))
    .unwrap_or("")
    .trim_start_matches('/');

  let reseller_prefix = state.config.auth.normalized_reseller_prefix();
  let path = format!("{reseller_prefix}.auth/.webadmin/{remainder}");
  let token = state.internal_token(false).await?;
  let resp = state.external.get(&path, &[("auth-token", &token)]).await?;

  if resp.is_not_found() {
    return Ok(StatusCode::NOT_FOUND.into_response());
  }
  if !resp.is_success() {
    return Err(AppError::Internal(format!(
      "static passthrough failed: status {}",
      resp.status
    )));
  }

  let mut headers = HeaderMap::new();
  if let Some(content_type) = resp.header("content-type") {
    if let Ok(value) = content_type.parse() {
      headers.insert(axum::http::header::CONTENT_TYPE, value);
    }
  }
  Ok((StatusCode::OK, headers, resp.body).into_response())
}
