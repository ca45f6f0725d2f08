//! Token grant (spec §4.8 "Token grant", §4.4).

use axum::Json;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::IntoResponse;

use swauth_core::{IssueOptions, ServicesDoc};

use crate::error::AppError;
use crate::state::AppState;

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
  headers.get(name)?.to_str().ok().map(str::to_string)
}

fn header_flag(headers: &HeaderMap, name: &str) -> bool {
  header(headers, name)
    .map(|v| v.eq_ignore_ascii_case("true"))
    .unwrap_or(false)
}

/// Minimal `%XX` decoder, just enough to turn `a%3Au` into `a:u` (spec
/// §4.8); no crate in the dependency set does this for us.
fn percent_decode(input: &str) -> String {
  let bytes = input.as_bytes();
  let mut out = Vec::with_capacity(bytes.len());
  let mut i = 0;
  while i < bytes.len() {
    if bytes[i] == b'%' && i + 2 < bytes.len() {
      if let Ok(hex) = std::str::from_utf8(&bytes[i + 1..i + 3]) {
        if let Ok(value) = u8::from_str_radix(hex, 16) {
          out.push(value);
          i += 3;
          continue;
        }
      }
    }
    out.push(bytes[i]);
    i += 1;
  }
  String::from_utf8_lossy(&out).into_owned()
}

pub async fn grant_token(State(state): State<AppState>, headers: HeaderMap) -> Result<impl IntoResponse, AppError> {
  // `x-auth-user`/`x-auth-key` take precedence over the storage-account
  // back-compat aliases when both are present (SPEC_FULL §2).
  let admin_user = header(&headers, "x-auth-user").or_else(|| header(&headers, "x-storage-user"));
  let admin_key = header(&headers, "x-auth-key").or_else(|| header(&headers, "x-storage-pass"));

  let (Some(admin_user), Some(admin_key)) = (admin_user, admin_key) else {
    return Err(AppError::Unauthorized("missing auth credentials".to_string()));
  };
  let admin_user = percent_decode(&admin_user);
  let force_new = header_flag(&headers, "x-auth-new-token");

  if admin_user == swauth_core::SUPER_ADMIN_USER {
    let configured = state.config.auth.super_admin_key.as_deref();
    if configured != Some(admin_key.as_str()) {
      return Err(AppError::Unauthorized("invalid super-admin credentials".to_string()));
    }
    let token = state.internal_token(force_new).await?;
    let reseller_prefix = state.config.auth.normalized_reseller_prefix();
    let storage_url = format!(
      "{}/v1/{}.auth",
      state.config.backing.default_cluster().map_err(|e| AppError::Configuration(e.to_string()))?.public_url.trim_end_matches('/'),
      reseller_prefix
    );
    let response = (
      [
        ("x-auth-token", token.clone()),
        ("x-storage-token", token),
        ("x-storage-url", storage_url),
        ("x-auth-token-expires", state.config.auth.token_life.to_string()),
      ],
      Json(ServicesDoc::default()),
    );
    return Ok(response.into_response());
  }

  let Some((account, user)) = admin_user.split_once(':') else {
    return Err(AppError::Unauthorized("x-auth-user must be account:user".to_string()));
  };

  let record = state
    .identity
    .get_user(account, user)
    .await
    .map_err(|_| AppError::Unauthorized("invalid credentials".to_string()))?;
  if !swauth_core::credential::verify(&admin_key, &record.auth)? {
    return Err(AppError::Unauthorized("invalid credentials".to_string()));
  }

  let view = state.identity.get_account(account).await?;
  let user_groups = record.group_names();

  let issued = state
    .token_store
    .issue(
      account,
      user,
      &user_groups,
      view.services,
      &view.account_id,
      IssueOptions {
        force_new,
        requested_lifetime: None,
      },
    )
    .await?;

  let expires_in = (issued.expires - chrono::Utc::now()).num_seconds().max(0);
  let response = (
    [
      ("x-auth-token", issued.token.clone()),
      ("x-storage-token", issued.token),
      ("x-storage-url", issued.storage_url),
      ("x-auth-token-expires", expires_in.to_string()),
    ],
    Json(issued.services),
  );
  Ok(response.into_response())
}
