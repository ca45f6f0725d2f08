//! The v2 admin API (spec §4.8 route table, §4.5/§4.7 semantics).

use axum::Json;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use serde::Deserialize;

use swauth_core::{AdminGate, Escalation, PutUserInput, ServicesDoc};

use super::admin_error_for;
use crate::error::AppError;
use crate::state::{AppState, Backing};

fn header_flag(headers: &HeaderMap, name: &str) -> bool {
  headers
    .get(name)
    .and_then(|v| v.to_str().ok())
    .map(|v| v.eq_ignore_ascii_case("true"))
    .unwrap_or(false)
}

pub async fn prep(State(state): State<AppState>, headers: HeaderMap) -> Result<impl IntoResponse, AppError> {
  let level = state.admin_gate.classify(&headers, None).await?;
  if !AdminGate::<Backing>::is_reseller_admin(&level) {
    return Err(admin_error_for(&level));
  }
  state.identity.prep().await?;
  Ok(axum::http::StatusCode::NO_CONTENT)
}

pub async fn list_accounts(
  State(state): State<AppState>,
  headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
  let level = state.admin_gate.classify(&headers, None).await?;
  if !AdminGate::<Backing>::is_reseller_admin(&level) {
    return Err(admin_error_for(&level));
  }
  let accounts = state.identity.list_accounts().await?;
  Ok(Json(accounts))
}

pub async fn get_account(
  State(state): State<AppState>,
  headers: HeaderMap,
  Path(account): Path<String>,
) -> Result<impl IntoResponse, AppError> {
  let level = state.admin_gate.classify(&headers, None).await?;
  if !AdminGate::<Backing>::is_account_admin(&level, &account) {
    return Err(admin_error_for(&level));
  }
  let view = state.identity.get_account(&account).await?;
  Ok(Json(view))
}

#[derive(Debug, Deserialize, Default)]
pub struct CreateAccountBody {
  #[serde(default)]
  pub suffix: Option<String>,
}

pub async fn create_account(
  State(state): State<AppState>,
  headers: HeaderMap,
  Path(account): Path<String>,
  body: Option<Json<CreateAccountBody>>,
) -> Result<impl IntoResponse, AppError> {
  let level = state.admin_gate.classify(&headers, None).await?;
  if !AdminGate::<Backing>::is_reseller_admin(&level) {
    return Err(admin_error_for(&level));
  }
  let suffix = headers
    .get("x-account-suffix")
    .and_then(|v| v.to_str().ok())
    .map(str::to_string)
    .or_else(|| body.and_then(|Json(b)| b.suffix));

  let internal_token = state.internal_token(false).await?;
  let created = state.identity.create_account(&account, suffix, &internal_token).await?;
  Ok(Json(created))
}

pub async fn delete_account(
  State(state): State<AppState>,
  headers: HeaderMap,
  Path(account): Path<String>,
) -> Result<impl IntoResponse, AppError> {
  let level = state.admin_gate.classify(&headers, None).await?;
  if !AdminGate::<Backing>::is_reseller_admin(&level) {
    return Err(admin_error_for(&level));
  }
  let internal_token = state.internal_token(false).await?;
  state.identity.delete_account(&account, &internal_token).await?;
  Ok(axum::http::StatusCode::NO_CONTENT)
}

pub async fn set_services(
  State(state): State<AppState>,
  headers: HeaderMap,
  Path(account): Path<String>,
  Json(patch): Json<ServicesDoc>,
) -> Result<impl IntoResponse, AppError> {
  let level = state.admin_gate.classify(&headers, None).await?;
  if !AdminGate::<Backing>::is_reseller_admin(&level) {
    return Err(admin_error_for(&level));
  }
  let services = state.identity.set_services(&account, patch).await?;
  Ok(Json(services))
}

pub async fn get_user(
  State(state): State<AppState>,
  headers: HeaderMap,
  Path((account, user)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
  let level = state.admin_gate.classify(&headers, Some((&account, &user))).await?;
  if !AdminGate::<Backing>::is_account_admin(&level, &account) && level != swauth_core::AdminLevel::Self_ {
    return Err(admin_error_for(&level));
  }
  let record = state.identity.get_user(&account, &user).await?;
  Ok(Json(record))
}

#[derive(Debug, Deserialize, Default)]
pub struct PutUserBody {
  pub key: Option<String>,
  pub prehashed: Option<String>,
}

pub async fn put_user(
  State(state): State<AppState>,
  headers: HeaderMap,
  Path((account, user)): Path<(String, String)>,
  body: Json<PutUserBody>,
) -> Result<impl IntoResponse, AppError> {
  let level = state.admin_gate.classify(&headers, Some((&account, &user))).await?;

  let escalation = Escalation {
    grant_admin: header_flag(&headers, "x-auth-user-admin"),
    grant_reseller_admin: header_flag(&headers, "x-auth-user-reseller-admin"),
  };

  let authorized = AdminGate::<Backing>::is_account_admin(&level, &account)
    || AdminGate::<Backing>::is_self_key_change(&level, &escalation);
  if !authorized {
    return Err(admin_error_for(&level));
  }
  if escalation.grant_admin && !AdminGate::<Backing>::can_grant_admin(&level) {
    return Err(AppError::Forbidden("caller may not grant account-admin privilege".to_string()));
  }
  if escalation.grant_reseller_admin && !AdminGate::<Backing>::can_grant_reseller_admin(&level) {
    return Err(AppError::Forbidden(
      "only the super-admin may grant reseller-admin privilege".to_string(),
    ));
  }

  state
    .identity
    .put_user(
      &account,
      &user,
      PutUserInput {
        key: body.key.clone(),
        prehashed: body.prehashed.clone(),
        admin: escalation.grant_admin,
        reseller_admin: escalation.grant_reseller_admin,
      },
    )
    .await?;
  Ok(axum::http::StatusCode::NO_CONTENT)
}

pub async fn delete_user(
  State(state): State<AppState>,
  headers: HeaderMap,
  Path((account, user)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
  let level = state.admin_gate.classify(&headers, Some((&account, &user))).await?;
  if !AdminGate::<Backing>::is_account_admin(&level, &account) {
    return Err(admin_error_for(&level));
  }
  let caller_is_super_admin = level == swauth_core::AdminLevel::SuperAdmin;
  let revoked_token = state.identity.delete_user(&account, &user, caller_is_super_admin).await?;
  if let Some(token) = revoked_token {
    if let Err(err) = state.token_store.revoke(&token).await {
      tracing::warn!(%err, "best-effort token revoke on user delete failed");
    }
  }
  Ok(axum::http::StatusCode::NO_CONTENT)
}

pub async fn validate_token(
  State(state): State<AppState>,
  Path(token): Path<String>,
) -> Result<impl IntoResponse, AppError> {
  let validation = state.token_store.validate(&token).await?;
  Ok((
    axum::http::StatusCode::NO_CONTENT,
    [
      ("x-auth-ttl", validation.ttl_seconds.to_string()),
      ("x-auth-groups", validation.groups.join(",")),
    ],
  ))
}
