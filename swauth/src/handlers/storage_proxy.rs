//! Storage-proxy route: the generic `/v1/<account>/<container?>/<object?>`
//! data path. This is where C6's `authorize()` is actually installed as the
//! authorization hook (spec §4.6, §4.8 steps 7-9) — `auth_middleware`
//! resolves a `Principal`/`DenyHook` for the request, and this handler is
//! the thing that consults it before forwarding to the backing cluster.

use std::net::SocketAddr;

use axum::body::Body;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::Method;
use axum::response::{IntoResponse, Response};

use swauth_core::{Acl, AuthRequest, BackingClient, Decision, DenyReason, authorize};

use crate::error::AppError;
use crate::router::{DenyHook, Principal};
use crate::state::AppState;

/// Splits `/v1/<account>/<container>/<object...>`; the object segment keeps
/// any embedded slashes (pseudo-folder object names).
fn split_storage_path(path: &str) -> Option<(&str, Option<&str>, Option<&str>)> {
  let mut parts = path.trim_start_matches('/').splitn(4, '/');
  let version = parts.next()?;
  if version != "v1" {
    return None;
  }
  let account = parts.next().filter(|s| !s.is_empty())?;
  let container = parts.next().filter(|s| !s.is_empty());
  let object = parts.next().filter(|s| !s.is_empty());
  Some((account, container, object))
}

fn remote_addr(req: &Request) -> String {
  req
    .headers()
    .get("x-forwarded-for")
    .and_then(|v| v.to_str().ok())
    .and_then(|v| v.split(',').next())
    .map(str::trim)
    .filter(|s| !s.is_empty())
    .map(str::to_string)
    .or_else(|| req.extensions().get::<ConnectInfo<SocketAddr>>().map(|ci| ci.0.ip().to_string()))
    .unwrap_or_default()
}

pub async fn proxy(State(state): State<AppState>, req: Request) -> Response {
  match handle(state, req).await {
    Ok(resp) => resp,
    Err(err) => err.into_response(),
  }
}

async fn handle(state: AppState, req: Request) -> Result<Response, AppError> {
  if req.extensions().get::<DenyHook>().is_some() {
    return Err(AppError::Forbidden(
      "anonymous request to an account outside this reseller".to_string(),
    ));
  }
  let principal = req.extensions().get::<Principal>().cloned().unwrap_or_default();

  let path = req.uri().path().to_string();
  let Some((account, container, object)) = split_storage_path(&path) else {
    return Err(AppError::NotFound("malformed storage path".to_string()));
  };

  let reseller_prefix = state.config.auth.normalized_reseller_prefix();
  let sync_hosts = state.config.auth.allowed_sync_hosts.clone();
  let method = req.method().clone();
  let referer = req
    .headers()
    .get(axum::http::header::REFERER)
    .and_then(|v| v.to_str().ok())
    .map(str::to_string);
  let sync_key_header = req
    .headers()
    .get("x-container-sync-key")
    .and_then(|v| v.to_str().ok())
    .map(str::to_string);
  let timestamp_header = req
    .headers()
    .get("x-timestamp")
    .and_then(|v| v.to_str().ok())
    .map(str::to_string);
  let addr = remote_addr(&req);

  let (acl, configured_sync_key) = match container {
    Some(container) => fetch_container_acl(&state, account, container, &method).await?,
    None => (Acl::default(), None),
  };

  let auth_req = AuthRequest {
    account,
    container,
    object,
    method: &method,
    acl: &acl,
    principal_groups: &principal.groups,
    referer: referer.as_deref(),
    sync_key_header: sync_key_header.as_deref(),
    configured_sync_key: configured_sync_key.as_deref(),
    timestamp_header: timestamp_header.as_deref(),
    remote_addr: &addr,
    reseller_prefix: &reseller_prefix,
    sync_hosts: &sync_hosts,
  };

  match authorize(&auth_req) {
    Decision::Allow { .. } => forward(&state, req, account, container, object).await,
    Decision::Deny(DenyReason::Unauthorized) => Err(AppError::Unauthorized("authentication required".to_string())),
    Decision::Deny(DenyReason::Forbidden) => Err(AppError::Forbidden("access denied".to_string())),
  }
}

/// Fetches the container's own ACL metadata from the backing cluster: the
/// read ACL governs GET/HEAD, the write ACL governs everything else
/// (spec §4.6's `req.acl`, sourced the way the backing layer supplies it).
async fn fetch_container_acl(
  state: &AppState,
  account: &str,
  container: &str,
  method: &Method,
) -> Result<(Acl, Option<String>), AppError> {
  let path = format!("{account}/{container}");
  let resp = state.external.head(&path, &[]).await?;
  if resp.is_not_found() {
    return Err(AppError::NotFound(format!("container {account}/{container} not found")));
  }

  let header_name = if matches!(*method, Method::GET | Method::HEAD) {
    "x-container-read"
  } else {
    "x-container-write"
  };
  let acl = resp.header(header_name).map(Acl::parse).unwrap_or_default();
  let sync_key = resp.header("x-container-sync-key").map(str::to_string);
  Ok((acl, sync_key))
}

fn backing_path(account: &str, container: Option<&str>, object: Option<&str>) -> String {
  let mut path = account.to_string();
  if let Some(container) = container {
    path.push('/');
    path.push_str(container);
  }
  if let Some(object) = object {
    path.push('/');
    path.push_str(object);
  }
  path
}

/// Only GET/HEAD/PUT/POST/DELETE are forwarded (`BackingClient`'s surface);
/// anything else (e.g. COPY) is rejected rather than silently dropped.
async fn forward(
  state: &AppState,
  req: Request,
  account: &str,
  container: Option<&str>,
  object: Option<&str>,
) -> Result<Response, AppError> {
  let method = req.method().clone();
  let headers = req.headers().clone();
  let body = axum::body::to_bytes(req.into_body(), usize::MAX)
    .await
    .map_err(|e| AppError::BadRequest(format!("failed to read request body: {e}")))?;

  let forward_headers: Vec<(&str, &str)> = headers
    .iter()
    .filter(|(name, _)| *name != axum::http::header::HOST)
    .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str(), v)))
    .collect();

  let path = backing_path(account, container, object);
  let resp = match method {
    Method::GET => state.external.get(&path, &forward_headers).await?,
    Method::HEAD => state.external.head(&path, &forward_headers).await?,
    Method::PUT => state.external.put(&path, &forward_headers, body).await?,
    Method::POST => state.external.post(&path, &forward_headers, body).await?,
    Method::DELETE => state.external.delete(&path, &forward_headers).await?,
    other => return Err(AppError::BadRequest(format!("unsupported storage method {other}"))),
  };

  let mut builder = axum::http::Response::builder().status(resp.status);
  for (name, value) in &resp.headers {
    builder = builder.header(name.as_str(), value.as_str());
  }
  builder
    .body(Body::from(resp.body))
    .map_err(|e| AppError::Internal(format!("failed to build proxied response: {e}")))
}
