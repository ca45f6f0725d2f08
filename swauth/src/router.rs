//! C8 Router/Middleware: per-request classification, principal resolution,
//! and the admin-API route table (spec §4.8).

use axum::Router;
use axum::extract::{Request, State};
use axum::http::{HeaderMap, Method};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get, post};
use tracing::{debug, warn};

use swauth_core::S3AuthDetails;
use swauth_core::middlewares::{TokenCandidate, extract_bearer_token};

use crate::error::AppError;
use crate::handlers;
use crate::middlewares::s3_detect::s3_detect_middleware;
use crate::state::AppState;

/// Sentinel header an upstream identity-provider integration sets once it
/// has already established an identity for this request (spec §4.8 step 1).
pub const IDENTITY_MARKER_HEADER: &str = "x-identity-status";

/// Caller-declared group override, honored only when `allow_overrides` is
/// configured (spec §4.8 step 3).
pub const OVERRIDE_GROUPS_HEADER: &str = "x-swauth-override-groups";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteClass {
  Passthrough,
  AdminApi,
  TokenBearing,
  AnonymousOwned,
  AnonymousUnowned,
  S3Signed,
}

/// Everything `classify` needs, kept separate from axum's `Request` so the
/// decision tree is unit-testable without constructing real HTTP requests.
pub struct ClassifyInput<'a> {
  pub method: &'a Method,
  pub path: &'a str,
  pub headers: &'a HeaderMap,
  pub s3_details_present: bool,
  pub admin_prefix: &'a str,
  pub reseller_prefix: &'a str,
  pub allow_overrides: bool,
  pub s3_support: bool,
}

/// Principal resolved for the request (spec §4.6/§4.8): its canonical
/// group string, already expanded (`.admin` substituted for the account id).
#[derive(Debug, Clone, Default)]
pub struct Principal {
  pub groups: Vec<String>,
  pub reseller_request: bool,
}

/// Installed when classification determines the request must be denied
/// before an authorize callback ever runs (spec §4.8 step 8 "deny-hook").
#[derive(Debug, Clone, Copy)]
pub struct DenyHook;

/// Pure decision tree, spec §4.8 steps 1-9 (step 5's oversize-token check
/// and S3 authentication itself happen in `auth_middleware`, which needs
/// I/O; this function only classifies).
pub fn classify(input: &ClassifyInput) -> RouteClass {
  if input.headers.contains_key(IDENTITY_MARKER_HEADER) {
    return RouteClass::Passthrough;
  }
  if input.method == Method::OPTIONS {
    return RouteClass::Passthrough;
  }
  if input.allow_overrides && input.headers.contains_key(OVERRIDE_GROUPS_HEADER) {
    return RouteClass::Passthrough;
  }

  let bare_prefix = input.admin_prefix.trim_end_matches('/');
  if input.path == bare_prefix || input.path.starts_with(input.admin_prefix) {
    return RouteClass::AdminApi;
  }

  if input.s3_details_present && input.s3_support {
    return RouteClass::S3Signed;
  }

  let token = extract_bearer_token(input.headers);
  let token_is_ours = match &token {
    TokenCandidate::Present(t) => input.reseller_prefix.is_empty() || t.starts_with(input.reseller_prefix),
    _ => false,
  };
  if token_is_ours {
    return RouteClass::TokenBearing;
  }

  if input.reseller_prefix.is_empty() {
    return RouteClass::AnonymousOwned;
  }

  let owned = input
    .path
    .trim_start_matches('/')
    .split('/')
    .nth(1)
    .map(|account| account.starts_with(input.reseller_prefix))
    .unwrap_or(false);
  if owned {
    RouteClass::AnonymousOwned
  } else {
    RouteClass::AnonymousUnowned
  }
}

/// Installs the resolved principal (or deny-hook) into request extensions
/// per the classification, then hands off to the next service.
pub async fn auth_middleware(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
  let candidate = extract_bearer_token(req.headers());
  if candidate == TokenCandidate::TooLong {
    return AppError::BadRequest("Token exceeds maximum length.".to_string()).into_response();
  }

  let path = req.uri().path().to_string();
  let admin_prefix = state.config.auth.auth_prefix.clone();
  let reseller_prefix = state.config.auth.normalized_reseller_prefix();
  let s3_details_present = req.extensions().get::<S3AuthDetails>().is_some();

  let input = ClassifyInput {
    method: req.method(),
    path: &path,
    headers: req.headers(),
    s3_details_present,
    admin_prefix: &admin_prefix,
    reseller_prefix: &reseller_prefix,
    allow_overrides: state.config.auth.allow_overrides,
    s3_support: state.config.auth.s3_support,
  };
  let class = classify(&input);
  debug!(?class, %path, "router classification");

  let remote_mode = state.config.remote.swauth_remote.is_some();

  match class {
    RouteClass::Passthrough => next.run(req).await,
    RouteClass::AdminApi => {
      // spec §6: swauth_remote delegation disables the admin API entirely.
      if remote_mode {
        return AppError::NotFound("admin API disabled in swauth_remote mode".to_string()).into_response();
      }
      let bare_prefix = admin_prefix.trim_end_matches('/');
      if path == bare_prefix {
        // 301, not axum's 308 `Redirect::permanent` (spec: trailing-slash
        // redirect for the bare admin prefix).
        return (axum::http::StatusCode::MOVED_PERMANENTLY, [(axum::http::header::LOCATION, admin_prefix.as_str())])
          .into_response();
      }
      next.run(req).await
    }
    RouteClass::S3Signed => {
      // spec §9 Open Question: S3 and swauth_remote are incompatible; warn
      // and fail closed rather than silently falling back to local auth.
      if remote_mode {
        warn!("S3-signed request received while swauth_remote is configured; denying");
        return AppError::Unauthorized("S3 authentication is unavailable in swauth_remote mode".to_string())
          .into_response();
      }
      let Some(adapter) = &state.s3_adapter else {
        return AppError::BadRequest("S3 authentication is not enabled".to_string()).into_response();
      };
      let Some(details) = req.extensions().get::<S3AuthDetails>().cloned() else {
        return AppError::Internal("S3 classification without S3 details".to_string()).into_response();
      };
      match adapter.authenticate(&details).await {
        Ok(authenticated) => {
          // spec §4.9 step 3: the access-key account is rewritten to the
          // resolved storage account before the request reaches the
          // storage-proxy handler.
          let query = req.uri().query().map(|q| format!("?{q}")).unwrap_or_default();
          let rewritten = format!("{}{}", authenticated.rewritten_path, query);
          match rewritten.parse::<axum::http::Uri>() {
            Ok(uri) => *req.uri_mut() = uri,
            Err(err) => {
              warn!(%err, path = %authenticated.rewritten_path, "failed to apply S3 path rewrite");
              return AppError::Internal("failed to rewrite S3 request path".to_string()).into_response();
            }
          }
          req.extensions_mut().insert(Principal {
            groups: authenticated.groups,
            reseller_request: false,
          });
          next.run(req).await
        }
        Err(err) => AppError::from(err).into_response(),
      }
    }
    RouteClass::TokenBearing => {
      let TokenCandidate::Present(token) = candidate else {
        return AppError::Internal("token-bearing classification without a token".to_string()).into_response();
      };
      let validated = if remote_mode {
        state.validate_token_remote(&token).await
      } else {
        state.token_store.validate(&token).await.map_err(AppError::from)
      };
      match validated {
        Ok(validation) => {
          let reseller_request = validation.groups.iter().any(|g| g == ".reseller_admin");
          req.extensions_mut().insert(Principal {
            groups: validation.groups,
            reseller_request,
          });
          next.run(req).await
        }
        // spec §4.8 step 7: a token that clearly belongs to this reseller
        // fails closed rather than falling through to anonymous handling.
        Err(err) => err.into_response(),
      }
    }
    RouteClass::AnonymousOwned => {
      req.extensions_mut().insert(Principal::default());
      next.run(req).await
    }
    RouteClass::AnonymousUnowned => {
      req.extensions_mut().insert(DenyHook);
      next.run(req).await
    }
  }
}

/// Builds the admin API surface of spec §4.8's table, rooted at
/// `auth_prefix`, plus the `/v1/<account>/<container?>/<object?>`
/// storage-proxy surface that installs C6 as the authorize hook for every
/// request `auth_middleware` resolves a `Principal`/`DenyHook` for (spec
/// §1, §4.8 steps 7-9). The storage-proxy routes sit outside the
/// `auth_prefix` nest so they share its `auth_middleware`/`s3_detect`
/// layers without inheriting the admin route table.
pub fn build_router(state: AppState) -> Router {
  let prefix = state.config.auth.auth_prefix.trim_end_matches('/').to_string();

  let admin = Router::new()
    .route("/v1.0", get(handlers::token_grant::grant_token))
    .route("/v1/a/auth", get(handlers::token_grant::grant_token))
    .route("/auth", get(handlers::token_grant::grant_token))
    .route("/v2/.prep", post(handlers::admin::prep))
    .route("/v2/.token/{token}", get(handlers::admin::validate_token))
    .route(
      "/v2/{account}/.services",
      post(handlers::admin::set_services),
    )
    .route(
      "/v2/{account}",
      get(handlers::admin::get_account)
        .put(handlers::admin::create_account)
        .delete(handlers::admin::delete_account),
    )
    .route(
      "/v2/{account}/{user}",
      get(handlers::admin::get_user)
        .put(handlers::admin::put_user)
        .delete(handlers::admin::delete_user),
    )
    .route("/v2", get(handlers::admin::list_accounts))
    .fallback(handlers::static_passthrough::fallback);

  let storage = Router::new()
    .route("/v1/{account}", any(handlers::storage_proxy::proxy))
    .route("/v1/{account}/{container}", any(handlers::storage_proxy::proxy))
    .route(
      "/v1/{account}/{container}/{*object}",
      any(handlers::storage_proxy::proxy),
    );

  Router::new()
    .nest(&prefix, admin)
    .merge(storage)
    .fallback(handlers::static_passthrough::fallback)
    .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
    .layer(middleware::from_fn(s3_detect_middleware))
    .with_state(state)
}
