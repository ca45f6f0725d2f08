//! Candidate bearer-token extraction, shared between the router's
//! classification step and any handler that needs the raw header value
//! (spec §4.8 step 5).

use axum::http::HeaderMap;

/// Tokens longer than this are rejected with *BadRequest* before ever
/// reaching `TokenStore::validate` (spec §4.8 step 5, §8).
pub const MAX_TOKEN_LENGTH: usize = 96;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenCandidate {
  None,
  TooLong,
  Present(String),
}

/// Reads `x-auth-token` or `x-storage-token` (in that order), per spec §4.8.
pub fn extract_bearer_token(headers: &HeaderMap) -> TokenCandidate {
  let raw = headers
    .get("x-auth-token")
    .or_else(|| headers.get("x-storage-token"))
    .and_then(|v| v.to_str().ok());

  match raw {
    None => TokenCandidate::None,
    Some(token) if token.len() > MAX_TOKEN_LENGTH => TokenCandidate::TooLong,
    Some(token) => TokenCandidate::Present(token.to_string()),
  }
}
