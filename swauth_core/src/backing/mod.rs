//! C2 BackingClient: typed operations over the backing object-storage
//! cluster, plus the process-wide internal token used for the middleware's
//! own administrative calls (spec §4.2).

mod internal_token;

pub use internal_token::InternalTokenState;

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Method;

use crate::error::CoreError;

pub const INTERNAL_TOKEN_PREFIX: &str = "R_itk";
const PREAUTH_SENTINEL_HEADER: &str = "x-swauth-preauthorized";

/// Response from a single backing-store call. Headers are lower-cased keys.
#[derive(Debug, Clone)]
pub struct BackingResponse {
  pub status: u16,
  pub headers: HashMap<String, String>,
  pub body: Bytes,
}

impl BackingResponse {
  pub fn is_success(&self) -> bool {
    (200..300).contains(&self.status)
  }

  pub fn is_not_found(&self) -> bool {
    self.status == 404
  }

  pub fn header(&self, name: &str) -> Option<&str> {
    self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
  }
}

/// Typed operations over account/container/object paths in the backing
/// store. Implementors never see the reseller prefix scheme; they are
/// handed fully qualified paths by the callers in this crate.
#[async_trait]
pub trait BackingClient: Send + Sync {
  async fn get(&self, path: &str, headers: &[(&str, &str)]) -> Result<BackingResponse, CoreError>;
  async fn head(&self, path: &str, headers: &[(&str, &str)]) -> Result<BackingResponse, CoreError>;
  async fn put(
    &self,
    path: &str,
    headers: &[(&str, &str)],
    body: Bytes,
  ) -> Result<BackingResponse, CoreError>;
  async fn post(
    &self,
    path: &str,
    headers: &[(&str, &str)],
    body: Bytes,
  ) -> Result<BackingResponse, CoreError>;
  async fn delete(&self, path: &str, headers: &[(&str, &str)]) -> Result<BackingResponse, CoreError>;
}

/// External-HTTP implementation, used for calls against storage accounts
/// other than the auth account (create/delete a user's storage account,
/// cross-cluster deletes).
#[derive(Clone)]
pub struct HttpBackingClient {
  client: reqwest::Client,
  base_url: String,
}

impl HttpBackingClient {
  pub fn new(base_url: impl Into<String>, node_timeout: Duration) -> Result<Self, CoreError> {
    let client = reqwest::Client::builder()
      .timeout(node_timeout)
      .build()
      .map_err(|e| CoreError::Configuration(format!("failed to build HTTP client: {e}")))?;
    Ok(Self {
      client,
      base_url: base_url.into(),
    })
  }

  fn url_for(&self, path: &str) -> String {
    format!("{}/{}", self.base_url.trim_end_matches('/'), path.trim_start_matches('/'))
  }

  async fn call(
    &self,
    method: Method,
    path: &str,
    headers: &[(&str, &str)],
    body: Option<Bytes>,
  ) -> Result<BackingResponse, CoreError> {
    let mut req = self.client.request(method, self.url_for(path));
    for (k, v) in headers {
      req = req.header(*k, *v);
    }
    if let Some(body) = body {
      req = req.body(body);
    }
    let resp = req.send().await?;
    let status = resp.status().as_u16();
    let mut out_headers = HashMap::new();
    for (name, value) in resp.headers() {
      if let Ok(v) = value.to_str() {
        out_headers.insert(name.as_str().to_ascii_lowercase(), v.to_string());
      }
    }
    let body = resp.bytes().await?;
    Ok(BackingResponse {
      status,
      headers: out_headers,
      body,
    })
  }
}

#[async_trait]
impl BackingClient for HttpBackingClient {
  async fn get(&self, path: &str, headers: &[(&str, &str)]) -> Result<BackingResponse, CoreError> {
    self.call(Method::GET, path, headers, None).await
  }

  async fn head(&self, path: &str, headers: &[(&str, &str)]) -> Result<BackingResponse, CoreError> {
    self.call(Method::HEAD, path, headers, None).await
  }

  async fn put(
    &self,
    path: &str,
    headers: &[(&str, &str)],
    body: Bytes,
  ) -> Result<BackingResponse, CoreError> {
    self.call(Method::PUT, path, headers, Some(body)).await
  }

  async fn post(
    &self,
    path: &str,
    headers: &[(&str, &str)],
    body: Bytes,
  ) -> Result<BackingResponse, CoreError> {
    self.call(Method::POST, path, headers, Some(body)).await
  }

  async fn delete(&self, path: &str, headers: &[(&str, &str)]) -> Result<BackingResponse, CoreError> {
    self.call(Method::DELETE, path, headers, None).await
  }
}

/// Wraps another `BackingClient`, marking every request so the downstream
/// storage stack bypasses its own auth check — the in-process
/// pre-authorized call style used for all access to the auth account
/// (spec §4.2).
#[derive(Clone)]
pub struct PreAuthClient<B: BackingClient> {
  inner: B,
}

impl<B: BackingClient> PreAuthClient<B> {
  pub fn new(inner: B) -> Self {
    Self { inner }
  }

  fn marked<'a>(headers: &[(&'a str, &'a str)]) -> Vec<(&'a str, &'a str)> {
    let mut marked = headers.to_vec();
    marked.push((PREAUTH_SENTINEL_HEADER, "true"));
    marked
  }
}

#[async_trait]
impl<B: BackingClient> BackingClient for PreAuthClient<B> {
  async fn get(&self, path: &str, headers: &[(&str, &str)]) -> Result<BackingResponse, CoreError> {
    self.inner.get(path, &Self::marked(headers)).await
  }

  async fn head(&self, path: &str, headers: &[(&str, &str)]) -> Result<BackingResponse, CoreError> {
    self.inner.head(path, &Self::marked(headers)).await
  }

  async fn put(
    &self,
    path: &str,
    headers: &[(&str, &str)],
    body: Bytes,
  ) -> Result<BackingResponse, CoreError> {
    self.inner.put(path, &Self::marked(headers), body).await
  }

  async fn post(
    &self,
    path: &str,
    headers: &[(&str, &str)],
    body: Bytes,
  ) -> Result<BackingResponse, CoreError> {
    self.inner.post(path, &Self::marked(headers), body).await
  }

  async fn delete(&self, path: &str, headers: &[(&str, &str)]) -> Result<BackingResponse, CoreError> {
    self.inner.delete(path, &Self::marked(headers)).await
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::sync::Mutex;

  #[derive(Default)]
  pub struct RecordingClient {
    pub calls: Mutex<Vec<(String, String, Vec<(String, String)>)>>,
    pub next_status: AtomicUsize,
  }

  #[async_trait]
  impl BackingClient for RecordingClient {
    async fn get(&self, path: &str, headers: &[(&str, &str)]) -> Result<BackingResponse, CoreError> {
      self.record("GET", path, headers)
    }
    async fn head(&self, path: &str, headers: &[(&str, &str)]) -> Result<BackingResponse, CoreError> {
      self.record("HEAD", path, headers)
    }
    async fn put(
      &self,
      path: &str,
      headers: &[(&str, &str)],
      _body: Bytes,
    ) -> Result<BackingResponse, CoreError> {
      self.record("PUT", path, headers)
    }
    async fn post(
      &self,
      path: &str,
      headers: &[(&str, &str)],
      _body: Bytes,
    ) -> Result<BackingResponse, CoreError> {
      self.record("POST", path, headers)
    }
    async fn delete(&self, path: &str, headers: &[(&str, &str)]) -> Result<BackingResponse, CoreError> {
      self.record("DELETE", path, headers)
    }
  }

  impl RecordingClient {
    fn record(&self, method: &str, path: &str, headers: &[(&str, &str)]) -> Result<BackingResponse, CoreError> {
      self.calls.lock().unwrap().push((
        method.to_string(),
        path.to_string(),
        headers.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
      ));
      let status = self.next_status.load(Ordering::SeqCst) as u16;
      Ok(BackingResponse {
        status: if status == 0 { 200 } else { status },
        headers: HashMap::new(),
        body: Bytes::new(),
      })
    }
  }

  #[tokio::test]
  async fn preauth_client_adds_sentinel_header() {
    let inner = RecordingClient::default();
    let wrapped = PreAuthClient::new(inner);
    wrapped.get("/v1/R_.auth/a", &[]).await.unwrap();
    let calls = wrapped.inner.calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert!(calls[0].2.iter().any(|(k, v)| k == PREAUTH_SENTINEL_HEADER && v == "true"));
  }

  #[test]
  fn response_classifies_status() {
    let resp = BackingResponse {
      status: 404,
      headers: HashMap::new(),
      body: Bytes::new(),
    };
    assert!(resp.is_not_found());
    assert!(!resp.is_success());
  }
}
