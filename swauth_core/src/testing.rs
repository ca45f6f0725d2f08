//! In-memory fakes for `BackingClient` and `SharedCache`, so the rest of
//! this crate is unit-testable without a running backing cluster (spec §1.4).

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;

use crate::backing::{BackingClient, BackingResponse};
use crate::cache::SharedCache;
use crate::error::CoreError;

#[derive(Debug, Clone)]
struct StoredObject {
  headers: HashMap<String, String>,
  body: Bytes,
}

/// An in-memory object store keyed by path, good enough to exercise
/// `IdentityStore`/`TokenStore` logic against realistic GET/PUT/HEAD/DELETE
/// semantics (2xx/404 status classes, header echoing).
#[derive(Default)]
pub struct InMemoryBackingClient {
  objects: Mutex<HashMap<String, StoredObject>>,
  /// Paths (containers) explicitly PUT, so GET-as-listing can distinguish
  /// "container exists, empty" from "container missing".
  containers: Mutex<HashMap<String, HashMap<String, String>>>,
}

impl InMemoryBackingClient {
  pub fn new() -> Self {
    Self::default()
  }

  fn not_found() -> BackingResponse {
    BackingResponse {
      status: 404,
      headers: HashMap::new(),
      body: Bytes::new(),
    }
  }

  fn ok(headers: HashMap<String, String>, body: Bytes) -> BackingResponse {
    BackingResponse {
      status: 200,
      headers,
      body,
    }
  }

  /// Lists object names directly under `container_path` (no nested paths),
  /// for tests that exercise account/user listings.
  pub fn list_children(&self, container_path: &str) -> Vec<String> {
    let prefix = format!("{}/", container_path.trim_end_matches('/'));
    self
      .objects
      .lock()
      .unwrap()
      .keys()
      .filter_map(|k| k.strip_prefix(&prefix))
      .filter(|rest| !rest.contains('/'))
      .map(str::to_string)
      .collect()
  }
}

#[async_trait]
impl BackingClient for InMemoryBackingClient {
  async fn get(&self, path: &str, _headers: &[(&str, &str)]) -> Result<BackingResponse, CoreError> {
    let objects = self.objects.lock().unwrap();
    match objects.get(path) {
      Some(obj) => Ok(Self::ok(obj.headers.clone(), obj.body.clone())),
      None => Ok(Self::not_found()),
    }
  }

  async fn head(&self, path: &str, _headers: &[(&str, &str)]) -> Result<BackingResponse, CoreError> {
    if let Some(meta) = self.containers.lock().unwrap().get(path) {
      return Ok(Self::ok(meta.clone(), Bytes::new()));
    }
    let objects = self.objects.lock().unwrap();
    match objects.get(path) {
      Some(obj) => Ok(Self::ok(obj.headers.clone(), Bytes::new())),
      None => Ok(Self::not_found()),
    }
  }

  async fn put(
    &self,
    path: &str,
    headers: &[(&str, &str)],
    body: Bytes,
  ) -> Result<BackingResponse, CoreError> {
    let header_map: HashMap<String, String> = headers
      .iter()
      .map(|(k, v)| (k.to_ascii_lowercase(), v.to_string()))
      .collect();
    // Heuristic shared with the real deployment's convention: a PUT with an
    // empty body and no object-looking path component is a container create.
    if body.is_empty() && !path.rsplit('/').next().unwrap_or_default().contains('.') {
      self
        .containers
        .lock()
        .unwrap()
        .entry(path.to_string())
        .or_default()
        .extend(header_map.clone());
    }
    self.objects.lock().unwrap().insert(
      path.to_string(),
      StoredObject {
        headers: header_map,
        body,
      },
    );
    Ok(BackingResponse {
      status: 201,
      headers: HashMap::new(),
      body: Bytes::new(),
    })
  }

  async fn post(
    &self,
    path: &str,
    headers: &[(&str, &str)],
    _body: Bytes,
  ) -> Result<BackingResponse, CoreError> {
    let mut containers = self.containers.lock().unwrap();
    let entry = containers.entry(path.to_string()).or_default();
    for (k, v) in headers {
      entry.insert(k.to_ascii_lowercase(), v.to_string());
    }
    drop(containers);
    if let Some(obj) = self.objects.lock().unwrap().get_mut(path) {
      for (k, v) in headers {
        obj.headers.insert(k.to_ascii_lowercase(), v.to_string());
      }
    }
    Ok(BackingResponse {
      status: 202,
      headers: HashMap::new(),
      body: Bytes::new(),
    })
  }

  async fn delete(&self, path: &str, _headers: &[(&str, &str)]) -> Result<BackingResponse, CoreError> {
    let existed_object = self.objects.lock().unwrap().remove(path).is_some();
    let existed_container = self.containers.lock().unwrap().remove(path).is_some();
    if existed_object || existed_container {
      Ok(BackingResponse {
        status: 204,
        headers: HashMap::new(),
        body: Bytes::new(),
      })
    } else {
      Ok(Self::not_found())
    }
  }
}

#[derive(Default)]
pub struct InMemorySharedCache {
  entries: Mutex<HashMap<String, String>>,
}

#[async_trait]
impl SharedCache for InMemorySharedCache {
  async fn get_string(&self, key: &str) -> Result<Option<String>, CoreError> {
    Ok(self.entries.lock().unwrap().get(key).cloned())
  }

  async fn set_string_ex(&self, key: &str, value: &str, _ttl_seconds: u64) -> Result<(), CoreError> {
    self
      .entries
      .lock()
      .unwrap()
      .insert(key.to_string(), value.to_string());
    Ok(())
  }

  async fn del(&self, key: &str) -> Result<(), CoreError> {
    self.entries.lock().unwrap().remove(key);
    Ok(())
  }
}
