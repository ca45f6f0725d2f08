//! Exponential-backoff retry helper for transient `CoreError::Internal`
//! failures against the backing store or the shared cache (spec §5: each
//! remote call is an independent suspension point with its own timeout).

use std::time::Duration;
use tokio::time::sleep;

use crate::error::CoreError;

#[derive(Debug, Clone)]
pub struct ExponentialBackoffRetry {
  pub base_delay_ms: u64,
  pub max_retries: u32,
  pub backoff_multiplier: f64,
  pub max_delay_ms: u64,
}

impl Default for ExponentialBackoffRetry {
  fn default() -> Self {
    Self {
      base_delay_ms: 200,
      max_retries: 2,
      backoff_multiplier: 2.0,
      max_delay_ms: 5_000,
    }
  }
}

impl ExponentialBackoffRetry {
  pub fn new(base_delay_ms: u64, max_retries: u32) -> Self {
    Self {
      base_delay_ms,
      max_retries,
      ..Default::default()
    }
  }

  fn calculate_delay(&self, attempt: u32) -> Duration {
    let delay_ms = (self.base_delay_ms as f64 * self.backoff_multiplier.powi(attempt as i32)) as u64;
    Duration::from_millis(delay_ms.min(self.max_delay_ms))
  }

  /// Retries `operation` while it returns a retryable `CoreError`
  /// (`CoreError::is_retryable`), giving up after `max_retries` attempts.
  pub async fn retry<F, Fut, T>(&self, operation: F) -> Result<T, CoreError>
  where
    F: Fn() -> Fut + Send + Sync,
    Fut: std::future::Future<Output = Result<T, CoreError>> + Send,
    T: Send,
  {
    let mut last_error: Option<CoreError> = None;

    for attempt in 0..=self.max_retries {
      match operation().await {
        Ok(result) => return Ok(result),
        Err(error) => {
          if !error.is_retryable() {
            return Err(error);
          }
          last_error = Some(error.clone());
          if attempt == self.max_retries {
            return Err(error);
          }
          let delay = self.calculate_delay(attempt);
          tracing::warn!(attempt = attempt + 1, %error, ?delay, "retrying backing-store call");
          sleep(delay).await;
        }
      }
    }

    Err(last_error.unwrap_or_else(|| CoreError::Internal("max retries exceeded".to_string())))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::Arc;
  use std::sync::atomic::{AtomicU32, Ordering};

  #[tokio::test]
  async fn succeeds_after_transient_failures() {
    let retry = ExponentialBackoffRetry::new(10, 3);
    let counter = Arc::new(AtomicU32::new(0));
    let counter_clone = counter.clone();

    let result: Result<&str, CoreError> = retry
      .retry(|| {
        let counter = counter_clone.clone();
        async move {
          let count = counter.fetch_add(1, Ordering::SeqCst);
          if count < 2 {
            Err(CoreError::Internal("transient".to_string()))
          } else {
            Ok("success")
          }
        }
      })
      .await;

    assert_eq!(result.unwrap(), "success");
    assert_eq!(counter.load(Ordering::SeqCst), 3);
  }

  #[tokio::test]
  async fn non_retryable_error_returns_immediately() {
    let retry = ExponentialBackoffRetry::new(10, 3);
    let counter = Arc::new(AtomicU32::new(0));
    let counter_clone = counter.clone();

    let result: Result<&str, CoreError> = retry
      .retry(|| {
        let counter = counter_clone.clone();
        async move {
          counter.fetch_add(1, Ordering::SeqCst);
          Err(CoreError::BadRequest("malformed".to_string()))
        }
      })
      .await;

    assert!(result.is_err());
    assert_eq!(counter.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn exhausts_retries_on_persistent_failure() {
    let retry = ExponentialBackoffRetry::new(5, 2);
    let counter = Arc::new(AtomicU32::new(0));
    let counter_clone = counter.clone();

    let result: Result<&str, CoreError> = retry
      .retry(|| {
        let counter = counter_clone.clone();
        async move {
          counter.fetch_add(1, Ordering::SeqCst);
          Err(CoreError::Internal("persistent".to_string()))
        }
      })
      .await;

    assert!(result.is_err());
    assert_eq!(counter.load(Ordering::SeqCst), 3);
  }
}
