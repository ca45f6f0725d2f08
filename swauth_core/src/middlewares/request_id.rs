use axum::{extract::Request, http::HeaderValue, middleware::Next, response::Response};

use tracing::warn;
use uuid::Uuid;

/// HTTP header for request ID
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/**
 * Request ID Middleware
 *
 * This middleware is responsible for generating and propagating a unique request ID for each HTTP request.
 * If the request already contains an x-request-id header, it uses that value; otherwise, it generates a new UUID v4.
 * The request ID is added to both request and response headers for request tracing and debugging purposes.
 *
 */
pub async fn request_id_middleware(mut req: Request, next: Next) -> Response {
  // Check if request already has an ID, if not generate one
  let req_id = if req.headers().get(REQUEST_ID_HEADER).is_none() {
    // Generate a new request ID using UUID v4
    let req_id = Uuid::new_v4().to_string();

    // Insert the request ID into headers
    if let Ok(header_value) = HeaderValue::from_str(&req_id) {
      req.headers_mut().insert(REQUEST_ID_HEADER, header_value);
    }
    Some(req_id)
  } else {
    None
  };

  let mut response = next.run(req).await;

  // Add request ID to response headers if we generated one
  if let Some(id) = req_id {
    if let Ok(header_value) = HeaderValue::from_str(&id) {
      response
        .headers_mut()
        .insert(REQUEST_ID_HEADER, header_value);
    }
  }

  response
}
