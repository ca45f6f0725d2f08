//! Parses a classic AWS S3 v2 `Authorization: AWS <access_key>:<signature>`
//! header into `S3AuthDetails` before the router classifies the request
//! (spec §4.9). Runs ahead of `auth_middleware` in the layer stack.

use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;

use swauth_core::S3AuthDetails;

pub async fn s3_detect_middleware(mut req: Request, next: Next) -> Response {
  if let Some(details) = parse(&req) {
    req.extensions_mut().insert(details);
  }
  next.run(req).await
}

fn parse(req: &Request) -> Option<S3AuthDetails> {
  let header = req.headers().get(axum::http::header::AUTHORIZATION)?.to_str().ok()?;
  let rest = header.strip_prefix("AWS ")?;
  let (access_key, signature) = rest.split_once(':')?;

  let content_md5 = header_str(req, "content-md5").unwrap_or_default();
  let content_type = header_str(req, "content-type").unwrap_or_default();
  let date = header_str(req, "date").unwrap_or_default();
  let path_info = req.uri().path().to_string();

  // Canonicalized resource is path-only: this deployment does not forward
  // sub-resource query strings (`?acl`, `?location`, ...) into signing.
  let string_to_sign = format!("{}\n{}\n{}\n{}\n{}", req.method(), content_md5, content_type, date, path_info);

  Some(S3AuthDetails {
    access_key: access_key.to_string(),
    signature: signature.to_string(),
    string_to_sign,
    path_info,
  })
}

fn header_str(req: &Request, name: &str) -> Option<String> {
  req.headers().get(name)?.to_str().ok().map(str::to_string)
}
