mod bearer_token;
mod request_id;

pub use bearer_token::{MAX_TOKEN_LENGTH, TokenCandidate, extract_bearer_token};
pub use request_id::{REQUEST_ID_HEADER, request_id_middleware};
