//! Admin API and token-grant handlers (spec §4.8's route table).

pub mod admin;
pub mod static_passthrough;
pub mod storage_proxy;
pub mod token_grant;

use swauth_core::AdminLevel;

use crate::error::AppError;

/// spec §4.7: 401 when no admin principal was established at all, 403 when
/// one was established but lacks the privilege the operation requires.
pub fn admin_error_for(level: &AdminLevel) -> AppError {
  if *level == AdminLevel::None {
    AppError::Unauthorized("admin credentials required".to_string())
  } else {
    AppError::Forbidden("insufficient admin privilege".to_string())
  }
}
