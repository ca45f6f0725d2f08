//! C7 AdminGate: classifies the admin-API caller and enforces privilege
//! escalation rules on writes (spec §4.7).

use std::sync::Arc;

use axum::http::HeaderMap;

use crate::backing::BackingClient;
use crate::credential;
use crate::error::CoreError;
use crate::identity::IdentityStore;

pub const SUPER_ADMIN_USER: &str = ".super_admin";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminLevel {
  SuperAdmin,
  ResellerAdmin,
  AccountAdmin(String),
  /// Authenticated as exactly the target user (self-key-change candidate).
  Self_,
  None,
}

/// Privileges a PUT-user request is asking to grant, used to validate
/// escalation (spec §4.7 `is_self_key_change`).
#[derive(Debug, Clone, Default)]
pub struct Escalation {
  pub grant_admin: bool,
  pub grant_reseller_admin: bool,
}

pub struct AdminGate<B: BackingClient> {
  identity: Arc<IdentityStore<B>>,
  super_admin_key: Option<String>,
}

impl<B: BackingClient> AdminGate<B> {
  pub fn new(identity: Arc<IdentityStore<B>>, super_admin_key: Option<String>) -> Self {
    Self {
      identity,
      super_admin_key,
    }
  }

  /// Classifies `x-auth-admin-user`/`x-auth-admin-key` against the target
  /// `(account, user)` the caller is operating on, if any.
  pub async fn classify(
    &self,
    headers: &HeaderMap,
    target: Option<(&str, &str)>,
  ) -> Result<AdminLevel, CoreError> {
    let admin_user = header_str(headers, "x-auth-admin-user");
    let admin_key = header_str(headers, "x-auth-admin-key");
    let (Some(admin_user), Some(admin_key)) = (admin_user, admin_key) else {
      return Ok(AdminLevel::None);
    };

    if admin_user == SUPER_ADMIN_USER {
      return match &self.super_admin_key {
        Some(configured) if configured == &admin_key => Ok(AdminLevel::SuperAdmin),
        _ => Ok(AdminLevel::None),
      };
    }

    let Some((caller_account, caller_user)) = admin_user.split_once(':') else {
      return Ok(AdminLevel::None);
    };

    let record = match self.identity.get_user(caller_account, caller_user).await {
      Ok(record) => record,
      Err(CoreError::NotFound(_)) => return Ok(AdminLevel::None),
      Err(err) => return Err(err),
    };
    if !credential::verify(&admin_key, &record.auth)? {
      return Ok(AdminLevel::None);
    }

    if record.is_reseller_admin() {
      return Ok(AdminLevel::ResellerAdmin);
    }

    if let Some((target_account, target_user)) = target {
      if caller_account == target_account && caller_user == target_user {
        return Ok(AdminLevel::Self_);
      }
      if record.is_account_admin() {
        return Ok(AdminLevel::AccountAdmin(caller_account.to_string()));
      }
      // Authenticated, but neither the target nor an admin over it.
      return Ok(AdminLevel::None);
    }

    if record.is_account_admin() {
      return Ok(AdminLevel::AccountAdmin(caller_account.to_string()));
    }

    Ok(AdminLevel::Self_)
  }

  pub fn is_reseller_admin(level: &AdminLevel) -> bool {
    matches!(level, AdminLevel::SuperAdmin | AdminLevel::ResellerAdmin)
  }

  pub fn is_account_admin(level: &AdminLevel, account: &str) -> bool {
    match level {
      AdminLevel::SuperAdmin | AdminLevel::ResellerAdmin => true,
      AdminLevel::AccountAdmin(a) => a == account,
      _ => false,
    }
  }

  pub fn can_grant_admin(level: &AdminLevel) -> bool {
    Self::is_reseller_admin(level) || matches!(level, AdminLevel::AccountAdmin(_))
  }

  pub fn can_grant_reseller_admin(level: &AdminLevel) -> bool {
    matches!(level, AdminLevel::SuperAdmin)
  }

  /// True when `level` authenticates exactly as `target` and the requested
  /// escalation does not exceed the caller's own privilege (spec §4.7).
  pub fn is_self_key_change(level: &AdminLevel, escalation: &Escalation) -> bool {
    if !matches!(level, AdminLevel::Self_) {
      return false;
    }
    if escalation.grant_reseller_admin && !Self::can_grant_reseller_admin(level) {
      return false;
    }
    if escalation.grant_admin && !Self::can_grant_admin(level) {
      return false;
    }
    true
  }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<String> {
  headers.get(name)?.to_str().ok().map(str::to_string)
}
