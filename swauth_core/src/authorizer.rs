//! C6 Authorizer: request/identity -> allow/deny decision (spec §4.6).

use http::Method;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferrerRule {
  pub allow: bool,
  pub pattern: String,
}

/// Parsed `x-container-read`/`x-container-write` ACL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Acl {
  pub referrers: Vec<ReferrerRule>,
  pub groups: Vec<String>,
  pub allow_listings_for_referrers: bool,
}

impl Acl {
  /// Parses the comma-separated ACL grammar: `.r:pattern` (referrer rule,
  /// `-` prefix denies), `.rlistings` (allow container listings for
  /// referrers), anything else is a group name.
  pub fn parse(header_value: &str) -> Acl {
    let mut acl = Acl::default();
    for entry in header_value.split(',').map(str::trim).filter(|e| !e.is_empty()) {
      if let Some(pattern) = entry.strip_prefix(".r:") {
        if let Some(denied) = pattern.strip_prefix('-') {
          acl.referrers.push(ReferrerRule {
            allow: false,
            pattern: denied.to_string(),
          });
        } else {
          acl.referrers.push(ReferrerRule {
            allow: true,
            pattern: pattern.to_string(),
          });
        }
      } else if entry == ".rlistings" {
        acl.allow_listings_for_referrers = true;
      } else {
        acl.groups.push(entry.to_string());
      }
    }
    acl
  }

  /// True if `referer` matches an allow rule and no deny rule with equal or
  /// higher specificity.
  fn referrer_allowed(&self, referer: Option<&str>) -> bool {
    let Some(referer) = referer else { return false };
    let host = extract_host(referer);
    let mut allowed = false;
    for rule in &self.referrers {
      if pattern_matches(&rule.pattern, &host) {
        allowed = rule.allow;
      }
    }
    allowed
  }
}

fn extract_host(referer: &str) -> String {
  referer
    .split("://")
    .nth(1)
    .unwrap_or(referer)
    .split('/')
    .next()
    .unwrap_or("")
    .to_string()
}

/// `pattern` is either `*` (matches everything) or a domain suffix such as
/// `example.com` (matches `example.com` and `www.example.com`).
fn pattern_matches(pattern: &str, host: &str) -> bool {
  if pattern == "*" {
    return true;
  }
  host == pattern || host.ends_with(&format!(".{pattern}"))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenyReason {
  Unauthorized,
  Forbidden,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
  Allow { swift_owner: bool },
  Deny(DenyReason),
}

pub struct AuthRequest<'a> {
  pub account: &'a str,
  pub container: Option<&'a str>,
  pub object: Option<&'a str>,
  pub method: &'a Method,
  pub acl: &'a Acl,
  pub principal_groups: &'a [String],
  pub referer: Option<&'a str>,
  pub sync_key_header: Option<&'a str>,
  pub configured_sync_key: Option<&'a str>,
  pub timestamp_header: Option<&'a str>,
  pub remote_addr: &'a str,
  pub reseller_prefix: &'a str,
  pub sync_hosts: &'a [String],
}

/// Implements the decision tree of spec §4.6.
pub fn authorize(req: &AuthRequest) -> Decision {
  if !req.reseller_prefix.is_empty() && !req.account.starts_with(req.reseller_prefix) {
    return Decision::Deny(DenyReason::Forbidden);
  }

  // A reseller-admin owns every account except the bare reseller prefix
  // itself and any reserved, dot-prefixed internal account (`.auth`,
  // `.token_3`, `.webadmin`, ...) immediately following it.
  let is_bare_prefix_account = req.account == req.reseller_prefix;
  let is_reserved_internal_account = req.account.as_bytes().get(req.reseller_prefix.len()) == Some(&b'.');
  if req.principal_groups.iter().any(|g| g == ".reseller_admin")
    && !is_bare_prefix_account
    && !is_reserved_internal_account
  {
    return Decision::Allow { swift_owner: true };
  }

  let is_bare_account_write = req.container.is_none()
    && req.object.is_none()
    && matches!(*req.method, Method::PUT | Method::DELETE);
  if req.principal_groups.iter().any(|g| g == req.account) && !is_bare_account_write {
    return Decision::Allow { swift_owner: true };
  }

  if let (Some(sync_key), Some(configured)) = (req.sync_key_header, req.configured_sync_key) {
    if sync_key == configured
      && req.timestamp_header.is_some()
      && req.sync_hosts.iter().any(|h| h == req.remote_addr)
    {
      return Decision::Allow { swift_owner: false };
    }
  }

  if req.acl.referrer_allowed(req.referer) && (req.object.is_some() || req.acl.allow_listings_for_referrers) {
    return Decision::Allow { swift_owner: false };
  }
  if req.principal_groups.is_empty() {
    return Decision::Deny(DenyReason::Unauthorized);
  }

  if req
    .principal_groups
    .iter()
    .any(|g| req.acl.groups.iter().any(|acl_group| acl_group == g))
  {
    return Decision::Allow { swift_owner: false };
  }

  Decision::Deny(DenyReason::Forbidden)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn base_req<'a>(acl: &'a Acl, groups: &'a [String], sync_hosts: &'a [String]) -> AuthRequest<'a> {
    AuthRequest {
      account: "AUTH_cfa",
      container: Some("c"),
      object: None,
      method: &Method::GET,
      acl,
      principal_groups: groups,
      referer: None,
      sync_key_header: None,
      configured_sync_key: None,
      timestamp_header: None,
      remote_addr: "10.0.0.1",
      reseller_prefix: "AUTH_",
      sync_hosts,
    }
  }

  #[test]
  fn wrong_reseller_prefix_is_forbidden() {
    let acl = Acl::default();
    let groups = vec!["act".to_string()];
    let mut req = base_req(&acl, &groups, &[]);
    req.account = "OTHER_cfa";
    assert_eq!(authorize(&req), Decision::Deny(DenyReason::Forbidden));
  }

  #[test]
  fn reseller_admin_allowed_with_swift_owner() {
    let acl = Acl::default();
    let groups = vec![".reseller_admin".to_string()];
    let req = base_req(&acl, &groups, &[]);
    assert_eq!(authorize(&req), Decision::Allow { swift_owner: true });
  }

  #[test]
  fn reseller_admin_denied_on_any_dot_prefixed_internal_account() {
    let acl = Acl::default();
    let groups = vec![".reseller_admin".to_string()];
    for reserved in ["AUTH_.auth", "AUTH_.token_3", "AUTH_.webadmin"] {
      let mut req = base_req(&acl, &groups, &[]);
      req.account = reserved;
      req.container = None;
      assert_eq!(
        authorize(&req),
        Decision::Deny(DenyReason::Forbidden),
        "{reserved} must not be granted swift_owner"
      );
    }
  }

  #[test]
  fn reseller_admin_denied_on_bare_reseller_prefix_account() {
    let acl = Acl::default();
    let groups = vec![".reseller_admin".to_string()];
    let mut req = base_req(&acl, &groups, &[]);
    req.account = "AUTH_";
    req.container = None;
    assert_eq!(authorize(&req), Decision::Deny(DenyReason::Forbidden));
  }

  #[test]
  fn account_admin_allowed_except_account_level_write() {
    let acl = Acl::default();
    let groups = vec!["AUTH_cfa".to_string()];
    let mut req = base_req(&acl, &groups, &[]);
    assert_eq!(authorize(&req), Decision::Allow { swift_owner: true });

    req.container = None;
    req.object = None;
    req.method = &Method::PUT;
    assert_eq!(authorize(&req), Decision::Deny(DenyReason::Forbidden));
  }

  #[test]
  fn container_sync_allows_matching_key_and_host() {
    let acl = Acl::default();
    let groups: Vec<String> = vec![];
    let sync_hosts = vec!["127.0.0.1".to_string()];
    let mut req = base_req(&acl, &groups, &sync_hosts);
    req.method = &Method::DELETE;
    req.container = Some("c");
    req.object = Some("o");
    req.sync_key_header = Some("secret");
    req.configured_sync_key = Some("secret");
    req.timestamp_header = Some("123.456");
    req.remote_addr = "127.0.0.1";
    assert_eq!(authorize(&req), Decision::Allow { swift_owner: false });
  }

  #[test]
  fn referrer_rule_allows_anonymous_object_access() {
    let acl = Acl::parse(".r:example.com,.rlistings");
    let groups: Vec<String> = vec![];
    let mut req = base_req(&acl, &groups, &[]);
    req.object = Some("o");
    req.referer = Some("http://www.example.com/index.html");
    assert_eq!(authorize(&req), Decision::Allow { swift_owner: false });
  }

  #[test]
  fn referrer_rule_denies_without_matching_referer() {
    let acl = Acl::parse(".r:example.com,.rlistings");
    let groups: Vec<String> = vec![];
    let mut req = base_req(&acl, &groups, &[]);
    req.object = Some("o");
    req.referer = Some("http://evil.example/");
    assert_eq!(authorize(&req), Decision::Deny(DenyReason::Unauthorized));
  }

  #[test]
  fn acl_group_membership_allows() {
    let acl = Acl::parse("act:usr");
    let groups = vec!["act:usr".to_string()];
    let req = base_req(&acl, &groups, &[]);
    assert_eq!(authorize(&req), Decision::Allow { swift_owner: false });
  }

  #[test]
  fn no_match_is_forbidden() {
    let acl = Acl::parse("act:other");
    let groups = vec!["act:usr".to_string()];
    let req = base_req(&acl, &groups, &[]);
    assert_eq!(authorize(&req), Decision::Deny(DenyReason::Forbidden));
  }

  #[test]
  fn acl_parse_splits_referrers_groups_and_listings() {
    let acl = Acl::parse(".r:example.com,.r:-evil.com,.rlistings,act:usr");
    assert_eq!(acl.referrers.len(), 2);
    assert!(acl.referrers[0].allow);
    assert!(!acl.referrers[1].allow);
    assert!(acl.allow_listings_for_referrers);
    assert_eq!(acl.groups, vec!["act:usr".to_string()]);
  }
}
