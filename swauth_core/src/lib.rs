pub mod admin_gate;
pub mod authorizer;
pub mod backing;
pub mod cache;
pub mod credential;
pub mod error;
pub mod identity;
pub mod middlewares;
pub mod models;
pub mod s3_compat;
pub mod services;
pub mod token_store;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use admin_gate::{AdminGate, AdminLevel, Escalation, SUPER_ADMIN_USER};
pub use authorizer::{Acl, AuthRequest, Decision, DenyReason, authorize};
pub use backing::{BackingClient, BackingResponse, HttpBackingClient, InternalTokenState, PreAuthClient};
pub use cache::{RedisSharedCache, SharedCache, TokenCache};
pub use credential::{CredentialType, StoredCredential};
pub use error::{CoreError, ErrorMapper};
pub use identity::{ClusterEndpoint, IdentityStore};
pub use models::{
  AccountCreated, AccountView, GroupEntry, IssuedToken, PutUserInput, ServiceEndpoints,
  ServicesDoc, TokenRecord, TokenValidation, UserRecord, group_string, is_reserved_name,
  is_valid_account_or_user_name,
};
pub use s3_compat::{S3AuthDetails, S3Authenticated, S3CompatAdapter};
pub use token_store::{IssueOptions, TokenStore};
