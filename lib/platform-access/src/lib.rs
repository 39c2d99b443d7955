//! Identity providers, account linking and sessions for gatehouse.
//!
//! This crate holds the transport-independent half of the login flow:
//! - Provider descriptions and lookup (`ProviderRegistry`, `ProviderScheme`)
//! - Identity extraction from verified claims (`resolve_identity`)
//! - Find-or-create of user records (`AccountLinker` over a `UserStore`)
//! - Stateless session tokens (`SessionIssuer`)
//! - The error vocabulary shared with the HTTP layer (`AuthFailure`)
//!
//! # Example
//!
//! ```
//! use gatehouse_platform_access::{RoleSet, SessionIssuer, SESSION_TTL_SECONDS};
//! use gatehouse_core::UserId;
//!
//! let issuer = SessionIssuer::new("secret", SESSION_TTL_SECONDS).unwrap();
//! let user_id = UserId::new();
//! let token = issuer.issue(user_id, &RoleSet::user(), "google").unwrap();
//!
//! let session = issuer.verify(&token).unwrap();
//! assert_eq!(session.user_id, user_id);
//! assert!(session.roles.has_access());
//! ```

pub mod error;
pub mod identity;
pub mod linker;
#[cfg(any(test, feature = "testing"))]
pub mod memory;
pub mod provider;
pub mod role;
pub mod session;
pub mod user;

pub use error::{
    AuthFailure, ConfigError, ConflictKind, LinkError, ResolveError, SessionError, StoreError,
    TokenRejection, UnknownProvider,
};
pub use identity::{NormalizedIdentity, VerifiedClaims, resolve_identity};
pub use linker::{AccountLinker, LinkedAccount, UserStore};
pub use provider::{
    ClaimMapping, EmailVerifiedPolicy, IssuerPolicy, ProviderCredentials, ProviderId,
    ProviderRegistry, ProviderScheme, ProvidersConfig,
};
pub use role::{Role, RoleSet};
pub use session::{SESSION_TTL_SECONDS, SessionIssuer, VerifiedSession};
pub use user::User;
