//! Sign-in through external identity providers.
//!
//! A login runs `login → provider → callback`. The callback exchanges the
//! authorization code, verifies the returned identity token against the
//! provider's published keys, binds the identity to a user record and sets
//! a signed session cookie. Sessions are stateless: the cookie carries the
//! user ID, roles and provider, and nothing is stored server-side.
//!
//! Roles live on the user record. A session carries the roles it was issued
//! with; `GET /auth/session` re-issues the cookie when they have changed.

pub mod callback;
pub mod db;
pub mod jwks;
pub mod middleware;
pub mod provider_client;
pub mod redirect;
pub mod routes;
pub mod session;
pub mod verify;

#[cfg(test)]
pub(crate) mod test_support;

use gatehouse_platform_access::{ProviderRegistry, UserStore};
use std::sync::Arc;

pub use callback::{CallbackFlow, CallbackOutcome, CallbackQuery};
pub use db::PgUserStore;
pub use jwks::KeySetCache;
pub use middleware::{AuthRejection, AuthenticatedUser, Credential, RequireAuth};
pub use provider_client::{HttpProviderClient, ProviderClient};
pub use session::SessionCookies;
pub use verify::TokenVerifier;

/// Shared application state.
pub struct AppState {
    /// Configured identity providers.
    pub registry: Arc<ProviderRegistry>,
    /// Outbound calls to provider endpoints.
    pub client: Arc<dyn ProviderClient>,
    /// Identity token verification over cached provider keys.
    pub verifier: TokenVerifier,
    /// User records.
    pub store: Arc<dyn UserStore>,
    /// Session cookie signing and parsing.
    pub sessions: SessionCookies,
    /// Where browsers return after login and logout.
    pub frontend_origin: String,
    /// This gateway's external origin, when fixed by configuration.
    pub public_base_url: Option<String>,
}
