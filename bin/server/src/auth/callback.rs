//! The OIDC callback pipeline.
//!
//! `code → token exchange → id_token verification → identity → account →
//! session`. Every step either advances or ends the flow with an
//! [`AuthFailure`]; either way the browser is redirected back to the
//! front-end, with a session cookie on success and `authError` on failure.

use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use gatehouse_core::UserId;
use gatehouse_platform_access::{
    AccountLinker, AuthFailure, ProviderRegistry, TokenRejection, UserStore, resolve_identity,
};
use serde::Deserialize;
use tracing::{error, info, warn};

use super::provider_client::{ProviderClient, ProviderClientError};
use super::redirect::{resolve_return_to, with_auth_error};
use super::session::SessionCookies;
use super::verify::TokenVerifier;

/// Query parameters of `GET /auth/{provider}/callback`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackQuery {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
}

/// How a callback ended.
#[derive(Debug)]
pub enum CallbackOutcome {
    SignedIn {
        location: String,
        cookie: Cookie<'static>,
        user_id: UserId,
        created: bool,
    },
    Failed {
        location: String,
        failure: AuthFailure,
    },
}

impl CallbackOutcome {
    /// Where the browser is sent.
    #[must_use]
    pub fn location(&self) -> &str {
        match self {
            Self::SignedIn { location, .. } | Self::Failed { location, .. } => location,
        }
    }
}

impl IntoResponse for CallbackOutcome {
    fn into_response(self) -> Response {
        match self {
            Self::SignedIn {
                location, cookie, ..
            } => (
                StatusCode::FOUND,
                CookieJar::new().add(cookie),
                [(header::LOCATION, location)],
            )
                .into_response(),
            Self::Failed { location, .. } => {
                (StatusCode::FOUND, [(header::LOCATION, location)]).into_response()
            }
        }
    }
}

struct SignedIn {
    cookie: Cookie<'static>,
    user_id: UserId,
    created: bool,
}

/// One callback's view of the shared services.
pub struct CallbackFlow<'a> {
    pub registry: &'a ProviderRegistry,
    pub client: &'a dyn ProviderClient,
    pub verifier: &'a TokenVerifier,
    pub store: &'a dyn UserStore,
    pub sessions: &'a SessionCookies,
    pub frontend_origin: &'a str,
}

impl CallbackFlow<'_> {
    /// Runs the callback for `provider`.
    ///
    /// `gateway_origin` is this service's external origin; the provider
    /// requires the token exchange to repeat the exact `redirect_uri` used
    /// at login.
    pub async fn run(
        &self,
        provider: &str,
        query: &CallbackQuery,
        gateway_origin: &str,
    ) -> CallbackOutcome {
        let location = resolve_return_to(query.state.as_deref(), self.frontend_origin);

        match self.sign_in(provider, query, gateway_origin).await {
            Ok(signed_in) => {
                info!(
                    provider,
                    user_id = %signed_in.user_id,
                    created = signed_in.created,
                    "signed in"
                );
                CallbackOutcome::SignedIn {
                    location,
                    cookie: signed_in.cookie,
                    user_id: signed_in.user_id,
                    created: signed_in.created,
                }
            }
            Err(failure) => {
                if failure.is_classified() {
                    warn!(provider, error_code = failure.code(), error = %failure, "callback rejected");
                } else {
                    error!(provider, error_code = failure.code(), error = %failure, "callback failed");
                }
                CallbackOutcome::Failed {
                    location: with_auth_error(&location, &failure),
                    failure,
                }
            }
        }
    }

    async fn sign_in(
        &self,
        provider: &str,
        query: &CallbackQuery,
        gateway_origin: &str,
    ) -> Result<SignedIn, AuthFailure> {
        let code = query
            .code
            .as_deref()
            .filter(|code| !code.is_empty())
            .ok_or(AuthFailure::MissingCode)?;
        let scheme = self.registry.scheme_for(provider)?;

        let redirect_uri = scheme.redirect_uri(gateway_origin);
        let tokens = self
            .client
            .exchange_code(scheme, code, &redirect_uri)
            .await
            .map_err(|e| match e {
                ProviderClientError::Status { .. } | ProviderClientError::Transport { .. } => {
                    warn!(%provider, error = %e, "token exchange failed");
                    AuthFailure::TokenExchangeFailed
                }
                ProviderClientError::Decode { .. } => AuthFailure::AuthenticationFailed {
                    details: e.to_string(),
                },
            })?;
        let id_token = tokens
            .id_token
            .filter(|token| !token.is_empty())
            .ok_or(AuthFailure::MissingIdToken)?;

        let claims = self
            .verifier
            .verify(&id_token, scheme)
            .await
            .map_err(|rejection| match rejection {
                TokenRejection::KeySetUnavailable { .. } => {
                    AuthFailure::AuthenticationFailed {
                        details: rejection.to_string(),
                    }
                }
                rejection => AuthFailure::InvalidToken(rejection),
            })?;

        let identity =
            resolve_identity(&claims, scheme.claims(), scheme.email_verified_policy())?;
        let account = AccountLinker::new(self.store)
            .link_or_create(&identity, scheme.id())
            .await?;

        let cookie = self
            .sessions
            .issue(account.user_id, &account.roles, scheme.id().as_str())?;
        Ok(SignedIn {
            cookie,
            user_id: account.user_id,
            created: account.created,
        })
    }
}
