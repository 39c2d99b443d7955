//! Authentication extractors for Axum.

use axum::{
    Json,
    extract::{FromRef, FromRequestParts},
    http::{HeaderMap, StatusCode, header, request::Parts},
    response::{IntoResponse, Response},
};
use gatehouse_platform_access::{ProviderId, StoreError, User, resolve_identity};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, error};

use super::AppState;

/// How the caller proved its identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Credential {
    /// The gateway's own session cookie.
    SessionCookie,
    /// A provider-issued identity token in `Authorization: Bearer`.
    BearerToken(ProviderId),
}

/// An authenticated, active user.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user: User,
    pub credential: Credential,
}

/// Extractor for requiring an authenticated user.
///
/// Accepts a bearer identity token when an `Authorization` header is
/// present, otherwise the session cookie. The user must exist and be active.
pub struct RequireAuth(pub AuthenticatedUser);

impl<S> FromRequestParts<S> for RequireAuth
where
    Arc<AppState>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app_state = Arc::<AppState>::from_ref(state);

        let (user, credential) = match bearer_token(&parts.headers) {
            Some(token) => {
                let user = user_for_bearer(&app_state, token).await?;
                let provider = user.provider();
                (user, Credential::BearerToken(provider))
            }
            None => {
                let session = app_state
                    .sessions
                    .verify_header(cookie_header(&parts.headers).as_deref())
                    .ok_or(AuthRejection::NotAuthenticated)?;
                let user = app_state
                    .store
                    .find_by_id(session.user_id)
                    .await
                    .map_err(AuthRejection::from)?
                    .ok_or(AuthRejection::NotAuthenticated)?;
                (user, Credential::SessionCookie)
            }
        };

        if !user.is_active() {
            debug!(user_id = %user.id(), "rejecting inactive user");
            return Err(AuthRejection::NotAuthenticated);
        }
        Ok(RequireAuth(AuthenticatedUser { user, credential }))
    }
}

async fn user_for_bearer(state: &AppState, token: &str) -> Result<User, AuthRejection> {
    let (scheme, claims) = state.verifier.verify_any(token).await.map_err(|rejection| {
        debug!(error = %rejection, "bearer token rejected");
        AuthRejection::NotAuthenticated
    })?;
    let identity = resolve_identity(&claims, scheme.claims(), scheme.email_verified_policy())
        .map_err(|e| {
            debug!(provider = %scheme.id(), error = %e, "bearer token has no usable identity");
            AuthRejection::NotAuthenticated
        })?;
    state
        .store
        .find_by_provider_subject(scheme.id(), &identity.provider_subject_id)
        .await?
        .ok_or(AuthRejection::NotAuthenticated)
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

// HTTP/2 clients may split cookies across several headers.
fn cookie_header(headers: &HeaderMap) -> Option<String> {
    let values: Vec<&str> = headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .collect();
    (!values.is_empty()).then(|| values.join("; "))
}

/// Rejection type for authentication extractors.
#[derive(Debug)]
pub enum AuthRejection {
    NotAuthenticated,
    InternalError,
}

impl From<StoreError> for AuthRejection {
    fn from(err: StoreError) -> Self {
        error!(error = %err, "user lookup failed");
        Self::InternalError
    }
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        match self {
            Self::NotAuthenticated => (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": "unauthorized" })),
            )
                .into_response(),
            Self::InternalError => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "internal_error" })),
            )
                .into_response(),
        }
    }
}
