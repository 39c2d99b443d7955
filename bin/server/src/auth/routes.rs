//! Authentication routes for login, callback, session status and logout.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::CookieJar;
use gatehouse_platform_access::AuthFailure;
use reqwest::Url;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info, warn};

use super::{
    AppState,
    callback::{CallbackFlow, CallbackOutcome, CallbackQuery},
    middleware::RequireAuth,
    redirect::{encode_state, resolve_return_to, with_auth_error},
};

const LOGIN_SCOPE: &str = "openid email profile";

/// `returnTo` query parameter of the login and logout routes.
#[derive(Debug, Default, Deserialize)]
pub struct ReturnToQuery {
    #[serde(default, rename = "returnTo")]
    return_to: Option<String>,
}

/// This gateway's external origin: the configured public base URL, else the
/// request's `X-Forwarded-Proto` (default `https`) and `Host`.
#[must_use]
pub fn gateway_origin(headers: &HeaderMap, public_base_url: Option<&str>) -> String {
    if let Some(base) = public_base_url {
        return base.trim_end_matches('/').to_string();
    }
    let header_value = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };
    let proto = header_value("x-forwarded-proto").unwrap_or("https");
    let host = header_value(header::HOST.as_str()).unwrap_or("localhost");
    format!("{proto}://{host}")
}

fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location.to_string())]).into_response()
}

/// Starts a login by redirecting to the provider's authorization endpoint.
pub async fn login(
    State(state): State<Arc<AppState>>,
    Path(provider): Path<String>,
    Query(query): Query<ReturnToQuery>,
    headers: HeaderMap,
) -> Response {
    let return_state = query.return_to.as_deref().map(encode_state);
    let scheme = match state.registry.scheme_for(&provider) {
        Ok(scheme) => scheme,
        Err(e) => {
            error!(%provider, error = %e, "login for unconfigured provider");
            let location = resolve_return_to(return_state.as_deref(), &state.frontend_origin);
            return found(&with_auth_error(&location, &AuthFailure::from(e)));
        }
    };

    let origin = gateway_origin(&headers, state.public_base_url.as_deref());
    let mut params = vec![
        ("response_type", "code".to_string()),
        ("client_id", scheme.client_id().to_string()),
        ("redirect_uri", scheme.redirect_uri(&origin)),
        ("scope", LOGIN_SCOPE.to_string()),
    ];
    if let Some(return_state) = return_state {
        params.push(("state", return_state));
    }

    match Url::parse_with_params(scheme.authorization_endpoint(), &params) {
        Ok(url) => found(url.as_str()),
        Err(e) => {
            let failure = AuthFailure::AuthenticationFailed {
                details: format!("invalid authorization endpoint: {e}"),
            };
            error!(%provider, error = %failure, "cannot build authorization URL");
            found(&with_auth_error(&state.frontend_origin, &failure))
        }
    }
}

/// Completes a login: `GET /auth/{provider}/callback`.
pub async fn callback(
    State(state): State<Arc<AppState>>,
    Path(provider): Path<String>,
    Query(query): Query<CallbackQuery>,
    headers: HeaderMap,
) -> CallbackOutcome {
    let flow = CallbackFlow {
        registry: &state.registry,
        client: state.client.as_ref(),
        verifier: &state.verifier,
        store: state.store.as_ref(),
        sessions: &state.sessions,
        frontend_origin: &state.frontend_origin,
    };
    let origin = gateway_origin(&headers, state.public_base_url.as_deref());
    flow.run(&provider, &query, &origin).await
}

/// Reports the current session.
///
/// Roles stored on the user win over the roles in the token; when they
/// differ a fresh cookie carrying the stored roles is issued.
pub async fn session_status(State(state): State<Arc<AppState>>, jar: CookieJar) -> Response {
    let unauthenticated = || Json(json!({ "authenticated": false }));

    let Some(session) = state.sessions.verify_jar(&jar) else {
        return unauthenticated().into_response();
    };

    let user = match state.store.find_by_id(session.user_id).await {
        Ok(Some(user)) if user.is_active() => user,
        Ok(_) => {
            info!(user_id = %session.user_id, "session for missing or inactive user");
            return (jar.add(state.sessions.clear()), unauthenticated()).into_response();
        }
        Err(e) => {
            error!(user_id = %session.user_id, error = %e, "session lookup failed");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "internal_error" })),
            )
                .into_response();
        }
    };

    let body = Json(json!({
        "authenticated": true,
        "userId": user.id().to_string(),
        "roles": user.roles().names(),
        "provider": &session.provider,
        "displayName": user.display_name(),
    }));

    if user.roles() == &session.roles {
        return body.into_response();
    }
    match state
        .sessions
        .issue(user.id(), user.roles(), &session.provider)
    {
        Ok(cookie) => {
            info!(user_id = %user.id(), "roles changed; re-issuing session");
            (jar.add(cookie), body).into_response()
        }
        Err(e) => {
            warn!(user_id = %user.id(), error = %e, "could not re-issue session");
            body.into_response()
        }
    }
}

/// Clears the session cookie and returns to the front-end.
pub async fn logout(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ReturnToQuery>,
    jar: CookieJar,
) -> Response {
    let location = resolve_return_to(query.return_to.as_deref(), &state.frontend_origin);
    (
        StatusCode::FOUND,
        jar.add(state.sessions.clear()),
        [(header::LOCATION, location)],
    )
        .into_response()
}

/// Returns the authenticated user.
pub async fn me(RequireAuth(auth): RequireAuth) -> Json<serde_json::Value> {
    let user = auth.user;
    Json(json!({
        "userId": user.id().to_string(),
        "email": user.email(),
        "displayName": user.display_name(),
        "provider": user.provider().as_str(),
        "roles": user.roles().names(),
    }))
}
