//! Session cookie encoding.

use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use gatehouse_core::UserId;
use gatehouse_platform_access::{RoleSet, SessionError, SessionIssuer, VerifiedSession};
use time::Duration as TimeDuration;

/// Session cookie name.
pub const SESSION_COOKIE: &str = "session";

/// Builds the session cookie: `HttpOnly; Secure; Path=/; SameSite=Lax` with
/// a `Max-Age` equal to the token lifetime.
#[must_use]
pub fn session_cookie(token: String, ttl_seconds: i64, secure: bool) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .http_only(true)
        .secure(secure)
        .path("/")
        .same_site(SameSite::Lax)
        .max_age(TimeDuration::seconds(ttl_seconds))
        .build()
}

/// Builds a cookie that removes the session cookie.
#[must_use]
pub fn clear_session_cookie(secure: bool) -> Cookie<'static> {
    session_cookie(String::new(), 0, secure)
}

/// Issues and reads session cookies.
#[derive(Debug, Clone)]
pub struct SessionCookies {
    issuer: SessionIssuer,
    secure: bool,
}

impl SessionCookies {
    /// `secure` controls the `Secure` attribute; it is only disabled for
    /// plain-HTTP local development.
    #[must_use]
    pub fn new(issuer: SessionIssuer, secure: bool) -> Self {
        Self { issuer, secure }
    }

    #[must_use]
    pub fn issuer(&self) -> &SessionIssuer {
        &self.issuer
    }

    /// Signs a session and wraps it in a cookie.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Signing` if the token cannot be signed.
    pub fn issue(
        &self,
        user_id: UserId,
        roles: &RoleSet,
        provider: &str,
    ) -> Result<Cookie<'static>, SessionError> {
        let token = self.issuer.issue(user_id, roles, provider)?;
        Ok(session_cookie(token, self.issuer.ttl_seconds(), self.secure))
    }

    #[must_use]
    pub fn clear(&self) -> Cookie<'static> {
        clear_session_cookie(self.secure)
    }

    /// Reads the session from a raw `Cookie` request header. A missing,
    /// malformed, expired or forged session is `None`.
    #[must_use]
    pub fn verify_header(&self, cookie_header: Option<&str>) -> Option<VerifiedSession> {
        let token = Cookie::split_parse(cookie_header?)
            .filter_map(Result::ok)
            .find(|cookie| cookie.name() == SESSION_COOKIE)?;
        self.issuer.verify(token.value())
    }

    /// Reads the session from an extracted cookie jar.
    #[must_use]
    pub fn verify_jar(&self, jar: &CookieJar) -> Option<VerifiedSession> {
        jar.get(SESSION_COOKIE)
            .and_then(|cookie| self.issuer.verify(cookie.value()))
    }
}
