//! Stateless session tokens.
//!
//! A session is an HS256-signed JWT carrying the user ID, roles and the
//! provider used to log in. The server keeps no session table: a token is
//! valid exactly when its signature verifies under the current secret and
//! it has not expired.

use chrono::{DateTime, Duration, Utc};
use gatehouse_core::{Result, UserId};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ConfigError, SessionError};
use crate::role::RoleSet;

/// Session lifetime: seven days.
pub const SESSION_TTL_SECONDS: i64 = 60 * 60 * 24 * 7;

/// Claims written into a session token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionClaims {
    pub sub: String,
    pub roles: Vec<String>,
    pub provider: String,
    pub iat: i64,
    pub exp: i64,
}

// Decoding is lenient about claim shapes; any problem yields "no session".
#[derive(Debug, Deserialize)]
struct IncomingClaims {
    #[serde(default)]
    sub: Option<String>,
    #[serde(default)]
    roles: Value,
    #[serde(default)]
    provider: Value,
}

/// A session that passed verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedSession {
    pub user_id: UserId,
    pub roles: RoleSet,
    /// The provider used at login, or `unknown` if the token omits it.
    pub provider: String,
}

/// Signs and verifies session tokens with a shared secret.
#[derive(Clone)]
pub struct SessionIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl: Duration,
}

impl std::fmt::Debug for SessionIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionIssuer")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl SessionIssuer {
    /// Creates an issuer for `secret` with the given token lifetime.
    ///
    /// # Errors
    ///
    /// Returns an error if the secret is empty or the lifetime is not positive.
    pub fn new(secret: &str, ttl_seconds: i64) -> Result<Self, ConfigError> {
        if secret.is_empty() {
            return Err(ConfigError::Missing {
                field: "session.secret".to_string(),
            }
            .into());
        }
        if ttl_seconds <= 0 {
            return Err(ConfigError::Invalid {
                field: "session.ttl_seconds".to_string(),
                reason: "must be positive".to_string(),
            }
            .into());
        }
        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            ttl: Duration::seconds(ttl_seconds),
        })
    }

    /// Token lifetime in seconds; also the cookie `Max-Age`.
    #[must_use]
    pub fn ttl_seconds(&self) -> i64 {
        self.ttl.num_seconds()
    }

    /// Issues a token valid from now for the configured lifetime.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Signing` if the token cannot be signed.
    pub fn issue(
        &self,
        user_id: UserId,
        roles: &RoleSet,
        provider: &str,
    ) -> std::result::Result<String, SessionError> {
        self.issue_at(user_id, roles, provider, Utc::now())
    }

    /// Issues a token as if the current time were `issued_at`.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Signing` if the token cannot be signed.
    pub fn issue_at(
        &self,
        user_id: UserId,
        roles: &RoleSet,
        provider: &str,
        issued_at: DateTime<Utc>,
    ) -> std::result::Result<String, SessionError> {
        let claims = SessionClaims {
            sub: user_id.to_string(),
            roles: roles.names(),
            provider: provider.to_string(),
            iat: issued_at.timestamp(),
            exp: (issued_at + self.ttl).timestamp(),
        };
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key).map_err(
            |e| SessionError::Signing {
                details: e.to_string(),
            },
        )
    }

    /// Verifies a token. Every failure (malformed, expired, bad signature,
    /// missing or unparseable subject) yields `None`.
    #[must_use]
    pub fn verify(&self, token: &str) -> Option<VerifiedSession> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp"]);

        let data = match jsonwebtoken::decode::<IncomingClaims>(
            token,
            &self.decoding_key,
            &validation,
        ) {
            Ok(data) => data,
            Err(e) => {
                tracing::debug!(error = %e, "rejected session token");
                return None;
            }
        };
        let claims = data.claims;

        let user_id = claims.sub?.parse::<UserId>().ok()?;
        let roles = match claims.roles {
            Value::Array(values) => {
                let names: Vec<&str> = values.iter().filter_map(Value::as_str).collect();
                RoleSet::from_names(&names[..])
            }
            _ => RoleSet::none(),
        };
        let provider = claims
            .provider
            .as_str()
            .map_or_else(|| "unknown".to_string(), str::to_string);

        Some(VerifiedSession {
            user_id,
            roles,
            provider,
        })
    }
}
