//! Centralized server configuration.
//!
//! Loaded via the `config` crate from environment variables, with `__`
//! separating nested keys (`SESSION__SECRET`, `PROVIDERS__GOOGLE__CLIENT_ID`).

use config::builder::DefaultState;
use config::{ConfigBuilder, Environment};
use gatehouse_platform_access::{ConfigError, ProvidersConfig, SESSION_TTL_SECONDS};
use reqwest::Url;
use serde::Deserialize;
use std::net::SocketAddr;
use std::time::Duration;

use crate::auth::redirect::DEFAULT_FRONTEND_ORIGIN;

/// Server configuration.
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// PostgreSQL database connection URL.
    pub database_url: String,

    /// Address the HTTP listener binds to.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// The front-end origin browsers are returned to.
    #[serde(default = "default_frontend_origin")]
    pub frontend_origin: String,

    /// This gateway's external origin. Derived per request when unset.
    #[serde(default)]
    pub public_base_url: Option<String>,

    pub session: SessionConfig,

    #[serde(default)]
    pub http: HttpConfig,

    /// Identity provider credentials. An absent provider is disabled.
    #[serde(default)]
    pub providers: ProvidersConfig,
}

/// Session-related configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// HMAC secret for session tokens.
    pub secret: String,

    /// Session lifetime in seconds.
    #[serde(default = "default_session_ttl_seconds")]
    pub ttl_seconds: i64,

    /// Whether to set the Secure flag on cookies (requires HTTPS).
    /// Set to false only for local HTTP development.
    #[serde(default = "default_secure_cookies")]
    pub secure_cookies: bool,
}

/// Outbound HTTP configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    /// Timeout for every call to a provider.
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    /// Key-set cache lifetime when the provider sends no `max-age`.
    #[serde(default = "default_jwks_ttl_seconds")]
    pub jwks_ttl_seconds: u64,
}

impl HttpConfig {
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    #[must_use]
    pub fn jwks_ttl(&self) -> Duration {
        Duration::from_secs(self.jwks_ttl_seconds)
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_timeout_seconds(),
            jwks_ttl_seconds: default_jwks_ttl_seconds(),
        }
    }
}

fn default_listen_addr() -> String {
    "0.0.0.0:8787".to_string()
}

fn default_frontend_origin() -> String {
    DEFAULT_FRONTEND_ORIGIN.to_string()
}

fn default_session_ttl_seconds() -> i64 {
    SESSION_TTL_SECONDS
}

fn default_secure_cookies() -> bool {
    true
}

fn default_timeout_seconds() -> u64 {
    10
}

fn default_jwks_ttl_seconds() -> u64 {
    3600
}

impl ServerConfig {
    /// Loads configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required configuration is missing or invalid.
    pub fn from_env() -> gatehouse_core::Result<Self, ConfigError> {
        Self::load(
            config::Config::builder().add_source(
                Environment::default()
                    .separator("__")
                    .try_parsing(true),
            ),
        )
    }

    fn load(builder: ConfigBuilder<DefaultState>) -> gatehouse_core::Result<Self, ConfigError> {
        let config: Self = builder
            .build()
            .and_then(config::Config::try_deserialize)
            .map_err(|e| ConfigError::Invalid {
                field: "environment".to_string(),
                reason: e.to_string(),
            })?;
        config.validate()?;
        Ok(config)
    }

    /// The parsed listen address.
    ///
    /// # Errors
    ///
    /// Returns an error if `listen_addr` is not a socket address.
    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.listen_addr
            .parse()
            .map_err(|e: std::net::AddrParseError| ConfigError::Invalid {
                field: "listen_addr".to_string(),
                reason: e.to_string(),
            })
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.database_url.trim().is_empty() {
            return Err(ConfigError::Missing {
                field: "database_url".to_string(),
            });
        }
        if self.session.secret.is_empty() {
            return Err(ConfigError::Missing {
                field: "session.secret".to_string(),
            });
        }
        self.listen_addr()?;
        validate_origin("frontend_origin", &self.frontend_origin)?;
        if let Some(base) = &self.public_base_url {
            validate_origin("public_base_url", base)?;
        }
        if self.http.timeout_seconds == 0 {
            return Err(ConfigError::Invalid {
                field: "http.timeout_seconds".to_string(),
                reason: "must be positive".to_string(),
            });
        }
        Ok(())
    }
}

fn validate_origin(field: &str, value: &str) -> Result<(), ConfigError> {
    let invalid = |reason: String| ConfigError::Invalid {
        field: field.to_string(),
        reason,
    };
    let url = Url::parse(value).map_err(|e| invalid(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(invalid("expected an http(s) origin".to_string()));
    }
    Ok(())
}
