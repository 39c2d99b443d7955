//! Outbound calls to identity providers: code exchange and key-set fetch.

use async_trait::async_trait;
use gatehouse_platform_access::{ConfigError, ProviderScheme};
use reqwest::header::CACHE_CONTROL;
use serde::Deserialize;
use std::fmt;
use std::time::Duration;

use super::jwks::JwkSet;

/// Failures talking to a provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderClientError {
    /// The provider answered with a non-success status.
    Status { status: u16 },
    /// The request did not complete (connect failure, timeout, reset).
    Transport { details: String },
    /// The response body was not the expected JSON document.
    Decode { details: String },
}

impl fmt::Display for ProviderClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Status { status } => write!(f, "provider responded with status {status}"),
            Self::Transport { details } => write!(f, "provider request failed: {details}"),
            Self::Decode { details } => write!(f, "unexpected provider response: {details}"),
        }
    }
}

impl std::error::Error for ProviderClientError {}

impl From<reqwest::Error> for ProviderClientError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            Self::Status {
                status: status.as_u16(),
            }
        } else if err.is_decode() {
            Self::Decode {
                details: err.to_string(),
            }
        } else {
            Self::Transport {
                details: err.to_string(),
            }
        }
    }
}

/// The parts of a token endpoint response the callback uses.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenResponse {
    #[serde(default)]
    pub id_token: Option<String>,
}

/// A key set as served by the provider.
#[derive(Debug, Clone)]
pub struct FetchedKeySet {
    pub document: JwkSet,
    /// `max-age` from the response's `Cache-Control`, if any.
    pub max_age: Option<Duration>,
}

/// Provider HTTP operations. Implemented over reqwest in production and by
/// a scripted fake in tests.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Exchanges an authorization code at the provider's token endpoint.
    async fn exchange_code(
        &self,
        scheme: &ProviderScheme,
        code: &str,
        redirect_uri: &str,
    ) -> Result<TokenResponse, ProviderClientError>;

    /// Fetches the provider's published signing keys.
    async fn fetch_key_set(&self, jwks_uri: &str) -> Result<FetchedKeySet, ProviderClientError>;
}

/// reqwest-backed [`ProviderClient`].
#[derive(Debug, Clone)]
pub struct HttpProviderClient {
    http: reqwest::Client,
}

impl HttpProviderClient {
    /// Creates a client applying `timeout` to every request.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS backend cannot be initialised.
    pub fn new(timeout: Duration) -> gatehouse_core::Result<Self, ConfigError> {
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(timeout)
            .build()
            .map_err(|e| ConfigError::Invalid {
                field: "http".to_string(),
                reason: format!("failed to create HTTP client: {e}"),
            })?;
        Ok(Self { http })
    }
}

#[async_trait]
impl ProviderClient for HttpProviderClient {
    async fn exchange_code(
        &self,
        scheme: &ProviderScheme,
        code: &str,
        redirect_uri: &str,
    ) -> Result<TokenResponse, ProviderClientError> {
        let response = self
            .http
            .post(scheme.token_endpoint())
            .form(&[
                ("code", code),
                ("client_id", scheme.client_id()),
                ("client_secret", scheme.client_secret()),
                ("redirect_uri", redirect_uri),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderClientError::Status {
                status: status.as_u16(),
            });
        }
        Ok(response.json::<TokenResponse>().await?)
    }

    async fn fetch_key_set(&self, jwks_uri: &str) -> Result<FetchedKeySet, ProviderClientError> {
        let response = self.http.get(jwks_uri).send().await?.error_for_status()?;
        let max_age = response
            .headers()
            .get(CACHE_CONTROL)
            .and_then(|h| h.to_str().ok())
            .and_then(parse_max_age)
            .map(Duration::from_secs);
        let document = response.json::<JwkSet>().await?;
        Ok(FetchedKeySet { document, max_age })
    }
}

fn parse_max_age(cache_control: &str) -> Option<u64> {
    cache_control.split(',').map(str::trim).find_map(|directive| {
        directive
            .strip_prefix("max-age=")
            .and_then(|value| value.parse::<u64>().ok())
    })
}
