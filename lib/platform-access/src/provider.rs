//! Identity provider registry.
//!
//! Each supported provider is described by a [`ProviderScheme`]: where to
//! exchange codes, where its signing keys live, which issuers and audience
//! its tokens must carry, and which claims hold the user's identity. All
//! provider-specific quirks live here; the rest of the pipeline only reads
//! from a scheme.
//!
//! The set of providers is fixed. The registry is built once at startup from
//! configuration and shared read-only.

use gatehouse_core::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{ConfigError, UnknownProvider};

const GOOGLE_AUTHORIZATION_ENDPOINT: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_JWKS_URI: &str = "https://www.googleapis.com/oauth2/v3/certs";

const MICROSOFT_AUTHORIZATION_ENDPOINT: &str =
    "https://login.microsoftonline.com/common/oauth2/v2.0/authorize";
const MICROSOFT_TOKEN_ENDPOINT: &str =
    "https://login.microsoftonline.com/common/oauth2/v2.0/token";
const MICROSOFT_JWKS_URI: &str = "https://login.microsoftonline.com/common/discovery/v2.0/keys";
// The common endpoint issues tokens from per-tenant issuers.
const MICROSOFT_ISSUER_PREFIX: &str = "https://login.microsoftonline.com/";

/// The supported identity providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    Google,
    Microsoft,
}

impl ProviderId {
    /// Returns the identifier used in paths, tokens and storage.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Google => "google",
            Self::Microsoft => "microsoft",
        }
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderId {
    type Err = UnknownProvider;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "google" => Ok(Self::Google),
            "microsoft" => Ok(Self::Microsoft),
            other => Err(UnknownProvider {
                provider: other.to_string(),
            }),
        }
    }
}

/// Which `iss` values a provider's tokens may carry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IssuerPolicy {
    /// The issuer must equal one of these values.
    OneOf(Vec<String>),
    /// The issuer must start with this prefix (multi-tenant providers).
    Prefix(String),
}

impl IssuerPolicy {
    /// Returns true if `issuer` is acceptable.
    #[must_use]
    pub fn accepts(&self, issuer: &str) -> bool {
        match self {
            Self::OneOf(issuers) => issuers.iter().any(|i| i == issuer),
            Self::Prefix(prefix) => issuer.starts_with(prefix.as_str()),
        }
    }
}

/// How to treat a token without an `email_verified` claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmailVerifiedPolicy {
    /// Absence of the claim counts as verified.
    #[default]
    TrustWhenAbsent,
    /// The claim must be present and true.
    RequireClaim,
}

/// Which claims carry the user's identity, in order of preference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimMapping {
    subject_claims: Vec<String>,
    email_claims: Vec<String>,
}

impl ClaimMapping {
    /// Creates a mapping from preference-ordered claim names.
    #[must_use]
    pub fn new(subject_claims: &[&str], email_claims: &[&str]) -> Self {
        Self {
            subject_claims: subject_claims.iter().map(|c| (*c).to_string()).collect(),
            email_claims: email_claims.iter().map(|c| (*c).to_string()).collect(),
        }
    }

    /// Claims consulted for the provider subject ID.
    #[must_use]
    pub fn subject_claims(&self) -> &[String] {
        &self.subject_claims
    }

    /// Claims consulted for the email address.
    #[must_use]
    pub fn email_claims(&self) -> &[String] {
        &self.email_claims
    }
}

impl Default for ClaimMapping {
    fn default() -> Self {
        Self::new(&["sub"], &["email"])
    }
}

/// Client credentials for one provider, as read from configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderCredentials {
    /// The OAuth2 client ID registered with the provider.
    pub client_id: String,
    /// The OAuth2 client secret.
    pub client_secret: String,
    /// Reject tokens that omit `email_verified` instead of trusting them.
    #[serde(default)]
    pub require_email_verified_claim: bool,
}

/// Provider section of the configuration. An absent provider is disabled.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub google: Option<ProviderCredentials>,
    #[serde(default)]
    pub microsoft: Option<ProviderCredentials>,
}

/// Everything needed to run the callback pipeline against one provider.
#[derive(Debug, Clone)]
pub struct ProviderScheme {
    id: ProviderId,
    authorization_endpoint: String,
    token_endpoint: String,
    jwks_uri: String,
    redirect_path: String,
    client_id: String,
    client_secret: String,
    issuer: IssuerPolicy,
    claims: ClaimMapping,
    email_verified: EmailVerifiedPolicy,
}

impl ProviderScheme {
    /// Google accounts.
    #[must_use]
    pub fn google(credentials: &ProviderCredentials) -> Self {
        Self::with_defaults(ProviderId::Google, credentials)
            .with_endpoints(GOOGLE_AUTHORIZATION_ENDPOINT, GOOGLE_TOKEN_ENDPOINT, GOOGLE_JWKS_URI)
            .with_issuer(IssuerPolicy::OneOf(vec![
                "https://accounts.google.com".to_string(),
                "accounts.google.com".to_string(),
            ]))
    }

    /// Microsoft identity platform (work, school and personal accounts).
    ///
    /// Microsoft puts the stable object ID in `oid` and may omit `email`,
    /// in which case `preferred_username` carries the sign-in address.
    #[must_use]
    pub fn microsoft(credentials: &ProviderCredentials) -> Self {
        Self::with_defaults(ProviderId::Microsoft, credentials)
            .with_endpoints(
                MICROSOFT_AUTHORIZATION_ENDPOINT,
                MICROSOFT_TOKEN_ENDPOINT,
                MICROSOFT_JWKS_URI,
            )
            .with_issuer(IssuerPolicy::Prefix(MICROSOFT_ISSUER_PREFIX.to_string()))
            .with_claims(ClaimMapping::new(
                &["oid", "sub"],
                &["email", "preferred_username"],
            ))
    }

    fn with_defaults(id: ProviderId, credentials: &ProviderCredentials) -> Self {
        let email_verified = if credentials.require_email_verified_claim {
            EmailVerifiedPolicy::RequireClaim
        } else {
            EmailVerifiedPolicy::TrustWhenAbsent
        };
        Self {
            id,
            authorization_endpoint: String::new(),
            token_endpoint: String::new(),
            jwks_uri: String::new(),
            redirect_path: format!("auth/{}/callback", id.as_str()),
            client_id: credentials.client_id.clone(),
            client_secret: credentials.client_secret.clone(),
            issuer: IssuerPolicy::OneOf(Vec::new()),
            claims: ClaimMapping::default(),
            email_verified,
        }
    }

    /// Overrides the provider endpoints.
    #[must_use]
    pub fn with_endpoints(
        mut self,
        authorization_endpoint: &str,
        token_endpoint: &str,
        jwks_uri: &str,
    ) -> Self {
        self.authorization_endpoint = authorization_endpoint.to_string();
        self.token_endpoint = token_endpoint.to_string();
        self.jwks_uri = jwks_uri.to_string();
        self
    }

    /// Overrides the issuer policy.
    #[must_use]
    pub fn with_issuer(mut self, issuer: IssuerPolicy) -> Self {
        self.issuer = issuer;
        self
    }

    /// Overrides the identity claim mapping.
    #[must_use]
    pub fn with_claims(mut self, claims: ClaimMapping) -> Self {
        self.claims = claims;
        self
    }

    /// Overrides the email-verified policy.
    #[must_use]
    pub fn with_email_verified_policy(mut self, policy: EmailVerifiedPolicy) -> Self {
        self.email_verified = policy;
        self
    }

    #[must_use]
    pub fn id(&self) -> ProviderId {
        self.id
    }

    #[must_use]
    pub fn authorization_endpoint(&self) -> &str {
        &self.authorization_endpoint
    }

    #[must_use]
    pub fn token_endpoint(&self) -> &str {
        &self.token_endpoint
    }

    #[must_use]
    pub fn jwks_uri(&self) -> &str {
        &self.jwks_uri
    }

    /// Callback path relative to the gateway's public base URL.
    #[must_use]
    pub fn redirect_path(&self) -> &str {
        &self.redirect_path
    }

    /// The absolute redirect URI registered with the provider.
    #[must_use]
    pub fn redirect_uri(&self, public_base_url: &str) -> String {
        format!(
            "{}/{}",
            public_base_url.trim_end_matches('/'),
            self.redirect_path
        )
    }

    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    #[must_use]
    pub fn client_secret(&self) -> &str {
        &self.client_secret
    }

    /// Tokens must carry exactly this audience.
    #[must_use]
    pub fn audience(&self) -> &str {
        &self.client_id
    }

    #[must_use]
    pub fn issuer_policy(&self) -> &IssuerPolicy {
        &self.issuer
    }

    #[must_use]
    pub fn claims(&self) -> &ClaimMapping {
        &self.claims
    }

    #[must_use]
    pub fn email_verified_policy(&self) -> EmailVerifiedPolicy {
        self.email_verified
    }
}

/// Immutable lookup table of configured providers.
#[derive(Debug, Clone)]
pub struct ProviderRegistry {
    schemes: Vec<ProviderScheme>,
}

impl ProviderRegistry {
    /// Builds the registry from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if a configured provider has blank credentials.
    pub fn from_config(config: &ProvidersConfig) -> Result<Self, ConfigError> {
        let mut schemes = Vec::new();
        if let Some(credentials) = &config.google {
            validate_credentials("providers.google", credentials)?;
            schemes.push(ProviderScheme::google(credentials));
        }
        if let Some(credentials) = &config.microsoft {
            validate_credentials("providers.microsoft", credentials)?;
            schemes.push(ProviderScheme::microsoft(credentials));
        }
        Ok(Self { schemes })
    }

    /// Builds a registry from prepared schemes.
    #[must_use]
    pub fn from_schemes(schemes: Vec<ProviderScheme>) -> Self {
        Self { schemes }
    }

    /// Looks up the scheme for a provider identifier.
    ///
    /// # Errors
    ///
    /// Returns `UnknownProvider` if the identifier is not a supported
    /// provider or the provider is not configured.
    pub fn scheme_for(&self, provider: &str) -> std::result::Result<&ProviderScheme, UnknownProvider> {
        let id: ProviderId = provider.parse()?;
        self.schemes
            .iter()
            .find(|s| s.id == id)
            .ok_or_else(|| UnknownProvider {
                provider: provider.to_string(),
            })
    }

    /// Finds the scheme whose issuer policy accepts `issuer`.
    ///
    /// Only used to route a token to a key set; the issuer is checked
    /// again after the signature verifies.
    #[must_use]
    pub fn scheme_for_issuer(&self, issuer: &str) -> Option<&ProviderScheme> {
        self.schemes.iter().find(|s| s.issuer.accepts(issuer))
    }

    /// Returns the configured provider identifiers.
    pub fn providers(&self) -> impl Iterator<Item = ProviderId> + '_ {
        self.schemes.iter().map(|s| s.id)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.schemes.is_empty()
    }
}

fn validate_credentials(
    section: &str,
    credentials: &ProviderCredentials,
) -> std::result::Result<(), ConfigError> {
    if credentials.client_id.trim().is_empty() {
        return Err(ConfigError::Missing {
            field: format!("{section}.client_id"),
        });
    }
    if credentials.client_secret.trim().is_empty() {
        return Err(ConfigError::Missing {
            field: format!("{section}.client_secret"),
        });
    }
    Ok(())
}
