//! Error types for the platform-access crate.
//!
//! Every failure the callback pipeline can produce is a variant of a closed
//! enum. The per-stage errors (`TokenRejection`, `ResolveError`,
//! `LinkError`, `StoreError`) are folded into [`AuthFailure`] at the
//! orchestrator boundary, which carries the user-facing error code.

use std::fmt;

/// Reasons a provider identity token is rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenRejection {
    /// The signature did not verify against any current provider key.
    InvalidSignature,
    /// The token's `exp` is in the past.
    ExpiredToken,
    /// The `aud` claim does not match the configured client ID.
    AudienceMismatch,
    /// The `iss` claim is not accepted by the provider's policy.
    IssuerMismatch,
    /// The token is not a well-formed JWT or uses an unexpected algorithm.
    Malformed { reason: String },
    /// The unverified issuer does not belong to any configured provider.
    UnknownIssuer,
    /// The provider's signing keys could not be fetched.
    KeySetUnavailable { reason: String },
}

impl TokenRejection {
    /// Returns true if a forced key-set refresh could turn this rejection
    /// into a success (the provider may have rotated its keys).
    #[must_use]
    pub fn is_stale_key(&self) -> bool {
        matches!(self, Self::InvalidSignature)
    }
}

impl fmt::Display for TokenRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidSignature => write!(f, "invalid token signature"),
            Self::ExpiredToken => write!(f, "token has expired"),
            Self::AudienceMismatch => write!(f, "token audience mismatch"),
            Self::IssuerMismatch => write!(f, "token issuer mismatch"),
            Self::Malformed { reason } => write!(f, "malformed token: {reason}"),
            Self::UnknownIssuer => write!(f, "token issuer is not a configured provider"),
            Self::KeySetUnavailable { reason } => {
                write!(f, "provider signing keys unavailable: {reason}")
            }
        }
    }
}

impl std::error::Error for TokenRejection {}

/// Failures turning verified claims into a normalized identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// Neither an email nor a subject could be determined.
    MissingIdentity { claim: &'static str },
    /// The provider marked the email as unverified.
    EmailNotVerified,
}

impl fmt::Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingIdentity { claim } => write!(f, "missing identity claim: {claim}"),
            Self::EmailNotVerified => write!(f, "email is not verified by the provider"),
        }
    }
}

impl std::error::Error for ResolveError {}

/// Why an identity could not be bound to a user record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictKind {
    /// The email belongs to a user created through another provider.
    DifferentProvider,
    /// The email belongs to another subject at the same provider.
    DifferentProviderAccount,
    /// The email is held by another record (detected by a unique constraint).
    EmailTaken,
}

impl ConflictKind {
    /// Human-readable description, safe to show to the end user.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::DifferentProvider => "Email already linked to a different provider",
            Self::DifferentProviderAccount => {
                "Email already linked to a different provider account"
            }
            Self::EmailTaken => "Email already linked to another account",
        }
    }
}

impl fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Errors reported by a user store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A uniqueness constraint rejected the write.
    UniqueViolation { constraint: Option<String> },
    /// Any other storage failure.
    Backend { details: String },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UniqueViolation {
                constraint: Some(name),
            } => write!(f, "unique constraint '{name}' violated"),
            Self::UniqueViolation { constraint: None } => write!(f, "unique constraint violated"),
            Self::Backend { details } => write!(f, "user store error: {details}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// Errors from the account linker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkError {
    /// The identity conflicts with an existing record.
    Conflict(ConflictKind),
    /// The store failed for a reason other than a uniqueness conflict.
    Store(StoreError),
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Conflict(kind) => write!(f, "account conflict: {kind}"),
            Self::Store(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for LinkError {}

impl From<StoreError> for LinkError {
    fn from(err: StoreError) -> Self {
        Self::Store(err)
    }
}

/// The requested provider is not configured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownProvider {
    /// The provider identifier taken from the request path.
    pub provider: String,
}

impl fmt::Display for UnknownProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown identity provider '{}'", self.provider)
    }
}

impl std::error::Error for UnknownProvider {}

/// Session token signing failed. Only a misconfigured key can cause this.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The token could not be signed.
    Signing { details: String },
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Signing { details } => write!(f, "failed to sign session token: {details}"),
        }
    }
}

impl std::error::Error for SessionError {}

/// Configuration errors raised while building providers and signers at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A required value is empty.
    Missing { field: String },
    /// A value is present but unusable.
    Invalid { field: String, reason: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing { field } => write!(f, "missing configuration value '{field}'"),
            Self::Invalid { field, reason } => {
                write!(f, "invalid configuration value '{field}': {reason}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Terminal failure of an OIDC callback, as reported back to the browser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthFailure {
    /// The callback carried no authorization code.
    MissingCode,
    /// The provider's token endpoint did not return a success response.
    TokenExchangeFailed,
    /// The token response carried no `id_token`.
    MissingIdToken,
    /// The identity token failed verification.
    InvalidToken(TokenRejection),
    /// No email or subject could be derived from the verified claims.
    MissingIdentity,
    /// The provider marked the email as unverified.
    EmailNotVerified,
    /// The identity conflicts with an existing account.
    AccountConflict(ConflictKind),
    /// The provider is not configured (misconfiguration, not user-recoverable).
    UnknownProvider { provider: String },
    /// Anything not classified above.
    AuthenticationFailed { details: String },
}

impl AuthFailure {
    /// The stable error code sent as the `authError` query parameter.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingCode => "missing_code",
            Self::TokenExchangeFailed => "token_exchange_failed",
            Self::MissingIdToken => "missing_id_token",
            Self::InvalidToken(_) => "invalid_token",
            Self::MissingIdentity => "missing_identity",
            Self::EmailNotVerified => "email_not_verified",
            Self::AccountConflict(_) => "oauth_conflict",
            Self::UnknownProvider { .. } | Self::AuthenticationFailed { .. } => {
                "authentication_failed"
            }
        }
    }

    /// The description sent as the `authErrorDescription` query parameter.
    ///
    /// Never includes internal details.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::MissingCode => "Missing code",
            Self::TokenExchangeFailed => "Failed to exchange code",
            Self::MissingIdToken => "Missing id_token",
            Self::InvalidToken(_) => "Invalid identity token",
            Self::MissingIdentity => "Missing email",
            Self::EmailNotVerified => "Email not verified",
            Self::AccountConflict(kind) => kind.description(),
            Self::UnknownProvider { .. } | Self::AuthenticationFailed { .. } => {
                "Authentication failed"
            }
        }
    }

    /// Returns false for the catch-all outcomes that indicate a fault
    /// rather than an expected rejection.
    #[must_use]
    pub fn is_classified(&self) -> bool {
        !matches!(
            self,
            Self::UnknownProvider { .. } | Self::AuthenticationFailed { .. }
        )
    }
}

impl fmt::Display for AuthFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidToken(rejection) => write!(f, "invalid_token: {rejection}"),
            Self::AccountConflict(kind) => write!(f, "oauth_conflict: {kind}"),
            Self::UnknownProvider { provider } => {
                write!(f, "authentication_failed: unknown provider '{provider}'")
            }
            Self::AuthenticationFailed { details } => {
                write!(f, "authentication_failed: {details}")
            }
            other => f.write_str(other.code()),
        }
    }
}

impl std::error::Error for AuthFailure {}

impl From<ResolveError> for AuthFailure {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::MissingIdentity { .. } => Self::MissingIdentity,
            ResolveError::EmailNotVerified => Self::EmailNotVerified,
        }
    }
}

impl From<LinkError> for AuthFailure {
    fn from(err: LinkError) -> Self {
        match err {
            LinkError::Conflict(kind) => Self::AccountConflict(kind),
            LinkError::Store(err) => Self::AuthenticationFailed {
                details: err.to_string(),
            },
        }
    }
}

impl From<UnknownProvider> for AuthFailure {
    fn from(err: UnknownProvider) -> Self {
        Self::UnknownProvider {
            provider: err.provider,
        }
    }
}

impl From<SessionError> for AuthFailure {
    fn from(err: SessionError) -> Self {
        Self::AuthenticationFailed {
            details: err.to_string(),
        }
    }
}
