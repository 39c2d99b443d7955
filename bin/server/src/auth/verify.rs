//! Identity token verification.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use gatehouse_platform_access::{ProviderRegistry, ProviderScheme, TokenRejection, VerifiedClaims};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, Header, Validation};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::debug;

use super::jwks::{KeySet, KeySetCache};

/// Clock skew tolerated on `exp`.
const LEEWAY_SECONDS: u64 = 60;

/// Verifies provider identity tokens against cached provider key sets.
pub struct TokenVerifier {
    keys: KeySetCache,
    registry: Arc<ProviderRegistry>,
}

impl TokenVerifier {
    #[must_use]
    pub fn new(keys: KeySetCache, registry: Arc<ProviderRegistry>) -> Self {
        Self { keys, registry }
    }

    /// Verifies `id_token` as issued by `scheme`'s provider.
    ///
    /// Checks the RS256 signature, expiry, that `aud` is the scheme's client
    /// ID, and that `iss` satisfies the scheme's issuer policy. No claim is
    /// read before the signature verifies. A signature failure is retried
    /// once against a freshly fetched key set, in case the provider rotated
    /// its keys.
    ///
    /// # Errors
    ///
    /// Returns the [`TokenRejection`] describing the first failed check.
    pub async fn verify(
        &self,
        id_token: &str,
        scheme: &ProviderScheme,
    ) -> Result<VerifiedClaims, TokenRejection> {
        let header = jsonwebtoken::decode_header(id_token).map_err(|e| TokenRejection::Malformed {
            reason: e.to_string(),
        })?;
        if header.alg != Algorithm::RS256 {
            return Err(TokenRejection::Malformed {
                reason: format!("unexpected algorithm {:?}", header.alg),
            });
        }

        let keys = self.keys.get(scheme.id(), scheme.jwks_uri()).await?;
        match verify_with(&keys, id_token, &header, scheme) {
            Err(rejection) if rejection.is_stale_key() => {
                debug!(provider = %scheme.id(), kid = ?header.kid, "signature check failed; retrying with fresh keys");
                let fresh = self
                    .keys
                    .refresh(scheme.id(), scheme.jwks_uri(), Some(&keys))
                    .await?;
                verify_with(&fresh, id_token, &header, scheme)
            }
            outcome => outcome,
        }
    }

    /// Verifies a token from any configured provider.
    ///
    /// The provider is chosen from the token's unverified `iss` claim. That
    /// value only selects which key set to try; [`Self::verify`] then checks
    /// the issuer again against the signed claims.
    ///
    /// # Errors
    ///
    /// Returns `UnknownIssuer` if no configured provider accepts the issuer,
    /// otherwise whatever [`Self::verify`] returns.
    pub async fn verify_any(
        &self,
        id_token: &str,
    ) -> Result<(&ProviderScheme, VerifiedClaims), TokenRejection> {
        let issuer = unverified_issuer(id_token)?;
        let scheme = self
            .registry
            .scheme_for_issuer(&issuer)
            .ok_or(TokenRejection::UnknownIssuer)?;
        let claims = self.verify(id_token, scheme).await?;
        Ok((scheme, claims))
    }
}

fn verify_with(
    keys: &KeySet,
    id_token: &str,
    header: &Header,
    scheme: &ProviderScheme,
) -> Result<VerifiedClaims, TokenRejection> {
    // An unknown kid usually means the provider rotated keys.
    let key = keys
        .lookup(header.kid.as_deref())
        .ok_or(TokenRejection::InvalidSignature)?;
    let decoding_key = key
        .decoding_key()
        .map_err(|e| TokenRejection::KeySetUnavailable {
            reason: format!("invalid RSA key: {e}"),
        })?;

    let mut validation = Validation::new(Algorithm::RS256);
    validation.set_audience(&[scheme.audience()]);
    validation.set_required_spec_claims(&["exp", "aud", "iss"]);
    validation.leeway = LEEWAY_SECONDS;

    let data = jsonwebtoken::decode::<Map<String, Value>>(id_token, &decoding_key, &validation)
        .map_err(|e| rejection_for(e.kind()))?;

    let claims = VerifiedClaims::new(data.claims);
    match claims.issuer() {
        Some(issuer) if scheme.issuer_policy().accepts(issuer) => Ok(claims),
        _ => Err(TokenRejection::IssuerMismatch),
    }
}

fn rejection_for(kind: &ErrorKind) -> TokenRejection {
    match kind {
        ErrorKind::InvalidSignature => TokenRejection::InvalidSignature,
        ErrorKind::ExpiredSignature => TokenRejection::ExpiredToken,
        ErrorKind::InvalidAudience => TokenRejection::AudienceMismatch,
        ErrorKind::InvalidIssuer => TokenRejection::IssuerMismatch,
        ErrorKind::MissingRequiredClaim(claim) if claim == "aud" => {
            TokenRejection::AudienceMismatch
        }
        ErrorKind::MissingRequiredClaim(claim) if claim == "iss" => TokenRejection::IssuerMismatch,
        other => TokenRejection::Malformed {
            reason: format!("{other:?}"),
        },
    }
}

/// Reads `iss` from the payload without verifying anything. Routing only.
fn unverified_issuer(id_token: &str) -> Result<String, TokenRejection> {
    let malformed = |reason: &str| TokenRejection::Malformed {
        reason: reason.to_string(),
    };

    // JWT is base64url(header).base64url(payload).signature
    let parts: Vec<&str> = id_token.split('.').collect();
    if parts.len() != 3 {
        return Err(malformed("expected three segments"));
    }
    let payload = URL_SAFE_NO_PAD
        .decode(parts[1])
        .map_err(|_| malformed("payload is not base64url"))?;
    let payload: Value =
        serde_json::from_slice(&payload).map_err(|_| malformed("payload is not JSON"))?;
    payload
        .get("iss")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or(TokenRejection::UnknownIssuer)
}
