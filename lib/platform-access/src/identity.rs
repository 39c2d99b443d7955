//! Identity resolution from verified provider claims.

use serde_json::{Map, Value};

use crate::error::ResolveError;
use crate::provider::{ClaimMapping, EmailVerifiedPolicy};

/// Claims of an identity token whose signature, expiry, audience and issuer
/// have been verified.
#[derive(Debug, Clone, PartialEq)]
pub struct VerifiedClaims {
    claims: Map<String, Value>,
}

impl VerifiedClaims {
    /// Wraps a claim set. Only the token verifier should call this.
    #[must_use]
    pub fn new(claims: Map<String, Value>) -> Self {
        Self { claims }
    }

    /// Returns a claim as a trimmed, non-empty string.
    #[must_use]
    pub fn string(&self, name: &str) -> Option<&str> {
        self.claims
            .get(name)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }

    /// Returns the first non-empty string among the named claims.
    #[must_use]
    pub fn first_string(&self, names: &[String]) -> Option<&str> {
        names.iter().find_map(|name| self.string(name))
    }

    /// Returns the raw claim value.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.claims.get(name)
    }

    /// Returns the `iss` claim.
    #[must_use]
    pub fn issuer(&self) -> Option<&str> {
        self.string("iss")
    }
}

/// The identity a provider vouched for, normalized across providers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedIdentity {
    /// Email as supplied by the provider (trimmed, not yet lower-cased).
    pub email: String,
    /// Whether the provider vouches for the email.
    pub email_verified: bool,
    /// The provider's stable identifier for the user.
    pub provider_subject_id: String,
    /// Display name, if one could be determined.
    pub display_name: Option<String>,
}

/// Extracts a [`NormalizedIdentity`] from verified claims.
///
/// The email comes from the first non-empty claim in the mapping's email
/// list and the subject from its subject list. The display name is `name`
/// when non-blank, else `given_name family_name` when both are non-blank.
///
/// # Errors
///
/// - `MissingIdentity` if no email or subject claim is present.
/// - `EmailNotVerified` if the provider marks the email unverified, or the
///   policy requires the claim and it is absent.
pub fn resolve_identity(
    claims: &VerifiedClaims,
    mapping: &ClaimMapping,
    policy: EmailVerifiedPolicy,
) -> Result<NormalizedIdentity, ResolveError> {
    let email = claims
        .first_string(mapping.email_claims())
        .ok_or(ResolveError::MissingIdentity { claim: "email" })?;
    let subject = claims
        .first_string(mapping.subject_claims())
        .ok_or(ResolveError::MissingIdentity { claim: "sub" })?;

    let email_verified = match email_verified_claim(claims) {
        Some(verified) => verified,
        None => policy == EmailVerifiedPolicy::TrustWhenAbsent,
    };
    if !email_verified {
        return Err(ResolveError::EmailNotVerified);
    }

    Ok(NormalizedIdentity {
        email: email.to_string(),
        email_verified,
        provider_subject_id: subject.to_string(),
        display_name: display_name(claims),
    })
}

// Some providers send the flag as a string.
fn email_verified_claim(claims: &VerifiedClaims) -> Option<bool> {
    match claims.get("email_verified")? {
        Value::Bool(verified) => Some(*verified),
        Value::String(s) if s.eq_ignore_ascii_case("true") => Some(true),
        Value::String(s) if s.eq_ignore_ascii_case("false") => Some(false),
        _ => None,
    }
}

fn display_name(claims: &VerifiedClaims) -> Option<String> {
    if let Some(name) = claims.string("name") {
        return Some(name.to_string());
    }
    match (claims.string("given_name"), claims.string("family_name")) {
        (Some(given), Some(family)) => Some(format!("{given} {family}")),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn claims(value: Value) -> VerifiedClaims {
        match value {
            Value::Object(map) => VerifiedClaims::new(map),
            _ => panic!("claims must be an object"),
        }
    }

    fn microsoft_mapping() -> ClaimMapping {
        ClaimMapping::new(&["oid", "sub"], &["email", "preferred_username"])
    }

    #[test]
    fn resolves_standard_claims() {
        let identity = resolve_identity(
            &claims(json!({
                "sub": "u1",
                "email": "foo@x.com",
                "email_verified": true,
                "name": "Foo Bar"
            })),
            &ClaimMapping::default(),
            EmailVerifiedPolicy::TrustWhenAbsent,
        )
        .expect("identity");

        assert_eq!(identity.email, "foo@x.com");
        assert_eq!(identity.provider_subject_id, "u1");
        assert!(identity.email_verified);
        assert_eq!(identity.display_name.as_deref(), Some("Foo Bar"));
    }

    #[test]
    fn falls_back_to_preferred_username_and_sub() {
        let identity = resolve_identity(
            &claims(json!({ "sub": "s1", "preferred_username": "user@contoso.com" })),
            &microsoft_mapping(),
            EmailVerifiedPolicy::TrustWhenAbsent,
        )
        .expect("identity");

        assert_eq!(identity.email, "user@contoso.com");
        assert_eq!(identity.provider_subject_id, "s1");
    }

    #[test]
    fn object_id_wins_over_sub() {
        let identity = resolve_identity(
            &claims(json!({ "sub": "pairwise", "oid": "object-id", "email": "a@b.c" })),
            &microsoft_mapping(),
            EmailVerifiedPolicy::TrustWhenAbsent,
        )
        .expect("identity");

        assert_eq!(identity.provider_subject_id, "object-id");
    }

    #[test]
    fn missing_email_is_missing_identity() {
        let err = resolve_identity(
            &claims(json!({ "sub": "u1", "email": "  " })),
            &ClaimMapping::default(),
            EmailVerifiedPolicy::TrustWhenAbsent,
        )
        .unwrap_err();
        assert_eq!(err, ResolveError::MissingIdentity { claim: "email" });
    }

    #[test]
    fn missing_subject_is_missing_identity() {
        let err = resolve_identity(
            &claims(json!({ "email": "a@b.c" })),
            &ClaimMapping::default(),
            EmailVerifiedPolicy::TrustWhenAbsent,
        )
        .unwrap_err();
        assert_eq!(err, ResolveError::MissingIdentity { claim: "sub" });
    }

    #[test]
    fn explicit_unverified_email_is_rejected() {
        for flag in [json!(false), json!("false")] {
            let err = resolve_identity(
                &claims(json!({ "sub": "u1", "email": "a@b.c", "email_verified": flag })),
                &ClaimMapping::default(),
                EmailVerifiedPolicy::TrustWhenAbsent,
            )
            .unwrap_err();
            assert_eq!(err, ResolveError::EmailNotVerified);
        }
    }

    #[test]
    fn absent_flag_follows_policy() {
        let token = claims(json!({ "sub": "u1", "email": "a@b.c" }));

        let trusted = resolve_identity(
            &token,
            &ClaimMapping::default(),
            EmailVerifiedPolicy::TrustWhenAbsent,
        )
        .expect("trusted");
        assert!(trusted.email_verified);

        let err = resolve_identity(
            &token,
            &ClaimMapping::default(),
            EmailVerifiedPolicy::RequireClaim,
        )
        .unwrap_err();
        assert_eq!(err, ResolveError::EmailNotVerified);
    }

    #[test]
    fn missing_identity_is_reported_before_verification() {
        let err = resolve_identity(
            &claims(json!({ "sub": "u1", "email_verified": false })),
            &ClaimMapping::default(),
            EmailVerifiedPolicy::TrustWhenAbsent,
        )
        .unwrap_err();
        assert_eq!(err, ResolveError::MissingIdentity { claim: "email" });
    }

    #[test]
    fn display_name_synthesized_from_given_and_family() {
        let identity = resolve_identity(
            &claims(json!({
                "sub": "u1",
                "email": "a@b.c",
                "name": " ",
                "given_name": "Ada",
                "family_name": " Lovelace "
            })),
            &ClaimMapping::default(),
            EmailVerifiedPolicy::TrustWhenAbsent,
        )
        .expect("identity");
        assert_eq!(identity.display_name.as_deref(), Some("Ada Lovelace"));
    }

    #[test]
    fn display_name_absent_with_only_given_name() {
        let identity = resolve_identity(
            &claims(json!({ "sub": "u1", "email": "a@b.c", "given_name": "Ada" })),
            &ClaimMapping::default(),
            EmailVerifiedPolicy::TrustWhenAbsent,
        )
        .expect("identity");
        assert!(identity.display_name.is_none());
    }
}
