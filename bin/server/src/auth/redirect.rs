//! Return destinations for the browser after a login attempt.
//!
//! The front-end passes its return path through the provider as the OAuth
//! `state`: base64url of `{"returnTo": "..."}`, or the bare path. Only
//! destinations on the configured front-end origin are honoured; anything
//! else lands on the origin itself.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use gatehouse_platform_access::AuthFailure;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Used when no front-end origin is configured.
pub const DEFAULT_FRONTEND_ORIGIN: &str = "https://emperjs.com";

// `returnTo` is read as any JSON value; only strings are honoured.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReturnState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    return_to: Option<Value>,
}

/// Encodes a return path as an OAuth `state` value.
#[must_use]
pub fn encode_state(return_to: &str) -> String {
    let state = ReturnState {
        return_to: Some(Value::String(return_to.to_string())),
    };
    // Serializing a string map cannot fail.
    let json = serde_json::to_vec(&state).unwrap_or_default();
    URL_SAFE_NO_PAD.encode(json)
}

fn decode_state(state: &str) -> Option<String> {
    let bytes = URL_SAFE_NO_PAD.decode(state.trim_end_matches('=')).ok()?;
    let parsed: ReturnState = serde_json::from_slice(&bytes).ok()?;
    match parsed.return_to? {
        Value::String(return_to) => Some(return_to),
        _ => None,
    }
}

/// Resolves the destination encoded in `state` against `frontend_origin`.
///
/// - no state: the origin, unchanged
/// - a path starting with `/`: joined onto the origin
/// - an absolute URL on the origin: that URL
/// - anything else, including paths that resolve off-origin: the origin
#[must_use]
pub fn resolve_return_to(state: Option<&str>, frontend_origin: &str) -> String {
    let origin = frontend_origin.to_string();
    let Some(state) = state.filter(|s| !s.is_empty()) else {
        return origin;
    };
    let return_to = decode_state(state).unwrap_or_else(|| state.to_string());
    if return_to.is_empty() {
        return origin;
    }
    let Ok(base) = Url::parse(frontend_origin) else {
        return origin;
    };

    let candidate = if return_to.starts_with('/') {
        base.join(&return_to)
    } else {
        Url::parse(&return_to)
    };
    match candidate {
        Ok(url) if url.origin() == base.origin() => url.to_string(),
        _ => origin,
    }
}

/// Adds `authError` and `authErrorDescription` to a return destination,
/// replacing any earlier values.
#[must_use]
pub fn with_auth_error(location: &str, failure: &AuthFailure) -> String {
    let Ok(mut url) = Url::parse(location) else {
        return location.to_string();
    };
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| key != "authError" && key != "authErrorDescription")
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();
    {
        let mut query = url.query_pairs_mut();
        query.clear();
        for (key, value) in &kept {
            query.append_pair(key, value);
        }
        query.append_pair("authError", failure.code());
        query.append_pair("authErrorDescription", failure.description());
    }
    url.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatehouse_platform_access::ConflictKind;

    const ORIGIN: &str = "https://app.test";

    fn state_for(return_to: &str) -> String {
        encode_state(return_to)
    }

    #[test]
    fn absent_state_is_origin() {
        assert_eq!(resolve_return_to(None, ORIGIN), ORIGIN);
        assert_eq!(resolve_return_to(Some(""), ORIGIN), ORIGIN);
    }

    #[test]
    fn relative_path_joins_origin() {
        let state = state_for("/dashboard?tab=2");
        assert_eq!(
            resolve_return_to(Some(&state), ORIGIN),
            "https://app.test/dashboard?tab=2"
        );
    }

    #[test]
    fn same_origin_absolute_url_is_kept() {
        let state = state_for("https://app.test/settings#profile");
        assert_eq!(
            resolve_return_to(Some(&state), ORIGIN),
            "https://app.test/settings#profile"
        );
    }

    #[test]
    fn foreign_absolute_url_falls_back_to_origin() {
        for target in [
            "https://evil.test/steal",
            "http://app.test/downgrade",
            "https://app.test:8443/port",
            "javascript:alert(1)",
        ] {
            let state = state_for(target);
            assert_eq!(resolve_return_to(Some(&state), ORIGIN), ORIGIN, "{target}");
        }
    }

    #[test]
    fn protocol_relative_paths_fall_back_to_origin() {
        for target in ["//evil.test/x", "/\\evil.test/x"] {
            let state = state_for(target);
            assert_eq!(resolve_return_to(Some(&state), ORIGIN), ORIGIN, "{target}");
        }
    }

    #[test]
    fn raw_state_is_used_as_path() {
        assert_eq!(
            resolve_return_to(Some("/plain/path"), ORIGIN),
            "https://app.test/plain/path"
        );
        assert_eq!(resolve_return_to(Some("opaque-csrf-value"), ORIGIN), ORIGIN);
    }

    #[test]
    fn padded_state_decodes() {
        let padded = format!("{}==", state_for("/a"));
        assert_eq!(resolve_return_to(Some(&padded), ORIGIN), "https://app.test/a");
    }

    #[test]
    fn non_string_return_to_is_ignored() {
        let state = URL_SAFE_NO_PAD.encode(br#"{"returnTo":42}"#);
        assert_eq!(resolve_return_to(Some(&state), ORIGIN), ORIGIN);
    }

    #[test]
    fn auth_error_is_appended() {
        let location = with_auth_error(
            "https://app.test/page?tab=2",
            &AuthFailure::AccountConflict(ConflictKind::DifferentProvider),
        );
        let url = Url::parse(&location).expect("url");
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        assert_eq!(url.path(), "/page");
        assert!(pairs.contains(&("tab".to_string(), "2".to_string())));
        assert!(pairs.contains(&("authError".to_string(), "oauth_conflict".to_string())));
        assert!(pairs.contains(&(
            "authErrorDescription".to_string(),
            ConflictKind::DifferentProvider.description().to_string()
        )));
    }

    #[test]
    fn auth_error_replaces_previous_error() {
        let location = with_auth_error(
            "https://app.test/?authError=stale&authErrorDescription=old",
            &AuthFailure::MissingCode,
        );
        let url = Url::parse(&location).expect("url");
        let errors: Vec<String> = url
            .query_pairs()
            .filter(|(k, _)| k == "authError")
            .map(|(_, v)| v.into_owned())
            .collect();
        assert_eq!(errors, vec!["missing_code".to_string()]);
    }
}
