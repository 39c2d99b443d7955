//! Fixtures shared by the auth tests: RSA keys, token signing, a scripted
//! provider client and a ready-made application state.

use async_trait::async_trait;
use chrono::Utc;
use gatehouse_platform_access::memory::MemoryUserStore;
use gatehouse_platform_access::{
    ProviderCredentials, ProviderRegistry, ProviderScheme, SESSION_TTL_SECONDS, SessionIssuer,
};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use super::AppState;
use super::jwks::{Jwk, JwkSet, KeySetCache};
use super::provider_client::{FetchedKeySet, ProviderClient, ProviderClientError, TokenResponse};
use super::session::SessionCookies;
use super::verify::TokenVerifier;

pub const CLIENT_ID: &str = "client-123";
pub const GOOGLE_ISSUER: &str = "https://accounts.google.com";
pub const FRONTEND_ORIGIN: &str = "https://app.test";
pub const GATEWAY_ORIGIN: &str = "https://api.test";
pub const SESSION_SECRET: &str = "session-secret";

pub const PRIMARY_N: &str = "teydLaywnRf9THKDX31POpo-uKX1UCLYUnOMwhfWIARdZiUS9wN5g0uPp6GBSTWNYt4OhP5ulfJ-uplMu6gsE07z6GERg1JT1eGKWyS-97sTUOKthf_PnVv13ssym-eM1Q-UKd5IYrGn2xhQ0cAdK0ctpIdIknljxJvgOF3R09-zdixya6777Cg6WdJoCl8uTGyDsrBzBVEF1V6HqNcBAyuMmyJWM9swwVFzjeGGnhAcp9nqC1E2ihmCr1pLVgqFNXPJgkkN4Xsg_Sn3FZEXDyENm0OVCV62xzsc_2CyqIO2QBMEmcKmUJs1G8vJyJCRf8N7kufxRNDo-0o_uuYomQ";
pub const ROTATED_N: &str = "lXhRslE8TJMf7r9il-MTCOm71pHdZpbuY_TM6tBEyFoRumlX9fxjJnONtSkgYiIph76N1kjd1eFSgb8tnHQN3Se3b3CbPp8LVE5UbzzupPsu5oukbVeij4LRZ2EvZRYnYMDbcgbrAj_QKQNYYOjkQNixu2ZSy-1AADuRH5_BPbWBfisjlQpzAg19Dp0GurUy6mXGQdHEZJRddY_9pESrH541_w-aE09dlnPGjL7k2NMqgRYyF-l0sHlcQOWlknehYpmmdSiK_R6OJWR3gNFKfG9OhZ_T9xiTrnv9N7JQwBBHTh0Bx_RlEzPZXO5szb1ttL74f5iM_BHDnLiB4Stu7Q";

const PRIMARY_PEM: &str = include_str!("testdata/rsa_primary.pem");
const ROTATED_PEM: &str = include_str!("testdata/rsa_rotated.pem");

#[derive(Debug, Clone, Copy)]
pub enum TestKey {
    Primary,
    Rotated,
}

/// Signs `claims` with RS256 under `kid`.
pub fn sign(key: TestKey, kid: &str, claims: &Value) -> String {
    let pem = match key {
        TestKey::Primary => PRIMARY_PEM,
        TestKey::Rotated => ROTATED_PEM,
    };
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(kid.to_string());
    let key = EncodingKey::from_rsa_pem(pem.as_bytes()).expect("test key");
    jsonwebtoken::encode(&header, claims, &key).expect("sign")
}

/// A valid Google identity token payload.
pub fn id_token_claims(subject: &str, email: &str) -> Value {
    let now = Utc::now().timestamp();
    json!({
        "iss": GOOGLE_ISSUER,
        "aud": CLIENT_ID,
        "sub": subject,
        "email": email,
        "email_verified": true,
        "iat": now,
        "exp": now + 3600
    })
}

pub fn jwk(kid: &str, n: &str) -> Jwk {
    Jwk {
        kid: Some(kid.to_string()),
        kty: "RSA".to_string(),
        alg: Some("RS256".to_string()),
        key_use: Some("sig".to_string()),
        n: Some(n.to_string()),
        e: Some("AQAB".to_string()),
    }
}

pub fn key_set(keys: &[(&str, &str)]) -> JwkSet {
    JwkSet {
        keys: keys.iter().map(|(kid, n)| jwk(kid, n)).collect(),
    }
}

fn credentials() -> ProviderCredentials {
    ProviderCredentials {
        client_id: CLIENT_ID.to_string(),
        client_secret: "client-secret".to_string(),
        require_email_verified_claim: false,
    }
}

pub fn google_scheme() -> ProviderScheme {
    ProviderScheme::google(&credentials()).with_endpoints(
        "https://google.test/auth",
        "https://google.test/token",
        "https://google.test/certs",
    )
}

pub fn microsoft_scheme() -> ProviderScheme {
    ProviderScheme::microsoft(&credentials()).with_endpoints(
        "https://microsoft.test/authorize",
        "https://microsoft.test/token",
        "https://microsoft.test/keys",
    )
}

/// One recorded code exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exchange {
    pub token_endpoint: String,
    pub code: String,
    pub redirect_uri: String,
}

#[derive(Default)]
struct Script {
    token_responses: VecDeque<Result<TokenResponse, ProviderClientError>>,
    key_sets: VecDeque<FetchedKeySet>,
    exchanges: Vec<Exchange>,
    key_set_fetches: usize,
}

/// A [`ProviderClient`] that replays queued responses and records calls.
/// An exhausted queue answers with a transport error.
#[derive(Default)]
pub struct FakeProviderClient {
    script: Mutex<Script>,
}

impl FakeProviderClient {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push_token_response(&self, response: Result<TokenResponse, ProviderClientError>) {
        self.lock().token_responses.push_back(response);
    }

    pub fn push_id_token(&self, id_token: String) {
        self.push_token_response(Ok(TokenResponse {
            id_token: Some(id_token),
        }));
    }

    pub fn push_key_set(&self, document: JwkSet, max_age: Option<Duration>) {
        self.lock()
            .key_sets
            .push_back(FetchedKeySet { document, max_age });
    }

    pub fn exchanges(&self) -> Vec<Exchange> {
        self.lock().exchanges.clone()
    }

    pub fn key_set_fetches(&self) -> usize {
        self.lock().key_set_fetches
    }
}

#[async_trait]
impl ProviderClient for FakeProviderClient {
    async fn exchange_code(
        &self,
        scheme: &ProviderScheme,
        code: &str,
        redirect_uri: &str,
    ) -> Result<TokenResponse, ProviderClientError> {
        let mut script = self.lock();
        script.exchanges.push(Exchange {
            token_endpoint: scheme.token_endpoint().to_string(),
            code: code.to_string(),
            redirect_uri: redirect_uri.to_string(),
        });
        script
            .token_responses
            .pop_front()
            .unwrap_or_else(|| {
                Err(ProviderClientError::Transport {
                    details: "no scripted token response".to_string(),
                })
            })
    }

    async fn fetch_key_set(&self, _jwks_uri: &str) -> Result<FetchedKeySet, ProviderClientError> {
        let mut script = self.lock();
        let next = script.key_sets.pop_front();
        if next.is_some() {
            script.key_set_fetches += 1;
        }
        next.ok_or_else(|| ProviderClientError::Transport {
            details: "no scripted key set".to_string(),
        })
    }
}

/// Application state over a fake provider client and an in-memory store,
/// with Google and Microsoft configured and the primary key published.
pub struct TestApp {
    pub state: Arc<AppState>,
    pub client: Arc<FakeProviderClient>,
    pub store: Arc<MemoryUserStore>,
}

impl TestApp {
    pub fn new() -> Self {
        let client = Arc::new(FakeProviderClient::new());
        client.push_key_set(key_set(&[("k1", PRIMARY_N)]), None);
        let store = Arc::new(MemoryUserStore::new());
        let registry = Arc::new(ProviderRegistry::from_schemes(vec![
            google_scheme(),
            microsoft_scheme(),
        ]));
        let verifier = TokenVerifier::new(
            KeySetCache::new(client.clone(), Duration::from_secs(3600)),
            Arc::clone(&registry),
        );
        let sessions = SessionCookies::new(
            SessionIssuer::new(SESSION_SECRET, SESSION_TTL_SECONDS).expect("issuer"),
            true,
        );
        let state = Arc::new(AppState {
            registry,
            client: client.clone(),
            verifier,
            store: store.clone(),
            sessions,
            frontend_origin: FRONTEND_ORIGIN.to_string(),
            public_base_url: Some(GATEWAY_ORIGIN.to_string()),
        });
        Self {
            state,
            client,
            store,
        }
    }
}
