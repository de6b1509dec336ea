use crate::config::{env_parse, env_string};
use crate::models::ApiError;
use axum::{
    Json,
    body::Body,
    extract::State,
    http::{self, Request, StatusCode, header::HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use base64::{Engine, engine::general_purpose::STANDARD};
use hmac::{Hmac, Mac};
use sha1::Sha1;
use std::{collections::HashMap, convert::Infallible, sync::Arc, time::Instant};
use tokio::sync::Mutex;
use tracing::{info, warn};

pub const API_KEY_HEADER: &str = "X-Listing-Key";
pub const SIGNATURE_HEADER: &str = "X-Twilio-Signature";

/// API-key authentication plus per-client rate limiting for the listing API.
#[derive(Clone)]
pub struct AuthState {
    clients: Arc<HashMap<String, AuthContext>>,
    limiter: Arc<TokenBuckets>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthContext {
    pub client_id: String,
    pub api_key_id: String,
}

impl AuthState {
    pub fn from_env() -> Self {
        let raw = env_string("LISTING_API_KEYS").unwrap_or_default();
        let rate_per_sec = env_parse::<f64>("RATE_LIMIT_PER_SEC")
            .filter(|value| *value > 0.0)
            .unwrap_or(5.0);
        let capacity = env_parse::<f64>("RATE_LIMIT_CAPACITY")
            .filter(|value| *value >= 1.0)
            .unwrap_or(10.0);
        Self::from_entries(&raw, rate_per_sec, capacity)
    }

    /// `raw` is a comma-separated `client:key` list. With no usable entry every
    /// request is rejected.
    pub fn from_entries(raw: &str, rate_per_sec: f64, capacity: f64) -> Self {
        let clients = Arc::new(parse_keys(raw));
        let limiter = Arc::new(TokenBuckets::new(rate_per_sec, capacity));
        Self { clients, limiter }
    }

    fn authenticate(&self, presented: &str) -> Option<AuthContext> {
        self.clients.get(presented).cloned()
    }
}

pub async fn require_api_auth(
    State(state): State<AuthState>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, Infallible> {
    let Some(presented) = extract_api_key(request.headers()) else {
        return Ok(error_response(
            StatusCode::UNAUTHORIZED,
            "missing_api_key",
            "Provide X-Listing-Key or Bearer token",
        ));
    };

    let Some(context) = state.authenticate(&presented) else {
        return Ok(error_response(
            StatusCode::UNAUTHORIZED,
            "invalid_api_key",
            "Key not recognized",
        ));
    };

    match state.limiter.consume(&context.client_id).await {
        Ok(permit) => {
            request.extensions_mut().insert(context);
            let mut response = next.run(request).await;
            permit.apply_headers(response.headers_mut());
            Ok(response)
        }
        Err(exceeded) => {
            warn!(target = "listing.api", client = %context.client_id, "rate limited");
            let mut response = error_response(
                StatusCode::TOO_MANY_REQUESTS,
                "rate_limited",
                "Too many requests",
            );
            exceeded.apply_headers(response.headers_mut());
            Ok(response)
        }
    }
}

fn extract_api_key(headers: &http::HeaderMap) -> Option<String> {
    if let Some(value) = headers.get(http::header::AUTHORIZATION)
        && let Ok(raw) = value.to_str()
        && raw.len() >= 7
        && raw[..6].eq_ignore_ascii_case("bearer")
    {
        return Some(raw[6..].trim().to_string());
    }
    headers
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn error_response(status: StatusCode, code: &str, message: &str) -> Response {
    let payload = ApiError {
        error: code.to_string(),
        detail: Some(message.to_string()),
    };
    (status, Json(payload)).into_response()
}

fn parse_keys(raw: &str) -> HashMap<String, AuthContext> {
    let mut entries = HashMap::new();
    for (idx, token) in raw.split(',').enumerate() {
        let trimmed = token.trim();
        if trimmed.is_empty() {
            continue;
        }
        let mut parts = trimmed.splitn(2, ':');
        let client = parts.next().map(str::trim).filter(|s| !s.is_empty());
        let key = parts.next().map(str::trim).filter(|s| !s.is_empty());
        match (client, key) {
            (Some(client), Some(secret)) => {
                entries.insert(
                    secret.to_string(),
                    AuthContext {
                        client_id: client.to_string(),
                        api_key_id: format!("key-{:02}", idx + 1),
                    },
                );
            }
            _ => warn!(target = "listing.api", "ignored malformed LISTING_API_KEYS entry #{}", idx + 1),
        }
    }

    if entries.is_empty() {
        warn!(
            target = "listing.api",
            "LISTING_API_KEYS produced no keys; listing API will reject all requests"
        );
    } else {
        info!(target = "listing.api", key_count = entries.len(), "loaded API keys");
    }
    entries
}

struct TokenBuckets {
    rate_per_sec: f64,
    capacity: f64,
    buckets: Mutex<HashMap<String, BucketState>>,
}

impl TokenBuckets {
    fn new(rate_per_sec: f64, capacity: f64) -> Self {
        Self {
            rate_per_sec,
            capacity,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    async fn consume(&self, key: &str) -> Result<RatePermit, RateExceeded> {
        let mut guard = self.buckets.lock().await;
        let now = Instant::now();
        let state = guard.entry(key.to_string()).or_insert_with(|| BucketState {
            tokens: self.capacity,
            last_refill: now,
        });

        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        if elapsed > 0.0 {
            state.tokens = (state.tokens + elapsed * self.rate_per_sec).min(self.capacity);
            state.last_refill = now;
        }

        let snapshot = RateSnapshot {
            capacity: self.capacity,
            tokens: state.tokens,
            rate: self.rate_per_sec,
        };
        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            Ok(RatePermit(RateSnapshot {
                tokens: state.tokens,
                ..snapshot
            }))
        } else {
            Err(RateExceeded(snapshot))
        }
    }
}

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

#[derive(Debug, Clone, Copy)]
struct RateSnapshot {
    capacity: f64,
    tokens: f64,
    rate: f64,
}

impl RateSnapshot {
    fn reset_secs(&self) -> u64 {
        ((self.capacity - self.tokens) / self.rate).ceil().max(0.0) as u64
    }

    fn apply_headers(&self, headers: &mut http::HeaderMap, remaining: u64) {
        headers.insert("X-RateLimit-Limit", header_number(self.capacity as u64));
        headers.insert("X-RateLimit-Remaining", header_number(remaining));
        headers.insert("X-RateLimit-Reset", header_number(self.reset_secs()));
    }
}

#[derive(Debug)]
struct RatePermit(RateSnapshot);

impl RatePermit {
    fn apply_headers(&self, headers: &mut http::HeaderMap) {
        let remaining = self.0.tokens.max(0.0).floor() as u64;
        self.0.apply_headers(headers, remaining);
    }
}

#[derive(Debug)]
struct RateExceeded(RateSnapshot);

impl RateExceeded {
    fn apply_headers(&self, headers: &mut http::HeaderMap) {
        let retry = ((1.0 - self.0.tokens) / self.0.rate).ceil().max(1.0) as u64;
        headers.insert(http::header::RETRY_AFTER, header_number(retry));
        self.0.apply_headers(headers, 0);
    }
}

fn header_number(value: u64) -> HeaderValue {
    HeaderValue::from(value)
}

/// Checks `X-Twilio-Signature`: base64 HMAC-SHA1, keyed with the account auth
/// token, over the public webhook URL followed by every form field as
/// `name + value` in name order.
#[derive(Clone)]
pub struct SignatureVerifier {
    auth_token: String,
    public_url: String,
}

impl SignatureVerifier {
    pub fn new(auth_token: impl Into<String>, public_url: impl Into<String>) -> Self {
        Self {
            auth_token: auth_token.into(),
            public_url: public_url.into(),
        }
    }

    pub fn verify(&self, signature: Option<&str>, params: &HashMap<String, String>) -> bool {
        let Some(decoded) = signature.and_then(|value| STANDARD.decode(value.trim()).ok()) else {
            return false;
        };
        let Ok(mut mac) = Hmac::<Sha1>::new_from_slice(self.auth_token.as_bytes()) else {
            return false;
        };
        mac.update(self.signed_payload(params).as_bytes());
        mac.verify_slice(&decoded).is_ok()
    }

    fn signed_payload(&self, params: &HashMap<String, String>) -> String {
        let mut keys: Vec<&String> = params.keys().collect();
        keys.sort();
        let mut payload = self.public_url.clone();
        for key in keys {
            payload.push_str(key);
            payload.push_str(&params[key]);
        }
        payload
    }
}
