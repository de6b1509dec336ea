use super::config::{DriveConfig, DriveCredentials};
use crate::http::is_transient_error;
use crate::storage::StorageError;
use reqwest::Client;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

/// Tokens are refreshed this long before Google says they expire.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

struct CachedToken {
    value: String,
    expires_at: Instant,
}

/// Hands out Drive access tokens, refreshing through OAuth when needed.
pub struct TokenSource {
    credentials: Option<DriveCredentials>,
    token_url: String,
    cached: Mutex<Option<CachedToken>>,
}

impl TokenSource {
    pub fn new(config: &DriveConfig) -> Self {
        Self {
            credentials: config.credentials.clone(),
            token_url: config.token_url.clone(),
            cached: Mutex::new(None),
        }
    }

    pub async fn access_token(&self, http: &Client) -> Result<String, StorageError> {
        let (client_id, client_secret, refresh_token) = match &self.credentials {
            None => {
                return Err(StorageError::Permanent(
                    "missing google drive credentials in env".into(),
                ));
            }
            Some(DriveCredentials::AccessToken(token)) => return Ok(token.clone()),
            Some(DriveCredentials::Refresh {
                client_id,
                client_secret,
                refresh_token,
            }) => (client_id, client_secret, refresh_token),
        };

        let mut guard = self.cached.lock().await;
        if let Some(token) = guard.as_ref()
            && token.expires_at > Instant::now()
        {
            return Ok(token.value.clone());
        }

        let params = [
            ("grant_type", "refresh_token"),
            ("client_id", client_id.as_str()),
            ("client_secret", client_secret.as_str()),
            ("refresh_token", refresh_token.as_str()),
        ];
        let response = http
            .post(&self.token_url)
            .form(&params)
            .send()
            .await
            .map_err(|err| {
                if is_transient_error(&err) {
                    StorageError::Transient(format!("oauth: {err}"))
                } else {
                    StorageError::Permanent(format!("oauth: {err}"))
                }
            })?;
        let status = response.status();
        if !status.is_success() {
            let message = format!("oauth: HTTP {status}");
            return Err(if crate::http::is_transient_status(status) {
                StorageError::Transient(message)
            } else {
                StorageError::Permanent(message)
            });
        }
        let payload: TokenResponse = response
            .json()
            .await
            .map_err(|err| StorageError::Permanent(format!("oauth: {err}")))?;

        let lifetime = Duration::from_secs(payload.expires_in.unwrap_or(3600));
        debug!(target = "listing.drive", lifetime_secs = lifetime.as_secs(), "drive token refreshed");
        *guard = Some(CachedToken {
            value: payload.access_token.clone(),
            expires_at: Instant::now() + lifetime.saturating_sub(EXPIRY_MARGIN),
        });
        Ok(payload.access_token)
    }
}
