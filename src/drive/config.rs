use crate::config::env_string;
use once_cell::sync::Lazy;
use std::env;

pub static API_ROOT: Lazy<String> = Lazy::new(|| {
    env::var("GOOGLE_DRIVE_API_ROOT")
        .unwrap_or_else(|_| "https://www.googleapis.com/drive/v3".to_string())
});

pub static UPLOAD_ROOT: Lazy<String> = Lazy::new(|| {
    env::var("GOOGLE_DRIVE_UPLOAD_ROOT")
        .unwrap_or_else(|_| "https://www.googleapis.com/upload/drive/v3".to_string())
});

pub static OAUTH_TOKEN_URL: Lazy<String> = Lazy::new(|| {
    env::var("GOOGLE_OAUTH_TOKEN_URL")
        .unwrap_or_else(|_| "https://oauth2.googleapis.com/token".to_string())
});

#[derive(Debug, Clone)]
pub enum DriveCredentials {
    /// Pre-minted bearer token, used as-is.
    AccessToken(String),
    /// OAuth client with an offline refresh token.
    Refresh {
        client_id: String,
        client_secret: String,
        refresh_token: String,
    },
}

#[derive(Debug, Clone)]
pub struct DriveConfig {
    pub api_root: String,
    pub upload_root: String,
    pub token_url: String,
    pub credentials: Option<DriveCredentials>,
}

impl DriveConfig {
    pub fn from_env() -> Self {
        let credentials = env_string("GOOGLE_DRIVE_ACCESS_TOKEN")
            .map(DriveCredentials::AccessToken)
            .or_else(|| {
                Some(DriveCredentials::Refresh {
                    client_id: env_string("GOOGLE_CLIENT_ID")?,
                    client_secret: env_string("GOOGLE_CLIENT_SECRET")?,
                    refresh_token: env_string("GOOGLE_REFRESH_TOKEN")?,
                })
            });
        Self {
            api_root: API_ROOT.trim_end_matches('/').to_string(),
            upload_root: UPLOAD_ROOT.trim_end_matches('/').to_string(),
            token_url: OAUTH_TOKEN_URL.clone(),
            credentials,
        }
    }
}
