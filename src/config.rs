use crate::drive::DriveConfig;
use crate::gateway::TwilioConfig;
use crate::llm::LlmConfig;
use crate::store::supabase::SupabaseConfig;
use std::{env, str::FromStr};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable `{0}`")]
    Missing(&'static str),
}

#[derive(Debug, Clone)]
pub struct HttpTimeouts {
    pub request_secs: u64,
    pub connect_secs: u64,
}

impl Default for HttpTimeouts {
    fn default() -> Self {
        Self {
            request_secs: 15,
            connect_secs: 5,
        }
    }
}

impl HttpTimeouts {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            request_secs: env_parse("HTTP_TIMEOUT_SECS")
                .filter(|v| *v > 0)
                .unwrap_or(defaults.request_secs),
            connect_secs: env_parse("HTTP_CONNECT_TIMEOUT_SECS")
                .filter(|v| *v > 0)
                .unwrap_or(defaults.connect_secs),
        }
    }
}

/// Everything the service reads from the environment, resolved once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub body_limit: usize,
    /// Drive folder that holds every listing folder.
    pub root_folder_id: String,
    pub http: HttpTimeouts,
    pub twilio: TwilioConfig,
    /// Public URL of `/webhook` as the gateway sees it; enables signature checks.
    pub webhook_public_url: Option<String>,
    pub llm: LlmConfig,
    pub drive: DriveConfig,
    pub supabase: Option<SupabaseConfig>,
    pub redis_url: Option<String>,
    pub conversation_ttl_secs: u64,
    pub outbox_capacity: usize,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let root_folder_id = env_string("GOOGLE_DRIVE_MAIN_FOLDER_ID")
            .ok_or(ConfigError::Missing("GOOGLE_DRIVE_MAIN_FOLDER_ID"))?;
        Ok(Self {
            port: env_parse("PORT").unwrap_or(8000),
            body_limit: env_parse("REQUEST_MAX_BYTES")
                .filter(|v: &usize| *v > 0)
                .unwrap_or(256 * 1024),
            root_folder_id,
            http: HttpTimeouts::from_env(),
            twilio: TwilioConfig::from_env(),
            webhook_public_url: env_string("WEBHOOK_PUBLIC_URL"),
            llm: LlmConfig::from_env(),
            drive: DriveConfig::from_env(),
            supabase: SupabaseConfig::from_env(),
            redis_url: env_string("REDIS_URL"),
            conversation_ttl_secs: env_parse("CONVERSATION_TTL_SECS")
                .filter(|v| *v > 0)
                .unwrap_or(24 * 3600),
            outbox_capacity: env_parse("OUTBOX_CAPACITY")
                .filter(|v| *v > 0)
                .unwrap_or(64),
        })
    }
}

/// Non-empty, trimmed value of an environment variable.
pub fn env_string(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

pub fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    env_string(key).and_then(|value| value.parse::<T>().ok())
}
