//! Messaging gateway (Twilio WhatsApp): inbound form parsing, TwiML replies,
//! media downloads and outbound sends.

use crate::config::env_string;
use crate::models::{InboundEvent, MediaAttachment};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Clone, Default)]
pub struct TwilioConfig {
    pub api_root: String,
    pub account_sid: String,
    pub auth_token: String,
    pub phone_number: String,
}

impl TwilioConfig {
    pub fn from_env() -> Self {
        Self {
            api_root: env_string("TWILIO_API_ROOT")
                .unwrap_or_else(|| "https://api.twilio.com".into()),
            account_sid: env_string("TWILIO_ACCOUNT_SID").unwrap_or_default(),
            auth_token: env_string("TWILIO_AUTH_TOKEN").unwrap_or_default(),
            phone_number: env_string("TWILIO_PHONE_NUMBER").unwrap_or_default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("gateway request failed: {0}")]
    Request(String),
    #[error("gateway returned HTTP {0}")]
    Status(u16),
}

impl GatewayError {
    pub fn is_transient(&self) -> bool {
        match self {
            GatewayError::Request(_) => true,
            GatewayError::Status(code) => *code == 429 || *code >= 500,
        }
    }
}

#[async_trait]
pub trait MessagingGateway: Send + Sync {
    /// Fetches an inbound media attachment using the gateway credentials.
    async fn download_media(&self, url: &str) -> Result<Vec<u8>, GatewayError>;

    /// Sends a text message; failures are logged and reported as `false`.
    async fn send_message(&self, to: &str, text: &str) -> bool;
}

pub struct TwilioGateway {
    http: Client,
    config: TwilioConfig,
}

#[derive(Deserialize)]
struct MessageResource {
    sid: String,
}

impl TwilioGateway {
    pub fn new(config: TwilioConfig, http: Client) -> Self {
        Self { http, config }
    }
}

#[async_trait]
impl MessagingGateway for TwilioGateway {
    async fn download_media(&self, url: &str) -> Result<Vec<u8>, GatewayError> {
        let response = self
            .http
            .get(url)
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
            .send()
            .await
            .map_err(|err| GatewayError::Request(err.to_string()))?;
        if !response.status().is_success() {
            return Err(GatewayError::Status(response.status().as_u16()));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|err| GatewayError::Request(err.to_string()))?;
        Ok(bytes.to_vec())
    }

    async fn send_message(&self, to: &str, text: &str) -> bool {
        let url = format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.config.api_root.trim_end_matches('/'),
            urlencoding::encode(&self.config.account_sid)
        );
        let from = format!("whatsapp:{}", self.config.phone_number);
        let result = self
            .http
            .post(url)
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
            .form(&[("From", from.as_str()), ("To", to), ("Body", text)])
            .send()
            .await;
        let response = match result {
            Ok(response) if response.status().is_success() => response,
            Ok(response) => {
                warn!(target = "listing.gateway", to = %to, status = %response.status(), "message send rejected");
                return false;
            }
            Err(err) => {
                warn!(target = "listing.gateway", to = %to, error = %err, "message send failed");
                return false;
            }
        };
        match response.json::<MessageResource>().await {
            Ok(message) => info!(target = "listing.gateway", to = %to, sid = %message.sid, "message sent"),
            Err(_) => info!(target = "listing.gateway", to = %to, "message sent"),
        }
        true
    }
}

/// Webhook form fields (`From`, `Body`, `NumMedia`, `MediaUrl{i}`,
/// `MediaContentType{i}`) as a sender and an [`InboundEvent`]. `None` when
/// there is no sender.
pub fn event_from_form(form: &HashMap<String, String>) -> Option<(String, InboundEvent)> {
    let sender = form
        .get("From")
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())?;
    let count = form
        .get("NumMedia")
        .and_then(|value| value.trim().parse::<usize>().ok())
        .unwrap_or(0);
    let media = (0..count)
        .filter_map(|idx| {
            let url = form.get(&format!("MediaUrl{idx}"))?.trim().to_string();
            let content_type = form
                .get(&format!("MediaContentType{idx}"))
                .map(|value| value.trim().to_string())
                .unwrap_or_default();
            (!url.is_empty()).then_some(MediaAttachment { url, content_type })
        })
        .collect();
    let event = InboundEvent {
        text: form.get("Body").cloned(),
        media,
    };
    Some((sender, event))
}

/// TwiML body wrapping zero or one message.
pub fn twiml(message: Option<&str>) -> String {
    let mut out = String::from(r#"<?xml version="1.0" encoding="UTF-8"?><Response>"#);
    if let Some(text) = message {
        out.push_str("<Message>");
        out.push_str(&escape_xml(text));
        out.push_str("</Message>");
    }
    out.push_str("</Response>");
    out
}

fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            other => out.push(other),
        }
    }
    out
}
