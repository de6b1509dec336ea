use crate::finalizer::parse_decimal;
use crate::llm::{LlmClient, LlmMessage};
use crate::models::ListingDraft;
use crate::naming;
use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

const PROMPT_TEMPLATE: &str = r#"
Aşağıdaki emlak mesajını analiz et ve yalnızca bir JSON nesnesi döndür.

Mesaj: "{message}"

Alanlar:
{
  "baslik": "...",
  "aciklama": "...",
  "fiyat": 0,
  "konum": "...",
  "sokak": "...",
  "oda_sayisi": "...",
  "metrekare": "..."
}

Kurallar:
- "fiyat" TL cinsindendir, sadece sayı yaz.
- "konum" alanına sadece mahalle adını yaz.
- "sokak" alanına sadece sokak/cadde adını yaz.
- "oda_sayisi" alanına sadece oda sayısını yaz (örn: "2+1").
- "metrekare" alanına varsa metrekare bilgisini yaz.
- Mesajda birden fazla satır varsa ilk satır genellikle mahalledir; baştaki emoji veya işaretleri temizle.
- JSON dışında hiçbir şey yazma.
"#;

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("llm request failed: {0}")]
    Llm(String),
    #[error("unable to parse listing json")]
    Parse,
    #[error("no listing fields found")]
    Empty,
}

/// Turns a free-text listing message into a draft.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract(&self, message: &str) -> Result<ListingDraft, ExtractionError>;
}

pub struct LlmExtractor {
    llm: LlmClient,
}

impl LlmExtractor {
    pub fn new(llm: LlmClient) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl TextExtractor for LlmExtractor {
    async fn extract(&self, message: &str) -> Result<ListingDraft, ExtractionError> {
        let prompt = PROMPT_TEMPLATE.replace("{message}", message);
        let response = self
            .llm
            .chat(&[LlmMessage::user(prompt)])
            .await
            .map_err(|err| ExtractionError::Llm(err.to_string()))?;
        if let Some(usage) = &response.usage {
            debug!(
                target = "listing.extraction",
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "extraction usage"
            );
        }
        draft_from_response(message, &response.text)
    }
}

/// Builds a draft from the model output. A missing neighborhood falls back to
/// the first non-empty line of the original message.
pub fn draft_from_response(message: &str, raw: &str) -> Result<ListingDraft, ExtractionError> {
    let cleaned = strip_markdown_fence(raw);
    let value: Value = serde_json::from_str(&cleaned).map_err(|_| ExtractionError::Parse)?;
    let Value::Object(fields) = value else {
        return Err(ExtractionError::Parse);
    };

    let mut draft = ListingDraft {
        title: String::new(),
        description: text_field(&fields, &["aciklama", "description"]).unwrap_or_default(),
        price: numeric_field(&fields, "fiyat"),
        neighborhood: text_field(&fields, &["konum", "mahalle"]),
        street: text_field(&fields, &["sokak"]),
        room_count: text_field(&fields, &["oda_sayisi"]),
        area: numeric_field(&fields, "metrekare"),
        folder_link: None,
    };

    if draft.neighborhood.is_none() {
        draft.neighborhood = first_line_neighborhood(message);
    }

    let nothing_extracted = text_field(&fields, &["baslik", "title"]).is_none()
        && draft.description.is_empty()
        && draft.price.is_none()
        && draft.neighborhood.is_none()
        && draft.street.is_none()
        && draft.room_count.is_none()
        && draft.area.is_none();
    if nothing_extracted {
        return Err(ExtractionError::Empty);
    }

    draft.title = naming::draft_title(&draft);
    Ok(draft)
}

fn text_field(fields: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| fields.get(*key))
        .find_map(|value| match value {
            Value::String(s) => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .filter(|s| !s.is_empty())
}

fn numeric_field(fields: &Map<String, Value>, key: &str) -> Option<f64> {
    match fields.get(key)? {
        Value::Number(n) => n.as_f64().filter(|v| v.is_finite()),
        Value::String(s) => parse_decimal(s),
        _ => None,
    }
}

fn first_line_neighborhood(message: &str) -> Option<String> {
    message
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(|line| {
            line.trim_start_matches(|c: char| !(c.is_alphanumeric() || c == '_'))
                .trim()
                .to_string()
        })
        .filter(|line| !line.is_empty())
}

fn strip_markdown_fence(input: &str) -> String {
    let trimmed = input.trim();
    if !trimmed.starts_with("```") {
        return trimmed.to_string();
    }
    trimmed
        .lines()
        .skip(1)
        .take_while(|line| !line.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n")
}
