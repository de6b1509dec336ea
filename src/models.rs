use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

/// Nominal photo ceiling for a new session; the real count is open until the
/// user sends the completion command.
pub const NOMINAL_EXPECTED_PHOTOS: u32 = 999;

/// One webhook delivery, reduced to what the conversation needs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InboundEvent {
    pub text: Option<String>,
    pub media: Vec<MediaAttachment>,
}

impl InboundEvent {
    #[cfg(test)]
    pub fn text(body: impl Into<String>) -> Self {
        Self {
            text: Some(body.into()),
            media: Vec::new(),
        }
    }

    /// Trimmed text body, `None` when absent or blank.
    pub fn trimmed_text(&self) -> Option<&str> {
        self.text
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaAttachment {
    pub url: String,
    pub content_type: String,
}

/// Structured listing fields extracted from a free-text message.
#[skip_serializing_none]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListingDraft {
    pub title: String,
    pub description: String,
    pub price: Option<f64>,
    pub neighborhood: Option<String>,
    pub street: Option<String>,
    pub room_count: Option<String>,
    pub area: Option<f64>,
    pub folder_link: Option<String>,
}

/// A finished listing as stored. Column names follow the `emlak_ilanlar` table.
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    pub id: i64,
    #[serde(rename = "baslik")]
    pub title: String,
    #[serde(rename = "aciklama", default)]
    pub description: String,
    #[serde(rename = "fiyat")]
    pub price: Option<f64>,
    #[serde(rename = "mahalle", default)]
    pub neighborhood: String,
    #[serde(rename = "sokak", default)]
    pub street: String,
    #[serde(rename = "oda_sayisi", default)]
    pub room_count: String,
    #[serde(rename = "metrekare")]
    pub area: Option<f64>,
    pub drive_link: Option<String>,
    #[serde(rename = "foto_linkleri", default)]
    pub photo_links: Vec<String>,
}

/// Insert payload for [`Listing`]; the store assigns the id.
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewListing {
    #[serde(rename = "baslik")]
    pub title: String,
    #[serde(rename = "aciklama")]
    pub description: String,
    #[serde(rename = "fiyat")]
    pub price: Option<f64>,
    #[serde(rename = "mahalle")]
    pub neighborhood: String,
    #[serde(rename = "sokak")]
    pub street: String,
    #[serde(rename = "oda_sayisi")]
    pub room_count: String,
    #[serde(rename = "metrekare")]
    pub area: Option<f64>,
    pub drive_link: Option<String>,
    #[serde(rename = "foto_linkleri")]
    pub photo_links: Vec<String>,
}

impl NewListing {
    pub fn into_listing(self, id: i64) -> Listing {
        Listing {
            id,
            title: self.title,
            description: self.description,
            price: self.price,
            neighborhood: self.neighborhood,
            street: self.street,
            room_count: self.room_count,
            area: self.area,
            drive_link: self.drive_link,
            photo_links: self.photo_links,
        }
    }
}

/// Durable record of one user's in-progress photo collection.
///
/// `received_photos` always equals `photo_links.len()`; only
/// [`PhotoUploadSession::record_photo`] changes either.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhotoUploadSession {
    pub user_id: String,
    pub expected_photos: u32,
    pub received_photos: u32,
    pub drive_folder_id: Option<String>,
    #[serde(default)]
    pub photo_links: Vec<String>,
    pub state: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PhotoUploadSession {
    pub fn new(user_id: &str, state: &str) -> Self {
        let now = Utc::now();
        Self {
            user_id: user_id.to_string(),
            expected_photos: NOMINAL_EXPECTED_PHOTOS,
            received_photos: 0,
            drive_folder_id: None,
            photo_links: Vec::new(),
            state: state.to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn record_photo(&mut self, link: String) {
        self.photo_links.push(link);
        self.received_photos = self.photo_links.len() as u32;
        self.updated_at = Utc::now();
    }

    /// Reverts the most recent [`record_photo`](Self::record_photo).
    pub fn forget_last_photo(&mut self) {
        self.photo_links.pop();
        self.received_photos = self.photo_links.len() as u32;
    }
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListingQuery {
    #[serde(default)]
    pub skip: usize,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    100
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_photo_keeps_count_in_step_with_links() {
        let mut session = PhotoUploadSession::new("whatsapp:+905551112233", "awaiting_photos");
        session.record_photo("https://drive.example/a".into());
        session.record_photo("https://drive.example/b".into());
        assert_eq!(session.received_photos, 2);
        session.forget_last_photo();
        assert_eq!(session.received_photos, 1);
        assert_eq!(session.photo_links, vec!["https://drive.example/a".to_string()]);
    }

    #[test]
    fn listing_serializes_with_table_column_names() {
        let listing = NewListing {
            title: "Moda-Bahçe Sk-2+1".into(),
            description: String::new(),
            price: None,
            neighborhood: "Moda".into(),
            street: "Bahçe Sk.".into(),
            room_count: "2+1".into(),
            area: Some(95.0),
            drive_link: None,
            photo_links: vec![],
        };
        let value = serde_json::to_value(&listing).expect("serialize");
        assert_eq!(value["baslik"], "Moda-Bahçe Sk-2+1");
        assert_eq!(value["metrekare"], 95.0);
        assert!(value.get("fiyat").is_none());
        assert!(value.get("drive_link").is_none());
    }

    #[test]
    fn trimmed_text_ignores_blank_bodies() {
        assert_eq!(InboundEvent::text("  ").trimmed_text(), None);
        assert_eq!(InboundEvent::text(" /sil ").trimmed_text(), Some("/sil"));
        assert_eq!(InboundEvent::default().trimmed_text(), None);
    }
}
