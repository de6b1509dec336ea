use super::{ListingStore, StoreError};
use crate::config::env_string;
use crate::models::{Listing, NewListing, PhotoUploadSession};
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use urlencoding::encode;

const LISTINGS_TABLE: &str = "emlak_ilanlar";
const SESSIONS_TABLE: &str = "photo_upload_sessions";

#[derive(Debug, Clone)]
pub struct SupabaseConfig {
    pub base_url: String,
    pub service_key: String,
}

impl SupabaseConfig {
    pub fn from_env() -> Option<Self> {
        let base_url = env_string("SUPABASE_URL")?;
        let service_key = env_string("SUPABASE_SERVICE_ROLE_KEY")
            .or_else(|| env_string("SUPABASE_SERVICE_KEY"))
            .or_else(|| env_string("SUPABASE_KEY"))?;
        Some(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            service_key,
        })
    }
}

/// Listing store over the PostgREST interface of a Supabase project.
#[derive(Debug, Clone)]
pub struct SupabaseListingStore {
    config: SupabaseConfig,
    http: Client,
}

impl SupabaseListingStore {
    pub fn new(config: SupabaseConfig, http: Client) -> Self {
        Self { config, http }
    }

    fn request(&self, method: Method, table: &str, query: &str) -> RequestBuilder {
        let url = format!("{}/rest/v1/{table}?{query}", self.config.base_url);
        self.http
            .request(method, url)
            .header("apikey", &self.config.service_key)
            .bearer_auth(&self.config.service_key)
    }

    fn returning(&self, method: Method, table: &str, query: &str) -> RequestBuilder {
        self.request(method, table, query)
            .header("Prefer", "return=representation")
    }
}

async fn read_rows<T: DeserializeOwned>(
    sent: Result<Response, reqwest::Error>,
) -> Result<Vec<T>, StoreError> {
    let response = sent.map_err(|err| StoreError::Request(err.to_string()))?;
    if !response.status().is_success() {
        return Err(StoreError::Request(format!("HTTP {}", response.status())));
    }
    response
        .json()
        .await
        .map_err(|err| StoreError::Deserialize(err.to_string()))
}

#[async_trait]
impl ListingStore for SupabaseListingStore {
    async fn create_listing(&self, listing: NewListing) -> Result<Listing, StoreError> {
        let sent = self
            .returning(Method::POST, LISTINGS_TABLE, "select=*")
            .json(&listing)
            .send()
            .await;
        let mut rows: Vec<Listing> = read_rows(sent).await?;
        rows.pop()
            .ok_or_else(|| StoreError::Deserialize("insert returned no row".into()))
    }

    async fn get_listing(&self, id: i64) -> Result<Option<Listing>, StoreError> {
        let query = format!("id=eq.{id}&select=*&limit=1");
        let sent = self.request(Method::GET, LISTINGS_TABLE, &query).send().await;
        let mut rows: Vec<Listing> = read_rows(sent).await?;
        Ok(rows.pop())
    }

    async fn list_listings(&self, skip: usize, limit: usize) -> Result<Vec<Listing>, StoreError> {
        let query = format!("select=*&order=id.asc&offset={skip}&limit={limit}");
        let sent = self.request(Method::GET, LISTINGS_TABLE, &query).send().await;
        read_rows(sent).await
    }

    async fn delete_listing_by_title_fragment(
        &self,
        fragment: &str,
    ) -> Result<Option<Listing>, StoreError> {
        let fragment = fragment.trim();
        if fragment.is_empty() {
            return Ok(None);
        }
        let query = format!(
            "select=*&baslik=like.*{}*&order=id.asc&limit=1",
            encode(fragment)
        );
        let sent = self.request(Method::GET, LISTINGS_TABLE, &query).send().await;
        let mut rows: Vec<Listing> = read_rows(sent).await?;
        let Some(found) = rows.pop() else {
            return Ok(None);
        };

        let query = format!("id=eq.{}", found.id);
        let sent = self
            .returning(Method::DELETE, LISTINGS_TABLE, &query)
            .send()
            .await;
        let mut deleted: Vec<Listing> = read_rows(sent).await?;
        Ok(deleted.pop())
    }

    async fn create_session(
        &self,
        session: &PhotoUploadSession,
    ) -> Result<PhotoUploadSession, StoreError> {
        let sent = self
            .returning(Method::POST, SESSIONS_TABLE, "select=*")
            .json(session)
            .send()
            .await;
        let mut rows: Vec<PhotoUploadSession> = read_rows(sent).await?;
        rows.pop()
            .ok_or_else(|| StoreError::Deserialize("insert returned no row".into()))
    }

    async fn get_session(&self, user_id: &str) -> Result<Option<PhotoUploadSession>, StoreError> {
        let query = format!("user_id=eq.{}&select=*&limit=1", encode(user_id));
        let sent = self.request(Method::GET, SESSIONS_TABLE, &query).send().await;
        let mut rows: Vec<PhotoUploadSession> = read_rows(sent).await?;
        Ok(rows.pop())
    }

    async fn save_session(&self, session: &PhotoUploadSession) -> Result<(), StoreError> {
        let query = format!("user_id=eq.{}", encode(&session.user_id));
        let sent = self
            .returning(Method::PATCH, SESSIONS_TABLE, &query)
            .json(session)
            .send()
            .await;
        let rows: Vec<PhotoUploadSession> = read_rows(sent).await?;
        if rows.is_empty() {
            return Err(StoreError::MissingSession(session.user_id.clone()));
        }
        Ok(())
    }

    async fn delete_session(&self, user_id: &str) -> Result<bool, StoreError> {
        let query = format!("user_id=eq.{}", encode(user_id));
        let sent = self
            .returning(Method::DELETE, SESSIONS_TABLE, &query)
            .send()
            .await;
        let rows: Vec<PhotoUploadSession> = read_rows(sent).await?;
        Ok(!rows.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn store(base_url: &str) -> SupabaseListingStore {
        SupabaseListingStore::new(
            SupabaseConfig {
                base_url: base_url.to_string(),
                service_key: "service-key".into(),
            },
            Client::new(),
        )
    }

    fn row(id: i64, title: &str) -> serde_json::Value {
        json!({
            "id": id,
            "baslik": title,
            "aciklama": "",
            "fiyat": null,
            "mahalle": "Moda",
            "sokak": "Bahçe Sk.",
            "oda_sayisi": "2+1",
            "metrekare": 95.0,
            "drive_link": "https://drive.google.com/drive/folders/f1",
            "foto_linkleri": ["https://drive.google.com/file/d/p1/view?usp=sharing"]
        })
    }

    #[tokio::test]
    async fn fragment_delete_looks_up_then_deletes_by_id() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/emlak_ilanlar"))
            .and(query_param("baslik", "like.*Moda-Bahçe Sk-2+1*"))
            .and(query_param("order", "id.asc"))
            .and(header("apikey", "service-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([row(7, "Moda-Bahçe Sk-2+1")])))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/rest/v1/emlak_ilanlar"))
            .and(query_param("id", "eq.7"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([row(7, "Moda-Bahçe Sk-2+1")])))
            .expect(1)
            .mount(&server)
            .await;

        let deleted = store(&server.uri())
            .delete_listing_by_title_fragment("Moda-Bahçe Sk-2+1")
            .await
            .expect("delete");
        assert_eq!(deleted.map(|l| l.id), Some(7));
    }

    #[tokio::test]
    async fn missing_listing_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/emlak_ilanlar"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;

        assert_eq!(store(&server.uri()).get_listing(42).await.expect("get"), None);
    }

    #[tokio::test]
    async fn save_session_reports_missing_row() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/rest/v1/photo_upload_sessions"))
            .and(header("prefer", "return=representation"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;

        let session = PhotoUploadSession::new("whatsapp:+905551112233", "awaiting_photos");
        let err = store(&server.uri())
            .save_session(&session)
            .await
            .expect_err("no row");
        assert!(matches!(err, StoreError::MissingSession(_)));
    }

    #[tokio::test]
    async fn server_errors_surface_as_request_failures() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/emlak_ilanlar"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let listing = NewListing {
            title: "Moda--3+1".into(),
            description: String::new(),
            price: None,
            neighborhood: "Moda".into(),
            street: String::new(),
            room_count: "3+1".into(),
            area: None,
            drive_link: None,
            photo_links: vec![],
        };
        let err = store(&server.uri())
            .create_listing(listing)
            .await
            .expect_err("503");
        assert!(matches!(err, StoreError::Request(_)));
    }
}
