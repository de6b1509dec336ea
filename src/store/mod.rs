//! Durable listings and in-flight photo-upload sessions.

pub mod memory;
pub mod supabase;

use crate::models::{Listing, NewListing, PhotoUploadSession};
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("request failed: {0}")]
    Request(String),
    #[error("invalid response: {0}")]
    Deserialize(String),
    #[error("photo upload session for `{0}` not found")]
    MissingSession(String),
}

#[async_trait]
pub trait ListingStore: Send + Sync {
    async fn create_listing(&self, listing: NewListing) -> Result<Listing, StoreError>;

    async fn get_listing(&self, id: i64) -> Result<Option<Listing>, StoreError>;

    /// Listings in ascending id order.
    async fn list_listings(&self, skip: usize, limit: usize) -> Result<Vec<Listing>, StoreError>;

    /// Deletes the first listing (ascending id) whose title contains
    /// `fragment` and returns it. A blank fragment matches nothing.
    async fn delete_listing_by_title_fragment(
        &self,
        fragment: &str,
    ) -> Result<Option<Listing>, StoreError>;

    async fn create_session(
        &self,
        session: &PhotoUploadSession,
    ) -> Result<PhotoUploadSession, StoreError>;

    async fn get_session(&self, user_id: &str) -> Result<Option<PhotoUploadSession>, StoreError>;

    /// Overwrites the stored session for `session.user_id`.
    async fn save_session(&self, session: &PhotoUploadSession) -> Result<(), StoreError>;

    /// Returns whether a session was removed.
    async fn delete_session(&self, user_id: &str) -> Result<bool, StoreError>;
}
