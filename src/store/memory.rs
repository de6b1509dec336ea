use super::{ListingStore, StoreError};
use crate::models::{Listing, NewListing, PhotoUploadSession};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::Mutex;

/// Process-local store used when no database is configured.
#[derive(Default)]
pub struct MemoryListingStore {
    listings: Mutex<Listings>,
    sessions: Mutex<HashMap<String, PhotoUploadSession>>,
}

#[derive(Default)]
struct Listings {
    next_id: i64,
    rows: BTreeMap<i64, Listing>,
}

#[async_trait]
impl ListingStore for MemoryListingStore {
    async fn create_listing(&self, listing: NewListing) -> Result<Listing, StoreError> {
        let mut guard = self.listings.lock().await;
        guard.next_id += 1;
        let stored = listing.into_listing(guard.next_id);
        guard.rows.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn get_listing(&self, id: i64) -> Result<Option<Listing>, StoreError> {
        Ok(self.listings.lock().await.rows.get(&id).cloned())
    }

    async fn list_listings(&self, skip: usize, limit: usize) -> Result<Vec<Listing>, StoreError> {
        let guard = self.listings.lock().await;
        Ok(guard.rows.values().skip(skip).take(limit).cloned().collect())
    }

    async fn delete_listing_by_title_fragment(
        &self,
        fragment: &str,
    ) -> Result<Option<Listing>, StoreError> {
        let fragment = fragment.trim();
        if fragment.is_empty() {
            return Ok(None);
        }
        let mut guard = self.listings.lock().await;
        let matched = guard
            .rows
            .values()
            .find(|listing| listing.title.contains(fragment))
            .map(|listing| listing.id);
        Ok(matched.and_then(|id| guard.rows.remove(&id)))
    }

    async fn create_session(
        &self,
        session: &PhotoUploadSession,
    ) -> Result<PhotoUploadSession, StoreError> {
        let mut guard = self.sessions.lock().await;
        guard.insert(session.user_id.clone(), session.clone());
        Ok(session.clone())
    }

    async fn get_session(&self, user_id: &str) -> Result<Option<PhotoUploadSession>, StoreError> {
        Ok(self.sessions.lock().await.get(user_id).cloned())
    }

    async fn save_session(&self, session: &PhotoUploadSession) -> Result<(), StoreError> {
        let mut guard = self.sessions.lock().await;
        match guard.get_mut(&session.user_id) {
            Some(existing) => {
                *existing = session.clone();
                Ok(())
            }
            None => Err(StoreError::MissingSession(session.user_id.clone())),
        }
    }

    async fn delete_session(&self, user_id: &str) -> Result<bool, StoreError> {
        Ok(self.sessions.lock().await.remove(user_id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing(title: &str) -> NewListing {
        NewListing {
            title: title.into(),
            description: String::new(),
            price: None,
            neighborhood: String::new(),
            street: String::new(),
            room_count: String::new(),
            area: None,
            drive_link: None,
            photo_links: vec![],
        }
    }

    #[tokio::test]
    async fn fragment_delete_takes_first_match_in_id_order() {
        let store = MemoryListingStore::default();
        let first = store.create_listing(listing("Moda-Bahçe Sk-2+1")).await.unwrap();
        let second = store.create_listing(listing("Moda-Bahçe Sk-2+1 yeni")).await.unwrap();

        let deleted = store
            .delete_listing_by_title_fragment("Moda-Bahçe Sk-2+1")
            .await
            .unwrap();
        assert_eq!(deleted.map(|l| l.id), Some(first.id));
        let remaining = store.list_listings(0, 10).await.unwrap();
        assert_eq!(remaining, vec![second]);
    }

    #[tokio::test]
    async fn blank_fragment_matches_nothing() {
        let store = MemoryListingStore::default();
        store.create_listing(listing("Moda--3+1")).await.unwrap();
        assert_eq!(store.delete_listing_by_title_fragment("  ").await.unwrap(), None);
        assert_eq!(store.list_listings(0, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn save_requires_existing_session() {
        let store = MemoryListingStore::default();
        let session = PhotoUploadSession::new("u1", "awaiting_photos");
        assert!(matches!(
            store.save_session(&session).await,
            Err(StoreError::MissingSession(_))
        ));
        store.create_session(&session).await.unwrap();
        let mut updated = session.clone();
        updated.record_photo("https://drive.example/p".into());
        store.save_session(&updated).await.unwrap();
        assert_eq!(store.get_session("u1").await.unwrap(), Some(updated));
        assert!(store.delete_session("u1").await.unwrap());
        assert!(!store.delete_session("u1").await.unwrap());
    }
}
