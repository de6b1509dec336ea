//! In-process stand-ins for the remote collaborators, shared by unit tests.

use crate::conversation::{
    ConversationState, ConversationStore, ConversationStoreError, MemoryConversationStore,
};
use crate::extraction::{ExtractionError, TextExtractor};
use crate::gateway::{GatewayError, MessagingGateway};
use crate::models::{Listing, ListingDraft, NewListing, PhotoUploadSession};
use crate::storage::{FolderRef, RemoteStorage, StorageError};
use crate::store::{ListingStore, StoreError, memory::MemoryListingStore};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

pub const ROOT_NAME: &str = "Emlak";

#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub id: String,
    pub name: String,
    pub mime_type: String,
    pub parent_id: String,
    pub size: usize,
}

#[derive(Default)]
struct Drive {
    next_id: usize,
    folders: Vec<FolderRef>,
    public: HashSet<String>,
    files: Vec<UploadedFile>,
    deleted: Vec<String>,
    get_folder_calls: usize,
    failing_uploads: usize,
    fail_create: bool,
    fail_search: bool,
    fail_delete: bool,
}

impl Drive {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}{}", self.next_id)
    }
}

/// Folder tree kept in memory. Ids are handed out in creation order.
#[derive(Default)]
pub struct FakeStorage {
    drive: Mutex<Drive>,
}

impl FakeStorage {
    pub fn with_root(root_id: &str) -> Self {
        let storage = Self::default();
        storage.drive.lock().unwrap().folders.push(FolderRef {
            id: root_id.to_string(),
            name: ROOT_NAME.to_string(),
            parent_id: None,
        });
        storage
    }

    pub fn insert_folder(&self, name: &str, parent_id: Option<&str>) -> String {
        let mut drive = self.drive.lock().unwrap();
        let id = drive.next_id("f");
        drive.folders.push(FolderRef {
            id: id.clone(),
            name: name.to_string(),
            parent_id: parent_id.map(str::to_string),
        });
        id
    }

    pub fn folder(&self, id: &str) -> Option<FolderRef> {
        self.drive
            .lock()
            .unwrap()
            .folders
            .iter()
            .find(|folder| folder.id == id)
            .cloned()
    }

    pub fn folders_named(&self, name: &str) -> Vec<FolderRef> {
        self.drive
            .lock()
            .unwrap()
            .folders
            .iter()
            .filter(|folder| folder.name == name)
            .cloned()
            .collect()
    }

    pub fn is_public(&self, id: &str) -> bool {
        self.drive.lock().unwrap().public.contains(id)
    }

    pub fn uploads(&self) -> Vec<UploadedFile> {
        self.drive.lock().unwrap().files.clone()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.drive.lock().unwrap().deleted.clone()
    }

    pub fn get_folder_calls(&self) -> usize {
        self.drive.lock().unwrap().get_folder_calls
    }

    /// The next `count` uploads fail with a transient error.
    pub fn fail_next_uploads(&self, count: usize) {
        self.drive.lock().unwrap().failing_uploads = count;
    }

    pub fn fail_create(&self, fail: bool) {
        self.drive.lock().unwrap().fail_create = fail;
    }

    pub fn fail_search(&self, fail: bool) {
        self.drive.lock().unwrap().fail_search = fail;
    }

    pub fn fail_delete(&self, fail: bool) {
        self.drive.lock().unwrap().fail_delete = fail;
    }
}

#[async_trait]
impl RemoteStorage for FakeStorage {
    async fn create_folder(&self, name: &str, parent_id: &str) -> Result<String, StorageError> {
        let mut drive = self.drive.lock().unwrap();
        if drive.fail_create {
            return Err(StorageError::Transient("HTTP 503".into()));
        }
        let id = drive.next_id("f");
        drive.folders.push(FolderRef {
            id: id.clone(),
            name: name.to_string(),
            parent_id: Some(parent_id.to_string()),
        });
        drive.public.insert(id.clone());
        Ok(id)
    }

    async fn find_child_folder(
        &self,
        name: &str,
        parent_id: &str,
    ) -> Result<Option<FolderRef>, StorageError> {
        Ok(self
            .drive
            .lock()
            .unwrap()
            .folders
            .iter()
            .find(|folder| folder.name == name && folder.parent_id.as_deref() == Some(parent_id))
            .cloned())
    }

    async fn upload_file(
        &self,
        bytes: Vec<u8>,
        name: &str,
        mime_type: &str,
        parent_id: &str,
    ) -> Result<String, StorageError> {
        let mut drive = self.drive.lock().unwrap();
        if drive.failing_uploads > 0 {
            drive.failing_uploads -= 1;
            return Err(StorageError::Transient("upload timed out".into()));
        }
        let id = drive.next_id("p");
        drive.public.insert(id.clone());
        drive.files.push(UploadedFile {
            id: id.clone(),
            name: name.to_string(),
            mime_type: mime_type.to_string(),
            parent_id: parent_id.to_string(),
            size: bytes.len(),
        });
        Ok(format!("https://drive.google.com/file/d/{id}/view?usp=sharing"))
    }

    async fn search_folders_by_name(
        &self,
        fragment: &str,
    ) -> Result<Vec<FolderRef>, StorageError> {
        let drive = self.drive.lock().unwrap();
        if drive.fail_search {
            return Err(StorageError::Permanent("HTTP 403".into()));
        }
        let needle = fragment.to_lowercase();
        Ok(drive
            .folders
            .iter()
            .filter(|folder| folder.name.to_lowercase().contains(&needle))
            .cloned()
            .collect())
    }

    async fn get_folder(&self, id: &str) -> Result<FolderRef, StorageError> {
        let mut drive = self.drive.lock().unwrap();
        drive.get_folder_calls += 1;
        drive
            .folders
            .iter()
            .find(|folder| folder.id == id)
            .cloned()
            .ok_or_else(|| StorageError::Permanent(format!("folder {id} not found")))
    }

    async fn delete_folder_by_id(&self, id: &str) -> Result<(), StorageError> {
        let mut drive = self.drive.lock().unwrap();
        if drive.fail_delete {
            return Err(StorageError::Permanent("HTTP 403".into()));
        }
        let before = drive.folders.len();
        drive.folders.retain(|folder| folder.id != id);
        if drive.folders.len() == before {
            return Err(StorageError::Permanent(format!("folder {id} not found")));
        }
        drive.deleted.push(id.to_string());
        Ok(())
    }

    fn folder_url(&self, id: &str) -> String {
        format!("https://drive.google.com/drive/folders/{id}")
    }
}

/// Returns a fixed draft, or fails every call when built with `failing`.
pub struct FakeExtractor {
    draft: Option<ListingDraft>,
    calls: AtomicUsize,
}

impl FakeExtractor {
    pub fn returning(draft: ListingDraft) -> Self {
        Self {
            draft: Some(draft),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            draft: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TextExtractor for FakeExtractor {
    async fn extract(&self, _message: &str) -> Result<ListingDraft, ExtractionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.draft.clone().ok_or(ExtractionError::Empty)
    }
}

/// Serves registered media URLs and records outbound messages.
#[derive(Default)]
pub struct FakeGateway {
    media: Mutex<HashMap<String, Vec<u8>>>,
    sent: Mutex<Vec<(String, String)>>,
    download_delay: Mutex<Option<Duration>>,
}

impl FakeGateway {
    pub fn with_media(self, url: &str, bytes: &[u8]) -> Self {
        self.media
            .lock()
            .unwrap()
            .insert(url.to_string(), bytes.to_vec());
        self
    }

    pub fn with_download_delay(self, delay: Duration) -> Self {
        *self.download_delay.lock().unwrap() = Some(delay);
        self
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessagingGateway for FakeGateway {
    async fn download_media(&self, url: &str) -> Result<Vec<u8>, GatewayError> {
        let delay = *self.download_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.media
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or(GatewayError::Status(404))
    }

    async fn send_message(&self, to: &str, text: &str) -> bool {
        self.sent
            .lock()
            .unwrap()
            .push((to.to_string(), text.to_string()));
        true
    }
}

/// Memory store whose writes can be made to fail.
#[derive(Default)]
pub struct FlakyListingStore {
    pub inner: MemoryListingStore,
    fail_create_listing: AtomicBool,
    failing_session_saves: AtomicUsize,
    fail_delete_listing: AtomicBool,
}

impl FlakyListingStore {
    pub fn fail_create_listing(&self, fail: bool) {
        self.fail_create_listing.store(fail, Ordering::SeqCst);
    }

    pub fn fail_next_session_saves(&self, count: usize) {
        self.failing_session_saves.store(count, Ordering::SeqCst);
    }

    pub fn fail_delete_listing(&self, fail: bool) {
        self.fail_delete_listing.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl ListingStore for FlakyListingStore {
    async fn create_listing(&self, listing: NewListing) -> Result<Listing, StoreError> {
        if self.fail_create_listing.load(Ordering::SeqCst) {
            return Err(StoreError::Request("connection reset".into()));
        }
        self.inner.create_listing(listing).await
    }

    async fn get_listing(&self, id: i64) -> Result<Option<Listing>, StoreError> {
        self.inner.get_listing(id).await
    }

    async fn list_listings(&self, skip: usize, limit: usize) -> Result<Vec<Listing>, StoreError> {
        self.inner.list_listings(skip, limit).await
    }

    async fn delete_listing_by_title_fragment(
        &self,
        fragment: &str,
    ) -> Result<Option<Listing>, StoreError> {
        if self.fail_delete_listing.load(Ordering::SeqCst) {
            return Err(StoreError::Request("connection reset".into()));
        }
        self.inner.delete_listing_by_title_fragment(fragment).await
    }

    async fn create_session(
        &self,
        session: &PhotoUploadSession,
    ) -> Result<PhotoUploadSession, StoreError> {
        self.inner.create_session(session).await
    }

    async fn get_session(&self, user_id: &str) -> Result<Option<PhotoUploadSession>, StoreError> {
        self.inner.get_session(user_id).await
    }

    async fn save_session(&self, session: &PhotoUploadSession) -> Result<(), StoreError> {
        let failed = self
            .failing_session_saves
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if failed {
            return Err(StoreError::Request("connection reset".into()));
        }
        self.inner.save_session(session).await
    }

    async fn delete_session(&self, user_id: &str) -> Result<bool, StoreError> {
        self.inner.delete_session(user_id).await
    }
}

/// Conversation store whose resets to idle can be made to fail.
#[derive(Default)]
pub struct FlakyConversationStore {
    pub inner: MemoryConversationStore,
    fail_resets: AtomicBool,
}

impl FlakyConversationStore {
    pub fn fail_resets(&self, fail: bool) {
        self.fail_resets.store(fail, Ordering::SeqCst);
    }

    fn reset_error(&self) -> Option<ConversationStoreError> {
        self.fail_resets
            .load(Ordering::SeqCst)
            .then(|| ConversationStoreError::Backend("connection reset".into()))
    }
}

#[async_trait]
impl ConversationStore for FlakyConversationStore {
    async fn load(&self, user_id: &str) -> Result<ConversationState, ConversationStoreError> {
        self.inner.load(user_id).await
    }

    async fn save(
        &self,
        user_id: &str,
        state: &ConversationState,
    ) -> Result<(), ConversationStoreError> {
        if *state == ConversationState::Idle
            && let Some(err) = self.reset_error()
        {
            return Err(err);
        }
        self.inner.save(user_id, state).await
    }

    async fn clear(&self, user_id: &str) -> Result<(), ConversationStoreError> {
        if let Some(err) = self.reset_error() {
            return Err(err);
        }
        self.inner.clear(user_id).await
    }
}
