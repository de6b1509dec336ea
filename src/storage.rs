//! Remote folder/file storage contract and the listing-folder helpers built on it.

use crate::models::ListingDraft;
use crate::naming::{self, FolderPlacement};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use thiserror::Error;
use tracing::{info, warn};

/// Parent walks stop here even if the remote tree is deeper (or cyclic).
const MAX_PATH_DEPTH: usize = 32;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage temporarily unavailable: {0}")]
    Transient(String),
    #[error("storage request failed: {0}")]
    Permanent(String),
}

impl StorageError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StorageError::Transient(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderRef {
    pub id: String,
    pub name: String,
    pub parent_id: Option<String>,
}

/// Folder and file operations against the remote drive. Anything created is
/// readable by anyone with the link before the call returns. Implementations
/// do not retry.
#[async_trait]
pub trait RemoteStorage: Send + Sync {
    async fn create_folder(&self, name: &str, parent_id: &str) -> Result<String, StorageError>;

    /// Exact-name lookup among the direct children of `parent_id`.
    async fn find_child_folder(
        &self,
        name: &str,
        parent_id: &str,
    ) -> Result<Option<FolderRef>, StorageError>;

    /// Uploads `bytes` and returns a public link to the file.
    async fn upload_file(
        &self,
        bytes: Vec<u8>,
        name: &str,
        mime_type: &str,
        parent_id: &str,
    ) -> Result<String, StorageError>;

    /// Folders anywhere in the drive whose name contains `fragment`.
    async fn search_folders_by_name(&self, fragment: &str)
    -> Result<Vec<FolderRef>, StorageError>;

    async fn get_folder(&self, id: &str) -> Result<FolderRef, StorageError>;

    async fn delete_folder_by_id(&self, id: &str) -> Result<(), StorageError>;

    fn folder_url(&self, id: &str) -> String;
}

pub async fn get_or_create_folder(
    storage: &dyn RemoteStorage,
    name: &str,
    parent_id: &str,
) -> Result<String, StorageError> {
    if let Some(existing) = storage.find_child_folder(name, parent_id).await? {
        return Ok(existing.id);
    }
    storage.create_folder(name, parent_id).await
}

/// Creates the folder for a draft's photos and returns its id. `3+1` listings
/// live directly under the root; every other room layout gets its own
/// subfolder.
pub async fn create_listing_folder(
    storage: &dyn RemoteStorage,
    root_folder_id: &str,
    draft: &ListingDraft,
) -> Result<String, StorageError> {
    let parent_id = match naming::placement(draft.room_count.as_deref()) {
        FolderPlacement::Root => root_folder_id.to_string(),
        FolderPlacement::RoomSubfolder(label) => {
            get_or_create_folder(storage, &label, root_folder_id).await?
        }
    };
    let name = naming::folder_name(draft);
    let folder_id = storage.create_folder(&name, &parent_id).await?;
    info!(
        target = "listing.drive",
        folder_id = %folder_id,
        parent_id = %parent_id,
        name = %name,
        "listing folder created"
    );
    Ok(folder_id)
}

/// Builds `/`-joined folder paths, remembering every folder it has looked up.
/// Meant to live for one search request.
pub struct FolderPathResolver<'a> {
    storage: &'a dyn RemoteStorage,
    cache: HashMap<String, Option<FolderRef>>,
}

impl<'a> FolderPathResolver<'a> {
    pub fn new(storage: &'a dyn RemoteStorage) -> Self {
        Self {
            storage,
            cache: HashMap::new(),
        }
    }

    /// Path from the top of the drive down to `folder`. An ancestor that
    /// cannot be fetched ends the walk.
    pub async fn path_of(&mut self, folder: &FolderRef) -> String {
        let mut segments = vec![folder.name.clone()];
        let mut seen = HashSet::from([folder.id.clone()]);
        let mut next = folder.parent_id.clone();

        while let Some(parent_id) = next {
            if segments.len() >= MAX_PATH_DEPTH || !seen.insert(parent_id.clone()) {
                break;
            }
            let Some(parent) = self.lookup(&parent_id).await else {
                break;
            };
            segments.push(parent.name.clone());
            next = parent.parent_id;
        }

        segments.reverse();
        segments.join("/")
    }

    async fn lookup(&mut self, id: &str) -> Option<FolderRef> {
        if let Some(cached) = self.cache.get(id) {
            return cached.clone();
        }
        let fetched = match self.storage.get_folder(id).await {
            Ok(folder) => Some(folder),
            Err(err) => {
                warn!(target = "listing.drive", folder_id = %id, error = %err, "parent lookup failed");
                None
            }
        };
        self.cache.insert(id.to_string(), fetched.clone());
        fetched
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeStorage;

    fn draft(room: &str) -> ListingDraft {
        ListingDraft {
            neighborhood: Some("Moda".into()),
            street: Some("Bahçe Sk.".into()),
            room_count: Some(room.into()),
            ..ListingDraft::default()
        }
    }

    #[tokio::test]
    async fn three_plus_one_folder_is_created_under_root() {
        let storage = FakeStorage::with_root("root");
        let id = create_listing_folder(&storage, "root", &draft("3+1"))
            .await
            .expect("folder");
        let folder = storage.folder(&id).expect("stored");
        assert_eq!(folder.name, "Moda-Bahçe Sk-3+1 #SADEEVIM");
        assert_eq!(folder.parent_id.as_deref(), Some("root"));
    }

    #[tokio::test]
    async fn other_layouts_share_one_room_subfolder() {
        let storage = FakeStorage::with_root("root");
        let first = create_listing_folder(&storage, "root", &draft("2+1"))
            .await
            .expect("first");
        let second = create_listing_folder(&storage, "root", &draft("2 + 1"))
            .await
            .expect("second");

        let first_parent = storage.folder(&first).and_then(|f| f.parent_id).expect("parent");
        let second_parent = storage.folder(&second).and_then(|f| f.parent_id).expect("parent");
        assert_eq!(first_parent, second_parent);
        let subfolder = storage.folder(&first_parent).expect("subfolder");
        assert_eq!(subfolder.name, "2+1");
        assert_eq!(subfolder.parent_id.as_deref(), Some("root"));
        assert!(storage.is_public(&first_parent));
    }

    #[tokio::test]
    async fn paths_walk_to_the_top_and_reuse_lookups() {
        let storage = FakeStorage::with_root("root");
        let sub = storage.insert_folder("2+1", Some("root"));
        let a = storage.insert_folder("Moda-Bahçe Sk-2+1 #SADEEVIM", Some(&sub));
        let b = storage.insert_folder("Moda-Yeni Sk-2+1 #SADEEVIM", Some(&sub));

        let mut resolver = FolderPathResolver::new(&storage);
        let path_a = resolver.path_of(&storage.folder(&a).expect("a")).await;
        let path_b = resolver.path_of(&storage.folder(&b).expect("b")).await;

        assert_eq!(path_a, "Emlak/2+1/Moda-Bahçe Sk-2+1 #SADEEVIM");
        assert_eq!(path_b, "Emlak/2+1/Moda-Yeni Sk-2+1 #SADEEVIM");
        assert_eq!(storage.get_folder_calls(), 2);
    }

    #[tokio::test]
    async fn unreachable_parent_ends_the_path() {
        let storage = FakeStorage::with_root("root");
        let orphan = FolderRef {
            id: "x".into(),
            name: "Moda-Bahçe Sk-2+1 #SADEEVIM".into(),
            parent_id: Some("gone".into()),
        };
        let mut resolver = FolderPathResolver::new(&storage);
        assert_eq!(resolver.path_of(&orphan).await, "Moda-Bahçe Sk-2+1 #SADEEVIM");
    }
}
