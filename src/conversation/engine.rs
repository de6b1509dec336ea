use super::replies::{self, COMPLETE_COMMAND, DELETE_COMMAND};
use super::{ConversationState, ConversationStore, FlowError, Phase, UserLocks};
use crate::extraction::TextExtractor;
use crate::finalizer::ListingFinalizer;
use crate::gateway::MessagingGateway;
use crate::media;
use crate::models::{InboundEvent, ListingDraft, MediaAttachment, PhotoUploadSession};
use crate::naming;
use crate::outbox::Outbox;
use crate::storage::{self, FolderPathResolver, FolderRef, RemoteStorage};
use crate::store::ListingStore;
use chrono::Utc;
use std::{sync::Arc, time::Instant};
use tracing::{Instrument, error, info, info_span, warn};
use uuid::Uuid;

/// What to send back for one inbound event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundReply {
    /// Answer in the webhook response itself.
    Inline(String),
    /// Answer with a separate outbound message; the webhook response is empty.
    Notify(String),
}

impl OutboundReply {
    pub fn text(&self) -> &str {
        match self {
            OutboundReply::Inline(text) | OutboundReply::Notify(text) => text,
        }
    }
}

pub struct EngineParts {
    pub states: Arc<dyn ConversationStore>,
    pub store: Arc<dyn ListingStore>,
    pub storage: Arc<dyn RemoteStorage>,
    pub extractor: Arc<dyn TextExtractor>,
    pub gateway: Arc<dyn MessagingGateway>,
    pub root_folder_id: String,
    /// Delivers [`OutboundReply::Notify`] texts. Without one the caller sends them.
    pub outbox: Option<Outbox>,
}

/// Drives each user's conversation. Events from one user are handled strictly
/// one after another; different users run concurrently.
#[derive(Clone)]
pub struct ConversationEngine {
    states: Arc<dyn ConversationStore>,
    store: Arc<dyn ListingStore>,
    storage: Arc<dyn RemoteStorage>,
    extractor: Arc<dyn TextExtractor>,
    gateway: Arc<dyn MessagingGateway>,
    finalizer: ListingFinalizer,
    root_folder_id: Arc<str>,
    outbox: Option<Outbox>,
    locks: UserLocks,
}

impl ConversationEngine {
    pub fn new(parts: EngineParts) -> Self {
        Self {
            finalizer: ListingFinalizer::new(parts.store.clone()),
            states: parts.states,
            store: parts.store,
            storage: parts.storage,
            extractor: parts.extractor,
            gateway: parts.gateway,
            root_folder_id: parts.root_folder_id.into(),
            outbox: parts.outbox,
            locks: UserLocks::default(),
        }
    }

    /// Handles one event to completion. The work runs on its own task so a
    /// dropped webhook connection cannot cut a step in half, and a panic turns
    /// into the generic apology. Notify replies are queued from that task too.
    pub async fn handle(&self, user_id: &str, event: InboundEvent) -> OutboundReply {
        let engine = self.clone();
        let user = user_id.to_string();
        let span = info_span!(
            target: "listing.conversation",
            "event",
            user = %user_id,
            event_id = %Uuid::new_v4()
        );
        let task = tokio::spawn(
            async move {
                let _turn = engine.locks.acquire(&user).await;
                let reply = engine.process(&user, &event).await;
                if let (OutboundReply::Notify(text), Some(outbox)) = (&reply, &engine.outbox) {
                    outbox.enqueue(&user, text).await;
                }
                reply
            }
            .instrument(span),
        );
        match task.await {
            Ok(reply) => reply,
            Err(err) => {
                error!(target = "listing.conversation", user = %user_id, error = %err, "event handler aborted");
                crate::metrics::event_outcome("unknown", "panic");
                OutboundReply::Inline(replies::GENERIC_FAILURE.to_string())
            }
        }
    }

    async fn process(&self, user: &str, event: &InboundEvent) -> OutboundReply {
        let started = Instant::now();
        let outcome = self.dispatch(user, event).await;
        crate::metrics::stage_elapsed("conversation_event", started.elapsed().as_millis());
        match outcome {
            Ok((phase, reply)) => {
                crate::metrics::event_outcome(phase.as_str(), "ok");
                reply
            }
            Err(err) => {
                if err.is_user_error() {
                    info!(target = "listing.conversation", stage = err.stage(), detail = %err.detail(), "corrective reply");
                    crate::metrics::event_outcome(err.stage(), "rejected");
                } else {
                    error!(
                        target = "listing.conversation",
                        stage = err.stage(),
                        kind = ?err.kind(),
                        transient = err.is_transient(),
                        detail = %err.detail(),
                        "event failed"
                    );
                    crate::metrics::event_outcome(err.stage(), "error");
                }
                OutboundReply::Inline(err.reply().to_string())
            }
        }
    }

    /// Routes the event. The returned phase is the one the event was handled
    /// in, for metrics.
    async fn dispatch(
        &self,
        user: &str,
        event: &InboundEvent,
    ) -> Result<(Phase, OutboundReply), FlowError> {
        let text = event.trimmed_text();

        if text.is_some_and(|t| t.eq_ignore_ascii_case(DELETE_COMMAND)) {
            self.save_state(user, &ConversationState::AwaitingDeleteKeyword)
                .await?;
            return Ok((
                Phase::AwaitingDeleteKeyword,
                inline(replies::ASK_DELETE_KEYWORD),
            ));
        }

        let state = self
            .states
            .load(user)
            .await
            .map_err(|err| FlowError::unexpected("load_state", err.to_string()))?;
        let phase = state.phase();

        if text.is_some_and(|t| t.eq_ignore_ascii_case(COMPLETE_COMMAND)) {
            let reply = match state {
                ConversationState::AwaitingPhotos { draft } => self.complete(user, draft).await?,
                _ => inline(replies::NEED_DETAILS_FIRST),
            };
            return Ok((phase, reply));
        }

        let reply = match state {
            ConversationState::Idle => match text {
                Some(message) => self.start_listing(user, message).await?,
                None => inline(replies::DEFAULT_PROMPT),
            },
            ConversationState::AwaitingPhotos { draft } => {
                if event.media.is_empty() {
                    inline(replies::SEND_PHOTO_OR_COMPLETE)
                } else {
                    self.receive_photos(user, draft, &event.media).await?
                }
            }
            ConversationState::AwaitingDeleteKeyword => match text {
                Some(keyword) => self.search_folders(user, keyword).await?,
                None => inline(replies::ASK_DELETE_KEYWORD),
            },
            ConversationState::AwaitingDeleteSelection { candidates } => {
                self.delete_selected(user, text, candidates).await?
            }
        };
        Ok((phase, reply))
    }

    async fn start_listing(&self, user: &str, message: &str) -> Result<OutboundReply, FlowError> {
        let started = Instant::now();
        let draft = self
            .extractor
            .extract(message)
            .await
            .map_err(|err| FlowError::extraction("extract", err.to_string()))?;
        crate::metrics::stage_elapsed("extract", started.elapsed().as_millis());
        info!(target = "listing.conversation", title = %draft.title, "draft extracted");
        // Each draft gets its own upload session and folder.
        let stale = self
            .store
            .delete_session(user)
            .await
            .map_err(|err| FlowError::unexpected("reset_session", err.to_string()))?;
        if stale {
            info!(target = "listing.conversation", "leftover photo session discarded");
        }
        self.save_state(user, &ConversationState::AwaitingPhotos { draft })
            .await?;
        Ok(inline(replies::DRAFT_SAVED))
    }

    async fn receive_photos(
        &self,
        user: &str,
        mut draft: ListingDraft,
        media: &[MediaAttachment],
    ) -> Result<OutboundReply, FlowError> {
        let existing = self
            .store
            .get_session(user)
            .await
            .map_err(|err| FlowError::unexpected("load_session", err.to_string()))?;
        let mut session = match existing {
            Some(session) => session,
            None => self
                .store
                .create_session(&PhotoUploadSession::new(
                    user,
                    Phase::AwaitingPhotos.as_str(),
                ))
                .await
                .map_err(|err| FlowError::unexpected("create_session", err.to_string()))?,
        };

        let folder_id = match session.drive_folder_id.clone() {
            Some(id) => id,
            None => {
                let id = storage::create_listing_folder(
                    self.storage.as_ref(),
                    &self.root_folder_id,
                    &draft,
                )
                .await
                .map_err(|err| {
                    FlowError::storage("create_folder", err.to_string(), err.is_transient())
                })?;
                session.drive_folder_id = Some(id.clone());
                session.updated_at = Utc::now();
                self.store
                    .save_session(&session)
                    .await
                    .map_err(|err| FlowError::unexpected("save_session", err.to_string()))?;
                draft.folder_link = Some(self.storage.folder_url(&id));
                self.save_state(user, &ConversationState::AwaitingPhotos { draft })
                    .await?;
                id
            }
        };

        let before = session.received_photos;
        for (idx, attachment) in media.iter().enumerate() {
            let link = match self.upload_attachment(&folder_id, idx, attachment).await {
                Ok(link) => link,
                Err(err) => {
                    warn!(
                        target = "listing.conversation",
                        idx,
                        transient = err.is_transient(),
                        error = %err,
                        "photo skipped"
                    );
                    crate::metrics::photo_uploaded(false);
                    continue;
                }
            };
            session.record_photo(link);
            if let Err(err) = self.store.save_session(&session).await {
                warn!(target = "listing.conversation", idx, error = %err, "photo count not persisted");
                session.forget_last_photo();
                crate::metrics::photo_uploaded(false);
                continue;
            }
            crate::metrics::photo_uploaded(true);
        }

        let total = session.received_photos;
        info!(
            target = "listing.conversation",
            added = total - before,
            total,
            "photos processed"
        );
        let text = if total > before {
            replies::photos_received(total)
        } else {
            replies::photos_failed(total)
        };
        Ok(OutboundReply::Notify(text))
    }

    async fn upload_attachment(
        &self,
        folder_id: &str,
        idx: usize,
        attachment: &MediaAttachment,
    ) -> Result<String, FlowError> {
        let bytes = self
            .gateway
            .download_media(&attachment.url)
            .await
            .map_err(|err| FlowError::storage("download_media", err.to_string(), err.is_transient()))?;
        let (mime_type, extension) = media::file_type(&attachment.content_type, &bytes);
        let name = format!(
            "photo_{}_{idx}{extension}",
            Utc::now().format("%Y%m%d_%H%M%S")
        );
        self.storage
            .upload_file(bytes, &name, mime_type, folder_id)
            .await
            .map_err(|err| FlowError::storage("upload_photo", err.to_string(), err.is_transient()))
    }

    async fn complete(&self, user: &str, mut draft: ListingDraft) -> Result<OutboundReply, FlowError> {
        let session = self
            .store
            .get_session(user)
            .await
            .map_err(|err| FlowError::unexpected("load_session", err.to_string()))?;
        let Some(session) = session else {
            return Ok(inline(replies::NO_PHOTOS_YET));
        };
        let Some(folder_id) = session.drive_folder_id.as_deref() else {
            return Ok(inline(replies::NEED_ONE_PHOTO));
        };
        if session.received_photos == 0 {
            return Ok(inline(replies::NEED_ONE_PHOTO));
        }

        let folder_link = self.storage.folder_url(folder_id);
        draft.folder_link = Some(folder_link.clone());
        let listing = self
            .finalizer
            .finalize(&draft, &session.photo_links)
            .await
            .map_err(|err| FlowError::persistence("finalize", err.to_string()))?;

        // The listing is committed; cleanup failures only leave stale rows.
        if let Err(err) = self.store.delete_session(user).await {
            warn!(target = "listing.conversation", error = %err, "session cleanup failed");
        }
        if let Err(err) = self.states.clear(user).await {
            warn!(target = "listing.conversation", error = %err, "state reset failed");
        }
        info!(
            target = "listing.conversation",
            listing_id = listing.id,
            photos = session.received_photos,
            "listing completed"
        );
        Ok(inline(&replies::listing_saved(&folder_link)))
    }

    async fn search_folders(&self, user: &str, keyword: &str) -> Result<OutboundReply, FlowError> {
        let found = self
            .storage
            .search_folders_by_name(keyword)
            .await
            .map_err(|err| {
                FlowError::storage("search_folders", err.to_string(), err.is_transient())
            })?;
        if found.is_empty() {
            return Err(FlowError::not_found("search_folders", keyword));
        }

        let mut resolver = FolderPathResolver::new(self.storage.as_ref());
        let mut paths = Vec::with_capacity(found.len());
        for folder in &found {
            paths.push(resolver.path_of(folder).await);
        }
        info!(target = "listing.conversation", keyword = %keyword, matches = found.len(), "folders found");
        self.save_state(
            user,
            &ConversationState::AwaitingDeleteSelection { candidates: found },
        )
        .await?;
        Ok(inline(&replies::folder_list(&paths)))
    }

    async fn delete_selected(
        &self,
        user: &str,
        text: Option<&str>,
        candidates: Vec<FolderRef>,
    ) -> Result<OutboundReply, FlowError> {
        let raw = text.unwrap_or_default();
        let choice: i64 = raw
            .parse()
            .map_err(|_| FlowError::non_numeric("select_folder", raw))?;
        let selected = usize::try_from(choice)
            .ok()
            .and_then(|n| n.checked_sub(1))
            .and_then(|idx| candidates.get(idx))
            .ok_or_else(|| FlowError::invalid_selection("select_folder", raw))?;

        let folder_result = self.storage.delete_folder_by_id(&selected.id).await;
        let fragment = naming::title_fragment(&selected.name);
        let listing_result = self.store.delete_listing_by_title_fragment(fragment).await;
        // Both deletes already ran; the report goes out even if the reset fails.
        if let Err(err) = self.states.clear(user).await {
            warn!(target = "listing.conversation", error = %err, "state reset failed");
        }

        let folder_error = folder_result.err().map(|err| {
            warn!(target = "listing.conversation", folder_id = %selected.id, error = %err, "folder delete failed");
            err.to_string()
        });
        let listing_error = match listing_result {
            Ok(Some(listing)) => {
                info!(target = "listing.conversation", listing_id = listing.id, "listing deleted");
                None
            }
            Ok(None) => Some("İlan bulunamadı".to_string()),
            Err(err) => {
                warn!(target = "listing.conversation", fragment = %fragment, error = %err, "listing delete failed");
                Some(format!("İlan silinirken hata oluştu: {err}"))
            }
        };

        if folder_error.is_none() && listing_error.is_none() {
            return Ok(inline(replies::DELETE_OK));
        }
        Ok(inline(&replies::delete_partial(
            folder_error.as_deref(),
            listing_error.as_deref(),
        )))
    }

    async fn save_state(&self, user: &str, state: &ConversationState) -> Result<(), FlowError> {
        self.states
            .save(user, state)
            .await
            .map_err(|err| FlowError::unexpected("save_state", err.to_string()))
    }
}

fn inline(text: &str) -> OutboundReply {
    OutboundReply::Inline(text.to_string())
}
