use super::replies;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowErrorKind {
    ExtractionFailure,
    NotFound,
    InvalidSelection,
    NonNumericSelection,
    StorageFailure,
    PersistenceFailure,
    Unexpected,
}

/// Failure of one conversation step. Every kind maps to a user-facing reply;
/// the stage and message only go to the logs.
#[derive(Debug, Error)]
#[error("stage `{stage}` failed: {message}")]
pub struct FlowError {
    stage: &'static str,
    kind: FlowErrorKind,
    message: String,
    transient: bool,
}

impl FlowError {
    fn new(stage: &'static str, kind: FlowErrorKind, message: impl Into<String>) -> Self {
        Self {
            stage,
            kind,
            message: message.into(),
            transient: false,
        }
    }

    pub fn extraction(stage: &'static str, message: impl Into<String>) -> Self {
        Self::new(stage, FlowErrorKind::ExtractionFailure, message)
    }

    pub fn not_found(stage: &'static str, message: impl Into<String>) -> Self {
        Self::new(stage, FlowErrorKind::NotFound, message)
    }

    pub fn invalid_selection(stage: &'static str, message: impl Into<String>) -> Self {
        Self::new(stage, FlowErrorKind::InvalidSelection, message)
    }

    pub fn non_numeric(stage: &'static str, message: impl Into<String>) -> Self {
        Self::new(stage, FlowErrorKind::NonNumericSelection, message)
    }

    pub fn storage(stage: &'static str, message: impl Into<String>, transient: bool) -> Self {
        Self {
            transient,
            ..Self::new(stage, FlowErrorKind::StorageFailure, message)
        }
    }

    pub fn persistence(stage: &'static str, message: impl Into<String>) -> Self {
        Self::new(stage, FlowErrorKind::PersistenceFailure, message)
    }

    pub fn unexpected(stage: &'static str, message: impl Into<String>) -> Self {
        Self::new(stage, FlowErrorKind::Unexpected, message)
    }

    pub fn stage(&self) -> &'static str {
        self.stage
    }

    pub fn kind(&self) -> FlowErrorKind {
        self.kind
    }

    pub fn detail(&self) -> &str {
        &self.message
    }

    pub fn is_transient(&self) -> bool {
        self.transient
    }

    /// Failures the user caused and can fix by sending something else.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self.kind,
            FlowErrorKind::ExtractionFailure
                | FlowErrorKind::NotFound
                | FlowErrorKind::InvalidSelection
                | FlowErrorKind::NonNumericSelection
        )
    }

    pub fn reply(&self) -> &'static str {
        match self.kind {
            FlowErrorKind::ExtractionFailure => replies::EXTRACTION_FAILED,
            FlowErrorKind::NotFound => replies::FOLDER_NOT_FOUND,
            FlowErrorKind::InvalidSelection => replies::INVALID_SELECTION,
            FlowErrorKind::NonNumericSelection => replies::NOT_A_NUMBER,
            FlowErrorKind::StorageFailure => replies::STORAGE_FAILED,
            FlowErrorKind::PersistenceFailure => replies::SAVE_FAILED,
            FlowErrorKind::Unexpected => replies::GENERIC_FAILURE,
        }
    }
}
