//! Terminal failures of a completion and their structured reports.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use shipfill_core::{
    CanonicalError, CoreError, DefaultsError, DetectError, MissingField, MissingSummary, RehydrationError,
};

use crate::channel::ChannelError;

/// Stable failure codes for callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    MalformedRequest,
    StructuralFieldsRequired,
    ElicitationUnsupported,
    ElicitationFailed,
    ElicitationDeclined,
    ElicitationCancelled,
    ElicitationInvalidResponse,
    ElicitationMaxRetries,
}

/// Finer-grained cause behind an [`ErrorCode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    MalformedStructure,
    AmbiguousPayer,
    Structural,
    Unsupported,
    TransportError,
    Declined,
    Cancelled,
    RehydrationError,
    MaxRetries,
}

/// Serializable summary of a failed completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureReport {
    pub code: ErrorCode,
    pub message: String,
    pub reason: FailureReason,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub missing: Vec<MissingSummary>,
}

/// Why a completion stopped without a complete document.
#[derive(Error, Debug)]
pub enum CompletionError {
    #[error(transparent)]
    Malformed(#[from] CanonicalError),

    #[error("Malformed request: {0}")]
    DefaultConflict(DefaultsError),

    #[error("{0}")]
    AmbiguousPayer(DetectError),

    #[error(
        "Missing {} structural field(s) that must be added directly to request_body (cannot be elicited via form)",
        .missing.len()
    )]
    Structural { missing: Vec<MissingField> },

    #[error("Missing {} required field(s) and client does not support form elicitation", .missing.len())]
    Unsupported { missing: Vec<MissingField> },

    #[error("Elicitation request failed: {source}")]
    Transport {
        #[source]
        source: ChannelError,
        missing: Vec<MissingField>,
    },

    #[error("User declined to provide missing {label} fields")]
    Declined { label: String, missing: Vec<MissingField> },

    #[error("User cancelled {label} field elicitation")]
    Cancelled { label: String, missing: Vec<MissingField> },

    #[error("Elicited data conflicts with request structure: {source}")]
    Rehydration {
        #[source]
        source: RehydrationError,
        missing: Vec<MissingField>,
    },

    #[error("Maximum elicitation retries ({max_retries}) exceeded for {label}")]
    MaxRetries {
        max_retries: u32,
        label: String,
        missing: Vec<MissingField>,
    },
}

impl From<DefaultsError> for CompletionError {
    fn from(err: DefaultsError) -> Self {
        match err {
            DefaultsError::Malformed(inner) => CompletionError::Malformed(inner),
            conflict => CompletionError::DefaultConflict(conflict),
        }
    }
}

impl From<DetectError> for CompletionError {
    fn from(err: DetectError) -> Self {
        match err {
            DetectError::Malformed(inner) => CompletionError::Malformed(inner),
            ambiguous => CompletionError::AmbiguousPayer(ambiguous),
        }
    }
}

impl From<CoreError> for CompletionError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Defaults(inner) => inner.into(),
            CoreError::Detect(inner) => inner.into(),
        }
    }
}

impl CompletionError {
    pub fn code(&self) -> ErrorCode {
        match self {
            CompletionError::Malformed(_)
            | CompletionError::DefaultConflict(_)
            | CompletionError::AmbiguousPayer(_) => ErrorCode::MalformedRequest,
            CompletionError::Structural { .. } => ErrorCode::StructuralFieldsRequired,
            CompletionError::Unsupported { .. } => ErrorCode::ElicitationUnsupported,
            CompletionError::Transport { .. } => ErrorCode::ElicitationFailed,
            CompletionError::Declined { .. } => ErrorCode::ElicitationDeclined,
            CompletionError::Cancelled { .. } => ErrorCode::ElicitationCancelled,
            CompletionError::Rehydration { .. } => ErrorCode::ElicitationInvalidResponse,
            CompletionError::MaxRetries { .. } => ErrorCode::ElicitationMaxRetries,
        }
    }

    pub fn reason(&self) -> FailureReason {
        match self {
            CompletionError::Malformed(_) | CompletionError::DefaultConflict(_) => {
                FailureReason::MalformedStructure
            }
            CompletionError::AmbiguousPayer(_) => FailureReason::AmbiguousPayer,
            CompletionError::Structural { .. } => FailureReason::Structural,
            CompletionError::Unsupported { .. } => FailureReason::Unsupported,
            CompletionError::Transport { .. } => FailureReason::TransportError,
            CompletionError::Declined { .. } => FailureReason::Declined,
            CompletionError::Cancelled { .. } => FailureReason::Cancelled,
            CompletionError::Rehydration { .. } => FailureReason::RehydrationError,
            CompletionError::MaxRetries { .. } => FailureReason::MaxRetries,
        }
    }

    /// Fields still missing when the completion stopped, if known.
    pub fn missing(&self) -> &[MissingField] {
        match self {
            CompletionError::Structural { missing }
            | CompletionError::Unsupported { missing }
            | CompletionError::Transport { missing, .. }
            | CompletionError::Declined { missing, .. }
            | CompletionError::Cancelled { missing, .. }
            | CompletionError::Rehydration { missing, .. }
            | CompletionError::MaxRetries { missing, .. } => missing,
            _ => &[],
        }
    }

    pub fn report(&self) -> FailureReport {
        FailureReport {
            code: self.code(),
            message: self.to_string(),
            reason: self.reason(),
            missing: self.missing().iter().map(MissingField::summary).collect(),
        }
    }
}

impl From<&CompletionError> for FailureReport {
    fn from(err: &CompletionError) -> Self {
        err.report()
    }
}
