//! crates/study_assistant_core/src/error.rs
//!
//! Errors surfaced by the study pipeline to its callers.

use crate::entitlement::{Feature, Limit, Tier};
use crate::ports::PortError;
use crate::quality::QualityRejection;

#[derive(Debug, thiserror::Error)]
pub enum StudyError {
    /// The caller used up today's allowance for a gated feature.
    #[error("Daily limit reached for {}", feature_label(.feature))]
    QuotaExceeded {
        feature: Feature,
        tier: Tier,
        limit: Limit,
    },

    /// A required input was missing or unusable.
    #[error("{0}")]
    Validation(String),

    /// The document text failed the quality gate.
    #[error("{0}")]
    Quality(QualityRejection),

    /// The model itself reported that the content could not be understood.
    #[error("The document content could not be understood well enough to generate a test. The text may be handwritten, blurry, or too fragmented. Please try a clearer document.")]
    Unreadable,

    #[error("{0}")]
    NotFound(String),

    /// The generation call itself failed.
    #[error("Generation failed: {0}")]
    Upstream(String),

    /// The generation call succeeded but its output did not have the expected shape.
    #[error("{0}")]
    MalformedOutput(String),

    /// The document changed underneath this request; retrying starts from the new version.
    #[error("{0}")]
    Conflict(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl StudyError {
    /// A short machine-readable tag for the error class.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::QuotaExceeded { .. } => "quota_exceeded",
            Self::Validation(_) => "validation",
            Self::Quality(_) => "quality",
            Self::Unreadable => "unreadable",
            Self::NotFound(_) => "not_found",
            Self::Upstream(_) => "upstream",
            Self::MalformedOutput(_) => "malformed_output",
            Self::Conflict(_) => "conflict",
            Self::Storage(_) => "storage",
        }
    }

    /// Maps an error from the generation port.
    pub(crate) fn from_generation(error: PortError) -> Self {
        match error {
            PortError::MalformedOutput(msg) => Self::MalformedOutput(msg),
            PortError::NotFound(msg) | PortError::Conflict(msg) | PortError::Unexpected(msg) => {
                Self::Upstream(msg)
            }
        }
    }

    /// Maps an error from the storage port.
    pub(crate) fn from_storage(error: PortError) -> Self {
        match error {
            PortError::NotFound(msg) => Self::NotFound(msg),
            PortError::Conflict(msg) => Self::Conflict(msg),
            PortError::MalformedOutput(msg) | PortError::Unexpected(msg) => Self::Storage(msg),
        }
    }
}

impl From<QualityRejection> for StudyError {
    fn from(rejection: QualityRejection) -> Self {
        Self::Quality(rejection)
    }
}

pub type StudyResult<T> = Result<T, StudyError>;

fn feature_label(feature: &Feature) -> String {
    feature.as_str().replace('_', " ")
}
