//! Bundle staging error types

use std::borrow::Cow;

use crate::UserFacingError;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum StageError {
    #[error("cannot open bundle source {source_path}: {message}")]
    SourceUnavailable {
        source_path: String,
        message: String,
    },

    #[error("copy into {path} interrupted: {message}")]
    CopyInterrupted { path: String, message: String },

    #[error("staging directory {path} unusable: {message}")]
    StagingDirectory { path: String, message: String },

    #[error("bundle exceeds size limit: {size} > {limit} bytes")]
    TooLarge { size: u64, limit: u64 },
}

impl UserFacingError for StageError {
    fn user_message(&self) -> Cow<'_, str> {
        Cow::Owned(self.to_string())
    }

    fn user_hint(&self) -> Option<&'static str> {
        match self {
            Self::SourceUnavailable { .. } => Some("Check that the bundle path exists and is readable."),
            Self::StagingDirectory { .. } => {
                Some("Ensure the staging directory is writable or point `paths.staging_dir` elsewhere.")
            }
            Self::TooLarge { .. } => Some("Raise `install.max_bundle_size` or use a smaller bundle."),
            Self::CopyInterrupted { .. } => None,
        }
    }

    fn is_retryable(&self) -> bool {
        matches!(self, Self::CopyInterrupted { .. })
    }

    fn user_code(&self) -> Option<&'static str> {
        let code = match self {
            Self::SourceUnavailable { .. } => "stage.source_unavailable",
            Self::CopyInterrupted { .. } => "stage.copy_interrupted",
            Self::StagingDirectory { .. } => "stage.staging_directory",
            Self::TooLarge { .. } => "stage.too_large",
        };
        Some(code)
    }
}
