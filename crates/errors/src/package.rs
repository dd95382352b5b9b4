//! Bundle metadata parse errors

use std::borrow::Cow;

use crate::UserFacingError;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PackageError {
    #[error("bundle not found: {path}")]
    NotFound { path: String },

    #[error("malformed bundle {path}: {message}")]
    Malformed { path: String, message: String },

    #[error("bundle {path} has no manifest")]
    MissingManifest { path: String },

    #[error("invalid manifest: {message}")]
    InvalidManifest { message: String },

    #[error("invalid value for {field}: {message}")]
    InvalidField { field: String, message: String },

    #[error("invalid signing certificate: {message}")]
    InvalidCertificate { message: String },
}

impl UserFacingError for PackageError {
    fn user_message(&self) -> Cow<'_, str> {
        Cow::Owned(self.to_string())
    }

    fn user_hint(&self) -> Option<&'static str> {
        match self {
            Self::NotFound { .. } => Some("Check the bundle path."),
            Self::MissingManifest { .. } | Self::Malformed { .. } => {
                Some("The file is not a sideload bundle or is damaged; obtain a fresh copy.")
            }
            _ => None,
        }
    }

    fn user_code(&self) -> Option<&'static str> {
        let code = match self {
            Self::NotFound { .. } => "package.not_found",
            Self::Malformed { .. } => "package.malformed",
            Self::MissingManifest { .. } => "package.missing_manifest",
            Self::InvalidManifest { .. } => "package.invalid_manifest",
            Self::InvalidField { .. } => "package.invalid_field",
            Self::InvalidCertificate { .. } => "package.invalid_certificate",
        };
        Some(code)
    }
}
