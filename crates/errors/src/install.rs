//! Install orchestration error types

use std::borrow::Cow;

use crate::UserFacingError;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum InstallError {
    #[error("signature mismatch: update for {package} is not signed by the installed identity")]
    SignatureMismatch { package: String },

    #[error("another operation is already in progress")]
    Busy,

    #[error("installer service reported failure {code}: {message}")]
    ServiceFailure { code: String, message: String },

    #[error("operation cancelled")]
    Cancelled,

    #[error("no completion received within {seconds}s")]
    TimedOut { seconds: u64 },

    #[error("correlation key already registered: {key}")]
    DuplicateRegistration { key: String },

    #[error("package not installed: {package}")]
    NotInstalled { package: String },

    #[error("no operation in progress")]
    NoActiveOperation,

    #[error("missing component: {component}")]
    MissingComponent { component: String },
}

impl UserFacingError for InstallError {
    fn user_message(&self) -> Cow<'_, str> {
        Cow::Owned(self.to_string())
    }

    fn user_hint(&self) -> Option<&'static str> {
        match self {
            Self::SignatureMismatch { .. } => Some(
                "Uninstall the existing package first if you trust the new signer.",
            ),
            Self::Busy => Some("Wait for the current operation to finish."),
            Self::TimedOut { .. } => Some(
                "The installer service did not answer; run `sideload sessions` to inspect leftovers.",
            ),
            _ => None,
        }
    }

    fn is_retryable(&self) -> bool {
        matches!(self, Self::Busy | Self::TimedOut { .. })
    }

    fn user_code(&self) -> Option<&'static str> {
        let code = match self {
            Self::SignatureMismatch { .. } => "install.signature_mismatch",
            Self::Busy => "install.busy",
            Self::ServiceFailure { .. } => "install.service_failure",
            Self::Cancelled => "install.cancelled",
            Self::TimedOut { .. } => "install.timed_out",
            Self::DuplicateRegistration { .. } => "install.duplicate_registration",
            Self::NotInstalled { .. } => "install.not_installed",
            Self::NoActiveOperation => "install.no_active_operation",
            Self::MissingComponent { .. } => "install.missing_component",
        };
        Some(code)
    }
}
