//! Installer session error types

use std::borrow::Cow;

use crate::UserFacingError;
use thiserror::Error;

/// Failures while obtaining or driving a session against the installer service
#[derive(Debug, Clone, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SessionError {
    #[error("installer service refused session: {message}")]
    CreateRejected { message: String },

    #[error("session {session_id} not found")]
    NotFound { session_id: u64 },

    #[error("cannot open session {session_id}: {message}")]
    OpenFailed { session_id: u64, message: String },

    #[error("illegal session transition {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("failed to abandon session {session_id}: {message}")]
    AbandonFailed { session_id: u64, message: String },

    #[error("cannot enumerate owned sessions: {message}")]
    EnumerationFailed { message: String },

    #[error("uninstall request rejected: {message}")]
    UninstallRejected { message: String },
}

/// Failures between the first written byte and a successful commit.
/// The session is abandoned before one of these reaches the caller.
#[derive(Debug, Clone, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CommitError {
    #[error("write to session {session_id} failed: {message}")]
    WriteFailed { session_id: u64, message: String },

    #[error("flush of session {session_id} failed: {message}")]
    FlushFailed { session_id: u64, message: String },

    #[error("commit of session {session_id} failed: {message}")]
    CommitFailed { session_id: u64, message: String },
}

impl UserFacingError for SessionError {
    fn user_message(&self) -> Cow<'_, str> {
        Cow::Owned(self.to_string())
    }

    fn user_hint(&self) -> Option<&'static str> {
        match self {
            Self::CreateRejected { .. } => {
                Some("Run `sideload cleanup` to release stale sessions, then retry.")
            }
            _ => None,
        }
    }

    fn is_retryable(&self) -> bool {
        matches!(self, Self::CreateRejected { .. } | Self::OpenFailed { .. })
    }

    fn user_code(&self) -> Option<&'static str> {
        let code = match self {
            Self::CreateRejected { .. } => "session.create_rejected",
            Self::NotFound { .. } => "session.not_found",
            Self::OpenFailed { .. } => "session.open_failed",
            Self::InvalidTransition { .. } => "session.invalid_transition",
            Self::AbandonFailed { .. } => "session.abandon_failed",
            Self::EnumerationFailed { .. } => "session.enumeration_failed",
            Self::UninstallRejected { .. } => "session.uninstall_rejected",
        };
        Some(code)
    }
}

impl UserFacingError for CommitError {
    fn user_message(&self) -> Cow<'_, str> {
        Cow::Owned(self.to_string())
    }

    fn user_hint(&self) -> Option<&'static str> {
        Some("The session was released; retry the install from the start.")
    }

    fn is_retryable(&self) -> bool {
        true
    }

    fn user_code(&self) -> Option<&'static str> {
        let code = match self {
            Self::WriteFailed { .. } => "commit.write_failed",
            Self::FlushFailed { .. } => "commit.flush_failed",
            Self::CommitFailed { .. } => "commit.commit_failed",
        };
        Some(code)
    }
}
