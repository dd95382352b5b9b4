use serde::{Deserialize, Serialize};

use crate::EventSource;
use sideload_errors::UserFacingError;

/// Structured failure information shared across domains.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Short user-facing message.
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    /// Whether retrying the operation might succeed.
    pub retryable: bool,
}

impl FailureContext {
    /// Construct a new failure context.
    #[must_use]
    pub fn new(
        code: Option<impl Into<String>>,
        message: impl Into<String>,
        hint: Option<impl Into<String>>,
        retryable: bool,
    ) -> Self {
        Self {
            code: code.map(Into::into),
            message: message.into(),
            hint: hint.map(Into::into),
            retryable,
        }
    }

    /// Build failure context from a `UserFacingError` implementation.
    #[must_use]
    pub fn from_error<E: UserFacingError + ?Sized>(error: &E) -> Self {
        Self::new(
            error.user_code(),
            error.user_message().into_owned(),
            error.user_hint(),
            error.is_retryable(),
        )
    }
}

pub mod general;
pub mod lifecycle;
pub mod session;

pub use general::*;
pub use lifecycle::*;
pub use session::*;

/// Top-level application event enum that aggregates all domain-specific events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "domain", content = "event", rename_all = "snake_case")]
pub enum AppEvent {
    /// General utility events (warnings, errors, operations)
    General(GeneralEvent),

    /// Staging, parsing, trust, install and uninstall progress
    Lifecycle(LifecycleEvent),

    /// Privileged service session bookkeeping
    Session(SessionEvent),
}

impl AppEvent {
    /// Identify the source domain for this event.
    #[must_use]
    pub fn event_source(&self) -> EventSource {
        match self {
            Self::General(_) => EventSource::GENERAL,
            Self::Session(SessionEvent::CompletionUnclaimed { .. }) => EventSource::COMPLETION,
            Self::Session(_) => EventSource::SESSION,
            Self::Lifecycle(event) => match event.domain() {
                LifecycleDomain::Staging => EventSource::STAGING,
                LifecycleDomain::Parsing => EventSource::PARSING,
                LifecycleDomain::Trust => EventSource::TRUST,
                LifecycleDomain::Install => EventSource::INSTALL,
                LifecycleDomain::Uninstall => EventSource::UNINSTALL,
            },
        }
    }

    /// Determine the appropriate tracing log level for this event
    #[must_use]
    pub fn log_level(&self) -> tracing::Level {
        use tracing::Level;

        match self {
            Self::General(GeneralEvent::Error { .. } | GeneralEvent::OperationFailed { .. })
            | Self::Session(SessionEvent::AbandonFailed { .. }) => Level::ERROR,

            Self::Lifecycle(event) if event.stage() == LifecycleStage::Failed => Level::ERROR,

            Self::General(GeneralEvent::Warning { .. })
            | Self::Session(SessionEvent::CompletionUnclaimed { .. }) => Level::WARN,

            Self::General(GeneralEvent::DebugLog { .. })
            | Self::Session(SessionEvent::Written { .. } | SessionEvent::Committed { .. }) => {
                Level::DEBUG
            }

            _ => Level::INFO,
        }
    }

    /// Get the log target for this event (for structured logging)
    #[must_use]
    pub fn log_target(&self) -> &'static str {
        match self {
            Self::General(_) => "sideload::events::general",
            Self::Session(_) => "sideload::events::session",
            Self::Lifecycle(event) => match event.domain() {
                LifecycleDomain::Staging => "sideload::events::staging",
                LifecycleDomain::Parsing => "sideload::events::parsing",
                LifecycleDomain::Trust => "sideload::events::trust",
                LifecycleDomain::Install => "sideload::events::install",
                LifecycleDomain::Uninstall => "sideload::events::uninstall",
            },
        }
    }
}
