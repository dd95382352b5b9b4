use serde::{Deserialize, Serialize};
use sideload_types::SessionId;

/// Session lifecycle against the privileged installer service
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SessionEvent {
    Created {
        session_id: SessionId,
        package: String,
    },

    /// Bundle bytes were streamed and flushed into the session
    Written {
        session_id: SessionId,
        bytes: u64,
    },

    Committed {
        session_id: SessionId,
        correlation_key: String,
    },

    Abandoned {
        session_id: SessionId,
        reason: String,
    },

    AbandonFailed {
        session_id: SessionId,
        error: String,
    },

    /// Owned sessions left behind by an earlier process were released
    StaleCleanup {
        found: usize,
        abandoned: usize,
    },

    /// A completion signal arrived for a key nobody is waiting on
    CompletionUnclaimed {
        correlation_key: String,
        status: String,
    },
}
