//! Observable install coordinator state

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::FailureReason;

/// What the coordinator is doing right now, as seen by the presentation layer
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum InstallState {
    #[default]
    Idle,
    Staging,
    Parsing,
    Installing,
    Succeeded,
    Failed {
        reason: FailureReason,
    },
    Uninstalling,
    Uninstalled,
    Cancelled,
}

impl InstallState {
    pub fn failed(reason: impl Into<FailureReason>) -> Self {
        Self::Failed {
            reason: reason.into(),
        }
    }

    /// An operation is between its start and its terminal state
    #[must_use]
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            Self::Staging | Self::Parsing | Self::Installing | Self::Uninstalling
        )
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Succeeded | Self::Failed { .. } | Self::Uninstalled | Self::Cancelled
        )
    }

    #[must_use]
    pub fn failure_reason(&self) -> Option<&FailureReason> {
        match self {
            Self::Failed { reason } => Some(reason),
            _ => None,
        }
    }
}

impl fmt::Display for InstallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::Staging => f.write_str("staging"),
            Self::Parsing => f.write_str("parsing"),
            Self::Installing => f.write_str("installing"),
            Self::Succeeded => f.write_str("succeeded"),
            Self::Failed { reason } => write!(f, "failed: {reason}"),
            Self::Uninstalling => f.write_str("uninstalling"),
            Self::Uninstalled => f.write_str("uninstalled"),
            Self::Cancelled => f.write_str("cancelled"),
        }
    }
}
