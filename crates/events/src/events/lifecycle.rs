use serde::{Deserialize, Serialize};
use sideload_types::{FollowUpAction, TrustVerdict};
use std::path::PathBuf;

use super::FailureContext;

/// Which part of the install pipeline a lifecycle event belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleDomain {
    Staging,
    Parsing,
    Trust,
    Install,
    Uninstall,
}

/// Coarse progress marker shared by all lifecycle events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleStage {
    Started,
    Completed,
    Failed,
    Waiting,
    Cancelled,
}

/// Package lifecycle events for install and uninstall operations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum LifecycleEvent {
    /// Copying the inbound bundle into the staging directory
    StagingStarted { source: PathBuf },

    StagingCompleted {
        path: PathBuf,
        size: u64,
        content_hash: String,
    },

    StagingFailed { failure: FailureContext },

    /// Reading the bundle manifest
    ParsingStarted { path: PathBuf },

    ParsingCompleted {
        package: String,
        version_code: u64,
        version_name: String,
    },

    ParsingFailed { failure: FailureContext },

    /// Signing identities were compared against the installed record
    TrustEvaluated {
        package: String,
        installed_version: Option<u64>,
        verdict: TrustVerdict,
    },

    InstallationStarted { package: String, version_code: u64 },

    InstallationCompleted { package: String, version_code: u64 },

    InstallationFailed { package: String, reason: String },

    /// The privileged service needs the user to confirm before continuing
    UserActionRequired {
        package: Option<String>,
        correlation_key: String,
        action: FollowUpAction,
    },

    RemovalStarted { package: String },

    RemovalCompleted { package: String },

    RemovalFailed { package: String, reason: String },

    /// A pending operation was cancelled locally
    OperationCancelled {
        package: Option<String>,
        correlation_key: Option<String>,
    },
}

impl LifecycleEvent {
    #[must_use]
    pub fn domain(&self) -> LifecycleDomain {
        match self {
            Self::StagingStarted { .. }
            | Self::StagingCompleted { .. }
            | Self::StagingFailed { .. } => LifecycleDomain::Staging,
            Self::ParsingStarted { .. }
            | Self::ParsingCompleted { .. }
            | Self::ParsingFailed { .. } => LifecycleDomain::Parsing,
            Self::TrustEvaluated { .. } => LifecycleDomain::Trust,
            Self::InstallationStarted { .. }
            | Self::InstallationCompleted { .. }
            | Self::InstallationFailed { .. }
            | Self::UserActionRequired { .. }
            | Self::OperationCancelled { .. } => LifecycleDomain::Install,
            Self::RemovalStarted { .. }
            | Self::RemovalCompleted { .. }
            | Self::RemovalFailed { .. } => LifecycleDomain::Uninstall,
        }
    }

    #[must_use]
    pub fn stage(&self) -> LifecycleStage {
        match self {
            Self::StagingStarted { .. }
            | Self::ParsingStarted { .. }
            | Self::InstallationStarted { .. }
            | Self::RemovalStarted { .. } => LifecycleStage::Started,
            Self::StagingCompleted { .. }
            | Self::ParsingCompleted { .. }
            | Self::InstallationCompleted { .. }
            | Self::RemovalCompleted { .. } => LifecycleStage::Completed,
            Self::TrustEvaluated { verdict, .. } => {
                if verdict.is_trusted() {
                    LifecycleStage::Completed
                } else {
                    LifecycleStage::Failed
                }
            }
            Self::StagingFailed { .. }
            | Self::ParsingFailed { .. }
            | Self::InstallationFailed { .. }
            | Self::RemovalFailed { .. } => LifecycleStage::Failed,
            Self::UserActionRequired { .. } => LifecycleStage::Waiting,
            Self::OperationCancelled { .. } => LifecycleStage::Cancelled,
        }
    }
}
