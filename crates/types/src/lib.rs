#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Core type definitions for the sideload installer
//!
//! This crate provides the data model shared by every other crate: parsed
//! bundles, installed-package records, installer sessions, correlation keys,
//! completion signals and the observable install state.

pub mod outcome;
pub mod package;
pub mod session;
pub mod state;

// Re-export commonly used types
pub use outcome::{
    CompletionSignal, CompletionStatus, CorrelationKey, FailureCode, FailureReason,
    FollowUpAction, OperationOutcome,
};
pub use package::{
    permission_label, InstallPreview, InstalledPackageRecord, PackageBundle, SigningIdentity,
    TrustVerdict, VersionInfo,
};
pub use session::{InstallMode, SessionId, SessionParams, SessionState, UserActionRequirement};
pub use state::InstallState;
