//! Installer session definitions

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque token the installer service assigns to a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle of one create -> write -> commit sequence.
///
/// ```text
/// Idle -> Created -> Writing -> Committed -> {Succeeded, Failed}
///         Created | Writing  -> Abandoned
/// Idle -> Failed              (service refused the session)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Created,
    Writing,
    Committed,
    Succeeded,
    Failed,
    Abandoned,
}

impl SessionState {
    /// Whether `next` is a legal successor; the machine never moves backwards
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::Created | Self::Failed)
                | (Self::Created, Self::Writing | Self::Abandoned)
                | (Self::Writing, Self::Committed | Self::Abandoned)
                | (Self::Committed, Self::Succeeded | Self::Failed)
        )
    }

    /// States in which the session still holds a slot in the service's table
    /// and must be released on cancellation
    #[must_use]
    pub fn is_abandonable(self) -> bool {
        matches!(self, Self::Created | Self::Writing)
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Abandoned)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Created => "created",
            Self::Writing => "writing",
            Self::Committed => "committed",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Abandoned => "abandoned",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallMode {
    /// Replace the whole package
    FullInstall,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserActionRequirement {
    /// Let the service decide whether to prompt
    Unspecified,
    /// Ask the service to skip the confirmation prompt where it is permitted
    NotRequired,
}

/// Parameters handed to the installer service when a session is created
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionParams {
    pub mode: InstallMode,
    pub user_action: UserActionRequirement,
    pub request_update_ownership: bool,
    /// Label the service tags the session with; enumeration is scoped by it
    pub owner: String,
    pub package_hint: Option<String>,
    pub size_hint: Option<u64>,
}

impl SessionParams {
    pub fn full_install(owner: impl Into<String>) -> Self {
        Self {
            mode: InstallMode::FullInstall,
            user_action: UserActionRequirement::Unspecified,
            request_update_ownership: false,
            owner: owner.into(),
            package_hint: None,
            size_hint: None,
        }
    }

    #[must_use]
    pub fn with_user_action(mut self, user_action: UserActionRequirement) -> Self {
        self.user_action = user_action;
        self
    }

    #[must_use]
    pub fn with_update_ownership(mut self, request: bool) -> Self {
        self.request_update_ownership = request;
        self
    }

    #[must_use]
    pub fn with_package(mut self, package_id: impl Into<String>, size: u64) -> Self {
        self.package_hint = Some(package_id.into());
        self.size_hint = Some(size);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [SessionState; 7] = [
        SessionState::Idle,
        SessionState::Created,
        SessionState::Writing,
        SessionState::Committed,
        SessionState::Succeeded,
        SessionState::Failed,
        SessionState::Abandoned,
    ];

    #[test]
    fn test_happy_path_is_legal() {
        let path = [
            SessionState::Idle,
            SessionState::Created,
            SessionState::Writing,
            SessionState::Committed,
            SessionState::Succeeded,
        ];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_no_write_after_commit_or_abandon() {
        for from in [SessionState::Committed, SessionState::Abandoned] {
            assert!(!from.can_transition_to(SessionState::Writing));
            assert!(!from.can_transition_to(SessionState::Abandoned));
        }
    }

    #[test]
    fn test_terminal_states_are_sinks() {
        for from in ALL.iter().copied().filter(|s| s.is_terminal()) {
            for to in ALL {
                assert!(!from.can_transition_to(to), "{from} -> {to}");
            }
        }
    }

    #[test]
    fn test_abandonable_states() {
        let abandonable: Vec<_> = ALL.iter().copied().filter(|s| s.is_abandonable()).collect();
        assert_eq!(abandonable, vec![SessionState::Created, SessionState::Writing]);
    }
}
