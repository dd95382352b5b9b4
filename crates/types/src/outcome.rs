//! Correlation keys, completion signals and operation outcomes

use serde::{Deserialize, Serialize};
use sideload_errors::{Error, InstallError};
use std::fmt;
use std::str::FromStr;

use crate::SessionId;

/// Durable link between a completion signal and the operation that asked for it.
///
/// Embedded in the commit / uninstall request, carried back verbatim by the
/// installer service, and looked up in the correlator's table on delivery.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum CorrelationKey {
    Session(SessionId),
    Uninstall(String),
}

impl fmt::Display for CorrelationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Session(id) => write!(f, "session:{id}"),
            Self::Uninstall(package) => write!(f, "uninstall:{package}"),
        }
    }
}

impl FromStr for CorrelationKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some(("session", id)) => id
                .parse()
                .map(|id| Self::Session(SessionId(id)))
                .map_err(|_| Error::internal(format!("invalid session key: {s}"))),
            Some(("uninstall", package)) if !package.is_empty() => {
                Ok(Self::Uninstall(package.to_string()))
            }
            _ => Err(Error::internal(format!("invalid correlation key: {s}"))),
        }
    }
}

impl TryFrom<String> for CorrelationKey {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<CorrelationKey> for String {
    fn from(key: CorrelationKey) -> Self {
        key.to_string()
    }
}

/// Failure categories the installer service reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureCode {
    Generic,
    Aborted,
    Blocked,
    Conflict,
    Incompatible,
    Invalid,
    Storage,
}

impl FailureCode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Generic => "GENERIC",
            Self::Aborted => "ABORTED",
            Self::Blocked => "BLOCKED",
            Self::Conflict => "CONFLICT",
            Self::Incompatible => "INCOMPATIBLE",
            Self::Invalid => "INVALID",
            Self::Storage => "STORAGE",
        }
    }
}

impl fmt::Display for FailureCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FailureCode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_uppercase().as_str() {
            "GENERIC" => Self::Generic,
            "ABORTED" => Self::Aborted,
            "BLOCKED" => Self::Blocked,
            "CONFLICT" => Self::Conflict,
            "INCOMPATIBLE" => Self::Incompatible,
            "INVALID" => Self::Invalid,
            "STORAGE" => Self::Storage,
            _ => return Err(Error::internal(format!("unknown failure code: {s}"))),
        })
    }
}

/// Follow-up the service needs the user to perform before it can proceed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowUpAction {
    pub session_id: Option<SessionId>,
    /// Opaque token the presentation layer hands back when confirming
    pub token: String,
    pub prompt: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CompletionStatus {
    PendingUserAction {
        action: FollowUpAction,
    },
    Success,
    Failure {
        code: FailureCode,
        message: Option<String>,
    },
}

impl CompletionStatus {
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::PendingUserAction { .. })
    }
}

/// Message the installer service delivers when an operation progresses or ends
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionSignal {
    pub key: CorrelationKey,
    pub package: Option<String>,
    #[serde(flatten)]
    pub status: CompletionStatus,
}

impl CompletionSignal {
    pub fn success(key: CorrelationKey, package: Option<String>) -> Self {
        Self {
            key,
            package,
            status: CompletionStatus::Success,
        }
    }

    pub fn failure(
        key: CorrelationKey,
        package: Option<String>,
        code: FailureCode,
        message: Option<String>,
    ) -> Self {
        Self {
            key,
            package,
            status: CompletionStatus::Failure { code, message },
        }
    }

    /// Serialise for delivery across a process boundary
    ///
    /// # Errors
    ///
    /// Returns an error if serialisation fails.
    pub fn to_json(&self) -> Result<String, Error> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse a signal delivered from another process
    ///
    /// # Errors
    ///
    /// Returns an error if the payload is not a valid signal.
    pub fn from_json(payload: &str) -> Result<Self, Error> {
        Ok(serde_json::from_str(payload)?)
    }

    /// Terminal outcome this signal resolves to, if any
    #[must_use]
    pub fn outcome(&self) -> Option<OperationOutcome> {
        match &self.status {
            CompletionStatus::PendingUserAction { .. } => None,
            CompletionStatus::Success => Some(OperationOutcome::Succeeded),
            CompletionStatus::Failure { code, message } => {
                Some(OperationOutcome::Failed(FailureReason::ServiceFailure {
                    code: *code,
                    message: message.clone(),
                }))
            }
        }
    }
}

/// Why an operation ended in failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureReason {
    Stage { message: String },
    Parse { message: String },
    SignatureMismatch,
    Session { message: String },
    Commit { message: String },
    ServiceFailure {
        code: FailureCode,
        message: Option<String>,
    },
    TimedOut,
    Other { message: String },
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stage { message } => write!(f, "staging failed: {message}"),
            Self::Parse { message } => write!(f, "invalid bundle: {message}"),
            Self::SignatureMismatch => f.write_str("signature mismatch"),
            Self::Session { message } => write!(f, "session failed: {message}"),
            Self::Commit { message } => write!(f, "commit failed: {message}"),
            Self::ServiceFailure {
                code,
                message: Some(message),
            } => write!(f, "installer failure {code}: {message}"),
            Self::ServiceFailure {
                code,
                message: None,
            } => write!(f, "installer failure {code}"),
            Self::TimedOut => f.write_str("timed out waiting for the installer"),
            Self::Other { message } => f.write_str(message),
        }
    }
}

impl From<&Error> for FailureReason {
    fn from(err: &Error) -> Self {
        match err {
            Error::Stage(e) => Self::Stage {
                message: e.to_string(),
            },
            Error::Package(e) => Self::Parse {
                message: e.to_string(),
            },
            Error::Session(e) => Self::Session {
                message: e.to_string(),
            },
            Error::Commit(e) => Self::Commit {
                message: e.to_string(),
            },
            Error::Install(InstallError::SignatureMismatch { .. }) => Self::SignatureMismatch,
            Error::Install(InstallError::TimedOut { .. }) => Self::TimedOut,
            Error::Install(InstallError::ServiceFailure { code, message }) => {
                Self::ServiceFailure {
                    code: code.parse().unwrap_or(FailureCode::Generic),
                    message: Some(message.clone()),
                }
            }
            other => Self::Other {
                message: other.to_string(),
            },
        }
    }
}

/// Result of one install or uninstall, produced exactly once per operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum OperationOutcome {
    Pending,
    InProgress,
    Succeeded,
    Failed(FailureReason),
    Cancelled,
}

impl OperationOutcome {
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed(_) | Self::Cancelled)
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_correlation_key_string_form() {
        let key = CorrelationKey::Session(SessionId(42));
        assert_eq!(key.to_string(), "session:42");
        assert_eq!("session:42".parse::<CorrelationKey>().unwrap(), key);

        let key: CorrelationKey = "uninstall:com.y".parse().unwrap();
        assert_eq!(key, CorrelationKey::Uninstall("com.y".into()));

        assert!("session:abc".parse::<CorrelationKey>().is_err());
        assert!("uninstall:".parse::<CorrelationKey>().is_err());
        assert!("bogus".parse::<CorrelationKey>().is_err());
    }

    #[test]
    fn test_signal_wire_format() {
        let signal = CompletionSignal::failure(
            CorrelationKey::Uninstall("com.y".into()),
            Some("com.y".into()),
            FailureCode::Aborted,
            None,
        );
        let json = signal.to_json().unwrap();
        assert!(json.contains(r#""key":"uninstall:com.y""#));
        assert!(json.contains(r#""status":"failure""#));
        assert!(json.contains(r#""code":"ABORTED""#));
        assert_eq!(CompletionSignal::from_json(&json).unwrap(), signal);
    }

    #[test]
    fn test_pending_user_action_has_no_outcome() {
        let signal = CompletionSignal {
            key: CorrelationKey::Session(SessionId(1)),
            package: None,
            status: CompletionStatus::PendingUserAction {
                action: FollowUpAction {
                    session_id: Some(SessionId(1)),
                    token: "t".into(),
                    prompt: "Install?".into(),
                },
            },
        };
        assert!(signal.outcome().is_none());
        assert!(!signal.status.is_terminal());
    }

    #[test]
    fn test_failure_reason_from_error() {
        let err = Error::from(InstallError::ServiceFailure {
            code: "ABORTED".into(),
            message: "user declined".into(),
        });
        assert_eq!(
            FailureReason::from(&err),
            FailureReason::ServiceFailure {
                code: FailureCode::Aborted,
                message: Some("user declined".into()),
            }
        );
        let err = Error::from(InstallError::SignatureMismatch {
            package: "com.x".into(),
        });
        assert_eq!(FailureReason::from(&err), FailureReason::SignatureMismatch);
    }
}
