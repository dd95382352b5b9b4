//! Completion correlation
//!
//! Completion signals arrive out of band, possibly in a process that never
//! issued the request. The correlation key carried by the signal is the only
//! link back to a waiter, so the table here maps keys to one-shot senders and
//! nothing else. Resolving a key removes it; a second signal for the same key
//! finds nothing and is logged, not treated as an error.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use sideload_errors::{Error, InstallError};
use sideload_events::{EventEmitter, EventSender, LifecycleEvent, SessionEvent};
use sideload_types::{
    CompletionSignal, CompletionStatus, CorrelationKey, FailureReason, OperationOutcome,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::service::CompletionReceiver;

/// What happened to a delivered completion signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// A waiter received the outcome
    Resolved,
    /// Nobody was waiting on the key; the signal was dropped
    Unclaimed,
    /// The signal asked for user confirmation and was passed on
    UserActionForwarded,
}

/// Receiving half of one registration
#[derive(Debug)]
pub struct OutcomeReceiver {
    key: CorrelationKey,
    rx: oneshot::Receiver<OperationOutcome>,
}

impl OutcomeReceiver {
    #[must_use]
    pub fn key(&self) -> &CorrelationKey {
        &self.key
    }
}

/// Table of pending correlations
#[derive(Debug, Default)]
pub struct CompletionCorrelator {
    pending: DashMap<CorrelationKey, oneshot::Sender<OperationOutcome>>,
    event_sender: Option<EventSender>,
}

impl EventEmitter for CompletionCorrelator {
    fn event_sender(&self) -> Option<&EventSender> {
        self.event_sender.as_ref()
    }
}

impl CompletionCorrelator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_event_sender(mut self, sender: Option<EventSender>) -> Self {
        self.event_sender = sender;
        self
    }

    /// Start waiting for the completion addressed to `key`
    ///
    /// # Errors
    ///
    /// Returns `InstallError::DuplicateRegistration` if a live waiter already
    /// holds the key.
    pub fn register(&self, key: CorrelationKey) -> Result<OutcomeReceiver, Error> {
        let (tx, rx) = oneshot::channel();
        match self.pending.entry(key.clone()) {
            Entry::Occupied(mut entry) if entry.get().is_closed() => {
                // Previous waiter went away without deregistering
                entry.insert(tx);
            }
            Entry::Occupied(_) => {
                return Err(InstallError::DuplicateRegistration {
                    key: key.to_string(),
                }
                .into());
            }
            Entry::Vacant(entry) => {
                entry.insert(tx);
            }
        }
        tracing::debug!(key = %key, "registered completion waiter");
        Ok(OutcomeReceiver { key, rx })
    }

    /// Drop the waiter for `key`; it observes `Cancelled`
    pub fn deregister(&self, key: &CorrelationKey) -> bool {
        let removed = self.pending.remove(key).is_some();
        if removed {
            tracing::debug!(key = %key, "deregistered completion waiter");
        }
        removed
    }

    #[must_use]
    pub fn is_pending(&self, key: &CorrelationKey) -> bool {
        self.pending.contains_key(key)
    }

    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Hand `outcome` to whoever waits on `key`, at most once
    pub fn resolve(&self, key: &CorrelationKey, outcome: OperationOutcome) -> Resolution {
        let Some((_, tx)) = self.pending.remove(key) else {
            tracing::warn!(key = %key, ?outcome, "completion for unknown or already resolved key");
            self.emit_session(SessionEvent::CompletionUnclaimed {
                correlation_key: key.to_string(),
                status: outcome_label(&outcome).to_string(),
            });
            return Resolution::Unclaimed;
        };

        if tx.send(outcome).is_err() {
            tracing::debug!(key = %key, "waiter dropped before completion arrived");
            return Resolution::Unclaimed;
        }
        tracing::debug!(key = %key, "resolved completion");
        Resolution::Resolved
    }

    /// Route an inbound signal: terminal ones resolve, user-action ones are
    /// forwarded to the presentation layer and leave the waiter in place
    pub fn deliver(&self, signal: CompletionSignal) -> Resolution {
        if let Some(outcome) = signal.outcome() {
            return self.resolve(&signal.key, outcome);
        }

        if let CompletionStatus::PendingUserAction { action } = signal.status {
            tracing::info!(key = %signal.key, prompt = %action.prompt, "installer requires user action");
            self.emit_lifecycle(LifecycleEvent::UserActionRequired {
                package: signal.package,
                correlation_key: signal.key.to_string(),
                action,
            });
        }
        Resolution::UserActionForwarded
    }

    /// Deliver a JSON-encoded signal received from another process
    ///
    /// # Errors
    ///
    /// Returns an error if the payload is not a valid completion signal.
    pub fn deliver_json(&self, payload: &str) -> Result<Resolution, Error> {
        Ok(self.deliver(CompletionSignal::from_json(payload)?))
    }

    /// Wait for the outcome without blocking a thread.
    ///
    /// A dropped sender reads as `Cancelled`. When `timeout` elapses the key
    /// is deregistered and the wait ends in `Failed(TimedOut)`.
    pub async fn wait(
        &self,
        receiver: OutcomeReceiver,
        timeout: Option<Duration>,
    ) -> OperationOutcome {
        let OutcomeReceiver { key, rx } = receiver;
        let Some(limit) = timeout else {
            return rx.await.unwrap_or(OperationOutcome::Cancelled);
        };

        match tokio::time::timeout(limit, rx).await {
            Ok(result) => result.unwrap_or(OperationOutcome::Cancelled),
            Err(_) => {
                tracing::warn!(key = %key, seconds = limit.as_secs(), "no completion before timeout");
                self.deregister(&key);
                OperationOutcome::Failed(FailureReason::TimedOut)
            }
        }
    }

    /// Drain `rx` on a background task until every sender is gone
    pub fn spawn_listener(self: &Arc<Self>, mut rx: CompletionReceiver) -> JoinHandle<()> {
        let correlator = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(signal) = rx.recv().await {
                correlator.deliver(signal);
            }
            tracing::debug!("completion channel closed");
        })
    }
}

fn outcome_label(outcome: &OperationOutcome) -> &'static str {
    match outcome {
        OperationOutcome::Pending => "pending",
        OperationOutcome::InProgress => "in_progress",
        OperationOutcome::Succeeded => "success",
        OperationOutcome::Failed(_) => "failure",
        OperationOutcome::Cancelled => "cancelled",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sideload_events::AppEvent;
    use sideload_types::{FailureCode, FollowUpAction, SessionId};

    fn key(id: u64) -> CorrelationKey {
        CorrelationKey::Session(SessionId(id))
    }

    #[tokio::test]
    async fn test_duplicate_registration_rejected() {
        let correlator = CompletionCorrelator::new();
        let _rx = correlator.register(key(1)).unwrap();
        assert!(matches!(
            correlator.register(key(1)),
            Err(Error::Install(InstallError::DuplicateRegistration { .. }))
        ));
    }

    #[tokio::test]
    async fn test_closed_registration_can_be_replaced() {
        let correlator = CompletionCorrelator::new();
        drop(correlator.register(key(1)).unwrap());
        assert!(correlator.register(key(1)).is_ok());
    }

    #[tokio::test]
    async fn test_resolution_is_idempotent() {
        let correlator = CompletionCorrelator::new();
        let rx = correlator.register(key(2)).unwrap();

        assert_eq!(
            correlator.deliver(CompletionSignal::success(key(2), None)),
            Resolution::Resolved
        );
        assert_eq!(
            correlator.deliver(CompletionSignal::failure(
                key(2),
                None,
                FailureCode::Generic,
                None
            )),
            Resolution::Unclaimed
        );
        assert_eq!(correlator.wait(rx, None).await, OperationOutcome::Succeeded);
        assert_eq!(correlator.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_deregistered_waiter_sees_cancelled() {
        let correlator = CompletionCorrelator::new();
        let rx = correlator.register(key(3)).unwrap();
        assert!(correlator.deregister(&key(3)));

        assert_eq!(
            correlator.deliver(CompletionSignal::success(key(3), None)),
            Resolution::Unclaimed
        );
        assert_eq!(correlator.wait(rx, None).await, OperationOutcome::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_deregisters() {
        let correlator = CompletionCorrelator::new();
        let rx = correlator.register(key(4)).unwrap();

        let outcome = correlator.wait(rx, Some(Duration::from_secs(30))).await;
        assert_eq!(outcome, OperationOutcome::Failed(FailureReason::TimedOut));
        assert!(!correlator.is_pending(&key(4)));
    }

    #[tokio::test]
    async fn test_user_action_is_forwarded_not_resolved() {
        let (tx, mut events) = sideload_events::channel();
        let correlator = CompletionCorrelator::new().with_event_sender(Some(tx));
        let _rx = correlator.register(key(5)).unwrap();

        let signal = CompletionSignal {
            key: key(5),
            package: Some("com.x".into()),
            status: CompletionStatus::PendingUserAction {
                action: FollowUpAction {
                    session_id: Some(SessionId(5)),
                    token: "t".into(),
                    prompt: "Install X?".into(),
                },
            },
        };
        assert_eq!(
            correlator.deliver(signal),
            Resolution::UserActionForwarded
        );
        assert!(correlator.is_pending(&key(5)));
        assert!(matches!(
            events.recv().await.unwrap(),
            AppEvent::Lifecycle(LifecycleEvent::UserActionRequired { .. })
        ));
    }

    #[tokio::test]
    async fn test_listener_drains_channel() {
        let correlator = Arc::new(CompletionCorrelator::new());
        let rx = correlator.register(CorrelationKey::Uninstall("com.y".into())).unwrap();

        let (tx, inbound) = crate::service::completion_channel();
        let handle = correlator.spawn_listener(inbound);

        let payload = CompletionSignal::failure(
            CorrelationKey::Uninstall("com.y".into()),
            Some("com.y".into()),
            FailureCode::Aborted,
            None,
        )
        .to_json()
        .unwrap();
        tx.send(CompletionSignal::from_json(&payload).unwrap()).unwrap();

        let outcome = correlator.wait(rx, None).await;
        assert_eq!(
            outcome,
            OperationOutcome::Failed(FailureReason::ServiceFailure {
                code: FailureCode::Aborted,
                message: None,
            })
        );
        drop(tx);
        handle.await.unwrap();
    }
}
