//! Integration tests for events

#[cfg(test)]
mod tests {
    use sideload_events::*;
    use sideload_types::{FollowUpAction, SessionId, TrustVerdict};

    #[tokio::test]
    async fn test_event_sender_emit() {
        let (tx, mut rx) = channel();

        tx.emit_error("test error");
        tx.emit_debug("test debug");

        let event1 = rx.recv().await.unwrap();
        assert!(matches!(event1, AppEvent::General(GeneralEvent::Error { .. })));

        let event2 = rx.recv().await.unwrap();
        assert!(matches!(
            event2,
            AppEvent::General(GeneralEvent::DebugLog { .. })
        ));
    }

    #[tokio::test]
    async fn test_dropped_receiver() {
        let (tx, rx) = channel();
        drop(rx);

        // Should not panic when receiver is dropped
        tx.emit_warning("ignored");
    }

    #[test]
    fn test_absent_sender_is_silent() {
        let emitter: Option<EventSender> = None;
        emitter.emit_lifecycle(LifecycleEvent::RemovalStarted {
            package: "com.x".into(),
        });
    }

    #[test]
    fn test_log_levels() {
        let untrusted = AppEvent::Lifecycle(LifecycleEvent::TrustEvaluated {
            package: "com.x".into(),
            installed_version: Some(3),
            verdict: TrustVerdict::Untrusted,
        });
        assert_eq!(untrusted.log_level(), tracing::Level::ERROR);
        assert_eq!(untrusted.log_target(), "sideload::events::trust");

        let unclaimed = AppEvent::Session(SessionEvent::CompletionUnclaimed {
            correlation_key: "session:4".into(),
            status: "success".into(),
        });
        assert_eq!(unclaimed.log_level(), tracing::Level::WARN);
        assert_eq!(unclaimed.event_source(), EventSource::COMPLETION);

        let created = AppEvent::Session(SessionEvent::Created {
            session_id: SessionId(1),
            package: "com.x".into(),
        });
        assert_eq!(created.log_level(), tracing::Level::INFO);
    }

    #[test]
    fn test_user_action_event_serialization() {
        let event = AppEvent::Lifecycle(LifecycleEvent::UserActionRequired {
            package: Some("com.x".into()),
            correlation_key: "session:2".into(),
            action: FollowUpAction {
                session_id: Some(SessionId(2)),
                token: "abc".into(),
                prompt: "Install com.x?".into(),
            },
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["domain"], "lifecycle");
        assert_eq!(json["event"]["type"], "UserActionRequired");
        assert_eq!(json["event"]["action"]["token"], "abc");
    }
}
