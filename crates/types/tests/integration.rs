//! Integration tests for types

#[cfg(test)]
mod tests {
    use sideload_types::*;

    #[test]
    fn test_install_state_serialization() {
        let state = InstallState::failed(FailureReason::ServiceFailure {
            code: FailureCode::Aborted,
            message: None,
        });
        let json = serde_json::to_string(&state).unwrap();
        assert_eq!(
            json,
            r#"{"state":"failed","reason":{"kind":"service_failure","code":"ABORTED","message":null}}"#
        );
        assert!(state.is_terminal());
        assert!(!state.is_busy());
    }

    #[test]
    fn test_signal_outcome_mapping() {
        let key = CorrelationKey::Session(SessionId(9));
        let ok = CompletionSignal::success(key.clone(), Some("com.x".into()));
        assert_eq!(ok.outcome(), Some(OperationOutcome::Succeeded));

        let failed = CompletionSignal::failure(key, None, FailureCode::Storage, Some("full".into()));
        match failed.outcome() {
            Some(OperationOutcome::Failed(FailureReason::ServiceFailure { code, .. })) => {
                assert_eq!(code, FailureCode::Storage);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn test_session_params_builder() {
        let params = SessionParams::full_install("sideload")
            .with_user_action(UserActionRequirement::NotRequired)
            .with_update_ownership(true)
            .with_package("com.x", 1024);
        assert_eq!(params.mode, InstallMode::FullInstall);
        assert_eq!(params.package_hint.as_deref(), Some("com.x"));
        assert_eq!(params.size_hint, Some(1024));
    }

    #[test]
    fn test_install_preview_serializes_shared_bundle() {
        let bundle = std::sync::Arc::new(PackageBundle {
            package_id: "com.example.notes".into(),
            label: "notes".into(),
            version: VersionInfo::new(3, "3.0"),
            min_platform: 1,
            target_platform: 34,
            permissions: vec!["example.permission.CAMERA".into()],
            size: 2048,
            content_hash: String::new(),
            signatures: std::collections::BTreeSet::from([SigningIdentity::new("ab12")]),
            path: "/tmp/notes.bundle".into(),
        });
        let preview = InstallPreview {
            installed: Some(InstalledPackageRecord::from_bundle(&bundle)),
            bundle,
            trust: TrustVerdict::Trusted,
        };

        let json = serde_json::to_value(&preview).unwrap();
        assert_eq!(json["bundle"]["package_id"], "com.example.notes");
        assert_eq!(json["bundle"]["signatures"][0], "ab12");
        assert_eq!(json["installed"]["version"]["code"], 3);
        assert_eq!(json["trust"], "trusted");
    }
}
