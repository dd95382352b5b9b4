//! Integration tests for error types

#[cfg(test)]
mod tests {
    use sideload_errors::*;

    #[test]
    fn test_error_conversion() {
        let err: Error = InstallError::SignatureMismatch {
            package: "com.x".into(),
        }
        .into();
        assert!(matches!(
            err,
            Error::Install(InstallError::SignatureMismatch { .. })
        ));
        assert_eq!(err.user_code(), Some("install.signature_mismatch"));
    }

    #[test]
    fn test_error_display() {
        let err = CommitError::WriteFailed {
            session_id: 7,
            message: "broken pipe".into(),
        };
        assert_eq!(err.to_string(), "write to session 7 failed: broken pipe");
    }

    #[test]
    fn test_commit_errors_are_retryable() {
        let err: Error = CommitError::FlushFailed {
            session_id: 1,
            message: "eio".into(),
        }
        .into();
        assert!(err.is_retryable());
        assert!(err.user_hint().is_some());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "test");
        let err: Error = io_err.into();
        assert!(matches!(
            err,
            Error::Io {
                kind: std::io::ErrorKind::PermissionDenied,
                ..
            }
        ));
    }

    #[test]
    fn test_cancelled_detection() {
        assert!(Error::Cancelled.is_cancelled());
        assert!(Error::from(InstallError::Cancelled).is_cancelled());
        assert!(!Error::from(InstallError::Busy).is_cancelled());
    }

    #[test]
    fn test_config_env_value_hint() {
        let env: Error = ConfigError::InvalidValue {
            field: "SIDELOAD_PLATFORM_LEVEL".into(),
            value: "high".into(),
        }
        .into();
        assert_eq!(env.user_code(), Some("config.invalid_value"));
        assert_eq!(
            env.user_hint(),
            Some("Correct or unset the environment variable named in the error.")
        );

        let parse: Error = ConfigError::ParseError {
            message: "expected `=`".into(),
        }
        .into();
        assert_eq!(parse.user_code(), Some("config.parse_error"));
        assert!(!parse.is_retryable());
    }
}
