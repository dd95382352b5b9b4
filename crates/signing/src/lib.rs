#![deny(clippy::pedantic, unsafe_code)]

//! Signing identities and update trust evaluation
//!
//! An update is trusted when the candidate bundle shares at least one signing
//! identity with the package already installed under the same id. Fresh
//! installs are never checked.

use base64::Engine as _;
use serde::{Deserialize, Serialize};
use sideload_errors::{Error, PackageError};
use sideload_types::{InstalledPackageRecord, PackageBundle, SigningIdentity, TrustVerdict};
use std::collections::BTreeSet;

/// How to treat an update when either side has no signing identities
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrustPolicy {
    /// An empty set on either side cannot prove a mismatch, so the update is trusted
    #[default]
    Lenient,
    /// Both sides must carry identities and share at least one
    Strict,
}

/// Compare candidate and installed signing identities under `policy`.
#[must_use]
pub fn evaluate(
    candidate: &BTreeSet<SigningIdentity>,
    installed: &BTreeSet<SigningIdentity>,
    policy: TrustPolicy,
) -> TrustVerdict {
    if candidate.is_empty() || installed.is_empty() {
        return match policy {
            TrustPolicy::Lenient => TrustVerdict::Trusted,
            TrustPolicy::Strict => TrustVerdict::Untrusted,
        };
    }

    if candidate.intersection(installed).next().is_some() {
        TrustVerdict::Trusted
    } else {
        TrustVerdict::Untrusted
    }
}

/// Trust verdict for installing `bundle` over whatever is installed now.
///
/// `installed` is `None` for a fresh install, which is always trusted.
#[must_use]
pub fn evaluate_update(
    bundle: &PackageBundle,
    installed: Option<&InstalledPackageRecord>,
    policy: TrustPolicy,
) -> TrustVerdict {
    let Some(record) = installed else {
        return TrustVerdict::Trusted;
    };

    let verdict = evaluate(&bundle.signatures, &record.signatures, policy);
    tracing::debug!(
        package = %bundle.package_id,
        candidate = bundle.signatures.len(),
        installed = record.signatures.len(),
        ?verdict,
        "evaluated update trust"
    );
    verdict
}

/// Fingerprint raw certificate bytes into a signing identity
#[must_use]
pub fn fingerprint(certificate: &[u8]) -> SigningIdentity {
    SigningIdentity::new(blake3::hash(certificate).to_hex().to_string())
}

/// Decode a base64 certificate and fingerprint it
///
/// # Errors
///
/// Returns an error if the input is not valid base64 or decodes to nothing.
pub fn fingerprint_certificate(encoded: &str) -> Result<SigningIdentity, Error> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .map_err(|e| PackageError::InvalidCertificate {
            message: e.to_string(),
        })?;
    if bytes.is_empty() {
        return Err(PackageError::InvalidCertificate {
            message: "empty certificate".to_string(),
        }
        .into());
    }
    Ok(fingerprint(&bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use sideload_types::VersionInfo;
    use std::path::PathBuf;

    fn ids(values: &[&str]) -> BTreeSet<SigningIdentity> {
        values.iter().map(|v| SigningIdentity::from(*v)).collect()
    }

    fn bundle(code: u64, signatures: &[&str]) -> PackageBundle {
        PackageBundle {
            package_id: "com.x".into(),
            label: "X".into(),
            version: VersionInfo::new(code, code.to_string()),
            min_platform: 1,
            target_platform: 1,
            permissions: Vec::new(),
            size: 0,
            content_hash: String::new(),
            signatures: ids(signatures),
            path: PathBuf::from("/tmp/x"),
        }
    }

    #[test]
    fn test_matching_identity_is_trusted() {
        let verdict = evaluate(&ids(&["a", "b"]), &ids(&["b"]), TrustPolicy::Lenient);
        assert_eq!(verdict, TrustVerdict::Trusted);
    }

    #[test]
    fn test_disjoint_identities_are_untrusted() {
        let candidate = bundle(4, &["b"]);
        let installed = InstalledPackageRecord::from_bundle(&bundle(3, &["a"]));
        assert_eq!(
            evaluate_update(&candidate, Some(&installed), TrustPolicy::Lenient),
            TrustVerdict::Untrusted
        );
    }

    #[test]
    fn test_empty_sets_follow_policy() {
        assert_eq!(
            evaluate(&ids(&[]), &ids(&["a"]), TrustPolicy::Lenient),
            TrustVerdict::Trusted
        );
        assert_eq!(
            evaluate(&ids(&["a"]), &ids(&[]), TrustPolicy::Strict),
            TrustVerdict::Untrusted
        );
    }

    #[test]
    fn test_fingerprint_certificate() {
        // "cert" in base64
        let id = fingerprint_certificate("Y2VydA==").unwrap();
        assert_eq!(id, fingerprint(b"cert"));
        assert_eq!(id.as_str().len(), 64);

        assert!(fingerprint_certificate("not base64!").is_err());
        assert!(fingerprint_certificate("").is_err());
    }

    fn identity_set() -> impl Strategy<Value = BTreeSet<SigningIdentity>> {
        prop::collection::btree_set("[a-f0-9]{4}", 0..6)
            .prop_map(|set| set.into_iter().map(SigningIdentity::new).collect())
    }

    proptest! {
        #[test]
        fn fresh_install_is_always_trusted(
            signatures in identity_set(),
            strict in any::<bool>(),
        ) {
            let mut candidate = bundle(1, &[]);
            candidate.signatures = signatures;
            let policy = if strict { TrustPolicy::Strict } else { TrustPolicy::Lenient };
            prop_assert_eq!(evaluate_update(&candidate, None, policy), TrustVerdict::Trusted);
        }

        #[test]
        fn disjoint_non_empty_sets_are_untrusted(
            candidate in identity_set(),
            installed in identity_set(),
        ) {
            prop_assume!(!candidate.is_empty() && !installed.is_empty());
            prop_assume!(candidate.is_disjoint(&installed));
            prop_assert_eq!(
                evaluate(&candidate, &installed, TrustPolicy::Lenient),
                TrustVerdict::Untrusted
            );
        }

        #[test]
        fn shared_identity_is_trusted(
            mut candidate in identity_set(),
            mut installed in identity_set(),
            shared in "[a-f0-9]{4}",
        ) {
            candidate.insert(SigningIdentity::new(shared.clone()));
            installed.insert(SigningIdentity::new(shared));
            prop_assert_eq!(
                evaluate(&candidate, &installed, TrustPolicy::Strict),
                TrustVerdict::Trusted
            );
        }
    }
}
