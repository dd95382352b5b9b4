//! Bundle and installed-package definitions

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Fingerprint of a certificate a bundle is signed with (lowercase hex)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SigningIdentity(String);

impl SigningIdentity {
    /// Create an identity from a fingerprint string; case is normalised
    pub fn new(fingerprint: impl Into<String>) -> Self {
        Self(fingerprint.into().to_ascii_lowercase())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SigningIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SigningIdentity {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Ordinal version code plus the display string shown to users
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInfo {
    pub code: u64,
    pub name: String,
}

impl VersionInfo {
    pub fn new(code: u64, name: impl Into<String>) -> Self {
        Self {
            code,
            name: name.into(),
        }
    }
}

impl fmt::Display for VersionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.code)
    }
}

/// A parsed application bundle.
///
/// Produced once by the metadata parser and never mutated afterwards; the
/// coordinator shares it behind an `Arc` for the lifetime of one operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageBundle {
    pub package_id: String,
    pub label: String,
    pub version: VersionInfo,
    pub min_platform: u32,
    pub target_platform: u32,
    pub permissions: Vec<String>,
    pub size: u64,
    /// BLAKE3 hex digest of the bundle file
    pub content_hash: String,
    pub signatures: BTreeSet<SigningIdentity>,
    /// Caller's source file; the staged copy is gone once the operation ends
    pub path: PathBuf,
}

impl PackageBundle {
    /// Byte size rendered with a binary unit, one decimal above bytes
    #[must_use]
    pub fn size_formatted(&self) -> String {
        format_size(self.size)
    }

    /// Permission strings paired with a readable label
    #[must_use]
    pub fn permission_labels(&self) -> Vec<(String, String)> {
        self.permissions
            .iter()
            .map(|p| (p.clone(), permission_label(p)))
            .collect()
    }
}

/// What the platform already has installed under a package id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledPackageRecord {
    pub package_id: String,
    pub version: VersionInfo,
    pub signatures: BTreeSet<SigningIdentity>,
}

impl InstalledPackageRecord {
    /// Record the state a bundle leaves behind once installed
    #[must_use]
    pub fn from_bundle(bundle: &PackageBundle) -> Self {
        Self {
            package_id: bundle.package_id.clone(),
            version: bundle.version.clone(),
            signatures: bundle.signatures.clone(),
        }
    }
}

/// Result of comparing a candidate bundle's signers with the installed ones
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrustVerdict {
    Trusted,
    Untrusted,
}

impl TrustVerdict {
    #[must_use]
    pub fn is_trusted(self) -> bool {
        matches!(self, Self::Trusted)
    }
}

/// Everything a confirmation screen needs before an install is started
#[derive(Debug, Clone, Serialize)]
pub struct InstallPreview {
    pub bundle: Arc<PackageBundle>,
    pub installed: Option<InstalledPackageRecord>,
    pub trust: TrustVerdict,
}

impl InstallPreview {
    #[must_use]
    pub fn is_update(&self) -> bool {
        self.installed.is_some()
    }

    /// True when the candidate's version code is lower than the installed one
    #[must_use]
    pub fn is_downgrade(&self) -> bool {
        self.installed
            .as_ref()
            .is_some_and(|record| self.bundle.version.code < record.version.code)
    }
}

/// Readable label for a permission string.
///
/// Uses the last dotted segment, lowercased, underscores turned into spaces
/// and every word capitalised: `net.ACCESS_WIFI_STATE` -> `Access Wifi State`.
#[must_use]
pub fn permission_label(permission: &str) -> String {
    let short = permission.rsplit('.').next().unwrap_or(permission);
    short
        .split('_')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let lower = word.to_lowercase();
            let mut chars = lower.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[allow(clippy::cast_precision_loss)]
fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    match bytes {
        b if b < KB => format!("{b} B"),
        b if b < MB => format!("{:.1} KB", b as f64 / KB as f64),
        b if b < GB => format!("{:.1} MB", b as f64 / MB as f64),
        b => format!("{:.1} GB", b as f64 / GB as f64),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bundle(size: u64) -> PackageBundle {
        PackageBundle {
            package_id: "com.x".into(),
            label: "X".into(),
            version: VersionInfo::new(3, "1.0"),
            min_platform: 26,
            target_platform: 34,
            permissions: vec!["net.INTERNET".into(), "media.READ_MEDIA_IMAGES".into()],
            size,
            content_hash: String::new(),
            signatures: BTreeSet::new(),
            path: PathBuf::from("/tmp/x.bundle"),
        }
    }

    #[test]
    fn test_size_formatting() {
        assert_eq!(bundle(512).size_formatted(), "512 B");
        assert_eq!(bundle(1536).size_formatted(), "1.5 KB");
        assert_eq!(bundle(5 * 1024 * 1024).size_formatted(), "5.0 MB");
        assert_eq!(bundle(3 * 1024 * 1024 * 1024).size_formatted(), "3.0 GB");
    }

    #[test]
    fn test_permission_label() {
        assert_eq!(permission_label("net.ACCESS_WIFI_STATE"), "Access Wifi State");
        assert_eq!(permission_label("CAMERA"), "Camera");
        assert_eq!(permission_label(""), "");
        let labels = bundle(0).permission_labels();
        assert_eq!(labels[1].1, "Read Media Images");
    }

    #[test]
    fn test_signing_identity_is_case_insensitive() {
        assert_eq!(SigningIdentity::new("ABCD"), SigningIdentity::from("abcd"));
    }

    #[test]
    fn test_preview_update_and_downgrade() {
        let candidate = Arc::new(bundle(0));
        let mut installed = InstalledPackageRecord::from_bundle(&candidate);
        installed.version = VersionInfo::new(5, "2.0");

        let preview = InstallPreview {
            bundle: candidate,
            installed: Some(installed),
            trust: TrustVerdict::Trusted,
        };
        assert!(preview.is_update());
        assert!(preview.is_downgrade());
    }
}
