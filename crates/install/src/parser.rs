//! Bundle metadata parsing
//!
//! A bundle is a tar archive with a `manifest.toml` at its root. The parser
//! turns it into an immutable [`PackageBundle`]; everything else in the
//! archive is payload and is never inspected here.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sideload_errors::{Error, PackageError};
use sideload_hash::Hash;
use sideload_types::{PackageBundle, SigningIdentity, VersionInfo};
use std::collections::BTreeSet;
use std::io::Read;
use std::path::{Path, PathBuf};

/// Name of the manifest entry inside a bundle archive
pub const MANIFEST_ENTRY: &str = "manifest.toml";

/// Reads a bundle's descriptive record
#[async_trait]
pub trait MetadataParser: Send + Sync {
    /// Parse the bundle at `path`
    async fn parse(&self, path: &Path) -> Result<PackageBundle, Error>;
}

/// Manifest as stored inside the bundle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleManifest {
    pub package: ManifestPackage,
    #[serde(default)]
    pub signing: ManifestSigning,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestPackage {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub version_code: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_name: Option<String>,
    #[serde(default = "default_min_platform")]
    pub min_platform: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_platform: Option<u32>,
    #[serde(default)]
    pub permissions: Vec<String>,
}

/// Base64-encoded signing certificates
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestSigning {
    #[serde(default)]
    pub certificates: Vec<String>,
}

fn default_min_platform() -> u32 {
    1
}

impl BundleManifest {
    /// Minimal manifest for a package id and version code
    #[must_use]
    pub fn new(id: impl Into<String>, version_code: u64) -> Self {
        Self {
            package: ManifestPackage {
                id: id.into(),
                label: None,
                version_code,
                version_name: None,
                min_platform: default_min_platform(),
                target_platform: None,
                permissions: Vec::new(),
            },
            signing: ManifestSigning::default(),
        }
    }

    /// Parse manifest text
    ///
    /// # Errors
    ///
    /// Returns `PackageError::InvalidManifest` for malformed TOML and
    /// `PackageError::InvalidField` when the package id is empty.
    pub fn from_toml(text: &str) -> Result<Self, Error> {
        let manifest: Self = toml::from_str(text).map_err(|e| PackageError::InvalidManifest {
            message: e.to_string(),
        })?;
        if manifest.package.id.trim().is_empty() {
            return Err(PackageError::InvalidField {
                field: "package.id".to_string(),
                message: "must not be empty".to_string(),
            }
            .into());
        }
        Ok(manifest)
    }

    /// Serialize to manifest text
    ///
    /// # Errors
    ///
    /// Returns an error if the manifest cannot be encoded as TOML.
    pub fn to_toml(&self) -> Result<String, Error> {
        toml::to_string(self).map_err(|e| {
            PackageError::InvalidManifest {
                message: e.to_string(),
            }
            .into()
        })
    }

    /// Fingerprint every certificate into a signing identity
    ///
    /// # Errors
    ///
    /// Returns `PackageError::InvalidCertificate` for any undecodable entry.
    pub fn signing_identities(&self) -> Result<BTreeSet<SigningIdentity>, Error> {
        self.signing
            .certificates
            .iter()
            .map(|cert| sideload_signing::fingerprint_certificate(cert))
            .collect()
    }

    fn into_bundle(
        self,
        path: PathBuf,
        size: u64,
        content_hash: String,
    ) -> Result<PackageBundle, Error> {
        let signatures = self.signing_identities()?;
        let pkg = self.package;
        let label = pkg.label.unwrap_or_else(|| {
            pkg.id
                .rsplit('.')
                .next()
                .unwrap_or(pkg.id.as_str())
                .to_string()
        });

        Ok(PackageBundle {
            label,
            version: VersionInfo::new(
                pkg.version_code,
                pkg.version_name.unwrap_or_else(|| "Unknown".to_string()),
            ),
            min_platform: pkg.min_platform,
            target_platform: pkg.target_platform.unwrap_or(pkg.min_platform),
            permissions: pkg.permissions,
            size,
            content_hash,
            signatures,
            path,
            package_id: pkg.id,
        })
    }
}

/// Parser for tar bundles carrying `manifest.toml`
#[derive(Debug, Clone, Copy, Default)]
pub struct ArchiveParser;

#[async_trait]
impl MetadataParser for ArchiveParser {
    async fn parse(&self, path: &Path) -> Result<PackageBundle, Error> {
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|_| PackageError::NotFound {
                path: path.display().to_string(),
            })?;

        let archive_path = path.to_path_buf();
        let manifest_text = tokio::task::spawn_blocking(move || read_manifest(&archive_path))
            .await
            .map_err(|e| Error::internal(format!("manifest reader task failed: {e}")))??;

        let manifest = BundleManifest::from_toml(&manifest_text)?;
        let hash = Hash::hash_file(path).await?;

        let bundle = manifest.into_bundle(path.to_path_buf(), metadata.len(), hash.to_hex())?;
        tracing::debug!(
            package = %bundle.package_id,
            version = %bundle.version,
            signatures = bundle.signatures.len(),
            "parsed bundle manifest"
        );
        Ok(bundle)
    }
}

fn read_manifest(path: &Path) -> Result<String, Error> {
    let malformed = |e: std::io::Error| -> Error {
        PackageError::Malformed {
            path: path.display().to_string(),
            message: e.to_string(),
        }
        .into()
    };

    let file = std::fs::File::open(path).map_err(malformed)?;
    let mut archive = tar::Archive::new(file);

    for entry in archive.entries().map_err(malformed)? {
        let mut entry = entry.map_err(malformed)?;
        let is_manifest = {
            let entry_path = entry.path().map_err(malformed)?;
            entry_path.strip_prefix(".").unwrap_or(&entry_path) == Path::new(MANIFEST_ENTRY)
        };
        if !is_manifest {
            continue;
        }

        let mut text = String::new();
        entry.read_to_string(&mut text).map_err(malformed)?;
        return Ok(text);
    }

    Err(PackageError::MissingManifest {
        path: path.display().to_string(),
    }
    .into())
}
