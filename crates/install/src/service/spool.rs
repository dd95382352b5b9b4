//! Filesystem spool implementation of the installer service
//!
//! Layout under the service root:
//!
//! ```text
//! next_id
//! sessions/<id>/session.json
//! sessions/<id>/payload
//! packages/<package_id>/record.json
//! packages/<package_id>/bundle
//! ```
//!
//! Session ids come from a counter file, so sessions outlive the process
//! that created them and show up again in `owned_sessions` after a restart.
//! Commit verification runs on a background task and reports through the
//! completion channel, never through the commit call itself.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use sideload_config::constants::SILENT_INSTALL_MIN_LEVEL;
use sideload_errors::{CommitError, Error, InstallError, SessionError};
use sideload_signing::TrustPolicy;
use sideload_types::{
    CompletionSignal, CompletionStatus, CorrelationKey, FailureCode, FollowUpAction,
    InstalledPackageRecord, PackageBundle, SessionId, SessionParams, UserActionRequirement,
};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::fs;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use uuid::Uuid;

use super::{CompletionSender, InstalledPackages, PackageService, SessionSink};
use crate::parser::{ArchiveParser, MetadataParser};

const SESSIONS_DIR: &str = "sessions";
const PACKAGES_DIR: &str = "packages";
const NEXT_ID_FILE: &str = "next_id";
const SESSION_FILE: &str = "session.json";
const PAYLOAD_FILE: &str = "payload";
const RECORD_FILE: &str = "record.json";
const BUNDLE_FILE: &str = "bundle";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum SpoolPhase {
    Open,
    Committed,
    AwaitingUser,
}

impl SpoolPhase {
    fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Committed => "committed",
            Self::AwaitingUser => "awaiting_user",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SpoolSession {
    id: SessionId,
    owner: String,
    params: SessionParams,
    phase: SpoolPhase,
    created_at: DateTime<Utc>,
}

#[derive(Debug)]
struct PendingConfirmation {
    key: CorrelationKey,
    bundle: PackageBundle,
}

/// Installer service that spools sessions and installed packages to disk
#[derive(Clone)]
pub struct SpoolService {
    inner: Arc<SpoolInner>,
}

struct SpoolInner {
    root: PathBuf,
    owner: String,
    platform_level: u32,
    completions: CompletionSender,
    confirmations: DashMap<SessionId, PendingConfirmation>,
    allocator: tokio::sync::Mutex<()>,
}

impl std::fmt::Debug for SpoolService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpoolService")
            .field("root", &self.inner.root)
            .field("owner", &self.inner.owner)
            .field("platform_level", &self.inner.platform_level)
            .finish_non_exhaustive()
    }
}

impl SpoolService {
    /// Service rooted at `root`, acting for `owner`, emulating `platform_level`
    #[must_use]
    pub fn new(
        root: impl Into<PathBuf>,
        owner: impl Into<String>,
        platform_level: u32,
        completions: CompletionSender,
    ) -> Self {
        Self {
            inner: Arc::new(SpoolInner {
                root: root.into(),
                owner: owner.into(),
                platform_level,
                completions,
                confirmations: DashMap::new(),
                allocator: tokio::sync::Mutex::new(()),
            }),
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.inner.root
    }

    /// Answer a pending user confirmation for `id`
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NotFound` if no confirmation is pending for the
    /// session.
    pub async fn confirm(&self, id: SessionId, accepted: bool) -> Result<(), Error> {
        let (_, pending) = self
            .inner
            .confirmations
            .remove(&id)
            .ok_or(SessionError::NotFound { session_id: id.0 })?;

        if accepted {
            tracing::info!(session = %id, package = %pending.bundle.package_id, "user confirmed install");
            self.inner.install_bundle(id, pending.key, pending.bundle).await;
        } else {
            tracing::info!(session = %id, "user declined install");
            let signal = CompletionSignal::failure(
                pending.key,
                Some(pending.bundle.package_id),
                FailureCode::Aborted,
                Some("installation declined by user".to_string()),
            );
            self.inner.finish(id, signal).await;
        }
        Ok(())
    }

    /// Every package recorded as installed
    ///
    /// # Errors
    ///
    /// Returns an error if the packages directory cannot be read.
    pub async fn installed_packages(&self) -> Result<Vec<InstalledPackageRecord>, Error> {
        let dir = self.inner.root.join(PACKAGES_DIR);
        let mut records = Vec::new();
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(records),
            Err(e) => return Err(Error::io_with_path(&e, &dir)),
        };

        while let Some(entry) = entries.next_entry().await? {
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if let Some(record) = self.inner.read_record(&name).await? {
                records.push(record);
            }
        }
        records.sort_by(|a, b| a.package_id.cmp(&b.package_id));
        Ok(records)
    }
}

impl SpoolInner {
    fn session_dir(&self, id: SessionId) -> PathBuf {
        self.root.join(SESSIONS_DIR).join(id.0.to_string())
    }

    fn package_dir(&self, package_id: &str) -> Option<PathBuf> {
        let valid = !package_id.is_empty()
            && package_id != "."
            && package_id != ".."
            && !package_id.contains(['/', '\\']);
        valid.then(|| self.root.join(PACKAGES_DIR).join(package_id))
    }

    async fn allocate_id(&self) -> Result<SessionId, Error> {
        let _guard = self.allocator.lock().await;
        let path = self.root.join(NEXT_ID_FILE);
        let next = match fs::read_to_string(&path).await {
            Ok(text) => text.trim().parse::<u64>().map_err(|e| SessionError::CreateRejected {
                message: format!("corrupt session counter {}: {e}", path.display()),
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => 1,
            Err(e) => return Err(reject(&e)),
        };
        fs::create_dir_all(&self.root)
            .await
            .map_err(|e| reject(&e))?;
        fs::write(&path, (next + 1).to_string())
            .await
            .map_err(|e| reject(&e))?;
        Ok(SessionId(next))
    }

    async fn read_session(&self, id: SessionId) -> Result<SpoolSession, Error> {
        let path = self.session_dir(id).join(SESSION_FILE);
        let text = fs::read_to_string(&path)
            .await
            .map_err(|_| SessionError::NotFound { session_id: id.0 })?;
        Ok(serde_json::from_str(&text)?)
    }

    async fn write_session(&self, session: &SpoolSession) -> Result<(), Error> {
        let path = self.session_dir(session.id).join(SESSION_FILE);
        let json = serde_json::to_vec_pretty(session)?;
        fs::write(&path, json)
            .await
            .map_err(|e| Error::io_with_path(&e, &path))
    }

    async fn read_record(&self, package_id: &str) -> Result<Option<InstalledPackageRecord>, Error> {
        let Some(dir) = self.package_dir(package_id) else {
            return Ok(None);
        };
        let path = dir.join(RECORD_FILE);
        match fs::read_to_string(&path).await {
            Ok(text) => Ok(Some(serde_json::from_str(&text)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::io_with_path(&e, &path)),
        }
    }

    fn deliver(&self, signal: CompletionSignal) {
        tracing::debug!(key = %signal.key, status = ?signal.status, "delivering completion");
        if self.completions.send(signal).is_err() {
            tracing::debug!("completion listener gone; signal dropped");
        }
    }

    /// Remove the session and deliver its terminal signal.
    ///
    /// Abandoned sessions no longer have a directory and deliver nothing.
    async fn finish(&self, id: SessionId, signal: CompletionSignal) {
        let dir = self.session_dir(id);
        if fs::metadata(&dir).await.is_err() {
            tracing::debug!(session = %id, "session abandoned before completion; signal suppressed");
            return;
        }
        if let Err(e) = fs::remove_dir_all(&dir).await {
            tracing::warn!(session = %id, error = %e, "failed to remove finished session");
        }
        self.deliver(signal);
    }

    async fn verify(self: Arc<Self>, id: SessionId, key: CorrelationKey, silent: bool) {
        let payload = self.session_dir(id).join(PAYLOAD_FILE);
        let bundle = match ArchiveParser.parse(&payload).await {
            Ok(bundle) => bundle,
            Err(e) => {
                let signal =
                    CompletionSignal::failure(key, None, FailureCode::Invalid, Some(e.to_string()));
                self.finish(id, signal).await;
                return;
            }
        };
        let package = Some(bundle.package_id.clone());

        if self.package_dir(&bundle.package_id).is_none() {
            let signal = CompletionSignal::failure(
                key,
                package,
                FailureCode::Invalid,
                Some(format!("unusable package id: {}", bundle.package_id)),
            );
            self.finish(id, signal).await;
            return;
        }

        match self.read_record(&bundle.package_id).await {
            Ok(Some(installed)) => {
                let verdict = sideload_signing::evaluate(
                    &bundle.signatures,
                    &installed.signatures,
                    TrustPolicy::Lenient,
                );
                if !verdict.is_trusted() {
                    let signal = CompletionSignal::failure(
                        key,
                        package,
                        FailureCode::Conflict,
                        Some("signatures do not match the installed package".to_string()),
                    );
                    self.finish(id, signal).await;
                    return;
                }
            }
            Ok(None) => {}
            Err(e) => {
                let signal =
                    CompletionSignal::failure(key, package, FailureCode::Storage, Some(e.to_string()));
                self.finish(id, signal).await;
                return;
            }
        }

        if bundle.min_platform > self.platform_level {
            let signal = CompletionSignal::failure(
                key,
                package,
                FailureCode::Incompatible,
                Some(format!(
                    "requires platform {}, service runs {}",
                    bundle.min_platform, self.platform_level
                )),
            );
            self.finish(id, signal).await;
            return;
        }

        if silent {
            self.install_bundle(id, key, bundle).await;
        } else {
            self.request_confirmation(id, key, bundle).await;
        }
    }

    async fn request_confirmation(&self, id: SessionId, key: CorrelationKey, bundle: PackageBundle) {
        if let Ok(mut session) = self.read_session(id).await {
            session.phase = SpoolPhase::AwaitingUser;
            if let Err(e) = self.write_session(&session).await {
                tracing::warn!(session = %id, error = %e, "failed to record confirmation phase");
            }
        } else {
            tracing::debug!(session = %id, "session abandoned before confirmation");
            return;
        }

        let action = FollowUpAction {
            session_id: Some(id),
            token: Uuid::new_v4().to_string(),
            prompt: format!("Install {} {}?", bundle.label, bundle.version),
        };
        let signal = CompletionSignal {
            key: key.clone(),
            package: Some(bundle.package_id.clone()),
            status: CompletionStatus::PendingUserAction { action },
        };
        self.confirmations
            .insert(id, PendingConfirmation { key, bundle });
        self.deliver(signal);
    }

    async fn install_bundle(&self, id: SessionId, key: CorrelationKey, bundle: PackageBundle) {
        let package = Some(bundle.package_id.clone());
        let signal = match self.store_bundle(id, &bundle).await {
            Ok(()) => {
                tracing::info!(session = %id, package = %bundle.package_id, version = %bundle.version, "package installed");
                CompletionSignal::success(key, package)
            }
            Err(e) => {
                CompletionSignal::failure(key, package, FailureCode::Storage, Some(e.to_string()))
            }
        };
        self.finish(id, signal).await;
    }

    async fn store_bundle(&self, id: SessionId, bundle: &PackageBundle) -> Result<(), Error> {
        let dir = self
            .package_dir(&bundle.package_id)
            .ok_or_else(|| Error::internal(format!("unusable package id: {}", bundle.package_id)))?;
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| Error::io_with_path(&e, &dir))?;

        let payload = self.session_dir(id).join(PAYLOAD_FILE);
        let target = dir.join(BUNDLE_FILE);
        fs::copy(&payload, &target)
            .await
            .map_err(|e| Error::io_with_path(&e, &target))?;

        let record = InstalledPackageRecord::from_bundle(bundle);
        let record_path = dir.join(RECORD_FILE);
        fs::write(&record_path, serde_json::to_vec_pretty(&record)?)
            .await
            .map_err(|e| Error::io_with_path(&e, &record_path))
    }
}

fn reject(err: &std::io::Error) -> Error {
    SessionError::CreateRejected {
        message: err.to_string(),
    }
    .into()
}

#[async_trait]
impl PackageService for SpoolService {
    async fn create_session(&self, params: &SessionParams) -> Result<SessionId, Error> {
        let inner = &self.inner;
        let id = inner.allocate_id().await?;
        let dir = inner.session_dir(id);
        fs::create_dir_all(inner.root.join(SESSIONS_DIR))
            .await
            .map_err(|e| reject(&e))?;
        // Fails on an id that is already in use instead of reusing its payload
        fs::create_dir(&dir).await.map_err(|e| reject(&e))?;
        fs::File::create(dir.join(PAYLOAD_FILE))
            .await
            .map_err(|e| reject(&e))?;

        let session = SpoolSession {
            id,
            owner: params.owner.clone(),
            params: params.clone(),
            phase: SpoolPhase::Open,
            created_at: Utc::now(),
        };
        inner.write_session(&session).await?;
        tracing::debug!(session = %id, owner = %session.owner, "created spool session");
        Ok(id)
    }

    async fn open_session(&self, id: SessionId) -> Result<Box<dyn SessionSink>, Error> {
        let session = self.inner.read_session(id).await?;
        if session.phase != SpoolPhase::Open {
            return Err(SessionError::InvalidTransition {
                from: session.phase.as_str().to_string(),
                to: "writing".to_string(),
            }
            .into());
        }

        let file = fs::OpenOptions::new()
            .append(true)
            .open(self.inner.session_dir(id).join(PAYLOAD_FILE))
            .await
            .map_err(|e| SessionError::OpenFailed {
                session_id: id.0,
                message: e.to_string(),
            })?;
        Ok(Box::new(SpoolSink { id, file }))
    }

    async fn commit(&self, id: SessionId, key: CorrelationKey) -> Result<(), Error> {
        let mut session = self.inner.read_session(id).await?;
        if session.phase != SpoolPhase::Open {
            return Err(SessionError::InvalidTransition {
                from: session.phase.as_str().to_string(),
                to: "committed".to_string(),
            }
            .into());
        }
        session.phase = SpoolPhase::Committed;
        self.inner
            .write_session(&session)
            .await
            .map_err(|e| CommitError::CommitFailed {
                session_id: id.0,
                message: e.to_string(),
            })?;

        let silent = session.params.user_action == UserActionRequirement::NotRequired
            && self.inner.platform_level >= SILENT_INSTALL_MIN_LEVEL;
        tokio::spawn(Arc::clone(&self.inner).verify(id, key, silent));
        Ok(())
    }

    async fn abandon(&self, id: SessionId) -> Result<(), Error> {
        let dir = self.inner.session_dir(id);
        if fs::metadata(&dir).await.is_err() {
            return Err(SessionError::NotFound { session_id: id.0 }.into());
        }
        self.inner.confirmations.remove(&id);
        fs::remove_dir_all(&dir)
            .await
            .map_err(|e| SessionError::AbandonFailed {
                session_id: id.0,
                message: e.to_string(),
            })?;
        tracing::debug!(session = %id, "abandoned spool session");
        Ok(())
    }

    async fn owned_sessions(&self) -> Result<Vec<SessionId>, Error> {
        let dir = self.inner.root.join(SESSIONS_DIR);
        let enumeration = |e: std::io::Error| -> Error {
            SessionError::EnumerationFailed {
                message: e.to_string(),
            }
            .into()
        };

        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(enumeration(e)),
        };

        let mut owned = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(enumeration)? {
            let Some(id) = entry
                .file_name()
                .to_str()
                .and_then(|name| name.parse::<u64>().ok())
                .map(SessionId)
            else {
                continue;
            };
            match self.inner.read_session(id).await {
                Ok(session) if session.owner == self.inner.owner => owned.push(id),
                Ok(_) => {}
                Err(e) => tracing::warn!(session = %id, error = %e, "skipping unreadable session"),
            }
        }
        owned.sort();
        Ok(owned)
    }

    async fn request_uninstall(&self, package_id: &str, key: CorrelationKey) -> Result<(), Error> {
        let dir = self
            .inner
            .package_dir(package_id)
            .ok_or_else(|| SessionError::UninstallRejected {
                message: format!("invalid package id: {package_id:?}"),
            })?;
        let package = Some(package_id.to_string());

        let signal = if fs::metadata(&dir).await.is_err() {
            CompletionSignal::failure(
                key,
                package,
                FailureCode::Invalid,
                Some(
                    InstallError::NotInstalled {
                        package: package_id.to_string(),
                    }
                    .to_string(),
                ),
            )
        } else {
            match fs::remove_dir_all(&dir).await {
                Ok(()) => {
                    tracing::info!(package = %package_id, "package removed");
                    CompletionSignal::success(key, package)
                }
                Err(e) => {
                    CompletionSignal::failure(key, package, FailureCode::Storage, Some(e.to_string()))
                }
            }
        };
        self.inner.deliver(signal);
        Ok(())
    }
}

#[async_trait]
impl InstalledPackages for SpoolService {
    async fn lookup(&self, package_id: &str) -> Result<Option<InstalledPackageRecord>, Error> {
        self.inner.read_record(package_id).await
    }
}

/// Payload writer handed out by [`SpoolService::open_session`]
struct SpoolSink {
    id: SessionId,
    file: fs::File,
}

impl AsyncWrite for SpoolSink {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        Pin::new(&mut self.file).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.file).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.file).poll_shutdown(cx)
    }
}

#[async_trait]
impl SessionSink for SpoolSink {
    async fn sync(&mut self) -> Result<(), Error> {
        let flushed = match self.file.flush().await {
            Ok(()) => self.file.sync_all().await,
            Err(e) => Err(e),
        };
        flushed.map_err(|e| {
            CommitError::FlushFailed {
                session_id: self.id.0,
                message: e.to_string(),
            }
            .into()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::completion_channel;
    use tempfile::TempDir;

    fn params(owner: &str) -> SessionParams {
        SessionParams::full_install(owner)
    }

    #[tokio::test]
    async fn test_session_ids_survive_restart() {
        let temp = TempDir::new().unwrap();
        let (tx, _rx) = completion_channel();

        let first = SpoolService::new(temp.path(), "sideload", 34, tx.clone());
        let a = first.create_session(&params("sideload")).await.unwrap();
        drop(first);

        let second = SpoolService::new(temp.path(), "sideload", 34, tx);
        let b = second.create_session(&params("sideload")).await.unwrap();
        assert!(b > a);
        assert_eq!(second.owned_sessions().await.unwrap(), vec![a, b]);
    }

    #[tokio::test]
    async fn test_corrupt_counter_rejects_session() {
        let temp = TempDir::new().unwrap();
        let (tx, _rx) = completion_channel();
        let service = SpoolService::new(temp.path(), "sideload", 34, tx);

        let first = service.create_session(&params("sideload")).await.unwrap();
        std::fs::write(temp.path().join(NEXT_ID_FILE), "garbage").unwrap();

        assert!(matches!(
            service.create_session(&params("sideload")).await,
            Err(Error::Session(SessionError::CreateRejected { .. }))
        ));
        assert_eq!(service.owned_sessions().await.unwrap(), vec![first]);
    }

    #[tokio::test]
    async fn test_reused_counter_does_not_clobber_live_session() {
        let temp = TempDir::new().unwrap();
        let (tx, _rx) = completion_channel();
        let service = SpoolService::new(temp.path(), "sideload", 34, tx);

        let id = service.create_session(&params("sideload")).await.unwrap();
        let mut sink = service.open_session(id).await.unwrap();
        sink.write_all(b"payload").await.unwrap();
        sink.sync().await.unwrap();
        drop(sink);

        std::fs::write(temp.path().join(NEXT_ID_FILE), id.0.to_string()).unwrap();
        assert!(service.create_session(&params("sideload")).await.is_err());

        let payload = temp
            .path()
            .join(SESSIONS_DIR)
            .join(id.0.to_string())
            .join(PAYLOAD_FILE);
        assert_eq!(std::fs::read(payload).unwrap(), b"payload");
    }

    #[tokio::test]
    async fn test_owned_sessions_filters_by_owner() {
        let temp = TempDir::new().unwrap();
        let (tx, _rx) = completion_channel();
        let service = SpoolService::new(temp.path(), "sideload", 34, tx);

        let mine = service.create_session(&params("sideload")).await.unwrap();
        service.create_session(&params("someone-else")).await.unwrap();
        assert_eq!(service.owned_sessions().await.unwrap(), vec![mine]);
    }

    #[tokio::test]
    async fn test_abandon_then_write_is_not_found() {
        let temp = TempDir::new().unwrap();
        let (tx, _rx) = completion_channel();
        let service = SpoolService::new(temp.path(), "sideload", 34, tx);

        let id = service.create_session(&params("sideload")).await.unwrap();
        service.abandon(id).await.unwrap();

        assert!(matches!(
            service.open_session(id).await,
            Err(Error::Session(SessionError::NotFound { .. }))
        ));
        assert!(matches!(
            service.abandon(id).await,
            Err(Error::Session(SessionError::NotFound { .. }))
        ));
    }

    #[tokio::test]
    async fn test_commit_of_garbage_payload_is_invalid() {
        let temp = TempDir::new().unwrap();
        let (tx, mut rx) = completion_channel();
        let service = SpoolService::new(temp.path(), "sideload", 34, tx);

        let id = service.create_session(&params("sideload")).await.unwrap();
        let mut sink = service.open_session(id).await.unwrap();
        sink.write_all(b"not an archive").await.unwrap();
        sink.sync().await.unwrap();
        drop(sink);

        service
            .commit(id, CorrelationKey::Session(id))
            .await
            .unwrap();
        let signal = rx.recv().await.unwrap();
        assert_eq!(signal.key, CorrelationKey::Session(id));
        assert!(matches!(
            signal.status,
            CompletionStatus::Failure {
                code: FailureCode::Invalid,
                ..
            }
        ));
        assert!(service.owned_sessions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_uninstall_missing_package_is_invalid() {
        let temp = TempDir::new().unwrap();
        let (tx, mut rx) = completion_channel();
        let service = SpoolService::new(temp.path(), "sideload", 34, tx);

        let key = CorrelationKey::Uninstall("com.absent".to_string());
        service.request_uninstall("com.absent", key.clone()).await.unwrap();
        let signal = rx.recv().await.unwrap();
        assert_eq!(signal.key, key);
        assert!(matches!(
            signal.status,
            CompletionStatus::Failure {
                code: FailureCode::Invalid,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_uninstall_rejects_path_like_ids() {
        let temp = TempDir::new().unwrap();
        let (tx, _rx) = completion_channel();
        let service = SpoolService::new(temp.path(), "sideload", 34, tx);
        let result = service
            .request_uninstall("../etc", CorrelationKey::Uninstall("../etc".into()))
            .await;
        assert!(matches!(
            result,
            Err(Error::Session(SessionError::UninstallRejected { .. }))
        ));
    }

    #[tokio::test]
    async fn test_confirm_without_pending_is_not_found() {
        let temp = TempDir::new().unwrap();
        let (tx, _rx) = completion_channel();
        let service = SpoolService::new(temp.path(), "sideload", 34, tx);
        assert!(service.confirm(SessionId(9), true).await.is_err());
    }
}
