//! Shared fixtures for install integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use base64::Engine;
use sideload_errors::{Error, SessionError};
use sideload_install::{
    completion_channel, BundleManifest, CompletionReceiver, CompletionSender, InstallCoordinator,
    InstalledPackages, PackageService, SessionSink, MANIFEST_ENTRY,
};
use sideload_types::{
    CompletionSignal, CorrelationKey, FailureCode, InstalledPackageRecord, SessionId,
    SessionParams, SigningIdentity, VersionInfo,
};
use std::collections::{BTreeMap, HashMap};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::AsyncWrite;
use tokio::sync::Notify;

type SessionTable = Arc<Mutex<BTreeMap<SessionId, Vec<u8>>>>;

/// How the scripted installer answers a commit
#[derive(Debug, Clone)]
pub enum CommitScript {
    Succeed,
    Fail(FailureCode),
    /// Accept the commit and never report back
    Silent,
}

/// In-memory installer service driven by the test
pub struct ScriptedService {
    completions: CompletionSender,
    next_id: AtomicU64,
    created: AtomicUsize,
    sessions: SessionTable,
    pub abandoned: Mutex<Vec<SessionId>>,
    pub installed: Mutex<HashMap<String, InstalledPackageRecord>>,
    commit_script: Mutex<CommitScript>,
    pub uninstall_failure: Mutex<Option<FailureCode>>,
    pub stall_writes: AtomicBool,
    pub opened: Notify,
}

impl ScriptedService {
    pub fn new() -> (Arc<Self>, CompletionReceiver) {
        let (tx, rx) = completion_channel();
        let service = Arc::new(Self {
            completions: tx,
            next_id: AtomicU64::new(1),
            created: AtomicUsize::new(0),
            sessions: Arc::new(Mutex::new(BTreeMap::new())),
            abandoned: Mutex::new(Vec::new()),
            installed: Mutex::new(HashMap::new()),
            commit_script: Mutex::new(CommitScript::Succeed),
            uninstall_failure: Mutex::new(None),
            stall_writes: AtomicBool::new(false),
            opened: Notify::new(),
        });
        (service, rx)
    }

    pub fn script_commit(&self, script: CommitScript) {
        *self.commit_script.lock().unwrap() = script;
    }

    pub fn install_record(&self, package_id: &str, version_code: u64, signers: &[&str]) {
        let record = InstalledPackageRecord {
            package_id: package_id.to_string(),
            version: VersionInfo::new(version_code, format!("{version_code}.0")),
            signatures: signers.iter().map(|s| identity(s)).collect(),
        };
        self.installed
            .lock()
            .unwrap()
            .insert(package_id.to_string(), record);
    }

    /// Leave a session behind as if a previous run had crashed
    pub fn leave_session(&self) -> SessionId {
        let id = SessionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.sessions.lock().unwrap().insert(id, Vec::new());
        id
    }

    pub fn live_sessions(&self) -> Vec<SessionId> {
        self.sessions.lock().unwrap().keys().copied().collect()
    }

    pub fn created_count(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn installed_version(&self, package_id: &str) -> Option<u64> {
        self.installed
            .lock()
            .unwrap()
            .get(package_id)
            .map(|record| record.version.code)
    }

    fn send(&self, signal: CompletionSignal) {
        let _ = self.completions.send(signal);
    }
}

#[async_trait]
impl PackageService for ScriptedService {
    async fn create_session(&self, _params: &SessionParams) -> Result<SessionId, Error> {
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(self.leave_session())
    }

    async fn open_session(&self, id: SessionId) -> Result<Box<dyn SessionSink>, Error> {
        if !self.sessions.lock().unwrap().contains_key(&id) {
            return Err(SessionError::NotFound { session_id: id.0 }.into());
        }
        self.opened.notify_one();
        Ok(Box::new(MemorySink {
            id,
            stalled: self.stall_writes.load(Ordering::SeqCst),
            sessions: Arc::clone(&self.sessions),
        }))
    }

    async fn commit(&self, id: SessionId, key: CorrelationKey) -> Result<(), Error> {
        let payload = self
            .sessions
            .lock()
            .unwrap()
            .remove(&id)
            .ok_or(SessionError::NotFound { session_id: id.0 })?;
        let script = self.commit_script.lock().unwrap().clone();
        match script {
            CommitScript::Succeed => {
                if let Some(manifest) = manifest_from_payload(&payload) {
                    let record = InstalledPackageRecord {
                        package_id: manifest.package.id.clone(),
                        version: VersionInfo::new(manifest.package.version_code, "installed"),
                        signatures: manifest.signing_identities().unwrap_or_default(),
                    };
                    self.installed
                        .lock()
                        .unwrap()
                        .insert(manifest.package.id.clone(), record);
                }
                self.send(CompletionSignal::success(key, None));
            }
            CommitScript::Fail(code) => {
                self.send(CompletionSignal::failure(key, None, code, None));
            }
            CommitScript::Silent => {}
        }
        Ok(())
    }

    async fn abandon(&self, id: SessionId) -> Result<(), Error> {
        self.sessions.lock().unwrap().remove(&id);
        self.abandoned.lock().unwrap().push(id);
        Ok(())
    }

    async fn owned_sessions(&self) -> Result<Vec<SessionId>, Error> {
        Ok(self.live_sessions())
    }

    async fn request_uninstall(&self, package_id: &str, key: CorrelationKey) -> Result<(), Error> {
        let failure = *self.uninstall_failure.lock().unwrap();
        match failure {
            Some(code) => self.send(CompletionSignal::failure(
                key,
                Some(package_id.to_string()),
                code,
                Some("removal refused".to_string()),
            )),
            None => {
                self.installed.lock().unwrap().remove(package_id);
                self.send(CompletionSignal::success(key, Some(package_id.to_string())));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl InstalledPackages for ScriptedService {
    async fn lookup(&self, package_id: &str) -> Result<Option<InstalledPackageRecord>, Error> {
        Ok(self.installed.lock().unwrap().get(package_id).cloned())
    }
}

/// Appends straight into the session table; a stalled sink never accepts bytes
struct MemorySink {
    id: SessionId,
    stalled: bool,
    sessions: SessionTable,
}

impl AsyncWrite for MemorySink {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        if self.stalled {
            return Poll::Pending;
        }
        match self.sessions.lock().unwrap().get_mut(&self.id) {
            Some(payload) => {
                payload.extend_from_slice(buf);
                Poll::Ready(Ok(buf.len()))
            }
            None => Poll::Ready(Err(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "session abandoned",
            ))),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

#[async_trait]
impl SessionSink for MemorySink {
    async fn sync(&mut self) -> Result<(), Error> {
        Ok(())
    }
}

/// Base64 certificate whose fingerprint is `identity(name)`
pub fn cert(name: &str) -> String {
    base64::engine::general_purpose::STANDARD.encode(name.as_bytes())
}

pub fn identity(name: &str) -> SigningIdentity {
    sideload_signing::fingerprint(name.as_bytes())
}

pub fn manifest(package_id: &str, version_code: u64, signers: &[&str]) -> BundleManifest {
    let mut manifest = BundleManifest::new(package_id, version_code);
    manifest.package.version_name = Some(format!("{version_code}.0"));
    manifest.signing.certificates = signers.iter().map(|s| cert(s)).collect();
    manifest
}

/// Write a tar bundle with `manifest` and a small payload into `dir`
pub fn write_bundle(dir: &Path, manifest: &BundleManifest) -> PathBuf {
    let path = dir.join(format!(
        "{}-{}.bundle",
        manifest.package.id, manifest.package.version_code
    ));
    let file = std::fs::File::create(&path).unwrap();
    let mut builder = tar::Builder::new(file);

    let text = manifest.to_toml().unwrap();
    append(&mut builder, MANIFEST_ENTRY, text.as_bytes());
    append(&mut builder, "payload/app.bin", &[7u8; 4096]);
    builder.into_inner().unwrap().sync_all().unwrap();
    path
}

fn append(builder: &mut tar::Builder<std::fs::File>, name: &str, data: &[u8]) {
    let mut header = tar::Header::new_gnu();
    header.set_size(data.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder.append_data(&mut header, name, data).unwrap();
}

fn manifest_from_payload(payload: &[u8]) -> Option<BundleManifest> {
    let mut archive = tar::Archive::new(payload);
    for entry in archive.entries().ok()? {
        let mut entry = entry.ok()?;
        let is_manifest = *entry.path().ok()? == *Path::new(MANIFEST_ENTRY);
        if is_manifest {
            let mut text = String::new();
            entry.read_to_string(&mut text).ok()?;
            return BundleManifest::from_toml(&text).ok();
        }
    }
    None
}

/// Coordinator over `service` staging into `staging`
pub async fn coordinator(
    service: &Arc<ScriptedService>,
    completions: CompletionReceiver,
    staging: &Path,
) -> InstallCoordinator {
    InstallCoordinator::builder()
        .with_service(Arc::clone(service) as Arc<dyn PackageService>)
        .with_installed(Arc::clone(service) as Arc<dyn InstalledPackages>)
        .with_completions(completions)
        .with_staging_dir(staging)
        .with_completion_timeout(Some(Duration::from_secs(10)))
        .build()
        .await
        .unwrap()
}

pub fn dir_is_empty(dir: &Path) -> bool {
    std::fs::read_dir(dir).unwrap().next().is_none()
}
