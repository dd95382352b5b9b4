//! Install coordinator
//!
//! Orchestrates stage, parse, trust check, session install and completion
//! wait for one operation at a time, and publishes what it is doing on a
//! watch channel. Failures delivered by the installer service end up in that
//! state, never as an `Err`.

use sideload_config::{Config, PlatformCapabilities};
use sideload_errors::{Error, InstallError};
use sideload_events::{EventEmitter, EventSender, FailureContext, LifecycleEvent};
use sideload_signing::TrustPolicy;
use sideload_types::{
    CompletionSignal, CorrelationKey, FailureReason, InstallPreview, InstallState,
    OperationOutcome, PackageBundle,
};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::cancel::CancelSignal;
use crate::correlator::{CompletionCorrelator, Resolution};
use crate::parser::{ArchiveParser, MetadataParser};
use crate::service::{CompletionReceiver, InstalledPackages, PackageService};
use crate::session::SessionInstaller;
use crate::stager::BundleStager;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Bookkeeping for the single in-flight operation
#[derive(Debug)]
struct ActiveOperation {
    generation: u64,
    cancel: CancelSignal,
    key: Option<CorrelationKey>,
    staged: Option<PathBuf>,
    package: Option<String>,
}

#[derive(Debug, Default)]
struct OperationSlot {
    /// Bumped by every new operation and by `reset`
    generation: u64,
    active: Option<ActiveOperation>,
}

/// Single entry point for the presentation layer
#[derive(Clone)]
pub struct InstallCoordinator {
    inner: Arc<Inner>,
}

struct Inner {
    stager: BundleStager,
    parser: Arc<dyn MetadataParser>,
    installed: Arc<dyn InstalledPackages>,
    installer: SessionInstaller,
    correlator: Arc<CompletionCorrelator>,
    policy: TrustPolicy,
    completion_timeout: Option<Duration>,
    state: watch::Sender<InstallState>,
    slot: Mutex<OperationSlot>,
    preview: Mutex<Option<InstallPreview>>,
    setup_errors: mpsc::UnboundedSender<Error>,
    setup_errors_rx: Mutex<Option<mpsc::UnboundedReceiver<Error>>>,
    listener: Option<JoinHandle<()>>,
    event_sender: Option<EventSender>,
}

impl EventEmitter for Inner {
    fn event_sender(&self) -> Option<&EventSender> {
        self.event_sender.as_ref()
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
    }
}

impl std::fmt::Debug for InstallCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstallCoordinator")
            .field("state", &*self.inner.state.borrow())
            .field("policy", &self.inner.policy)
            .field("completion_timeout", &self.inner.completion_timeout)
            .finish_non_exhaustive()
    }
}

/// Claim on the operation slot; releases it on drop
struct OperationTicket<'a> {
    inner: &'a Inner,
    generation: u64,
    cancel: CancelSignal,
}

impl OperationTicket<'_> {
    fn ensure_active(&self) -> Result<(), Error> {
        if self.cancel.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

impl Drop for OperationTicket<'_> {
    fn drop(&mut self) {
        let mut slot = lock(&self.inner.slot);
        let ours = slot
            .active
            .as_ref()
            .is_some_and(|op| op.generation == self.generation);
        if ours {
            if let Some(key) = slot.active.take().and_then(|op| op.key) {
                self.inner.correlator.deregister(&key);
            }
        }
    }
}

impl InstallCoordinator {
    #[must_use]
    pub fn builder() -> InstallCoordinatorBuilder {
        InstallCoordinatorBuilder::new()
    }

    /// Current observable state
    #[must_use]
    pub fn state(&self) -> InstallState {
        self.inner.state.borrow().clone()
    }

    /// Stream of state changes
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<InstallState> {
        self.inner.state.subscribe()
    }

    /// Receiver of unrecoverable setup failures; handed out once
    #[must_use]
    pub fn take_setup_errors(&self) -> Option<mpsc::UnboundedReceiver<Error>> {
        lock(&self.inner.setup_errors_rx).take()
    }

    /// Bundle retained by the last `inspect` or `install`.
    ///
    /// Its `path` is the caller's source file, not the staged copy.
    #[must_use]
    pub fn current_bundle(&self) -> Option<Arc<PackageBundle>> {
        lock(&self.inner.preview)
            .as_ref()
            .map(|preview| Arc::clone(&preview.bundle))
    }

    #[must_use]
    pub fn current_preview(&self) -> Option<InstallPreview> {
        lock(&self.inner.preview).clone()
    }

    #[must_use]
    pub fn correlator(&self) -> &Arc<CompletionCorrelator> {
        &self.inner.correlator
    }

    #[must_use]
    pub fn installer(&self) -> &SessionInstaller {
        &self.inner.installer
    }

    #[must_use]
    pub fn staging_dir(&self) -> &Path {
        self.inner.stager.dir()
    }

    /// Read a bundle's metadata without staging it
    ///
    /// # Errors
    ///
    /// Returns a `PackageError` if the bundle cannot be parsed.
    pub async fn parse_metadata(&self, path: &Path) -> Result<PackageBundle, Error> {
        self.inner.parser.parse(path).await
    }

    /// Stage and parse a bundle and evaluate trust, without creating a session
    ///
    /// # Errors
    ///
    /// Returns `InstallError::Busy` while another operation runs, and any
    /// staging, parsing or lookup error.
    pub async fn inspect(&self, source: &Path) -> Result<InstallPreview, Error> {
        let inner = &*self.inner;
        let _ticket = inner.begin()?;

        let staged = inner.stager.stage(source).await?;
        let bundle = Arc::new(inner.parse_staged(staged.path(), source).await?);
        let preview = inner.preview_for(bundle).await?;
        *lock(&inner.preview) = Some(preview.clone());
        Ok(preview)
    }

    /// Install the bundle at `source`.
    ///
    /// Returns the operation's outcome once the installer service resolves
    /// it; failures of the operation are `Ok(Failed(..))` and are also
    /// published as state.
    ///
    /// # Errors
    ///
    /// Returns `InstallError::Busy` without touching state if another
    /// operation is in flight, including a session a reset left behind that
    /// is still being written.
    pub async fn install(&self, source: &Path) -> Result<OperationOutcome, Error> {
        let inner = &*self.inner;
        let prior = self.state();
        let ticket = inner.begin()?;
        if inner.installer.is_busy().await {
            return Err(InstallError::Busy.into());
        }
        inner.emit_operation_started("install");

        let outcome = match inner.run_install(&ticket, source).await {
            Ok(outcome) => outcome,
            Err(e) if e.is_busy() => {
                inner.publish(ticket.generation, prior);
                return Err(e);
            }
            Err(e) => inner.outcome_for_error(&e),
        };

        let state = match &outcome {
            OperationOutcome::Succeeded => InstallState::Succeeded,
            OperationOutcome::Failed(reason) => InstallState::failed(reason.clone()),
            OperationOutcome::Cancelled => InstallState::Cancelled,
            OperationOutcome::Pending | OperationOutcome::InProgress => InstallState::Idle,
        };
        inner.publish(ticket.generation, state);
        inner.emit_operation_completed("install", outcome.is_success());
        Ok(outcome)
    }

    /// Ask the installer service to remove `package_id`
    ///
    /// # Errors
    ///
    /// Returns `InstallError::Busy` if another operation is in flight.
    pub async fn uninstall(&self, package_id: &str) -> Result<OperationOutcome, Error> {
        let inner = &*self.inner;
        let ticket = inner.begin()?;
        inner.emit_operation_started("uninstall");

        let outcome = match inner.run_uninstall(&ticket, package_id).await {
            Ok(outcome) => outcome,
            Err(e) => inner.outcome_for_error(&e),
        };

        let state = match &outcome {
            OperationOutcome::Succeeded => InstallState::Uninstalled,
            OperationOutcome::Failed(reason) => InstallState::failed(reason.clone()),
            OperationOutcome::Cancelled => InstallState::Cancelled,
            OperationOutcome::Pending | OperationOutcome::InProgress => InstallState::Idle,
        };
        inner.publish(ticket.generation, state);
        inner.emit_operation_completed("uninstall", outcome.is_success());
        Ok(outcome)
    }

    /// Cancel the in-flight operation.
    ///
    /// Abandons an uncommitted session, drops the pending correlation and
    /// deletes the staged file before returning. After commit the installer
    /// may still finish; the late completion is ignored.
    ///
    /// # Errors
    ///
    /// Returns `InstallError::NoActiveOperation` when idle, or the service's
    /// error if the session could not be abandoned.
    pub async fn cancel(&self) -> Result<(), Error> {
        let inner = &*self.inner;
        let (generation, cancel, key, staged, package) = {
            let slot = lock(&inner.slot);
            let op = slot
                .active
                .as_ref()
                .ok_or(InstallError::NoActiveOperation)?;
            (
                op.generation,
                op.cancel.clone(),
                op.key.clone(),
                op.staged.clone(),
                op.package.clone(),
            )
        };

        cancel.cancel();
        let abandoned = inner.installer.cancel().await;

        if let Some(key) = &key {
            inner.correlator.deregister(key);
        }
        if let Some(path) = &staged {
            match tokio::fs::remove_file(path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "failed to remove staged bundle");
                }
            }
        }

        inner.publish(generation, InstallState::Cancelled);
        inner.emit_lifecycle(LifecycleEvent::OperationCancelled {
            package,
            correlation_key: key.map(|k| k.to_string()),
        });
        tracing::info!("operation cancelled");
        abandoned.map(|_| ())
    }

    /// Return to idle and drop retained bundle references.
    ///
    /// Does not abandon the live session; a pre-reset operation keeps running
    /// but can no longer publish state. A session it already committed is
    /// released from the installer so the next install is not blocked by it.
    /// Stale sessions other than the live one are abandoned. Returns how
    /// many were.
    ///
    /// # Errors
    ///
    /// Returns an error if the installer service cannot enumerate sessions.
    pub async fn reset(&self) -> Result<usize, Error> {
        let inner = &*self.inner;
        {
            let mut slot = lock(&inner.slot);
            slot.generation += 1;
            slot.active = None;
            inner.state.send_replace(InstallState::Idle);
        }
        *lock(&inner.preview) = None;
        inner.installer.reset().await
    }

    /// Deliver a completion signal received out of band
    pub fn deliver(&self, signal: CompletionSignal) -> Resolution {
        self.inner.correlator.deliver(signal)
    }

    /// Deliver a JSON-encoded completion signal
    ///
    /// # Errors
    ///
    /// Returns an error if the payload is not a valid completion signal.
    pub fn deliver_json(&self, payload: &str) -> Result<Resolution, Error> {
        self.inner.correlator.deliver_json(payload)
    }
}

impl Inner {
    fn begin(&self) -> Result<OperationTicket<'_>, Error> {
        let mut slot = lock(&self.slot);
        if slot.active.is_some() {
            return Err(InstallError::Busy.into());
        }
        slot.generation += 1;
        let cancel = CancelSignal::new();
        slot.active = Some(ActiveOperation {
            generation: slot.generation,
            cancel: cancel.clone(),
            key: None,
            staged: None,
            package: None,
        });
        Ok(OperationTicket {
            inner: self,
            generation: slot.generation,
            cancel,
        })
    }

    /// Publish `state` unless a newer operation or a reset superseded `generation`
    fn publish(&self, generation: u64, state: InstallState) {
        let slot = lock(&self.slot);
        if slot.generation == generation {
            tracing::debug!(%state, "install state");
            self.state.send_replace(state);
        } else {
            tracing::debug!(%state, "dropping state from superseded operation");
        }
    }

    fn track(&self, generation: u64, update: impl FnOnce(&mut ActiveOperation)) {
        let mut slot = lock(&self.slot);
        if let Some(op) = slot.active.as_mut().filter(|op| op.generation == generation) {
            update(op);
        }
    }

    /// Parse the staged copy but record the caller's path in the bundle
    async fn parse_staged(&self, staged: &Path, source: &Path) -> Result<PackageBundle, Error> {
        let mut bundle = self.parser.parse(staged).await?;
        bundle.path = source.to_path_buf();
        Ok(bundle)
    }

    fn report_setup_error(&self, error: &Error) {
        let _ = self.setup_errors.send(error.clone());
    }

    fn outcome_for_error(&self, error: &Error) -> OperationOutcome {
        if error.is_cancelled() {
            OperationOutcome::Cancelled
        } else {
            tracing::warn!(error = %error, "operation failed");
            self.emit_operation_failed("operation", error.to_string());
            OperationOutcome::Failed(FailureReason::from(error))
        }
    }

    async fn preview_for(&self, bundle: Arc<PackageBundle>) -> Result<InstallPreview, Error> {
        let installed = self.installed.lookup(&bundle.package_id).await?;
        let trust = sideload_signing::evaluate_update(&bundle, installed.as_ref(), self.policy);
        self.emit_lifecycle(LifecycleEvent::TrustEvaluated {
            package: bundle.package_id.clone(),
            installed_version: installed.as_ref().map(|record| record.version.code),
            verdict: trust,
        });
        Ok(InstallPreview {
            bundle,
            installed,
            trust,
        })
    }

    async fn run_install(
        &self,
        ticket: &OperationTicket<'_>,
        source: &Path,
    ) -> Result<OperationOutcome, Error> {
        let generation = ticket.generation;

        self.publish(generation, InstallState::Staging);
        let staged = self.stager.stage(source).await.inspect_err(|e| {
            self.report_setup_error(e);
        })?;
        let staged_path = staged.path().to_path_buf();
        self.track(generation, |op| op.staged = Some(staged_path.clone()));
        ticket.ensure_active()?;

        self.publish(generation, InstallState::Parsing);
        self.emit_lifecycle(LifecycleEvent::ParsingStarted {
            path: staged_path.clone(),
        });
        let bundle = match self.parse_staged(&staged_path, source).await {
            Ok(bundle) => Arc::new(bundle),
            Err(e) => {
                self.emit_lifecycle(LifecycleEvent::ParsingFailed {
                    failure: FailureContext::from_error(&e),
                });
                self.report_setup_error(&e);
                return Err(e);
            }
        };
        self.emit_lifecycle(LifecycleEvent::ParsingCompleted {
            package: bundle.package_id.clone(),
            version_code: bundle.version.code,
            version_name: bundle.version.name.clone(),
        });
        self.track(generation, |op| op.package = Some(bundle.package_id.clone()));

        let preview = self.preview_for(Arc::clone(&bundle)).await?;
        let trusted = preview.trust.is_trusted();
        *lock(&self.preview) = Some(preview);
        if !trusted {
            tracing::warn!(package = %bundle.package_id, "update signed by a different identity; refusing");
            return Err(InstallError::SignatureMismatch {
                package: bundle.package_id.clone(),
            }
            .into());
        }
        ticket.ensure_active()?;

        self.publish(generation, InstallState::Installing);
        self.emit_lifecycle(LifecycleEvent::InstallationStarted {
            package: bundle.package_id.clone(),
            version_code: bundle.version.code,
        });

        let (session_id, receiver) = self
            .installer
            .install(&bundle, &staged_path, &ticket.cancel, |key| {
                let receiver = self.correlator.register(key.clone())?;
                self.track(generation, |op| op.key = Some(key.clone()));
                Ok(receiver)
            })
            .await?;

        // The service holds its own copy once the session is committed
        drop(staged);

        let outcome = self
            .correlator
            .wait(receiver, self.completion_timeout)
            .await;
        self.installer
            .complete(session_id, outcome.is_success())
            .await;

        match &outcome {
            OperationOutcome::Succeeded => {
                tracing::info!(package = %bundle.package_id, version = %bundle.version, "install succeeded");
                self.emit_lifecycle(LifecycleEvent::InstallationCompleted {
                    package: bundle.package_id.clone(),
                    version_code: bundle.version.code,
                });
            }
            OperationOutcome::Failed(reason) => {
                self.emit_lifecycle(LifecycleEvent::InstallationFailed {
                    package: bundle.package_id.clone(),
                    reason: reason.to_string(),
                });
            }
            _ => {}
        }
        Ok(outcome)
    }

    async fn run_uninstall(
        &self,
        ticket: &OperationTicket<'_>,
        package_id: &str,
    ) -> Result<OperationOutcome, Error> {
        let generation = ticket.generation;
        self.publish(generation, InstallState::Uninstalling);
        self.emit_lifecycle(LifecycleEvent::RemovalStarted {
            package: package_id.to_string(),
        });

        let key = CorrelationKey::Uninstall(package_id.to_string());
        let receiver = self.correlator.register(key.clone())?;
        self.track(generation, |op| {
            op.key = Some(key.clone());
            op.package = Some(package_id.to_string());
        });
        ticket.ensure_active()?;

        self.installer.uninstall(package_id, key).await?;
        let outcome = self
            .correlator
            .wait(receiver, self.completion_timeout)
            .await;

        match &outcome {
            OperationOutcome::Succeeded => {
                tracing::info!(package = %package_id, "uninstall succeeded");
                self.emit_lifecycle(LifecycleEvent::RemovalCompleted {
                    package: package_id.to_string(),
                });
            }
            OperationOutcome::Failed(reason) => {
                self.emit_lifecycle(LifecycleEvent::RemovalFailed {
                    package: package_id.to_string(),
                    reason: reason.to_string(),
                });
            }
            _ => {}
        }
        Ok(outcome)
    }
}

/// Builder for [`InstallCoordinator`]
pub struct InstallCoordinatorBuilder {
    service: Option<Arc<dyn PackageService>>,
    installed: Option<Arc<dyn InstalledPackages>>,
    parser: Arc<dyn MetadataParser>,
    completions: Option<CompletionReceiver>,
    staging_dir: Option<PathBuf>,
    max_bundle_size: u64,
    capabilities: PlatformCapabilities,
    owner: String,
    request_update_ownership: bool,
    policy: TrustPolicy,
    completion_timeout: Option<Duration>,
    cleanup_on_build: bool,
    event_sender: Option<EventSender>,
}

impl Default for InstallCoordinatorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl InstallCoordinatorBuilder {
    #[must_use]
    pub fn new() -> Self {
        let defaults = Config::default();
        Self {
            service: None,
            installed: None,
            parser: Arc::new(ArchiveParser),
            completions: None,
            staging_dir: None,
            max_bundle_size: defaults.install.max_bundle_size,
            capabilities: defaults.capabilities(),
            owner: defaults.install.installer_label.clone(),
            request_update_ownership: defaults.install.request_update_ownership,
            policy: defaults.security.empty_signature_policy,
            completion_timeout: defaults.completion_timeout(),
            cleanup_on_build: true,
            event_sender: None,
        }
    }

    /// Take paths, limits, capabilities and policy from `config`
    #[must_use]
    pub fn with_config(mut self, config: &Config) -> Self {
        self.staging_dir = Some(config.staging_path());
        self.max_bundle_size = config.install.max_bundle_size;
        self.capabilities = config.capabilities();
        self.owner.clone_from(&config.install.installer_label);
        self.request_update_ownership = config.install.request_update_ownership;
        self.policy = config.security.empty_signature_policy;
        self.completion_timeout = config.completion_timeout();
        self
    }

    #[must_use]
    pub fn with_service(mut self, service: Arc<dyn PackageService>) -> Self {
        self.service = Some(service);
        self
    }

    #[must_use]
    pub fn with_installed(mut self, installed: Arc<dyn InstalledPackages>) -> Self {
        self.installed = Some(installed);
        self
    }

    #[must_use]
    pub fn with_parser(mut self, parser: Arc<dyn MetadataParser>) -> Self {
        self.parser = parser;
        self
    }

    /// Channel the installer service delivers completion signals into
    #[must_use]
    pub fn with_completions(mut self, completions: CompletionReceiver) -> Self {
        self.completions = Some(completions);
        self
    }

    #[must_use]
    pub fn with_staging_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.staging_dir = Some(dir.into());
        self
    }

    #[must_use]
    pub fn with_capabilities(mut self, capabilities: PlatformCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    #[must_use]
    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = owner.into();
        self
    }

    #[must_use]
    pub fn with_trust_policy(mut self, policy: TrustPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// `None` waits for completion until cancel or reset
    #[must_use]
    pub fn with_completion_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.completion_timeout = timeout;
        self
    }

    /// Skip abandoning stale sessions in [`build`](Self::build)
    #[must_use]
    pub fn keep_stale_sessions(mut self) -> Self {
        self.cleanup_on_build = false;
        self
    }

    #[must_use]
    pub fn with_event_sender(mut self, tx: EventSender) -> Self {
        self.event_sender = Some(tx);
        self
    }

    /// Build the coordinator, prepare staging and abandon stale sessions
    ///
    /// # Errors
    ///
    /// Returns `InstallError::MissingComponent` if the service, installed
    /// lookup or staging directory was not supplied, and staging errors if
    /// the staging directory cannot be prepared.
    pub async fn build(self) -> Result<InstallCoordinator, Error> {
        let service = self.service.ok_or_else(|| InstallError::MissingComponent {
            component: "service".to_string(),
        })?;
        let installed = self
            .installed
            .ok_or_else(|| InstallError::MissingComponent {
                component: "installed_packages".to_string(),
            })?;
        let staging_dir = self
            .staging_dir
            .ok_or_else(|| InstallError::MissingComponent {
                component: "staging_dir".to_string(),
            })?;

        let stager = BundleStager::new(staging_dir)
            .with_size_limit(self.max_bundle_size)
            .with_event_sender(self.event_sender.clone());
        stager.prepare().await?;

        let installer = SessionInstaller::new(service, self.capabilities, self.owner)
            .with_update_ownership(self.request_update_ownership)
            .with_event_sender(self.event_sender.clone());
        let correlator =
            Arc::new(CompletionCorrelator::new().with_event_sender(self.event_sender.clone()));
        let listener = self
            .completions
            .map(|completions| correlator.spawn_listener(completions));

        let (state, _) = watch::channel(InstallState::Idle);
        let (setup_errors, setup_errors_rx) = mpsc::unbounded_channel();

        let coordinator = InstallCoordinator {
            inner: Arc::new(Inner {
                stager,
                parser: self.parser,
                installed,
                installer,
                correlator,
                policy: self.policy,
                completion_timeout: self.completion_timeout,
                state,
                slot: Mutex::new(OperationSlot::default()),
                preview: Mutex::new(None),
                setup_errors,
                setup_errors_rx: Mutex::new(Some(setup_errors_rx)),
                listener,
                event_sender: self.event_sender,
            }),
        };

        if self.cleanup_on_build {
            if let Err(e) = coordinator.inner.installer.cleanup_stale().await {
                tracing::warn!(error = %e, "stale session cleanup failed at startup");
            }
        }
        Ok(coordinator)
    }
}
