//! Session installer
//!
//! Owns the create, write, commit and abandon sequence against the installer
//! service. At most one session is live per installer; it sits in an arena
//! guarded by an async mutex so cancellation, commit and stale-session
//! cleanup all agree on its state.

use chrono::{DateTime, Utc};
use sideload_config::PlatformCapabilities;
use sideload_errors::{CommitError, Error, InstallError, SessionError};
use sideload_events::{EventEmitter, EventSender, SessionEvent};
use sideload_types::{
    CorrelationKey, PackageBundle, SessionId, SessionParams, SessionState, UserActionRequirement,
};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::cancel::CancelSignal;
use crate::service::PackageService;

/// The live session tracked by the installer
#[derive(Debug, Clone)]
pub struct InstallSession {
    pub id: SessionId,
    pub package_id: String,
    pub state: SessionState,
    pub created_at: DateTime<Utc>,
}

impl InstallSession {
    fn new(id: SessionId, package_id: impl Into<String>) -> Self {
        Self {
            id,
            package_id: package_id.into(),
            state: SessionState::Created,
            created_at: Utc::now(),
        }
    }

    fn advance(&mut self, next: SessionState) -> Result<(), Error> {
        if !self.state.can_transition_to(next) {
            return Err(SessionError::InvalidTransition {
                from: self.state.to_string(),
                to: next.to_string(),
            }
            .into());
        }
        tracing::debug!(session = %self.id, from = %self.state, to = %next, "session transition");
        self.state = next;
        Ok(())
    }
}

/// Drives installer sessions for one coordinator
pub struct SessionInstaller {
    service: Arc<dyn PackageService>,
    capabilities: PlatformCapabilities,
    owner: String,
    request_update_ownership: bool,
    active: Mutex<Option<InstallSession>>,
    event_sender: Option<EventSender>,
}

impl std::fmt::Debug for SessionInstaller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionInstaller")
            .field("capabilities", &self.capabilities)
            .field("owner", &self.owner)
            .finish_non_exhaustive()
    }
}

impl EventEmitter for SessionInstaller {
    fn event_sender(&self) -> Option<&EventSender> {
        self.event_sender.as_ref()
    }
}

impl SessionInstaller {
    #[must_use]
    pub fn new(
        service: Arc<dyn PackageService>,
        capabilities: PlatformCapabilities,
        owner: impl Into<String>,
    ) -> Self {
        Self {
            service,
            capabilities,
            owner: owner.into(),
            request_update_ownership: true,
            active: Mutex::new(None),
            event_sender: None,
        }
    }

    #[must_use]
    pub fn with_update_ownership(mut self, request: bool) -> Self {
        self.request_update_ownership = request;
        self
    }

    #[must_use]
    pub fn with_event_sender(mut self, sender: Option<EventSender>) -> Self {
        self.event_sender = sender;
        self
    }

    #[must_use]
    pub fn service(&self) -> &Arc<dyn PackageService> {
        &self.service
    }

    /// Session parameters for `bundle` under the resolved platform capabilities
    #[must_use]
    pub fn session_params(&self, bundle: &PackageBundle) -> SessionParams {
        let user_action = if self.capabilities.silent_install {
            UserActionRequirement::NotRequired
        } else {
            UserActionRequirement::Unspecified
        };
        SessionParams::full_install(&self.owner)
            .with_user_action(user_action)
            .with_update_ownership(
                self.capabilities.update_ownership && self.request_update_ownership,
            )
            .with_package(&bundle.package_id, bundle.size)
    }

    /// Snapshot of the live session, if any
    pub async fn active(&self) -> Option<InstallSession> {
        self.active.lock().await.clone()
    }

    /// Whether a session currently occupies the arena
    pub async fn is_busy(&self) -> bool {
        self.active.lock().await.is_some()
    }

    /// Create a session, stream `staged` into it and commit it.
    ///
    /// `register` runs right before commit with the session's correlation
    /// key, so the completion waiter exists before the service can answer.
    /// Any failure after the session exists abandons it before returning.
    ///
    /// # Errors
    ///
    /// Returns `InstallError::Busy` if a session is already live,
    /// `Error::Cancelled` if `cancel` fires before commit, and session or
    /// commit errors from the service.
    pub async fn install<T, F>(
        &self,
        bundle: &PackageBundle,
        staged: &Path,
        cancel: &CancelSignal,
        register: F,
    ) -> Result<(SessionId, T), Error>
    where
        F: FnOnce(&CorrelationKey) -> Result<T, Error> + Send,
        T: Send,
    {
        if self.active.lock().await.is_some() {
            return Err(InstallError::Busy.into());
        }

        let params = self.session_params(bundle);
        let id = self
            .service
            .create_session(&params)
            .await
            .map_err(|e| match e {
                Error::Session(_) => e,
                other => SessionError::CreateRejected {
                    message: other.to_string(),
                }
                .into(),
            })?;

        {
            let mut arena = self.active.lock().await;
            if cancel.is_cancelled() {
                drop(arena);
                self.release(id, "cancelled before write").await;
                return Err(Error::Cancelled);
            }
            if arena.is_some() {
                drop(arena);
                self.release(id, "another session became active").await;
                return Err(InstallError::Busy.into());
            }
            *arena = Some(InstallSession::new(id, &bundle.package_id));
        }
        tracing::info!(session = %id, package = %bundle.package_id, "created install session");
        self.emit_session(SessionEvent::Created {
            session_id: id,
            package: bundle.package_id.clone(),
        });

        let written = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                // cancel() abandons the session; the copy is simply dropped
                return Err(Error::Cancelled);
            }
            result = self.stream(id, staged) => result,
        };

        match written {
            Ok(bytes) => self.emit_session(SessionEvent::Written {
                session_id: id,
                bytes,
            }),
            Err(e) => {
                self.fail_live(id, &e).await;
                return Err(e);
            }
        }

        self.commit(id, cancel, register).await
    }

    async fn stream(&self, id: SessionId, staged: &Path) -> Result<u64, Error> {
        self.advance(id, SessionState::Writing).await?;

        let mut sink = self.service.open_session(id).await.map_err(|e| match e {
            Error::Session(_) => e,
            other => SessionError::OpenFailed {
                session_id: id.0,
                message: other.to_string(),
            }
            .into(),
        })?;

        let write_failed = |message: String| -> Error {
            CommitError::WriteFailed {
                session_id: id.0,
                message,
            }
            .into()
        };

        let mut file = tokio::fs::File::open(staged)
            .await
            .map_err(|e| write_failed(format!("{}: {e}", staged.display())))?;
        let bytes = tokio::io::copy(&mut file, &mut sink)
            .await
            .map_err(|e| write_failed(e.to_string()))?;

        sink.sync().await.map_err(|e| match e {
            Error::Commit(_) => e,
            other => CommitError::FlushFailed {
                session_id: id.0,
                message: other.to_string(),
            }
            .into(),
        })?;

        tracing::debug!(session = %id, bytes, "session payload written");
        Ok(bytes)
    }

    async fn commit<T, F>(
        &self,
        id: SessionId,
        cancel: &CancelSignal,
        register: F,
    ) -> Result<(SessionId, T), Error>
    where
        F: FnOnce(&CorrelationKey) -> Result<T, Error> + Send,
        T: Send,
    {
        let mut arena = self.active.lock().await;
        let writing = arena
            .as_ref()
            .is_some_and(|s| s.id == id && s.state == SessionState::Writing);
        if !writing || cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let key = CorrelationKey::Session(id);
        let registered = match register(&key) {
            Ok(registered) => registered,
            Err(e) => {
                self.abandon_locked(&mut arena, "registration failed").await;
                return Err(e);
            }
        };

        // The arena lock is held across the commit call, so a concurrent
        // cancel observes either Writing (and abandons) or Committed.
        if let Err(e) = self.service.commit(id, key.clone()).await {
            self.abandon_locked(&mut arena, "commit failed").await;
            return Err(match e {
                Error::Commit(_) | Error::Session(_) => e,
                other => CommitError::CommitFailed {
                    session_id: id.0,
                    message: other.to_string(),
                }
                .into(),
            });
        }

        if let Some(session) = arena.as_mut() {
            session.advance(SessionState::Committed)?;
        }
        tracing::info!(session = %id, key = %key, "session committed");
        self.emit_session(SessionEvent::Committed {
            session_id: id,
            correlation_key: key.to_string(),
        });
        Ok((id, registered))
    }

    /// Record the terminal result of a committed session and free the arena
    pub async fn complete(&self, id: SessionId, succeeded: bool) {
        let mut arena = self.active.lock().await;
        let Some(session) = arena.as_mut().filter(|s| s.id == id) else {
            return;
        };
        let next = if succeeded {
            SessionState::Succeeded
        } else {
            SessionState::Failed
        };
        if let Err(e) = session.advance(next) {
            tracing::debug!(session = %id, error = %e, "ignoring late completion");
        }
        *arena = None;
    }

    /// Abandon the live session if it has not been committed yet.
    ///
    /// A committed session is only forgotten locally; the service may still
    /// finish it.
    ///
    /// # Errors
    ///
    /// Returns an error if the service refuses to abandon the session. The
    /// arena is cleared either way.
    pub async fn cancel(&self) -> Result<Option<SessionId>, Error> {
        let mut arena = self.active.lock().await;
        let Some(session) = arena.take() else {
            return Ok(None);
        };

        if session.state.is_abandonable() {
            self.abandon(session.id, "cancelled").await?;
        } else {
            tracing::info!(
                session = %session.id,
                state = %session.state,
                "session already committed; cancellation is best effort"
            );
        }
        Ok(Some(session.id))
    }

    /// Abandon every owned session except the live one.
    ///
    /// # Errors
    ///
    /// Returns an error only if the service cannot enumerate its sessions;
    /// individual abandon failures are logged and skipped.
    pub async fn cleanup_stale(&self) -> Result<usize, Error> {
        let live = self.active.lock().await.as_ref().map(|s| s.id);
        self.abandon_stale(live).await
    }

    /// Stale cleanup for a coordinator reset.
    ///
    /// A committed session is dropped from the arena so the next install can
    /// start; the service still finishes it, so it is not abandoned. A
    /// session still being created or written stays live and is skipped.
    ///
    /// # Errors
    ///
    /// Returns an error only if the service cannot enumerate its sessions.
    pub async fn reset(&self) -> Result<usize, Error> {
        let keep = {
            let mut arena = self.active.lock().await;
            match arena.as_ref().map(|s| (s.id, s.state)) {
                Some((id, SessionState::Committed)) => {
                    *arena = None;
                    tracing::debug!(session = %id, "detached committed session");
                    Some(id)
                }
                other => other.map(|(id, _)| id),
            }
        };
        self.abandon_stale(keep).await
    }

    async fn abandon_stale(&self, keep: Option<SessionId>) -> Result<usize, Error> {
        let owned = self.service.owned_sessions().await.map_err(|e| match e {
            Error::Session(_) => e,
            other => SessionError::EnumerationFailed {
                message: other.to_string(),
            }
            .into(),
        })?;

        let stale: Vec<SessionId> = owned.into_iter().filter(|id| Some(*id) != keep).collect();
        let mut abandoned = 0;
        for id in &stale {
            if self.abandon(*id, "stale").await.is_ok() {
                abandoned += 1;
            }
        }

        if !stale.is_empty() {
            tracing::info!(found = stale.len(), abandoned, "cleaned up stale sessions");
        }
        self.emit_session(SessionEvent::StaleCleanup {
            found: stale.len(),
            abandoned,
        });
        Ok(abandoned)
    }

    /// Submit an uninstall request; completion arrives under `key`
    ///
    /// # Errors
    ///
    /// Returns `SessionError::UninstallRejected` if the service refuses.
    pub async fn uninstall(&self, package_id: &str, key: CorrelationKey) -> Result<(), Error> {
        self.service
            .request_uninstall(package_id, key)
            .await
            .map_err(|e| match e {
                Error::Session(_) => e,
                other => SessionError::UninstallRejected {
                    message: other.to_string(),
                }
                .into(),
            })
    }

    async fn advance(&self, id: SessionId, next: SessionState) -> Result<(), Error> {
        let mut arena = self.active.lock().await;
        match arena.as_mut().filter(|s| s.id == id) {
            Some(session) => session.advance(next),
            None => Err(Error::Cancelled),
        }
    }

    /// A write-phase failure: abandon the session before the error surfaces
    async fn fail_live(&self, id: SessionId, error: &Error) {
        let mut arena = self.active.lock().await;
        if arena.as_ref().is_some_and(|s| s.id == id) {
            self.abandon_locked(&mut arena, &error.to_string()).await;
        }
    }

    async fn abandon_locked(&self, arena: &mut Option<InstallSession>, reason: &str) {
        if let Some(mut session) = arena.take() {
            if session.state.is_abandonable() {
                let _ = session.advance(SessionState::Abandoned);
            }
            let _ = self.abandon(session.id, reason).await;
        }
    }

    /// Abandon a session that never made it into the arena
    async fn release(&self, id: SessionId, reason: &str) {
        let _ = self.abandon(id, reason).await;
    }

    async fn abandon(&self, id: SessionId, reason: &str) -> Result<(), Error> {
        match self.service.abandon(id).await {
            Ok(()) => {
                tracing::info!(session = %id, reason, "abandoned session");
                self.emit_session(SessionEvent::Abandoned {
                    session_id: id,
                    reason: reason.to_string(),
                });
                Ok(())
            }
            Err(e) => {
                tracing::warn!(session = %id, error = %e, "failed to abandon session");
                self.emit_session(SessionEvent::AbandonFailed {
                    session_id: id,
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }
}
