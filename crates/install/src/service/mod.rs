//! Privileged installer service boundary
//!
//! The installer service is opaque: it hands out sessions, accepts bytes
//! through a sink, and reports completion later through a
//! [`CompletionSignal`] addressed by correlation key. Completion may reach a
//! different process instance than the one that committed, so nothing here
//! carries callbacks; the key is the only link.

mod spool;

pub use spool::SpoolService;

use async_trait::async_trait;
use sideload_errors::Error;
use sideload_types::{
    CompletionSignal, CorrelationKey, InstalledPackageRecord, SessionId, SessionParams,
};
use tokio::io::AsyncWrite;
use tokio::sync::mpsc;

/// Writable end of an open installer session
#[async_trait]
pub trait SessionSink: AsyncWrite + Send + Unpin {
    /// Flush everything written so far to stable storage
    async fn sync(&mut self) -> Result<(), Error>;
}

/// Session and request primitives of the privileged installer
#[async_trait]
pub trait PackageService: Send + Sync {
    async fn create_session(&self, params: &SessionParams) -> Result<SessionId, Error>;

    async fn open_session(&self, id: SessionId) -> Result<Box<dyn SessionSink>, Error>;

    /// Commit a fully written session; completion arrives later under `key`
    async fn commit(&self, id: SessionId, key: CorrelationKey) -> Result<(), Error>;

    /// Release a session that will not be committed
    async fn abandon(&self, id: SessionId) -> Result<(), Error>;

    /// Sessions the service holds on behalf of this installer
    async fn owned_sessions(&self) -> Result<Vec<SessionId>, Error>;

    async fn request_uninstall(&self, package_id: &str, key: CorrelationKey) -> Result<(), Error>;
}

/// Read-only view of what the platform has installed
#[async_trait]
pub trait InstalledPackages: Send + Sync {
    async fn lookup(&self, package_id: &str) -> Result<Option<InstalledPackageRecord>, Error>;
}

/// Inbound side of completion delivery
pub type CompletionSender = mpsc::UnboundedSender<CompletionSignal>;

/// Drained by the coordinator's completion listener
pub type CompletionReceiver = mpsc::UnboundedReceiver<CompletionSignal>;

#[must_use]
pub fn completion_channel() -> (CompletionSender, CompletionReceiver) {
    mpsc::unbounded_channel()
}
