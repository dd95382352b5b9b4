#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Bundle installation for sideload
//!
//! A local bundle goes through four stages on its way to the platform
//! installer: it is copied into a private staging directory
//! ([`BundleStager`]), its manifest is read ([`MetadataParser`]), its signers
//! are compared against the installed package, and it is streamed into an
//! installer session ([`SessionInstaller`]). The installer reports back
//! asynchronously; [`CompletionCorrelator`] routes each report to the
//! operation that is waiting for it. [`InstallCoordinator`] drives the whole
//! sequence and is the only type a front end needs.

mod cancel;
mod coordinator;
mod correlator;
mod parser;
pub mod service;
mod session;
mod stager;

pub use cancel::CancelSignal;
pub use coordinator::{InstallCoordinator, InstallCoordinatorBuilder};
pub use correlator::{CompletionCorrelator, OutcomeReceiver, Resolution};
pub use parser::{
    ArchiveParser, BundleManifest, ManifestPackage, ManifestSigning, MetadataParser,
    MANIFEST_ENTRY,
};
pub use service::{
    completion_channel, CompletionReceiver, CompletionSender, InstalledPackages, PackageService,
    SessionSink, SpoolService,
};
pub use session::{InstallSession, SessionInstaller};
pub use stager::{BundleStager, StagedBundle};

pub use sideload_events::EventSender;
