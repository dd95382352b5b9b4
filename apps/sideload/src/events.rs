//! Event handling and status display

use console::{Style, Term};
use sideload_events::{AppEvent, GeneralEvent, LifecycleEvent, SessionEvent};
use sideload_types::FollowUpAction;

/// Event handler for status lines and user feedback
pub struct EventHandler {
    colors: bool,
    debug: bool,
    quiet: bool,
    term: Term,
}

impl EventHandler {
    /// `quiet` suppresses terminal output (JSON mode); events are still logged
    pub fn new(colors: bool, debug: bool, quiet: bool) -> Self {
        Self {
            colors,
            debug,
            quiet,
            term: Term::stderr(),
        }
    }

    /// Handle an incoming event.
    ///
    /// Returns the follow-up action when the installer asks the user to
    /// confirm; answering it is up to the caller.
    pub fn handle_event(&mut self, event: &AppEvent) -> Option<FollowUpAction> {
        crate::logging::log_event_with_tracing(event);

        match event {
            AppEvent::Lifecycle(event) => self.handle_lifecycle(event),
            AppEvent::Session(event) => {
                self.handle_session(event);
                None
            }
            AppEvent::General(event) => {
                self.handle_general(event);
                None
            }
        }
    }

    fn handle_lifecycle(&mut self, event: &LifecycleEvent) -> Option<FollowUpAction> {
        match event {
            LifecycleEvent::StagingCompleted { size, .. } => {
                self.show_status(&format!("Staged bundle ({size} bytes)"));
            }
            LifecycleEvent::StagingFailed { failure } | LifecycleEvent::ParsingFailed { failure } => {
                self.show_error(&failure.message);
            }
            LifecycleEvent::ParsingCompleted {
                package,
                version_name,
                ..
            } => {
                self.show_status(&format!("Read {package} {version_name}"));
            }
            LifecycleEvent::TrustEvaluated {
                package, verdict, ..
            } if !verdict.is_trusted() => {
                self.show_error(&format!(
                    "{package} is signed by a different identity than the installed package"
                ));
            }
            LifecycleEvent::InstallationStarted { package, .. } => {
                self.show_status(&format!("Installing {package}"));
            }
            LifecycleEvent::InstallationFailed { package, reason } => {
                self.show_error(&format!("Install of {package} failed: {reason}"));
            }
            LifecycleEvent::RemovalStarted { package } => {
                self.show_status(&format!("Removing {package}"));
            }
            LifecycleEvent::RemovalFailed { package, reason } => {
                self.show_error(&format!("Removal of {package} failed: {reason}"));
            }
            LifecycleEvent::UserActionRequired { action, .. } => {
                return Some(action.clone());
            }
            LifecycleEvent::OperationCancelled { package, .. } => {
                let target = package.as_deref().unwrap_or("operation");
                self.show_warning(&format!("Cancelled {target}"));
            }
            _ => {}
        }
        None
    }

    fn handle_session(&mut self, event: &SessionEvent) {
        match event {
            SessionEvent::AbandonFailed { session_id, error } => {
                self.show_warning(&format!("Could not abandon session {session_id}: {error}"));
            }
            SessionEvent::StaleCleanup { found, abandoned } if *found > 0 => {
                self.show_status(&format!(
                    "Abandoned {abandoned} of {found} stale installer session(s)"
                ));
            }
            SessionEvent::CompletionUnclaimed {
                correlation_key, ..
            } if self.debug => {
                self.show_status(&format!("Ignored completion for {correlation_key}"));
            }
            _ => {}
        }
    }

    fn handle_general(&mut self, event: &GeneralEvent) {
        match event {
            GeneralEvent::Warning { message, context } => {
                let text = match context {
                    Some(context) => format!("{message} ({context})"),
                    None => message.clone(),
                };
                self.show_warning(&text);
            }
            GeneralEvent::Error { message, details } => {
                let text = match details {
                    Some(details) => format!("{message}: {details}"),
                    None => message.clone(),
                };
                self.show_error(&text);
            }
            GeneralEvent::DebugLog { message, .. } if self.debug => {
                self.show_status(message);
            }
            _ => {}
        }
    }

    fn styled(&self, style: Style, text: &str) -> String {
        if self.colors {
            style.apply_to(text).to_string()
        } else {
            text.to_string()
        }
    }

    fn show_status(&self, message: &str) {
        if !self.quiet {
            let _ = self.term.write_line(message);
        }
    }

    fn show_warning(&self, message: &str) {
        if !self.quiet {
            let line = self.styled(Style::new().yellow(), &format!("Warning: {message}"));
            let _ = self.term.write_line(&line);
        }
    }

    fn show_error(&self, message: &str) {
        if !self.quiet {
            let line = self.styled(Style::new().red(), &format!("Error: {message}"));
            let _ = self.term.write_line(&line);
        }
    }
}
