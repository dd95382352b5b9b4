//! Structured logging integration for events
//!
//! Every [`AppEvent`] is mirrored into the tracing subscriber at the level the
//! event declares, so a debug log file holds the full lifecycle of a run even
//! when the terminal only shows a few status lines.

use sideload_events::AppEvent;
use tracing::{debug, error, info, trace, warn, Level};

/// Log an event with its source and category as structured fields
pub fn log_event_with_tracing(event: &AppEvent) {
    let source = event.event_source();
    let source = source.as_str();
    let category = event.log_target();

    match event.log_level() {
        Level::ERROR => error!(source, category, event = ?event, "event"),
        Level::WARN => warn!(source, category, event = ?event, "event"),
        Level::INFO => info!(source, category, event = ?event, "event"),
        Level::DEBUG => debug!(source, category, event = ?event, "event"),
        _ => trace!(source, category, event = ?event, "event"),
    }
}
