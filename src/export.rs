//! Event sink for NDJSON export of the filtered view.
//!
//! Writes one JSON object per line, each wrapping a visible event with the
//! time of the update that produced it.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::io::Write;
use tracing::warn;
use tracing_appender::non_blocking::NonBlocking;

use crate::models::Event;

/// Target name for export operational logs
const TARGET_EXPORT: &str = "export";

#[derive(Serialize)]
struct ExportRecord<'a> {
    synced_at: DateTime<Utc>,
    category: String,
    event: &'a Event,
}

#[derive(Clone)]
pub struct EventExporter {
    writer: NonBlocking,
}

impl EventExporter {
    pub fn new(writer: NonBlocking) -> Self {
        Self { writer }
    }

    /// Append one record; returns whether it reached the writer.
    pub fn write_event(&self, event: &Event, synced_at: DateTime<Utc>) -> bool {
        let record = ExportRecord {
            synced_at,
            category: event.category(),
            event,
        };
        let line = match serde_json::to_string(&record) {
            Ok(line) => line,
            Err(err) => {
                warn!(target: TARGET_EXPORT, error = %err, "Failed to serialize exported event");
                return false;
            }
        };
        let mut writer = self.writer.clone();
        match writeln!(writer, "{}", line) {
            Ok(()) => true,
            Err(err) => {
                warn!(target: TARGET_EXPORT, error = %err, "Failed to write exported event");
                false
            }
        }
    }

    /// Export every event of one applied update; returns how many were written.
    pub fn write_events<'a, I>(&self, events: I, synced_at: DateTime<Utc>) -> usize
    where
        I: IntoIterator<Item = &'a Event>,
    {
        events
            .into_iter()
            .filter(|event| self.write_event(event, synced_at))
            .count()
    }
}
