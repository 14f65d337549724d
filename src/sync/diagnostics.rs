use std::io::Write;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Kind of a diagnostic event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Predicted positions differ from what the authority reports
    Drift,
    /// Submission failed and the job was rolled back
    ReconciliationFailure,
    /// A queued operation was dropped because an earlier one rolled back
    Cancelled,
}

/// Structured event for an external notification or logging collaborator
#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub message: String,
    pub details: serde_json::Value,
    pub at: DateTime<Utc>,
}

impl DiagnosticEvent {
    pub fn new(kind: EventKind, message: impl Into<String>, details: serde_json::Value) -> Self {
        DiagnosticEvent {
            kind,
            message: message.into(),
            details,
            at: Utc::now(),
        }
    }
}

/// Receiver of diagnostic events
pub trait DiagnosticSink {
    fn emit(&mut self, event: DiagnosticEvent);
}

impl<S: DiagnosticSink + ?Sized> DiagnosticSink for Box<S> {
    fn emit(&mut self, event: DiagnosticEvent) {
        (**self).emit(event);
    }
}

impl DiagnosticSink for Vec<DiagnosticEvent> {
    fn emit(&mut self, event: DiagnosticEvent) {
        self.push(event);
    }
}

/// Drops events. The reconciler's own tracing output still records them.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl DiagnosticSink for NullSink {
    fn emit(&mut self, _event: DiagnosticEvent) {}
}

/// Writes one JSON object per line
pub struct JsonLinesSink<W: Write> {
    out: W,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(out: W) -> Self {
        JsonLinesSink { out }
    }
}

impl<W: Write> DiagnosticSink for JsonLinesSink<W> {
    fn emit(&mut self, event: DiagnosticEvent) {
        let written = serde_json::to_writer(&mut self.out, &event)
            .map_err(std::io::Error::from)
            .and_then(|()| writeln!(self.out));
        if let Err(e) = written {
            tracing::warn!(error = %e, "could not write diagnostic event");
        }
    }
}
