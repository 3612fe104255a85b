use std::{
    fs::OpenOptions,
    io::Write,
    path::{Path, PathBuf},
};

use chrono::Utc;
use serde::Serialize;

use crate::{domain::UserId, Result};

/// Where a meeting start was triggered from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StartSource {
    Command,
    AskPmi,
    Confirm,
    OAuth,
}

impl StartSource {
    pub fn as_str(self) -> &'static str {
        match self {
            StartSource::Command => "command",
            StartSource::AskPmi => "ask_pmi",
            StartSource::Confirm => "confirm",
            StartSource::OAuth => "oauth",
        }
    }
}

/// Usage events. Best-effort: implementations swallow (and log) their own
/// failures so tracking never fails a command.
pub trait Telemetry: Send + Sync {
    fn track_meeting_start(&self, user_id: UserId, source: StartSource);
    fn track_disconnect(&self, user_id: UserId);
}

#[derive(Clone, Debug, Serialize)]
pub struct TelemetryEvent {
    pub timestamp: String,
    pub event: String,
    pub user_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl TelemetryEvent {
    pub fn meeting_start(user_id: UserId, source: StartSource) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
            event: "start_meeting".to_string(),
            user_id: user_id.0,
            source: Some(source.as_str().to_string()),
        }
    }

    pub fn disconnect(user_id: UserId) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
            event: "disconnect".to_string(),
            user_id: user_id.0,
            source: None,
        }
    }
}

/// Appends telemetry events as JSON lines and mirrors them to `tracing`.
#[derive(Clone, Debug)]
pub struct TelemetryLogger {
    path: PathBuf,
}

impl TelemetryLogger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write(&self, event: &TelemetryEvent) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let line = serde_json::to_string(event)?;
        writeln!(file, "{line}")?;
        Ok(())
    }

    fn record(&self, event: TelemetryEvent) {
        tracing::info!(
            event = %event.event,
            user_id = event.user_id,
            source = event.source.as_deref().unwrap_or(""),
            "telemetry"
        );
        if let Err(e) = self.write(&event) {
            tracing::warn!(error = %e, "failed to write telemetry event");
        }
    }
}

impl Telemetry for TelemetryLogger {
    fn track_meeting_start(&self, user_id: UserId, source: StartSource) {
        self.record(TelemetryEvent::meeting_start(user_id, source));
    }

    fn track_disconnect(&self, user_id: UserId) {
        self.record(TelemetryEvent::disconnect(user_id));
    }
}
