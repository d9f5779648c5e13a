//! Audit trail for spindle commands and lifecycle events.
//!
//! One JSON object per line. Every command that changes the spindle is
//! recorded with its outcome, together with startup, shutdown and
//! rejected configurations.

use serde::{Deserialize, Serialize};
use spindle_core::{TimeBase, WaitOutcome};
use spindle_io::{CommandJournal, CommandOutcome, SpindleCommand};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::warn;

/// Types of events that are logged in the audit trail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    SystemStart,
    SystemShutdown,
    /// Spindle settings failed validation; nothing was started
    ConfigRejected,
    CommandApplied,
    /// Refused by the bridge, e.g. a speed command while halted
    CommandRejected,
    /// A speed wait ended early because of a halt
    WaitAborted,
    Halt,
}

/// A single audit log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Monotonic timestamp in microseconds
    pub timestamp_us: u64,
    /// Wall-clock Unix timestamp in microseconds
    pub unix_us: u64,
    pub event_type: AuditEventType,
    pub details: serde_json::Value,
}

/// Thread-safe audit logger that writes to a JSONL file
pub struct AuditLogger {
    writer: Mutex<BufWriter<File>>,
}

impl AuditLogger {
    /// Opens `path` for appending, creating parent directories as needed.
    pub fn new(path: &Path) -> std::io::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            writer: Mutex::new(BufWriter::with_capacity(8192, file)),
        })
    }

    pub fn log(&self, entry: AuditEntry) -> std::io::Result<()> {
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| std::io::Error::other("audit writer poisoned"))?;
        serde_json::to_writer(&mut *writer, &entry)?;
        writer.write_all(b"\n")?;
        writer.flush()
    }

    pub fn log_event(
        &self,
        timestamp_us: u64,
        unix_us: u64,
        event_type: AuditEventType,
        details: serde_json::Value,
    ) -> std::io::Result<()> {
        self.log(AuditEntry {
            timestamp_us,
            unix_us,
            event_type,
            details,
        })
    }
}

/// Feeds bridge commands into an [`AuditLogger`].
pub struct AuditJournal {
    logger: Arc<AuditLogger>,
    timebase: TimeBase,
}

impl AuditJournal {
    pub fn new(logger: Arc<AuditLogger>, timebase: TimeBase) -> Self {
        Self { logger, timebase }
    }
}

fn event_for(command: &SpindleCommand, outcome: &CommandOutcome) -> Option<AuditEventType> {
    match (command, outcome) {
        (SpindleCommand::Report | SpindleCommand::Settings, _) => None,
        (_, CommandOutcome::Rejected(_)) => Some(AuditEventType::CommandRejected),
        (_, CommandOutcome::Wait(WaitOutcome::Halted)) => Some(AuditEventType::WaitAborted),
        (SpindleCommand::Halt, _) => Some(AuditEventType::Halt),
        _ => Some(AuditEventType::CommandApplied),
    }
}

impl CommandJournal for AuditJournal {
    fn record(&self, command: &SpindleCommand, outcome: &CommandOutcome) {
        let Some(event_type) = event_for(command, outcome) else {
            return;
        };

        let mut details = serde_json::json!({
            "command": command.name(),
            "outcome": outcome.label(),
        });
        match command {
            SpindleCommand::On { rpm: Some(rpm) } | SpindleCommand::SetSpeed { rpm } => {
                details["rpm"] = serde_json::json!(rpm);
            }
            SpindleCommand::ManualPwm { duty, enable } => {
                details["duty"] = serde_json::json!(duty);
                details["enable"] = serde_json::json!(enable);
            }
            _ => {}
        }
        if let CommandOutcome::Rejected(reason) = outcome {
            details["reason"] = serde_json::json!(reason);
        }

        if let Err(e) = self.logger.log_event(
            self.timebase.now_us(),
            self.timebase.unix_us(),
            event_type,
            details,
        ) {
            warn!(error = %e, "Failed to write audit entry");
        }
    }
}
