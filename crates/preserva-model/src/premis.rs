// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! PREMIS provenance event logging.
//!
//! Every preservation-relevant action on an object (digest calculation,
//! virus check, format identification, validation) appends one immutable
//! event to that object's log file. Events are write-once: multiple events
//! per object per run are allowed (a retried virus scan produces a second
//! VirusCheck event), but none are ever deleted or rewritten.

use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::pid::Pid;
use crate::{ModelError, Result};

/// PREMIS v3 event type vocabulary used by the deposit pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PremisEventType {
    /// Object was ingested into the deposit.
    Ingestion,
    /// Content was scanned for viruses.
    VirusCheck,
    /// A digest was computed or verified.
    MessageDigestCalculation,
    /// File format was identified by a characterization tool.
    FormatIdentification,
    /// Structural or descriptive validation was performed.
    Validation,
    /// Package was normalized from a legacy submission format.
    Normalization,
}

impl PremisEventType {
    /// PREMIS vocabulary term for this event type.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ingestion => "ingestion",
            Self::VirusCheck => "virus check",
            Self::MessageDigestCalculation => "message digest calculation",
            Self::FormatIdentification => "format identification",
            Self::Validation => "validation",
            Self::Normalization => "normalization",
        }
    }
}

/// Software agent responsible for an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PremisAgent {
    /// The deposit pipeline itself.
    DepositService,
    /// The clamd virus scanner.
    ClamAv,
    /// The FITS characterization tool.
    Fits,
    /// Any other named software agent.
    Other(String),
}

impl PremisAgent {
    /// Agent name recorded in the event.
    pub fn name(&self) -> &str {
        match self {
            Self::DepositService => "preserva-deposit-service",
            Self::ClamAv => "clamav",
            Self::Fits => "fits",
            Self::Other(name) => name,
        }
    }
}

/// One immutable provenance event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PremisEvent {
    /// Event type from the PREMIS vocabulary.
    pub event_type: PremisEventType,
    /// When the event occurred.
    pub event_datetime: DateTime<Utc>,
    /// Human-readable detail text.
    pub detail: String,
    /// Whether the recorded action succeeded.
    pub outcome: bool,
    /// Optional outcome note (e.g., a digest value or virus signature).
    pub outcome_note: Option<String>,
    /// Software agents responsible.
    pub agents: Vec<PremisAgent>,
}

impl PremisEvent {
    /// Build a successful event.
    pub fn success(event_type: PremisEventType, detail: impl Into<String>) -> Self {
        Self {
            event_type,
            event_datetime: Utc::now(),
            detail: detail.into(),
            outcome: true,
            outcome_note: None,
            agents: Vec::new(),
        }
    }

    /// Build a failed event.
    pub fn failure(event_type: PremisEventType, detail: impl Into<String>) -> Self {
        Self {
            outcome: false,
            ..Self::success(event_type, detail)
        }
    }

    /// Attach an outcome note.
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.outcome_note = Some(note.into());
        self
    }

    /// Attach a responsible agent.
    pub fn with_agent(mut self, agent: PremisAgent) -> Self {
        self.agents.push(agent);
        self
    }
}

/// Append-only per-object event log writer.
#[derive(Debug, Clone)]
pub struct PremisLogger {
    events_dir: PathBuf,
}

impl PremisLogger {
    /// Create a logger writing under the given events directory.
    pub fn new(events_dir: impl Into<PathBuf>) -> Self {
        Self {
            events_dir: events_dir.into(),
        }
    }

    fn log_path(&self, object: &Pid) -> PathBuf {
        self.events_dir.join(format!("{}.jsonl", object.local_id()))
    }

    /// Append one event to the object's log.
    ///
    /// The write is a single appended line; partially written logs from a
    /// crashed process remain readable up to the last complete line.
    pub fn write_event(&self, object: &Pid, event: &PremisEvent) -> Result<()> {
        fs::create_dir_all(&self.events_dir)
            .map_err(|e| ModelError::io("create_dir", &self.events_dir, e))?;
        let path = self.log_path(object);
        let line = serde_json::to_string(event).map_err(|e| ModelError::Corrupt {
            path: path.display().to_string(),
            line: 0,
            details: e.to_string(),
        })?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| ModelError::io("append", &path, e))?;
        writeln!(file, "{}", line).map_err(|e| ModelError::io("append", &path, e))?;
        Ok(())
    }

    /// Read back every event recorded for an object, oldest first.
    ///
    /// Returns an empty list when no events have been written.
    pub fn events_for(&self, object: &Pid) -> Result<Vec<PremisEvent>> {
        let path = self.log_path(object);
        let file = match fs::File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(ModelError::io("read", &path, e)),
        };
        let reader = BufReader::new(file);
        let mut events = Vec::new();
        for (idx, line) in reader.lines().enumerate() {
            let line = line.map_err(|e| ModelError::io("read", &path, e))?;
            if line.trim().is_empty() {
                continue;
            }
            let event: PremisEvent =
                serde_json::from_str(&line).map_err(|e| ModelError::Corrupt {
                    path: path.display().to_string(),
                    line: idx + 1,
                    details: e.to_string(),
                })?;
            events.push(event);
        }
        Ok(events)
    }
}
