// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error taxonomy for deposit jobs.
//!
//! Jobs exit one of three ways: return normally (success), raise
//! [`JobError::Interrupted`] (pause/cancel detected — resumable, not an
//! operator error), or raise [`JobError::Failed`] (terminal for this run,
//! carries a message plus a multi-line details blob enumerating every root
//! cause found). Infrastructure faults that are not attributable to the
//! deposit content (storage, scanner malfunction, registry database) are
//! [`JobError::Repository`]. Pause/resume is never modelled as a failure;
//! the three outcomes are distinct variants matched explicitly.

use std::fmt;

/// Result type using JobError.
pub type Result<T> = std::result::Result<T, JobError>;

/// Why a job was interrupted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptReason {
    /// The deposit was paused by an operator; the job is resumable.
    Paused,
    /// The deposit was cancelled; in-flight work is drained and discarded.
    Cancelled,
}

impl InterruptReason {
    /// Wire form of the reason.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Paused => "paused",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Errors raised by deposit jobs.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum JobError {
    /// The deposit was paused or cancelled while the job was running.
    Interrupted {
        /// The deposit that was interrupted.
        deposit_id: String,
        /// Whether the interruption was a pause or a cancellation.
        reason: InterruptReason,
    },

    /// The job failed; operator intervention is required.
    Failed {
        /// Short human-readable summary.
        message: String,
        /// Multi-line blob enumerating every contributing object/violation.
        details: Option<String>,
    },

    /// Infrastructure or backend fault not attributable to deposit content.
    Repository {
        /// The operation that failed.
        operation: String,
        /// Fault details.
        details: String,
    },
}

impl JobError {
    /// Build a terminal failure with detail text.
    pub fn failed(message: impl Into<String>, details: impl Into<String>) -> Self {
        JobError::Failed {
            message: message.into(),
            details: Some(details.into()),
        }
    }

    /// Build a terminal failure with no additional detail.
    pub fn failed_simple(message: impl Into<String>) -> Self {
        JobError::Failed {
            message: message.into(),
            details: None,
        }
    }

    /// Build a repository fault.
    pub fn repository(operation: impl Into<String>, details: impl Into<String>) -> Self {
        JobError::Repository {
            operation: operation.into(),
            details: details.into(),
        }
    }

    /// Machine-readable code for this error class.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Interrupted { .. } => "INTERRUPTED",
            Self::Failed { .. } => "JOB_FAILED",
            Self::Repository { .. } => "REPOSITORY_ERROR",
        }
    }

    /// Whether the deposit can be resumed after this error.
    pub fn is_resumable(&self) -> bool {
        matches!(self, Self::Interrupted { .. })
    }
}

impl fmt::Display for JobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Interrupted { deposit_id, reason } => {
                write!(f, "Deposit '{}' was {}", deposit_id, reason.as_str())
            }
            Self::Failed { message, details } => {
                write!(f, "{}", message)?;
                if let Some(details) = details {
                    write!(f, "\n{}", details)?;
                }
                Ok(())
            }
            Self::Repository { operation, details } => {
                write!(f, "Repository error during '{}': {}", operation, details)
            }
        }
    }
}

impl std::error::Error for JobError {}

impl From<sqlx::Error> for JobError {
    fn from(err: sqlx::Error) -> Self {
        JobError::Repository {
            operation: "registry query".to_string(),
            details: err.to_string(),
        }
    }
}

impl From<preserva_model::ModelError> for JobError {
    fn from(err: preserva_model::ModelError) -> Self {
        JobError::Repository {
            operation: "deposit model".to_string(),
            details: err.to_string(),
        }
    }
}

/// Aggregated structural violations collected across a whole deposit
/// subtree.
///
/// Validation jobs never fail fast: every violation across the traversal is
/// collected, then rendered into one [`JobError::Failed`] whose details
/// enumerate every violating object id and reason, grouped by violation
/// kind for operator readability.
#[derive(Debug, Default)]
pub struct ValidationReport {
    violations: Vec<Violation>,
}

/// One structural rule violation.
#[derive(Debug, Clone)]
pub struct Violation {
    /// The violating object.
    pub object_id: String,
    /// Violation kind, used for grouping (e.g., "member order").
    pub kind: String,
    /// Human-readable reason.
    pub reason: String,
}

impl ValidationReport {
    /// Create an empty report.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one violation.
    pub fn add(
        &mut self,
        object_id: impl Into<String>,
        kind: impl Into<String>,
        reason: impl Into<String>,
    ) {
        self.violations.push(Violation {
            object_id: object_id.into(),
            kind: kind.into(),
            reason: reason.into(),
        });
    }

    /// Merge another report into this one.
    pub fn merge(&mut self, other: ValidationReport) {
        self.violations.extend(other.violations);
    }

    /// Number of recorded violations.
    pub fn len(&self) -> usize {
        self.violations.len()
    }

    /// Whether the report holds no violations.
    pub fn is_empty(&self) -> bool {
        self.violations.is_empty()
    }

    /// Borrow the recorded violations.
    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }

    /// Render the details blob: violations grouped by kind, sorted by
    /// object id within each group.
    pub fn details(&self) -> String {
        let mut kinds: Vec<&str> = self.violations.iter().map(|v| v.kind.as_str()).collect();
        kinds.sort_unstable();
        kinds.dedup();

        let mut out = String::new();
        for kind in kinds {
            let mut group: Vec<&Violation> = self
                .violations
                .iter()
                .filter(|v| v.kind == kind)
                .collect();
            group.sort_by(|a, b| a.object_id.cmp(&b.object_id));
            out.push_str(&format!("{} ({} violation(s)):\n", kind, group.len()));
            for v in group {
                out.push_str(&format!("  {}: {}\n", v.object_id, v.reason));
            }
        }
        out
    }

    /// Convert into a job result: `Ok(())` when empty, otherwise one
    /// aggregated failure.
    pub fn into_result(self, job_name: &str) -> Result<()> {
        if self.is_empty() {
            return Ok(());
        }
        Err(JobError::failed(
            format!(
                "{} found {} violation(s)",
                job_name,
                self.violations.len()
            ),
            self.details(),
        ))
    }
}
