// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Deposit and job status registries.
//!
//! Two independent key-value registries coordinate the pipeline across
//! process restarts: the deposit registry holds workflow-level state
//! (queued/running/paused/cancelled/failed/finished, destination,
//! depositor), and the job registry holds per-job completion counters plus
//! the per-object completed set used for resume-after-failure idempotence.
//!
//! The registries — not the deposit graph — are the cross-thread
//! coordination point for progress: counters are updated through the
//! store's own atomic operations, never through shared in-process mutable
//! counters.

pub mod memory;
pub mod sqlite;

pub use self::memory::MemoryStatusStore;
pub use self::sqlite::SqliteStatusStore;

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::JobError;

/// Workflow state of a deposit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepositState {
    /// Submitted, waiting for the pipeline.
    Queued,
    /// Pipeline is actively working the deposit.
    Running,
    /// Paused by an operator; resumable.
    Paused,
    /// Cancelled by an operator; terminal.
    Cancelled,
    /// A job failed; operator intervention required.
    Failed,
    /// All jobs completed; the deposit was committed.
    Finished,
}

impl DepositState {
    /// Wire form of the state.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
            Self::Finished => "finished",
        }
    }

    /// Parse the wire form.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(Self::Queued),
            "running" => Some(Self::Running),
            "paused" => Some(Self::Paused),
            "cancelled" => Some(Self::Cancelled),
            "failed" => Some(Self::Failed),
            "finished" => Some(Self::Finished),
            _ => None,
        }
    }
}

impl fmt::Display for DepositState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Deposit record from the status registry.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DepositRecord {
    /// The deposit PID.
    pub deposit_id: String,
    /// Current workflow state (wire form).
    pub state: String,
    /// Destination container PID.
    pub destination: Option<String>,
    /// Destination container type tag.
    pub destination_type: Option<String>,
    /// Who submitted the deposit.
    pub depositor: Option<String>,
    /// Comma-separated permission groups granted on ingest.
    pub permission_groups: Option<String>,
    /// Failure detail from the last failed run.
    pub error: Option<String>,
    /// When the deposit was registered.
    pub created_at: DateTime<Utc>,
    /// When the record last changed.
    pub updated_at: DateTime<Utc>,
}

/// Job record from the status registry.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct JobRecord {
    /// Stable job id (`<deposit-id>/<job-name>`), reused on resume.
    pub job_id: String,
    /// The deposit this job belongs to.
    pub deposit_id: String,
    /// Job name.
    pub name: String,
    /// Eligible object count, set exactly once before work begins.
    pub total_completion: i64,
    /// Completed object count, incremented exactly once per object.
    pub incr_completion: i64,
    /// When the job was first registered.
    pub started_at: DateTime<Utc>,
    /// When the job finished, if it has.
    pub finished_at: Option<DateTime<Utc>>,
}

/// Parameters for registering a deposit.
#[derive(Debug, Clone, Default)]
pub struct NewDeposit {
    /// Destination container PID.
    pub destination: Option<String>,
    /// Destination container type tag.
    pub destination_type: Option<String>,
    /// Who submitted the deposit.
    pub depositor: Option<String>,
    /// Comma-separated permission groups.
    pub permission_groups: Option<String>,
}

/// Workflow-level deposit status operations.
#[async_trait]
pub trait DepositStatusStore: Send + Sync {
    /// Register a deposit in state `queued`. Idempotent.
    async fn register_deposit(
        &self,
        deposit_id: &str,
        params: &NewDeposit,
    ) -> Result<(), JobError>;

    /// Fetch the full deposit record.
    async fn get_deposit(&self, deposit_id: &str) -> Result<Option<DepositRecord>, JobError>;

    /// Current workflow state. This is the poll point checked at every
    /// object boundary while a job runs.
    async fn state(&self, deposit_id: &str) -> Result<Option<DepositState>, JobError>;

    /// Transition the deposit to a new state.
    async fn set_state(&self, deposit_id: &str, state: DepositState) -> Result<(), JobError>;

    /// Record operator-visible failure detail on the deposit.
    async fn set_error(&self, deposit_id: &str, error: &str) -> Result<(), JobError>;
}

/// Per-job completion accounting operations.
#[async_trait]
pub trait JobStatusStore: Send + Sync {
    /// Register a job run. Idempotent: re-registering after an interruption
    /// keeps the existing counters and completed set.
    async fn register_job(
        &self,
        job_id: &str,
        deposit_id: &str,
        name: &str,
    ) -> Result<(), JobError>;

    /// Fetch the job record.
    async fn get_job(&self, job_id: &str) -> Result<Option<JobRecord>, JobError>;

    /// Set the eligible object count. Called exactly once per run, before
    /// any work is dispatched.
    async fn set_total_completion(&self, job_id: &str, total: i64) -> Result<(), JobError>;

    /// Atomically add to the completed count. The count never exceeds the
    /// registered total.
    async fn incr_completion(&self, job_id: &str, delta: i64) -> Result<(), JobError>;

    /// Whether an object was already completed by a previous run.
    async fn object_is_completed(&self, job_id: &str, object_id: &str)
    -> Result<bool, JobError>;

    /// Record an object as completed. Idempotent.
    async fn mark_object_completed(&self, job_id: &str, object_id: &str)
    -> Result<(), JobError>;

    /// Number of objects in the completed set.
    async fn completed_count(&self, job_id: &str) -> Result<i64, JobError>;

    /// Mark the job finished.
    async fn finish_job(&self, job_id: &str) -> Result<(), JobError>;
}
