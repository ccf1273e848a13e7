// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The deposit job contract.
//!
//! A job is a strategy object implementing [`DepositJob::run`] against a
//! [`JobContext`] of injected collaborators — graph store, status
//! registries, PREMIS logger. There is no job inheritance hierarchy; shared
//! behavior lives in the context and in the
//! [task runner](crate::runner::ObjectTaskRunner).
//!
//! Jobs are re-entrant: running a job twice against the same on-disk graph
//! after an interruption skips objects already marked complete in the job
//! status registry and does not duplicate PREMIS events for them.
//! Duplicates are tolerated only for objects that were in flight, not
//! completed, at interruption time.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use preserva_model::pid::Pid;
use preserva_model::premis::PremisLogger;
use preserva_model::store::GraphStore;

use crate::error::{InterruptReason, JobError, Result};
use crate::registry::{DepositState, DepositStatusStore, JobStatusStore};

/// Tuning knobs shared by all jobs of one pipeline run.
#[derive(Debug, Clone)]
pub struct JobOptions {
    /// Worker pool size for per-object fan-out.
    pub workers: usize,
    /// Maximum spawned-but-unreaped tasks (admission control).
    pub max_queued: usize,
    /// Upper bound on any single external call (characterization request,
    /// scanner socket call). Expiry is a per-object failure.
    pub external_timeout: Duration,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            workers: 4,
            max_queued: 64,
            external_timeout: Duration::from_secs(120),
        }
    }
}

/// Collaborators handed to every job.
#[derive(Clone)]
pub struct JobContext {
    /// The deposit being worked.
    pub deposit_id: Pid,
    /// Stable job id (`<deposit-id>/<job-name>`), reused across resumptions
    /// so the completed set survives restarts.
    pub job_id: String,
    /// Graph load/save and deposit directory layout.
    pub graphs: Arc<GraphStore>,
    /// Workflow-level deposit state; polled for pause/cancel.
    pub deposit_status: Arc<dyn DepositStatusStore>,
    /// Per-job completion accounting.
    pub job_status: Arc<dyn JobStatusStore>,
    /// Append-only provenance log for this deposit's objects.
    pub premis: Arc<PremisLogger>,
    /// Tuning knobs.
    pub options: JobOptions,
}

impl JobContext {
    /// Build a context for one job run.
    pub fn new(
        deposit_id: Pid,
        job_name: &str,
        graphs: Arc<GraphStore>,
        deposit_status: Arc<dyn DepositStatusStore>,
        job_status: Arc<dyn JobStatusStore>,
        options: JobOptions,
    ) -> Self {
        let premis = Arc::new(PremisLogger::new(graphs.events_dir(&deposit_id)));
        let job_id = format!("{}/{}", deposit_id, job_name);
        Self {
            deposit_id,
            job_id,
            graphs,
            deposit_status,
            job_status,
            premis,
            options,
        }
    }

    /// Register this job run in the status registry. Idempotent across
    /// resumptions.
    pub async fn register(&self, job_name: &str) -> Result<()> {
        self.job_status
            .register_job(&self.job_id, self.deposit_id.as_str(), job_name)
            .await
    }

    /// Poll the deposit registry for pause/cancel.
    ///
    /// Called before each unit of per-object work so an external pause
    /// request takes effect within one object's processing time. A paused
    /// or cancelled deposit yields [`JobError::Interrupted`], which is
    /// distinct from [`JobError::Failed`]: interrupted deposits are
    /// resumable.
    pub async fn interrupt_check(&self) -> Result<()> {
        match self
            .deposit_status
            .state(self.deposit_id.as_str())
            .await?
        {
            Some(DepositState::Paused) => Err(JobError::Interrupted {
                deposit_id: self.deposit_id.as_str().to_string(),
                reason: InterruptReason::Paused,
            }),
            Some(DepositState::Cancelled) => Err(JobError::Interrupted {
                deposit_id: self.deposit_id.as_str().to_string(),
                reason: InterruptReason::Cancelled,
            }),
            _ => Ok(()),
        }
    }
}

impl std::fmt::Debug for JobContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobContext")
            .field("deposit_id", &self.deposit_id)
            .field("job_id", &self.job_id)
            .field("options", &self.options)
            .finish()
    }
}

/// One step of the deposit pipeline.
#[async_trait]
pub trait DepositJob: Send + Sync {
    /// Stable job name, used to derive the job id.
    fn name(&self) -> &'static str;

    /// Execute the job. Returns normally on success, raises
    /// [`JobError::Interrupted`] when pause/cancel was detected, or
    /// [`JobError::Failed`]/[`JobError::Repository`] on error.
    async fn run(&self, ctx: &JobContext) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{MemoryStatusStore, NewDeposit};

    async fn context(state: DepositState) -> JobContext {
        let dir = tempfile::tempdir().unwrap();
        let graphs = Arc::new(GraphStore::new(dir.path()).unwrap());
        let store = Arc::new(MemoryStatusStore::new());
        let deposit = Pid::new();
        store
            .register_deposit(deposit.as_str(), &NewDeposit::default())
            .await
            .unwrap();
        store.set_state(deposit.as_str(), state).await.unwrap();
        JobContext::new(
            deposit,
            "test job",
            graphs,
            store.clone(),
            store,
            JobOptions::default(),
        )
    }

    #[tokio::test]
    async fn test_interrupt_check_passes_while_running() {
        let ctx = context(DepositState::Running).await;
        assert!(ctx.interrupt_check().await.is_ok());
    }

    #[tokio::test]
    async fn test_interrupt_check_detects_pause() {
        let ctx = context(DepositState::Paused).await;
        match ctx.interrupt_check().await.unwrap_err() {
            JobError::Interrupted { reason, .. } => {
                assert_eq!(reason, InterruptReason::Paused)
            }
            other => panic!("expected Interrupted, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_interrupt_check_detects_cancel() {
        let ctx = context(DepositState::Cancelled).await;
        match ctx.interrupt_check().await.unwrap_err() {
            JobError::Interrupted { reason, .. } => {
                assert_eq!(reason, InterruptReason::Cancelled)
            }
            other => panic!("expected Interrupted, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_job_id_is_stable() {
        let ctx = context(DepositState::Running).await;
        assert_eq!(
            ctx.job_id,
            format!("{}/{}", ctx.deposit_id, "test job")
        );
    }
}
