// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The deposit pipeline driver.
//!
//! Runs the job sequence for one deposit and maps job outcomes onto the
//! deposit's workflow state: success moves on, `Interrupted` parks the
//! deposit as paused or cancelled for a later resume, and
//! `Failed`/`Repository` record the failure details and mark the deposit
//! failed. Jobs are re-entrant, so resuming simply runs the sequence
//! again; finished work is skipped through the per-job completed-sets.

use std::sync::Arc;

use preserva_model::pid::Pid;
use preserva_model::store::GraphStore;
use tracing::{error, info, instrument, warn};

use crate::error::{InterruptReason, JobError, Result};
use crate::job::{DepositJob, JobContext, JobOptions};
use crate::registry::{DepositState, DepositStatusStore, JobStatusStore};
use crate::services::{CharacterizationService, VirusScanner};

/// Ordered job sequence over one deposit.
pub struct DepositPipeline {
    jobs: Vec<Box<dyn DepositJob>>,
    graphs: Arc<GraphStore>,
    deposit_status: Arc<dyn DepositStatusStore>,
    job_status: Arc<dyn JobStatusStore>,
    options: JobOptions,
}

impl DepositPipeline {
    /// Create an empty pipeline; add jobs with [`with_job`](Self::with_job).
    pub fn new(
        graphs: Arc<GraphStore>,
        deposit_status: Arc<dyn DepositStatusStore>,
        job_status: Arc<dyn JobStatusStore>,
        options: JobOptions,
    ) -> Self {
        Self {
            jobs: Vec::new(),
            graphs,
            deposit_status,
            job_status,
            options,
        }
    }

    /// Append a job to the sequence.
    pub fn with_job(mut self, job: impl DepositJob + 'static) -> Self {
        self.jobs.push(Box::new(job));
        self
    }

    /// The standard ingest sequence: validation first (destination, content
    /// model, file availability), then fixity, virus scan, and technical
    /// metadata extraction. `scan_local_paths` sends staged-file paths to
    /// the scanner daemon instead of streaming; it requires a daemon that
    /// reads the deposit filesystem directly.
    pub fn standard(
        graphs: Arc<GraphStore>,
        deposit_status: Arc<dyn DepositStatusStore>,
        job_status: Arc<dyn JobStatusStore>,
        options: JobOptions,
        characterization: Arc<dyn CharacterizationService>,
        scanner: Arc<dyn VirusScanner>,
        scan_local_paths: bool,
    ) -> Self {
        let mut virus_scan = crate::jobs::VirusScanJob::new(scanner);
        if scan_local_paths {
            virus_scan = virus_scan.with_local_paths();
        }
        Self::new(graphs, deposit_status, job_status, options)
            .with_job(crate::jobs::ValidateDestinationJob::new())
            .with_job(crate::jobs::ValidateContentModelJob::new())
            .with_job(crate::jobs::ValidateFileAvailabilityJob::new())
            .with_job(crate::jobs::FixityCheckJob::new())
            .with_job(virus_scan)
            .with_job(crate::jobs::ExtractTechnicalMetadataJob::new(
                characterization,
            ))
    }

    /// Run the sequence for `deposit_id`, updating the deposit's workflow
    /// state as it goes. Returns the first job error, after recording it.
    #[instrument(skip_all, fields(deposit_id = %deposit_id))]
    pub async fn run(&self, deposit_id: &Pid) -> Result<()> {
        let current = self.deposit_status.state(deposit_id.as_str()).await?;
        match current {
            None => {
                return Err(JobError::repository(
                    "deposit lookup",
                    format!("deposit '{}' is not registered", deposit_id),
                ));
            }
            Some(DepositState::Cancelled) => {
                return Err(JobError::failed_simple(format!(
                    "deposit '{}' was cancelled and cannot be resumed",
                    deposit_id
                )));
            }
            _ => {}
        }

        self.deposit_status
            .set_state(deposit_id.as_str(), DepositState::Running)
            .await?;

        for job in &self.jobs {
            let ctx = JobContext::new(
                deposit_id.clone(),
                job.name(),
                self.graphs.clone(),
                self.deposit_status.clone(),
                self.job_status.clone(),
                self.options.clone(),
            );
            info!(job = job.name(), "running job");
            match job.run(&ctx).await {
                Ok(()) => {
                    self.job_status.finish_job(&ctx.job_id).await?;
                }
                Err(err @ JobError::Interrupted { .. }) => {
                    let state = match err {
                        JobError::Interrupted {
                            reason: InterruptReason::Cancelled,
                            ..
                        } => DepositState::Cancelled,
                        _ => DepositState::Paused,
                    };
                    warn!(job = job.name(), state = state.as_str(), "job interrupted");
                    self.deposit_status
                        .set_state(deposit_id.as_str(), state)
                        .await?;
                    return Err(err);
                }
                Err(err) => {
                    error!(job = job.name(), error = %err, "job failed");
                    self.deposit_status
                        .set_error(deposit_id.as_str(), &err.to_string())
                        .await?;
                    self.deposit_status
                        .set_state(deposit_id.as_str(), DepositState::Failed)
                        .await?;
                    return Err(err);
                }
            }
        }

        self.deposit_status
            .set_state(deposit_id.as_str(), DepositState::Finished)
            .await?;
        info!("deposit pipeline finished");
        Ok(())
    }
}
