// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! In-memory status registry.
//!
//! Backs tests and embedded single-process use. Same semantics as the
//! SQLite registry, including the completion guard and idempotent
//! registration.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use crate::error::JobError;

use super::{
    DepositRecord, DepositState, DepositStatusStore, JobRecord, JobStatusStore, NewDeposit,
};

#[derive(Debug, Default)]
struct Inner {
    deposits: HashMap<String, DepositRecord>,
    jobs: HashMap<String, JobRecord>,
    completed: HashMap<String, HashSet<String>>,
}

/// In-memory deposit and job status registry.
#[derive(Debug, Default)]
pub struct MemoryStatusStore {
    inner: Mutex<Inner>,
}

impl MemoryStatusStore {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>, JobError> {
        self.inner
            .lock()
            .map_err(|_| JobError::repository("registry lock", "registry mutex poisoned"))
    }
}

#[async_trait]
impl DepositStatusStore for MemoryStatusStore {
    async fn register_deposit(
        &self,
        deposit_id: &str,
        params: &NewDeposit,
    ) -> Result<(), JobError> {
        let mut inner = self.lock()?;
        inner
            .deposits
            .entry(deposit_id.to_string())
            .or_insert_with(|| DepositRecord {
                deposit_id: deposit_id.to_string(),
                state: DepositState::Queued.as_str().to_string(),
                destination: params.destination.clone(),
                destination_type: params.destination_type.clone(),
                depositor: params.depositor.clone(),
                permission_groups: params.permission_groups.clone(),
                error: None,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            });
        Ok(())
    }

    async fn get_deposit(&self, deposit_id: &str) -> Result<Option<DepositRecord>, JobError> {
        Ok(self.lock()?.deposits.get(deposit_id).cloned())
    }

    async fn state(&self, deposit_id: &str) -> Result<Option<DepositState>, JobError> {
        Ok(self
            .lock()?
            .deposits
            .get(deposit_id)
            .and_then(|d| DepositState::parse(&d.state)))
    }

    async fn set_state(&self, deposit_id: &str, state: DepositState) -> Result<(), JobError> {
        let mut inner = self.lock()?;
        if let Some(record) = inner.deposits.get_mut(deposit_id) {
            record.state = state.as_str().to_string();
            record.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn set_error(&self, deposit_id: &str, error: &str) -> Result<(), JobError> {
        let mut inner = self.lock()?;
        if let Some(record) = inner.deposits.get_mut(deposit_id) {
            record.error = Some(error.to_string());
            record.updated_at = Utc::now();
        }
        Ok(())
    }
}

#[async_trait]
impl JobStatusStore for MemoryStatusStore {
    async fn register_job(
        &self,
        job_id: &str,
        deposit_id: &str,
        name: &str,
    ) -> Result<(), JobError> {
        let mut inner = self.lock()?;
        inner.jobs.entry(job_id.to_string()).or_insert_with(|| JobRecord {
            job_id: job_id.to_string(),
            deposit_id: deposit_id.to_string(),
            name: name.to_string(),
            total_completion: 0,
            incr_completion: 0,
            started_at: Utc::now(),
            finished_at: None,
        });
        Ok(())
    }

    async fn get_job(&self, job_id: &str) -> Result<Option<JobRecord>, JobError> {
        Ok(self.lock()?.jobs.get(job_id).cloned())
    }

    async fn set_total_completion(&self, job_id: &str, total: i64) -> Result<(), JobError> {
        let mut inner = self.lock()?;
        if let Some(job) = inner.jobs.get_mut(job_id) {
            job.total_completion = total;
        }
        Ok(())
    }

    async fn incr_completion(&self, job_id: &str, delta: i64) -> Result<(), JobError> {
        let mut inner = self.lock()?;
        let job = inner.jobs.get_mut(job_id).ok_or_else(|| {
            JobError::repository("incr_completion", format!("unknown job '{}'", job_id))
        })?;
        if job.incr_completion + delta > job.total_completion {
            return Err(JobError::repository(
                "incr_completion",
                format!(
                    "completion increment of {} for job '{}' would exceed total",
                    delta, job_id
                ),
            ));
        }
        job.incr_completion += delta;
        Ok(())
    }

    async fn object_is_completed(
        &self,
        job_id: &str,
        object_id: &str,
    ) -> Result<bool, JobError> {
        Ok(self
            .lock()?
            .completed
            .get(job_id)
            .is_some_and(|set| set.contains(object_id)))
    }

    async fn mark_object_completed(
        &self,
        job_id: &str,
        object_id: &str,
    ) -> Result<(), JobError> {
        self.lock()?
            .completed
            .entry(job_id.to_string())
            .or_default()
            .insert(object_id.to_string());
        Ok(())
    }

    async fn completed_count(&self, job_id: &str) -> Result<i64, JobError> {
        Ok(self
            .lock()?
            .completed
            .get(job_id)
            .map(|set| set.len() as i64)
            .unwrap_or(0))
    }

    async fn finish_job(&self, job_id: &str) -> Result<(), JobError> {
        let mut inner = self.lock()?;
        if let Some(job) = inner.jobs.get_mut(job_id) {
            job.finished_at = Some(Utc::now());
        }
        Ok(())
    }
}
