// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Parallel per-object task runner.
//!
//! [`ObjectTaskRunner`] applies one unit of work (fixity digest, virus
//! scan, technical metadata extraction) to each qualifying object in a
//! deposit, fanning out over a fixed-size worker pool with bounded
//! admission so a deposit with tens of thousands of files never exhausts
//! memory queuing futures.
//!
//! Per-object state machine:
//!
//! ```text
//! pending → in-flight → { completed | failed | skipped(already-complete) }
//! ```
//!
//! There is no transition from completed back to pending. Completion
//! accounting is deterministic: the eligible total is registered once
//! before dispatch, the completed set and counter are updated exactly once
//! per successfully completed object on the dispatching task (never inside
//! workers), and objects recorded complete by a previous run are skipped
//! before dispatch.
//!
//! Interruption is polled at every object boundary, so a pause request
//! takes effect within one object's processing time. A worker aborted by
//! the runtime is translated into the job-level Interrupted signal on the
//! dispatching side; a worker panic is an infrastructure fault.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, warn};

use preserva_model::pid::Pid;

use crate::error::{JobError, Result};
use crate::job::JobContext;

/// How per-object failures affect the rest of the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// First fatal error stops new submissions, in-flight tasks are
    /// drained, and the first error propagates. Preservation-critical jobs
    /// (fixity, virus scan) are fail-stop.
    FailFast,
    /// Every per-object failure is recorded and the run continues; all
    /// failures aggregate into one multi-line report.
    CollectAll,
}

/// The concurrency engine shared by per-file jobs.
#[derive(Debug, Clone)]
pub struct ObjectTaskRunner {
    workers: usize,
    max_queued: usize,
    policy: FailurePolicy,
}

impl ObjectTaskRunner {
    /// Create a runner with the context's pool size and admission limit.
    pub fn new(ctx: &JobContext, policy: FailurePolicy) -> Self {
        Self {
            workers: ctx.options.workers.max(1),
            max_queued: ctx.options.max_queued.max(1),
            policy,
        }
    }

    /// Apply `task` to every object not already completed by a previous
    /// run.
    ///
    /// `objects` are the qualified object ids that key the completed set.
    /// The eligible total (including previously completed objects) is
    /// registered via `set_total_completion` before any dispatch.
    pub async fn run<F, Fut>(&self, ctx: &JobContext, objects: &[Pid], task: F) -> Result<()>
    where
        F: Fn(Pid) -> Fut,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        // Total is the full qualifying count; resumed runs re-register the
        // same value so the completion guard holds across restarts.
        ctx.job_status
            .set_total_completion(&ctx.job_id, objects.len() as i64)
            .await?;

        let semaphore = Arc::new(Semaphore::new(self.workers));
        let mut in_flight: JoinSet<(Pid, Result<()>)> = JoinSet::new();
        let mut failures: Vec<(Pid, JobError)> = Vec::new();
        let mut fatal: Option<JobError> = None;
        let mut dispatched = 0usize;
        let mut skipped = 0usize;

        for object in objects {
            // Observe finished workers before admitting more work, so a
            // fatal failure stops dispatch at the next object boundary.
            while let Some(joined) = in_flight.try_join_next() {
                self.reap(ctx, joined, &mut failures, &mut fatal).await?;
            }
            if fatal.is_some() {
                break;
            }

            // Pause/cancel takes effect at the next object boundary.
            if let Err(interrupt) = ctx.interrupt_check().await {
                fatal = Some(interrupt);
                break;
            }

            // Resume-safety: never reprocess a completed object.
            if ctx
                .job_status
                .object_is_completed(&ctx.job_id, object.as_str())
                .await?
            {
                skipped += 1;
                continue;
            }

            // Admission control: bound spawned-but-unreaped tasks.
            while in_flight.len() >= self.max_queued && fatal.is_none() {
                if let Some(joined) = in_flight.join_next().await {
                    self.reap(ctx, joined, &mut failures, &mut fatal).await?;
                }
            }
            if fatal.is_some() {
                break;
            }

            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| JobError::repository("worker pool", e.to_string()))?;
            let object = object.clone();
            let fut = task(object.clone());
            dispatched += 1;
            in_flight.spawn(async move {
                let result = fut.await;
                drop(permit);
                (object, result)
            });
        }

        // Drain in-flight tasks. Their successes are accounted only when the
        // run is clean or merely interrupted; after a terminal failure no
        // further completion increments are recorded.
        while let Some(joined) = in_flight.join_next().await {
            self.reap(ctx, joined, &mut failures, &mut fatal).await?;
        }

        debug!(
            job_id = %ctx.job_id,
            dispatched,
            skipped,
            failures = failures.len(),
            "Task runner drained"
        );

        if let Some(err) = fatal {
            return Err(err);
        }

        match self.policy {
            FailurePolicy::FailFast => Ok(()),
            FailurePolicy::CollectAll => {
                if failures.is_empty() {
                    return Ok(());
                }
                let mut details = String::new();
                failures.sort_by(|a, b| a.0.cmp(&b.0));
                for (object, err) in &failures {
                    details.push_str(&format!("  {}: {}\n", object, err));
                }
                Err(JobError::failed(
                    format!("{} object(s) failed", failures.len()),
                    details,
                ))
            }
        }
    }

    /// Account one joined worker on the dispatching task.
    async fn reap(
        &self,
        ctx: &JobContext,
        joined: std::result::Result<(Pid, Result<()>), JoinError>,
        failures: &mut Vec<(Pid, JobError)>,
        fatal: &mut Option<JobError>,
    ) -> Result<()> {
        // Successes that finish after a terminal failure is observed get no
        // completion increment; an interruption still accounts drained work
        // so resumed runs skip it.
        let account_successes = !matches!(
            fatal,
            Some(JobError::Failed { .. }) | Some(JobError::Repository { .. })
        );
        match joined {
            Ok((object, Ok(()))) => {
                if !account_successes {
                    return Ok(());
                }
                // Completed-set first, then the counter: a crash between the
                // two undercounts, and the object is skipped (not re-run) on
                // resume, keeping success events unduplicated.
                ctx.job_status
                    .mark_object_completed(&ctx.job_id, object.as_str())
                    .await?;
                ctx.job_status.incr_completion(&ctx.job_id, 1).await?;
                Ok(())
            }
            Ok((object, Err(err))) => {
                match self.policy {
                    FailurePolicy::CollectAll if !matches!(err, JobError::Interrupted { .. }) => {
                        failures.push((object, err));
                    }
                    _ => {
                        if fatal.is_none() {
                            *fatal = Some(err);
                        } else {
                            // Later errors are suppressed but logged.
                            warn!(
                                job_id = %ctx.job_id,
                                object_id = %object,
                                error = %err,
                                "Suppressing subsequent task failure"
                            );
                        }
                    }
                }
                Ok(())
            }
            Err(join_err) => {
                // An aborted worker is an interruption of the job, not a
                // failure of the deposit content.
                let err = if join_err.is_cancelled() {
                    JobError::Interrupted {
                        deposit_id: ctx.deposit_id.as_str().to_string(),
                        reason: crate::error::InterruptReason::Cancelled,
                    }
                } else {
                    JobError::repository("worker", format!("worker panicked: {}", join_err))
                };
                if fatal.is_none() {
                    *fatal = Some(err);
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use preserva_model::store::GraphStore;

    use crate::job::JobOptions;
    use crate::registry::{
        DepositState, DepositStatusStore, JobStatusStore, MemoryStatusStore, NewDeposit,
    };

    async fn context(workers: usize) -> (JobContext, Arc<MemoryStatusStore>) {
        let dir = tempfile::tempdir().unwrap();
        let graphs = Arc::new(GraphStore::new(dir.path()).unwrap());
        let store = Arc::new(MemoryStatusStore::new());
        let deposit = Pid::new();
        store
            .register_deposit(deposit.as_str(), &NewDeposit::default())
            .await
            .unwrap();
        store
            .set_state(deposit.as_str(), DepositState::Running)
            .await
            .unwrap();
        let ctx = JobContext::new(
            deposit,
            "runner test",
            graphs,
            store.clone(),
            store.clone(),
            JobOptions {
                workers,
                max_queued: 8,
                ..JobOptions::default()
            },
        );
        ctx.register("runner test").await.unwrap();
        (ctx, store)
    }

    fn objects(n: usize) -> Vec<Pid> {
        (0..n).map(|_| Pid::new().qualified("originalFile")).collect()
    }

    #[tokio::test]
    async fn test_all_objects_complete_once() {
        let (ctx, store) = context(4).await;
        let objects = objects(10);
        let counter = Arc::new(AtomicUsize::new(0));

        let runner = ObjectTaskRunner::new(&ctx, FailurePolicy::FailFast);
        let c = counter.clone();
        runner
            .run(&ctx, &objects, move |_| {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            })
            .await
            .unwrap();

        assert_eq!(counter.load(Ordering::SeqCst), 10);
        let job = store.get_job(&ctx.job_id).await.unwrap().unwrap();
        assert_eq!(job.total_completion, 10);
        assert_eq!(job.incr_completion, 10);
    }

    #[tokio::test]
    async fn test_resume_skips_completed_objects() {
        let (ctx, store) = context(2).await;
        let objects = objects(6);

        // Simulate a prior run that completed the first three objects.
        store
            .set_total_completion(&ctx.job_id, objects.len() as i64)
            .await
            .unwrap();
        for object in &objects[..3] {
            store
                .mark_object_completed(&ctx.job_id, object.as_str())
                .await
                .unwrap();
            store.incr_completion(&ctx.job_id, 1).await.unwrap();
        }

        let counter = Arc::new(AtomicUsize::new(0));
        let runner = ObjectTaskRunner::new(&ctx, FailurePolicy::FailFast);
        let c = counter.clone();
        runner
            .run(&ctx, &objects, move |_| {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            })
            .await
            .unwrap();

        // Only the remaining three ran; totals add up exactly once each.
        assert_eq!(counter.load(Ordering::SeqCst), 3);
        let job = store.get_job(&ctx.job_id).await.unwrap().unwrap();
        assert_eq!(job.incr_completion, 6);
        assert_eq!(store.completed_count(&ctx.job_id).await.unwrap(), 6);
    }

    #[tokio::test]
    async fn test_fail_fast_stops_dispatch_and_propagates_first_error() {
        let (ctx, store) = context(1).await;
        let objects = objects(5);
        let failing = objects[1].clone();
        let dispatched = Arc::new(AtomicUsize::new(0));

        let runner = ObjectTaskRunner::new(&ctx, FailurePolicy::FailFast);
        let d = dispatched.clone();
        let err = runner
            .run(&ctx, &objects, move |object| {
                let d = d.clone();
                let failing = failing.clone();
                async move {
                    d.fetch_add(1, Ordering::SeqCst);
                    if object == failing {
                        Err(JobError::failed_simple("digest mismatch"))
                    } else {
                        Ok(())
                    }
                }
            })
            .await
            .unwrap_err();

        assert_eq!(err.error_code(), "JOB_FAILED");
        // With one worker, dispatch halts within one object of the failure.
        assert!(dispatched.load(Ordering::SeqCst) <= 3);
        let job = store.get_job(&ctx.job_id).await.unwrap().unwrap();
        assert_eq!(job.incr_completion, 1, "only the first object completed");
    }

    #[tokio::test]
    async fn test_collect_all_aggregates_every_failure() {
        let (ctx, store) = context(2).await;
        let objects = objects(4);
        let bad: Vec<Pid> = vec![objects[1].clone(), objects[3].clone()];

        let runner = ObjectTaskRunner::new(&ctx, FailurePolicy::CollectAll);
        let err = runner
            .run(&ctx, &objects, move |object| {
                let bad = bad.clone();
                async move {
                    if bad.contains(&object) {
                        Err(JobError::failed_simple("staged file missing"))
                    } else {
                        Ok(())
                    }
                }
            })
            .await
            .unwrap_err();

        match err {
            JobError::Failed { message, details } => {
                assert!(message.contains("2 object(s) failed"));
                let details = details.unwrap();
                assert!(details.contains(objects[1].as_str()));
                assert!(details.contains(objects[3].as_str()));
            }
            other => panic!("expected Failed, got {:?}", other),
        }

        let job = store.get_job(&ctx.job_id).await.unwrap().unwrap();
        assert_eq!(job.incr_completion, 2, "good objects still completed");
    }

    #[tokio::test]
    async fn test_pause_interrupts_at_object_boundary() {
        let (ctx, store) = context(1).await;
        let objects = objects(8);
        let deposit_id = ctx.deposit_id.as_str().to_string();
        let pause_after = 2usize;
        let counter = Arc::new(AtomicUsize::new(0));

        let runner = ObjectTaskRunner::new(&ctx, FailurePolicy::FailFast);
        let c = counter.clone();
        let s = store.clone();
        let err = runner
            .run(&ctx, &objects, move |_| {
                let c = c.clone();
                let s = s.clone();
                let deposit_id = deposit_id.clone();
                async move {
                    let n = c.fetch_add(1, Ordering::SeqCst) + 1;
                    if n == pause_after {
                        s.set_state(&deposit_id, DepositState::Paused)
                            .await
                            .unwrap();
                    }
                    Ok(())
                }
            })
            .await
            .unwrap_err();

        assert!(err.is_resumable());
        // Dispatch stopped within one object of the pause request.
        assert!(counter.load(Ordering::SeqCst) <= pause_after + 1);

        // In-flight completions before the pause were still accounted.
        let job = store.get_job(&ctx.job_id).await.unwrap().unwrap();
        assert_eq!(job.incr_completion as usize, counter.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_interrupt_then_resume_completes_each_object_exactly_once() {
        let (ctx, store) = context(1).await;
        let objects = objects(6);

        // First run: pause after the second object.
        let counter = Arc::new(AtomicUsize::new(0));
        let runner = ObjectTaskRunner::new(&ctx, FailurePolicy::FailFast);
        let c = counter.clone();
        let s = store.clone();
        let deposit_id = ctx.deposit_id.as_str().to_string();
        let err = runner
            .run(&ctx, &objects, move |_| {
                let c = c.clone();
                let s = s.clone();
                let deposit_id = deposit_id.clone();
                async move {
                    if c.fetch_add(1, Ordering::SeqCst) + 1 == 2 {
                        s.set_state(&deposit_id, DepositState::Paused)
                            .await
                            .unwrap();
                    }
                    Ok(())
                }
            })
            .await
            .unwrap_err();
        assert!(err.is_resumable());
        let first_run = counter.load(Ordering::SeqCst);

        // Operator resumes the deposit.
        store
            .set_state(ctx.deposit_id.as_str(), DepositState::Running)
            .await
            .unwrap();

        // Second run over the same objects.
        let second = Arc::new(AtomicUsize::new(0));
        let c = second.clone();
        runner
            .run(&ctx, &objects, move |_| {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            })
            .await
            .unwrap();

        // Exactly once in total across the two runs combined.
        assert_eq!(first_run + second.load(Ordering::SeqCst), 6);
        let job = store.get_job(&ctx.job_id).await.unwrap().unwrap();
        assert_eq!(job.incr_completion, 6);
        assert_eq!(job.total_completion, 6);
    }
}
