// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Virus scan job.
//!
//! Scans every staged file through the configured [`VirusScanner`]. A FOUND
//! result fails the whole deposit immediately: no completion increment and
//! no PREMIS event is recorded for the infected file or anything dispatched
//! after it, while files that passed beforehand keep their PASSED events
//! and increments. Scanner-side errors are infrastructure failures, not
//! content failures. An unclassifiable reply is retried once; clamd
//! occasionally drops a reply mid-reload.
//!
//! Files stream to the scanner by default. When the daemon is co-located
//! with the deposit filesystem ([`with_local_paths`](VirusScanJob::with_local_paths)),
//! the job sends paths instead and the daemon reads the files itself.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, instrument, warn};

use preserva_model::pid::Pid;
use preserva_model::premis::{PremisAgent, PremisEvent, PremisEventType};

use crate::error::{JobError, Result};
use crate::job::{DepositJob, JobContext};
use crate::runner::{FailurePolicy, ObjectTaskRunner};
use crate::services::{ScanOutcome, VirusScanner};

use super::{staged_entry, staged_files, StagedFile};

/// Scan every staged file for threats before ingest.
pub struct VirusScanJob {
    scanner: Arc<dyn VirusScanner>,
    local_paths: bool,
}

impl VirusScanJob {
    /// Create the job around a scanner transport. Files are streamed.
    pub fn new(scanner: Arc<dyn VirusScanner>) -> Self {
        Self {
            scanner,
            local_paths: false,
        }
    }

    /// Send paths instead of streaming; only correct when the scanner
    /// daemon can read the deposit filesystem directly.
    pub fn with_local_paths(mut self) -> Self {
        self.local_paths = true;
        self
    }
}

#[async_trait]
impl DepositJob for VirusScanJob {
    fn name(&self) -> &'static str {
        "virus scan"
    }

    #[instrument(skip_all, fields(deposit_id = %ctx.deposit_id))]
    async fn run(&self, ctx: &JobContext) -> Result<()> {
        ctx.register(self.name()).await?;
        let graph = ctx.graphs.open_read_only(&ctx.deposit_id)?;

        let staged = staged_files(ctx, &graph);
        let objects: Vec<Pid> = staged.iter().map(|(pid, _)| pid.clone()).collect();
        let table: Arc<HashMap<Pid, StagedFile>> = Arc::new(staged.into_iter().collect());

        let runner = ObjectTaskRunner::new(ctx, FailurePolicy::FailFast);
        let scanner = self.scanner.clone();
        let local_paths = self.local_paths;
        let premis = ctx.premis.clone();
        runner
            .run(ctx, &objects, move |object| {
                let table = table.clone();
                let scanner = scanner.clone();
                let premis = premis.clone();
                async move {
                    let entry = staged_entry(&table, &object)?.clone();
                    let outcome = scan_with_retry(scanner.as_ref(), &entry, local_paths).await?;
                    match outcome {
                        ScanOutcome::Passed => {
                            let event = PremisEvent::success(
                                PremisEventType::VirusCheck,
                                format!("File passed pre-ingest scan: {}", entry.staging),
                            )
                            .with_agent(PremisAgent::ClamAv);
                            premis.write_event(&entry.file_object, &event)?;
                            Ok(())
                        }
                        ScanOutcome::Found { signature } => Err(JobError::failed(
                            format!("Virus signature detected in {}", entry.staging),
                            format!(
                                "object: {}\npath: {}\nsignature: {}",
                                object, entry.staging, signature
                            ),
                        )),
                        ScanOutcome::Error { detail } => Err(JobError::repository(
                            "virus scan",
                            format!("scanner error for {}: {}", entry.staging, detail),
                        )),
                        ScanOutcome::Unidentified => Err(JobError::repository(
                            "virus scan",
                            format!("unclassifiable scanner reply for {}", entry.staging),
                        )),
                    }
                }
            })
            .await?;

        info!(files = objects.len(), "virus scan complete");
        Ok(())
    }
}

/// Scan once, retrying a single time on an unclassifiable reply.
async fn scan_with_retry(
    scanner: &dyn VirusScanner,
    entry: &StagedFile,
    local_paths: bool,
) -> Result<ScanOutcome> {
    let first = scan(scanner, entry, local_paths).await?;
    if first != ScanOutcome::Unidentified {
        return Ok(first);
    }
    warn!(path = %entry.path.display(), "unclassifiable scanner reply, retrying once");
    scan(scanner, entry, local_paths).await
}

async fn scan(
    scanner: &dyn VirusScanner,
    entry: &StagedFile,
    local_paths: bool,
) -> Result<ScanOutcome> {
    if local_paths {
        scanner.scan_path(&entry.path).await
    } else {
        scanner.scan_stream(&entry.path).await
    }
}
