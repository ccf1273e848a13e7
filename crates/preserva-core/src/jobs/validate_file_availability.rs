// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! File availability validation job.
//!
//! Confirms every staged file referenced by the graph exists and is
//! readable before any job tries to open it. All missing or unreadable
//! paths are collected into one aggregated failure.

use std::fs::File;
use std::path::Path;

use async_trait::async_trait;
use tracing::{info, instrument};

use crate::error::{Result, ValidationReport};
use crate::job::{DepositJob, JobContext};

use super::staged_files;

const KIND_AVAILABILITY: &str = "file availability";

/// Check that every staging location resolves to a readable file.
#[derive(Debug, Default)]
pub struct ValidateFileAvailabilityJob;

impl ValidateFileAvailabilityJob {
    /// Create the job.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DepositJob for ValidateFileAvailabilityJob {
    fn name(&self) -> &'static str {
        "validate file availability"
    }

    #[instrument(skip_all, fields(deposit_id = %ctx.deposit_id))]
    async fn run(&self, ctx: &JobContext) -> Result<()> {
        ctx.register(self.name()).await?;
        let graph = ctx.graphs.open_read_only(&ctx.deposit_id)?;

        let mut report = ValidationReport::new();
        for (datastream, entry) in staged_files(ctx, &graph) {
            if let Some(reason) = probe(&entry.path) {
                report.add(
                    datastream.as_str(),
                    KIND_AVAILABILITY,
                    format!("{}: {}", entry.staging, reason),
                );
            }
        }

        info!(violations = report.len(), "file availability validated");
        report.into_result(self.name())
    }
}

/// Returns a reason string when the path is not an available file.
fn probe(path: &Path) -> Option<String> {
    match File::open(path) {
        Ok(_) => match path.is_file() {
            true => None,
            false => Some("not a regular file".to_string()),
        },
        Err(e) => Some(e.to_string()),
    }
}
