// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Destination validation job.
//!
//! The deposit record names a destination container in the repository;
//! every top-level object of the deposit must be admissible under that
//! container's type. Violations are collected across all top-level
//! objects, never fail-fast.

use async_trait::async_trait;
use tracing::{info, instrument};

use preserva_model::graph::DepositGraph;
use preserva_model::vocab::ResourceType;

use crate::error::{JobError, Result, ValidationReport};
use crate::job::{DepositJob, JobContext};

const KIND_DESTINATION: &str = "destination";

/// Check that the destination container admits the deposit's top-level
/// objects.
#[derive(Debug, Default)]
pub struct ValidateDestinationJob;

impl ValidateDestinationJob {
    /// Create the job.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DepositJob for ValidateDestinationJob {
    fn name(&self) -> &'static str {
        "validate destination"
    }

    #[instrument(skip_all, fields(deposit_id = %ctx.deposit_id))]
    async fn run(&self, ctx: &JobContext) -> Result<()> {
        ctx.register(self.name()).await?;

        let record = ctx
            .deposit_status
            .get_deposit(ctx.deposit_id.as_str())
            .await?
            .ok_or_else(|| {
                JobError::repository(
                    "deposit lookup",
                    format!("deposit '{}' is not registered", ctx.deposit_id),
                )
            })?;
        let destination_type = record.destination_type.as_deref().ok_or_else(|| {
            JobError::failed_simple(format!(
                "deposit '{}' has no destination type recorded",
                ctx.deposit_id
            ))
        })?;
        let destination_type = ResourceType::parse(destination_type).ok_or_else(|| {
            JobError::failed_simple(format!(
                "unrecognized destination type '{}'",
                destination_type
            ))
        })?;

        let graph = ctx.graphs.open_read_only(&ctx.deposit_id)?;
        let report = validate(&graph, destination_type);
        info!(
            destination_type = destination_type.as_str(),
            violations = report.len(),
            "destination validated"
        );
        report.into_result(self.name())
    }
}

pub(crate) fn validate(graph: &DepositGraph, destination: ResourceType) -> ValidationReport {
    let mut report = ValidationReport::new();
    for top in graph.children(graph.root()) {
        match graph.resource_type(&top) {
            Some(top_type) if destination.can_contain(top_type) => {}
            Some(top_type) => report.add(
                top.as_str(),
                KIND_DESTINATION,
                format!(
                    "{} cannot be deposited into a {} destination",
                    top_type.as_str(),
                    destination.as_str()
                ),
            ),
            None => report.add(
                top.as_str(),
                KIND_DESTINATION,
                "top-level object has no recognizable type",
            ),
        }
    }
    report
}
