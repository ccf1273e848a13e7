// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The deposit jobs.
//!
//! Each job is one pipeline step over the shared deposit graph. File-level
//! jobs fan out over FileObjects through the
//! [task runner](crate::runner::ObjectTaskRunner); validation jobs are pure
//! single-threaded graph traversals that collect every violation before
//! failing.

pub mod fixity;
pub mod technical_metadata;
pub mod validate_content_model;
pub mod validate_destination;
pub mod validate_file_availability;
pub mod virus_scan;

pub use fixity::FixityCheckJob;
pub use technical_metadata::ExtractTechnicalMetadataJob;
pub use validate_content_model::ValidateContentModelJob;
pub use validate_destination::ValidateDestinationJob;
pub use validate_file_availability::ValidateFileAvailabilityJob;
pub use virus_scan::VirusScanJob;

use std::path::PathBuf;

use preserva_model::graph::DepositGraph;
use preserva_model::pid::{Pid, ORIGINAL_FILE};
use preserva_model::store::resolve_staging_location;
use preserva_model::vocab::{MD5_SUM, MIMETYPE, SHA1_SUM, STAGING_LOCATION};

use crate::error::{JobError, Result};
use crate::job::JobContext;

/// One staged file eligible for file-level work, keyed by its
/// originalFile datastream pid.
#[derive(Debug, Clone)]
pub(crate) struct StagedFile {
    /// The FileObject owning the datastream.
    pub file_object: Pid,
    /// Staging location as recorded in the graph.
    pub staging: String,
    /// Resolved absolute path of the staged content.
    pub path: PathBuf,
    /// Client-provided MD5, if any.
    pub md5: Option<String>,
    /// Client-provided SHA-1, if any.
    pub sha1: Option<String>,
    /// Client-provided mimetype, if any.
    pub mimetype: Option<String>,
}

/// Collect the staged originalFile datastreams of every FileObject, in
/// graph order. FileObjects without a staged datastream are skipped; they
/// carry nothing to digest, scan, or characterize.
pub(crate) fn staged_files(
    ctx: &JobContext,
    graph: &DepositGraph,
) -> Vec<(Pid, StagedFile)> {
    let data_dir = ctx.graphs.data_dir(&ctx.deposit_id);
    let mut out = Vec::new();
    for file_object in graph.file_objects() {
        let Some(datastream) = graph.datastream(&file_object, ORIGINAL_FILE) else {
            continue;
        };
        let Some(staging) = graph.first_object(&datastream, STAGING_LOCATION) else {
            continue;
        };
        let entry = StagedFile {
            file_object: file_object.clone(),
            staging: staging.to_string(),
            path: resolve_staging_location(&data_dir, staging),
            md5: graph.first_object(&datastream, MD5_SUM).map(str::to_string),
            sha1: graph
                .first_object(&datastream, SHA1_SUM)
                .map(str::to_string),
            mimetype: graph
                .first_object(&datastream, MIMETYPE)
                .map(str::to_string),
        };
        out.push((datastream, entry));
    }
    out
}

/// Look up a dispatched object in the per-job staged-file table.
pub(crate) fn staged_entry<'a>(
    table: &'a std::collections::HashMap<Pid, StagedFile>,
    object: &Pid,
) -> Result<&'a StagedFile> {
    table.get(object).ok_or_else(|| {
        JobError::repository(
            "staged file lookup",
            format!("no staged file recorded for '{}'", object),
        )
    })
}
