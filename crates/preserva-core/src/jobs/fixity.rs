// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Fixity check job.
//!
//! Computes SHA-1 and MD5 digests for every staged file in a single read
//! pass. Computed digests are compared case-insensitively against any
//! depositor-provided values; a mismatch fails the whole deposit. Digests
//! the depositor did not provide are written back into the graph by the
//! single-threaded post phase, so parallel workers never touch shared
//! graph state.

use std::collections::HashMap;
use std::io::Read;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use md5::Md5;
use sha1::{Digest, Sha1};
use tracing::{info, instrument};

use preserva_model::pid::Pid;
use preserva_model::premis::{PremisAgent, PremisEvent, PremisEventType};
use preserva_model::vocab::{MD5_SUM, SHA1_SUM};

use crate::error::{JobError, Result};
use crate::job::{DepositJob, JobContext};
use crate::runner::{FailurePolicy, ObjectTaskRunner};

use super::{staged_entry, staged_files, StagedFile};

/// Digests computed for one staged file.
#[derive(Debug, Clone)]
struct ComputedDigests {
    sha1: String,
    md5: String,
}

/// Verify and record content digests for every staged file.
#[derive(Debug, Default)]
pub struct FixityCheckJob;

impl FixityCheckJob {
    /// Create the job.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DepositJob for FixityCheckJob {
    fn name(&self) -> &'static str {
        "fixity check"
    }

    #[instrument(skip_all, fields(deposit_id = %ctx.deposit_id))]
    async fn run(&self, ctx: &JobContext) -> Result<()> {
        ctx.register(self.name()).await?;
        let mut graph = ctx.graphs.open_writable(&ctx.deposit_id)?;

        let staged = staged_files(ctx, &graph);
        let objects: Vec<Pid> = staged.iter().map(|(pid, _)| pid.clone()).collect();
        let table: HashMap<Pid, StagedFile> = staged.into_iter().collect();

        let results: Arc<Mutex<Vec<(Pid, ComputedDigests)>>> = Arc::new(Mutex::new(Vec::new()));
        let table = Arc::new(table);

        let runner = ObjectTaskRunner::new(ctx, FailurePolicy::FailFast);
        let outcome = {
            let premis = ctx.premis.clone();
            let task_table = table.clone();
            let task_results = results.clone();
            runner
                .run(ctx, &objects, move |object| {
                    let table = task_table.clone();
                    let results = task_results.clone();
                    let premis = premis.clone();
                    async move {
                        let entry = staged_entry(&table, &object)?.clone();
                        let computed = digest_file(&entry.path).await?;

                        verify(&object, &entry, &computed)?;

                        let mut event = PremisEvent::success(
                            PremisEventType::MessageDigestCalculation,
                            format!("SHA1 checksum calculated: {}", computed.sha1),
                        )
                        .with_agent(PremisAgent::DepositService);
                        if entry.sha1.is_some() {
                            event = event.with_note("verified against depositor-provided value");
                        }
                        premis.write_event(&entry.file_object, &event)?;

                        let mut event = PremisEvent::success(
                            PremisEventType::MessageDigestCalculation,
                            format!("MD5 checksum calculated: {}", computed.md5),
                        )
                        .with_agent(PremisAgent::DepositService);
                        if entry.md5.is_some() {
                            event = event.with_note("verified against depositor-provided value");
                        }
                        premis.write_event(&entry.file_object, &event)?;

                        results
                            .lock()
                            .map_err(|_| {
                                JobError::repository("fixity results", "results mutex poisoned")
                            })?
                            .push((object, computed));
                        Ok(())
                    }
                })
                .await
        };

        // Persist digests for every object that finished, even when the run
        // was interrupted or failed partway; completed objects are skipped
        // on resume and would otherwise never get their triples.
        let collected = results
            .lock()
            .map_err(|_| JobError::repository("fixity results", "results mutex poisoned"))?
            .clone();
        for (datastream, computed) in &collected {
            if graph.first_object(datastream, SHA1_SUM).is_none() {
                graph.add(datastream, SHA1_SUM, &computed.sha1);
            }
            if graph.first_object(datastream, MD5_SUM).is_none() {
                graph.add(datastream, MD5_SUM, &computed.md5);
            }
        }
        ctx.graphs.save(&ctx.deposit_id, &graph)?;

        outcome?;
        info!(files = collected.len(), "fixity check complete");
        Ok(())
    }
}

/// Compare computed digests against depositor-provided values.
fn verify(object: &Pid, entry: &StagedFile, computed: &ComputedDigests) -> Result<()> {
    if let Some(provided) = &entry.sha1
        && !provided.eq_ignore_ascii_case(&computed.sha1)
    {
        return Err(mismatch(object, entry, "SHA1", provided, &computed.sha1));
    }
    if let Some(provided) = &entry.md5
        && !provided.eq_ignore_ascii_case(&computed.md5)
    {
        return Err(mismatch(object, entry, "MD5", provided, &computed.md5));
    }
    Ok(())
}

fn mismatch(
    object: &Pid,
    entry: &StagedFile,
    algorithm: &str,
    provided: &str,
    computed: &str,
) -> JobError {
    JobError::failed(
        format!("{} fixity mismatch for {}", algorithm, entry.staging),
        format!(
            "object: {}\nalgorithm: {}\npath: {}\nprovided: {}\ncomputed: {}",
            object, algorithm, entry.staging, provided, computed
        ),
    )
}

/// Digest a file in one read pass, off the async runtime.
async fn digest_file(path: &Path) -> Result<ComputedDigests> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || -> Result<ComputedDigests> {
        let mut file = std::fs::File::open(&path).map_err(|e| {
            JobError::failed_simple(format!("cannot read staged file {}: {}", path.display(), e))
        })?;
        let mut sha1 = Sha1::new();
        let mut md5 = Md5::new();
        let mut buf = [0u8; 64 * 1024];
        loop {
            let n = file.read(&mut buf).map_err(|e| {
                JobError::failed_simple(format!("read {}: {}", path.display(), e))
            })?;
            if n == 0 {
                break;
            }
            sha1.update(&buf[..n]);
            md5.update(&buf[..n]);
        }
        Ok(ComputedDigests {
            sha1: hex(&sha1.finalize()),
            md5: hex(&md5.finalize()),
        })
    })
    .await
    .map_err(|e| JobError::repository("digest computation", e.to_string()))?
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_digest_known_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hello.txt");
        std::fs::write(&path, b"hello world").unwrap();

        let digests = digest_file(&path).await.unwrap();
        assert_eq!(digests.sha1, "2aae6c35c94fcfb415dbe95f408b9ce91ee846ed");
        assert_eq!(digests.md5, "5eb63bbbe01eeed093cb22bb8f5acdc3");
    }

    #[test]
    fn test_verify_is_case_insensitive() {
        let entry = StagedFile {
            file_object: Pid::new(),
            staging: "data/hello.txt".to_string(),
            path: "data/hello.txt".into(),
            md5: None,
            sha1: Some("2AAE6C35C94FCFB415DBE95F408B9CE91EE846ED".to_string()),
            mimetype: None,
        };
        let computed = ComputedDigests {
            sha1: "2aae6c35c94fcfb415dbe95f408b9ce91ee846ed".to_string(),
            md5: "5eb63bbbe01eeed093cb22bb8f5acdc3".to_string(),
        };
        assert!(verify(&Pid::new(), &entry, &computed).is_ok());
    }

    #[test]
    fn test_verify_rejects_wrong_provided_md5() {
        let entry = StagedFile {
            file_object: Pid::new(),
            staging: "data/hello.txt".to_string(),
            path: "data/hello.txt".into(),
            md5: Some("d41d8cd98f00b204e9800998ecf8427e".to_string()),
            sha1: None,
            mimetype: None,
        };
        let computed = ComputedDigests {
            sha1: "2aae6c35c94fcfb415dbe95f408b9ce91ee846ed".to_string(),
            md5: "5eb63bbbe01eeed093cb22bb8f5acdc3".to_string(),
        };
        let err = verify(&Pid::new(), &entry, &computed).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("MD5"), "message: {message}");
        assert!(message.contains("data/hello.txt"), "message: {message}");
    }

    #[test]
    fn test_mismatch_names_algorithm_and_path() {
        let entry = StagedFile {
            file_object: Pid::new(),
            staging: "data/hello.txt".to_string(),
            path: "data/hello.txt".into(),
            md5: None,
            sha1: Some("deadbeef".to_string()),
            mimetype: None,
        };
        let computed = ComputedDigests {
            sha1: "2aae6c35c94fcfb415dbe95f408b9ce91ee846ed".to_string(),
            md5: "5eb63bbbe01eeed093cb22bb8f5acdc3".to_string(),
        };
        let err = verify(&Pid::new(), &entry, &computed).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("SHA1"), "message: {message}");
        assert!(message.contains("data/hello.txt"), "message: {message}");
    }
}
