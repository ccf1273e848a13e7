// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Fixity check job against a real on-disk deposit.

mod common;

use common::{provide_digest, TestDeposit};

use preserva_core::error::JobError;
use preserva_core::job::DepositJob;
use preserva_core::jobs::FixityCheckJob;
use preserva_core::registry::JobStatusStore;
use preserva_model::premis::PremisEventType;
use preserva_model::vocab::{MD5_SUM, SHA1_SUM};

const HELLO_SHA1: &str = "2aae6c35c94fcfb415dbe95f408b9ce91ee846ed";
const HELLO_MD5: &str = "5eb63bbbe01eeed093cb22bb8f5acdc3";

#[tokio::test]
async fn test_matching_provided_digest_coexists_with_computed() {
    let t = TestDeposit::new().await;
    let mut graph = t.graphs.open_writable(&t.deposit).unwrap();
    let (file_object, datastream) = t.stage_file(&mut graph, "hello.txt", b"hello world");
    // Uppercase on purpose: comparison is case-insensitive.
    provide_digest(&mut graph, &datastream, "sha1", &HELLO_SHA1.to_uppercase());
    t.save(&graph);

    let ctx = t.ctx("fixity check");
    FixityCheckJob::new().run(&ctx).await.unwrap();

    let graph = t.graphs.open_read_only(&t.deposit).unwrap();
    // Provided SHA-1 kept, MD5 computed and added alongside it.
    assert_eq!(
        graph.first_object(&datastream, SHA1_SUM),
        Some(HELLO_SHA1.to_uppercase().as_str())
    );
    assert_eq!(graph.first_object(&datastream, MD5_SUM), Some(HELLO_MD5));

    let events = ctx.premis.events_for(&file_object).unwrap();
    assert!(events
        .iter()
        .any(|e| e.event_type == PremisEventType::MessageDigestCalculation && e.outcome));

    let job = t.store.get_job(&ctx.job_id).await.unwrap().unwrap();
    assert_eq!(job.total_completion, 1);
    assert_eq!(job.incr_completion, 1);
}

#[tokio::test]
async fn test_provided_md5_is_recomputed_and_verified() {
    let t = TestDeposit::new().await;
    let mut graph = t.graphs.open_writable(&t.deposit).unwrap();
    let (file_object, datastream) = t.stage_file(&mut graph, "hello.txt", b"hello world");
    provide_digest(&mut graph, &datastream, "md5", &HELLO_MD5.to_uppercase());
    t.save(&graph);

    let ctx = t.ctx("fixity check");
    FixityCheckJob::new().run(&ctx).await.unwrap();

    let graph = t.graphs.open_read_only(&t.deposit).unwrap();
    // Provided MD5 kept as-is, SHA-1 computed and added alongside it.
    assert_eq!(
        graph.first_object(&datastream, MD5_SUM),
        Some(HELLO_MD5.to_uppercase().as_str())
    );
    assert_eq!(graph.first_object(&datastream, SHA1_SUM), Some(HELLO_SHA1));

    // Both algorithms leave an event; the provided one is marked verified.
    let events = ctx.premis.events_for(&file_object).unwrap();
    let digests: Vec<_> = events
        .iter()
        .filter(|e| e.event_type == PremisEventType::MessageDigestCalculation)
        .collect();
    assert_eq!(digests.len(), 2);
    assert!(digests.iter().any(|e| e.detail.contains("MD5")
        && e.outcome_note.as_deref() == Some("verified against depositor-provided value")));
}

#[tokio::test]
async fn test_mismatch_fails_naming_algorithm_and_path() {
    let t = TestDeposit::new().await;
    let mut graph = t.graphs.open_writable(&t.deposit).unwrap();
    let (_file_object, datastream) = t.stage_file(&mut graph, "hello.txt", b"hello world");
    provide_digest(&mut graph, &datastream, "md5", "d41d8cd98f00b204e9800998ecf8427e");
    t.save(&graph);

    let ctx = t.ctx("fixity check");
    let err = FixityCheckJob::new().run(&ctx).await.unwrap_err();
    let message = err.to_string();
    assert!(matches!(err, JobError::Failed { .. }));
    assert!(message.contains("MD5"), "message: {message}");
    assert!(message.contains("hello.txt"), "message: {message}");
}

#[tokio::test]
async fn test_missing_staged_file_is_fatal() {
    let t = TestDeposit::new().await;
    let mut graph = t.graphs.open_writable(&t.deposit).unwrap();
    let (_file_object, datastream) = t.stage_file(&mut graph, "present.txt", b"data");
    // Point the datastream somewhere that does not exist.
    graph.set_single(
        &datastream,
        preserva_model::vocab::STAGING_LOCATION,
        "vanished.txt",
    );
    t.save(&graph);

    let ctx = t.ctx("fixity check");
    let err = FixityCheckJob::new().run(&ctx).await.unwrap_err();
    assert!(matches!(err, JobError::Failed { .. }));
}

#[tokio::test]
async fn test_rerun_skips_completed_objects_without_new_events() {
    let t = TestDeposit::new().await;
    let mut graph = t.graphs.open_writable(&t.deposit).unwrap();
    let (file_object, _datastream) = t.stage_file(&mut graph, "hello.txt", b"hello world");
    t.save(&graph);

    let ctx = t.ctx("fixity check");
    FixityCheckJob::new().run(&ctx).await.unwrap();
    let after_first = ctx.premis.events_for(&file_object).unwrap().len();

    FixityCheckJob::new().run(&ctx).await.unwrap();
    let after_second = ctx.premis.events_for(&file_object).unwrap().len();
    assert_eq!(after_first, after_second);

    let job = t.store.get_job(&ctx.job_id).await.unwrap().unwrap();
    assert_eq!(job.incr_completion, 1);
}
