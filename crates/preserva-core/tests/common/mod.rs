// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Shared fixtures for the integration tests.

// Not every test binary uses every helper.
#![allow(dead_code)]

use std::sync::Arc;

use preserva_core::job::{JobContext, JobOptions};
use preserva_core::registry::{DepositState, DepositStatusStore, MemoryStatusStore, NewDeposit};
use preserva_model::graph::DepositGraph;
use preserva_model::pid::{Pid, ORIGINAL_FILE};
use preserva_model::store::GraphStore;
use preserva_model::vocab::{ResourceType, MD5_SUM, MIMETYPE, SHA1_SUM, STAGING_LOCATION};

/// One deposit in a temporary directory with in-memory registries, ready
/// for jobs to run against.
pub struct TestDeposit {
    pub graphs: Arc<GraphStore>,
    pub store: Arc<MemoryStatusStore>,
    pub deposit: Pid,
    _dir: tempfile::TempDir,
}

impl TestDeposit {
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let graphs = Arc::new(GraphStore::new(dir.path()).unwrap());
        let store = Arc::new(MemoryStatusStore::new());
        let deposit = Pid::new();
        graphs.create(&deposit).unwrap();
        store
            .register_deposit(
                deposit.as_str(),
                &NewDeposit {
                    destination: Some(Pid::new().as_str().to_string()),
                    destination_type: Some("Collection".to_string()),
                    depositor: Some("tester".to_string()),
                    permission_groups: None,
                },
            )
            .await
            .unwrap();
        store
            .set_state(deposit.as_str(), DepositState::Running)
            .await
            .unwrap();
        Self {
            graphs,
            store,
            deposit,
            _dir: dir,
        }
    }

    /// Build a job context the way the pipeline does.
    pub fn ctx(&self, job_name: &str) -> JobContext {
        JobContext::new(
            self.deposit.clone(),
            job_name,
            self.graphs.clone(),
            self.store.clone(),
            self.store.clone(),
            JobOptions::default(),
        )
    }

    /// Build a job context with custom tuning, for tests that need a
    /// deterministic single worker.
    pub fn ctx_with(&self, job_name: &str, options: JobOptions) -> JobContext {
        JobContext::new(
            self.deposit.clone(),
            job_name,
            self.graphs.clone(),
            self.store.clone(),
            self.store.clone(),
            options,
        )
    }

    /// Stage one file under a fresh Work: writes `content` into the data
    /// directory and wires a FileObject with an originalFile datastream
    /// pointing at it. Returns (FileObject pid, datastream pid).
    pub fn stage_file(
        &self,
        graph: &mut DepositGraph,
        name: &str,
        content: &[u8],
    ) -> (Pid, Pid) {
        let data_dir = self.graphs.data_dir(&self.deposit);
        std::fs::create_dir_all(&data_dir).unwrap();
        std::fs::write(data_dir.join(name), content).unwrap();

        let root = graph.root().clone();
        let work = Pid::new();
        graph.set_type(&work, ResourceType::Work);
        graph.add_child(&root, &work);
        let file_object = Pid::new();
        graph.set_type(&file_object, ResourceType::FileObject);
        graph.add_child(&work, &file_object);
        let datastream = graph.add_datastream(&file_object, ORIGINAL_FILE);
        graph.add(&datastream, STAGING_LOCATION, name);
        (file_object, datastream)
    }

    /// Persist the graph.
    pub fn save(&self, graph: &DepositGraph) {
        self.graphs.save(&self.deposit, graph).unwrap();
    }
}

/// Record a depositor-provided digest on a datastream.
pub fn provide_digest(graph: &mut DepositGraph, datastream: &Pid, algorithm: &str, value: &str) {
    match algorithm {
        "md5" => graph.add(datastream, MD5_SUM, value),
        "sha1" => graph.add(datastream, SHA1_SUM, value),
        other => panic!("unknown algorithm {other}"),
    }
}

/// Record a depositor-provided mimetype on a datastream.
pub fn provide_mimetype(graph: &mut DepositGraph, datastream: &Pid, mimetype: &str) {
    graph.add(datastream, MIMETYPE, mimetype);
}
