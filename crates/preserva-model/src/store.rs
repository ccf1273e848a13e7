// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! File-backed graph persistence.
//!
//! Each deposit owns one directory under the deposits root:
//!
//! ```text
//! <deposits>/<deposit-pid>/
//!     model.jsonl     one serialized triple per line
//!     events/         PREMIS event log, one file per object
//!     techmd/         technical metadata reports, one file per FileObject
//!     data/           staged content (populated by normalization)
//! ```
//!
//! The model file is the single source of truth for an in-flight deposit.
//! Saves go through a temp sibling and an atomic rename so an interrupted
//! process never leaves a half-written graph; the graph is created once per
//! deposit and never torn down mid-deposit.

use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::graph::{DepositGraph, Triple};
use crate::pid::Pid;
use crate::{ModelError, Result};

/// Name of the serialized graph file inside a deposit directory.
const MODEL_FILE: &str = "model.jsonl";

/// Per-deposit on-disk layout and graph load/save.
#[derive(Debug, Clone)]
pub struct GraphStore {
    deposits_dir: PathBuf,
}

impl GraphStore {
    /// Create a store rooted at the given deposits directory.
    ///
    /// The directory is created if it does not exist.
    pub fn new(deposits_dir: impl Into<PathBuf>) -> Result<Self> {
        let deposits_dir = deposits_dir.into();
        fs::create_dir_all(&deposits_dir)
            .map_err(|e| ModelError::io("create_dir", &deposits_dir, e))?;
        Ok(Self { deposits_dir })
    }

    /// Directory owned by one deposit. Created on first use.
    pub fn deposit_dir(&self, deposit: &Pid) -> PathBuf {
        self.deposits_dir.join(deposit.local_id())
    }

    /// Directory holding per-object PREMIS event logs.
    pub fn events_dir(&self, deposit: &Pid) -> PathBuf {
        self.deposit_dir(deposit).join("events")
    }

    /// Directory holding technical metadata reports.
    pub fn techmd_dir(&self, deposit: &Pid) -> PathBuf {
        self.deposit_dir(deposit).join("techmd")
    }

    /// Directory holding staged content.
    pub fn data_dir(&self, deposit: &Pid) -> PathBuf {
        self.deposit_dir(deposit).join("data")
    }

    fn model_path(&self, deposit: &Pid) -> PathBuf {
        self.deposit_dir(deposit).join(MODEL_FILE)
    }

    /// Whether a graph has been created for this deposit.
    pub fn exists(&self, deposit: &Pid) -> bool {
        self.model_path(deposit).is_file()
    }

    /// Initialize the deposit directory layout and persist a fresh graph.
    ///
    /// Idempotent: an existing graph is loaded instead of overwritten.
    pub fn create(&self, deposit: &Pid) -> Result<DepositGraph> {
        if self.exists(deposit) {
            return self.open_writable(deposit);
        }
        for dir in [
            self.deposit_dir(deposit),
            self.events_dir(deposit),
            self.techmd_dir(deposit),
            self.data_dir(deposit),
        ] {
            fs::create_dir_all(&dir).map_err(|e| ModelError::io("create_dir", &dir, e))?;
        }
        let graph = DepositGraph::new(deposit.clone());
        self.save(deposit, &graph)?;
        Ok(graph)
    }

    /// Load the deposit graph for mutation.
    pub fn open_writable(&self, deposit: &Pid) -> Result<DepositGraph> {
        self.load(deposit)
    }

    /// Load the deposit graph for read-only traversal.
    pub fn open_read_only(&self, deposit: &Pid) -> Result<DepositGraph> {
        self.load(deposit)
    }

    fn load(&self, deposit: &Pid) -> Result<DepositGraph> {
        let path = self.model_path(deposit);
        let file = fs::File::open(&path).map_err(|e| ModelError::io("read", &path, e))?;
        let reader = BufReader::new(file);
        let mut triples = Vec::new();
        for (idx, line) in reader.lines().enumerate() {
            let line = line.map_err(|e| ModelError::io("read", &path, e))?;
            if line.trim().is_empty() {
                continue;
            }
            let triple: Triple =
                serde_json::from_str(&line).map_err(|e| ModelError::Corrupt {
                    path: path.display().to_string(),
                    line: idx + 1,
                    details: e.to_string(),
                })?;
            triples.push(triple);
        }
        debug!(deposit_id = %deposit, triples = triples.len(), "Loaded deposit graph");
        Ok(DepositGraph::from_triples(deposit.clone(), triples))
    }

    /// Persist the graph, replacing the on-disk model atomically.
    pub fn save(&self, deposit: &Pid, graph: &DepositGraph) -> Result<()> {
        let path = self.model_path(deposit);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ModelError::io("create_dir", parent, e))?;
        }
        let tmp = path.with_extension("jsonl.tmp");
        {
            let mut file =
                fs::File::create(&tmp).map_err(|e| ModelError::io("write", &tmp, e))?;
            for triple in graph.triples() {
                let line = serde_json::to_string(&triple).map_err(|e| ModelError::Corrupt {
                    path: tmp.display().to_string(),
                    line: 0,
                    details: e.to_string(),
                })?;
                writeln!(file, "{}", line).map_err(|e| ModelError::io("write", &tmp, e))?;
            }
            file.sync_all().map_err(|e| ModelError::io("sync", &tmp, e))?;
        }
        fs::rename(&tmp, &path).map_err(|e| ModelError::io("rename", &path, e))?;
        debug!(deposit_id = %deposit, triples = graph.len(), "Saved deposit graph");
        Ok(())
    }
}

/// Join a staging location to an absolute path.
///
/// Staging locations are either absolute paths, `file://` URIs, or paths
/// relative to the deposit data directory.
pub fn resolve_staging_location(data_dir: &Path, staging: &str) -> PathBuf {
    if let Some(stripped) = staging.strip_prefix("file://") {
        return PathBuf::from(stripped);
    }
    let path = Path::new(staging);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        data_dir.join(path)
    }
}
