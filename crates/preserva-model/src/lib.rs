// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Preserva Model - Deposit Object Graph
//!
//! This crate provides the shared data model for one in-flight deposit: the
//! persistent identifiers that name repository objects, the fixed property
//! vocabulary, the file-backed triple graph that every deposit job reads and
//! mutates, and the append-only PREMIS provenance log.
//!
//! # The deposit graph
//!
//! A deposit is a tree of typed resources rooted at a [`DepositRecord`]:
//!
//! ```text
//! DepositRecord
//! └── Work
//!     ├── FileObject ── ORIGINAL_FILE datastream (stagingLocation, digests, mimetype)
//!     └── FileObject ── ORIGINAL_FILE datastream
//! ```
//!
//! Every content node reachable from the deposit root has exactly one parent
//! containment edge. `primaryObject`, `memberOrder` and `defaultWebObject`
//! are reference-only links and never count as containment.
//!
//! The graph is created once per deposit, mutated in place by every
//! subsequent job, and persisted after each job's unit of work via
//! [`store::GraphStore`]. It is the single source of truth across process
//! restarts and is never torn down mid-deposit.
//!
//! # Modules
//!
//! - [`pid`]: opaque persistent identifiers and qualified sub-resource ids
//! - [`vocab`]: property vocabulary and the resource type containment model
//! - [`graph`]: the in-memory triple graph with typed accessors
//! - [`store`]: per-deposit on-disk layout and graph load/save
//! - [`premis`]: append-only PREMIS event logging
//!
//! [`DepositRecord`]: vocab::ResourceType::DepositRecord

#![deny(missing_docs)]

/// Opaque persistent identifiers (PIDs) and qualified object ids.
pub mod pid;

/// Property vocabulary and resource type containment rules.
pub mod vocab;

/// In-memory triple graph with typed accessors and traversal.
pub mod graph;

/// File-backed graph persistence and per-deposit directory layout.
pub mod store;

/// Append-only PREMIS provenance event logging.
pub mod premis;

use std::fmt;

/// Result type using ModelError.
pub type Result<T> = std::result::Result<T, ModelError>;

/// Errors raised by model load/save and event logging.
#[derive(Debug)]
#[non_exhaustive]
pub enum ModelError {
    /// A PID string could not be parsed.
    InvalidPid {
        /// The rejected input.
        input: String,
    },

    /// A serialized triple or event line could not be decoded.
    Corrupt {
        /// Path of the offending file.
        path: String,
        /// Line number (1-based) where decoding failed.
        line: usize,
        /// Decoder error details.
        details: String,
    },

    /// Filesystem operation failed.
    Io {
        /// The operation that failed (read, write, rename, create_dir).
        operation: String,
        /// Path involved.
        path: String,
        /// Underlying error details.
        details: String,
    },
}

impl ModelError {
    pub(crate) fn io(operation: &str, path: impl AsRef<std::path::Path>, err: std::io::Error) -> Self {
        ModelError::Io {
            operation: operation.to_string(),
            path: path.as_ref().display().to_string(),
            details: err.to_string(),
        }
    }
}

impl fmt::Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidPid { input } => write!(f, "Invalid PID '{}'", input),
            Self::Corrupt {
                path,
                line,
                details,
            } => write!(f, "Corrupt model file {} at line {}: {}", path, line, details),
            Self::Io {
                operation,
                path,
                details,
            } => write!(f, "I/O error during '{}' on {}: {}", operation, path, details),
        }
    }
}

impl std::error::Error for ModelError {}
