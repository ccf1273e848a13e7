// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Preserva Core - Deposit Job Engine
//!
//! This crate runs deposit pipelines: ordered sequences of resumable jobs
//! over the shared on-disk deposit graph from `preserva-model`, with
//! workflow and per-job progress persisted to SQLite for crash resilience.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                    DepositPipeline                         │
//! │   destination → content model → file availability →        │
//! │   fixity → virus scan → technical metadata                 │
//! └────────────────────────────────────────────────────────────┘
//!          │                                  │
//!          │ per-object fan-out               │ state / progress
//!          ▼                                  ▼
//! ┌───────────────────────┐       ┌───────────────────────────┐
//! │   ObjectTaskRunner    │       │   Status registries        │
//! │  bounded worker pool  │       │  (SQLite or in-memory)     │
//! │  pause/cancel polling │       │  deposit state, counters,  │
//! │  completed-set skip   │       │  per-object completed-set  │
//! └───────────────────────┘       └───────────────────────────┘
//!          │
//!          ▼
//! ┌───────────────────────┐       ┌───────────────────────────┐
//! │  External services    │       │   preserva-model           │
//! │  FITS servlet (HTTP)  │       │  deposit graph, PREMIS     │
//! │  clamd (TCP)          │       │  event log, staging layout │
//! └───────────────────────┘       └───────────────────────────┘
//! ```
//!
//! # Job exit semantics
//!
//! | Outcome | Meaning |
//! |---------|---------|
//! | `Ok(())` | Job finished; pipeline moves on |
//! | [`JobError::Interrupted`] | Pause/cancel detected; deposit is resumable |
//! | [`JobError::Failed`] | Content problem; details recorded on the deposit |
//! | [`JobError::Repository`] | Infrastructure problem (database, scanner, panic) |
//!
//! Jobs are re-entrant: resuming a deposit reruns the sequence, and each
//! job skips objects already in its completed-set, so no PREMIS event or
//! completion increment is ever duplicated for completed objects.
//!
//! [`JobError::Interrupted`]: crate::error::JobError::Interrupted
//! [`JobError::Failed`]: crate::error::JobError::Failed
//! [`JobError::Repository`]: crate::error::JobError::Repository

#![deny(missing_docs)]

pub mod config;
pub mod error;
pub mod job;
pub mod jobs;
pub mod paths;
pub mod pipeline;
pub mod registry;
pub mod runner;
pub mod services;
