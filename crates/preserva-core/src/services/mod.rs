// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Clients for the external services the jobs call out to.
//!
//! Both services sit behind traits so jobs can be tested without a running
//! FITS servlet or clamd daemon.

pub mod clamav;
pub mod fits;

pub use clamav::{ClamdScanner, ScanOutcome, VirusScanner};
pub use fits::{CharacterizationService, FitsHttpClient, FitsIdentity, FitsReport};
