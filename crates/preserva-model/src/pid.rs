// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Persistent identifiers.
//!
//! A [`Pid`] is an opaque, UUID-backed identifier naming one repository
//! object. Datastreams and other sub-resources are addressed by a qualified
//! id of the form `uuid:<v4>/<component>`; the qualified form is also the
//! key used by the job status registry's completed-object set.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ModelError;

/// Prefix used by the rendered form of every PID.
pub const PID_PREFIX: &str = "uuid:";

/// Component name of the original file datastream owned by a FileObject.
pub const ORIGINAL_FILE: &str = "originalFile";

/// Component name of the technical metadata datastream.
pub const TECHNICAL_METADATA: &str = "techmdFits";

/// An opaque persistent identifier for a repository object.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Pid(String);

impl Pid {
    /// Mint a fresh PID.
    pub fn new() -> Self {
        Pid(format!("{}{}", PID_PREFIX, Uuid::new_v4()))
    }

    /// Parse a PID from its rendered form (`uuid:<v4>` or `uuid:<v4>/<component>`).
    pub fn parse(input: &str) -> Result<Self, ModelError> {
        let rest = input
            .strip_prefix(PID_PREFIX)
            .ok_or_else(|| ModelError::InvalidPid {
                input: input.to_string(),
            })?;
        let base = rest.split('/').next().unwrap_or(rest);
        if Uuid::parse_str(base).is_err() {
            return Err(ModelError::InvalidPid {
                input: input.to_string(),
            });
        }
        Ok(Pid(input.to_string()))
    }

    /// The qualified id addressing a sub-resource of this object.
    ///
    /// Qualifying an already-qualified PID replaces the component.
    pub fn qualified(&self, component: &str) -> Pid {
        Pid(format!("{}/{}", self.base_str(), component))
    }

    /// The unqualified object PID (drops any sub-resource component).
    pub fn base(&self) -> Pid {
        Pid(self.base_str().to_string())
    }

    /// The sub-resource component, if this is a qualified id.
    pub fn component(&self) -> Option<&str> {
        self.0.split_once('/').map(|(_, c)| c)
    }

    /// The local identifier portion (UUID without prefix or component).
    ///
    /// Used by member-order values, which reference direct children by
    /// local id.
    pub fn local_id(&self) -> &str {
        let base = self.base_str();
        base.strip_prefix(PID_PREFIX).unwrap_or(base)
    }

    /// Borrow the rendered form.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn base_str(&self) -> &str {
        self.0.split('/').next().unwrap_or(&self.0)
    }
}

impl Default for Pid {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_pid_roundtrip() {
        let pid = Pid::new();
        let parsed = Pid::parse(pid.as_str()).unwrap();
        assert_eq!(pid, parsed);
        assert!(pid.as_str().starts_with(PID_PREFIX));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(Pid::parse("not-a-pid").is_err());
        assert!(Pid::parse("uuid:not-a-uuid").is_err());
        assert!(Pid::parse("").is_err());
    }

    #[test]
    fn test_qualified_and_base() {
        let pid = Pid::new();
        let qualified = pid.qualified(ORIGINAL_FILE);
        assert_eq!(
            qualified.as_str(),
            format!("{}/{}", pid.as_str(), ORIGINAL_FILE)
        );
        assert_eq!(qualified.base(), pid);
        assert_eq!(qualified.component(), Some(ORIGINAL_FILE));
        assert_eq!(pid.component(), None);
    }

    #[test]
    fn test_requalify_replaces_component() {
        let pid = Pid::new();
        let a = pid.qualified(ORIGINAL_FILE);
        let b = a.qualified(TECHNICAL_METADATA);
        assert_eq!(b.base(), pid);
        assert_eq!(b.component(), Some(TECHNICAL_METADATA));
    }

    #[test]
    fn test_local_id_strips_prefix_and_component() {
        let pid = Pid::new();
        let local = pid.local_id();
        assert!(!local.contains(':'));
        assert_eq!(pid.qualified(ORIGINAL_FILE).local_id(), local);
        assert!(Uuid::parse_str(local).is_ok());
    }

    #[test]
    fn test_parse_qualified_form() {
        let pid = Pid::new();
        let qualified = pid.qualified(ORIGINAL_FILE);
        let parsed = Pid::parse(qualified.as_str()).unwrap();
        assert_eq!(parsed, qualified);
    }
}
