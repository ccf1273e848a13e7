// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Property vocabulary and the resource type containment model.
//!
//! The graph schema is a small fixed vocabulary of typed properties. Jobs
//! never invent predicates; everything written into a deposit graph uses a
//! constant from this module.

use std::fmt;

use serde::{Deserialize, Serialize};

/// RDF type tag of a resource.
pub const RDF_TYPE: &str = "rdf:type";

/// Human-readable label.
pub const LABEL: &str = "cdr:label";

/// Containment edge from parent to child. Exactly one per content node.
pub const CONTAINS: &str = "cdr:contains";

/// Edge from a FileObject to its datastream sub-resource.
pub const HAS_DATASTREAM: &str = "cdr:hasDatastream";

/// Staged source location of a datastream (URI).
pub const STAGING_LOCATION: &str = "cdr:stagingLocation";

/// Repository storage location assigned at ingest.
pub const STORAGE_LOCATION: &str = "cdr:storageLocation";

/// Declared or detected MIME type of a datastream.
pub const MIMETYPE: &str = "cdr:mimetype";

/// Size in bytes of a datastream.
pub const SIZE: &str = "cdr:size";

/// MD5 digest of a datastream, lowercase hex.
pub const MD5_SUM: &str = "cdr:md5sum";

/// SHA-1 digest of a datastream, lowercase hex.
pub const SHA1_SUM: &str = "cdr:sha1sum";

/// Pipe-delimited ordering of a container's direct children by local id.
/// Reference-only; never a containment edge.
pub const MEMBER_ORDER: &str = "cdr:memberOrder";

/// A Work's designated primary FileObject. Reference-only.
pub const PRIMARY_OBJECT: &str = "cdr:primaryObject";

/// A container's designated representative object. Reference-only.
pub const DEFAULT_WEB_OBJECT: &str = "cdr:defaultWebObject";

/// Embargo expiry date (ISO 8601).
pub const EMBARGO_UNTIL: &str = "cdr:embargoUntil";

/// Predicates that reference other objects without owning them.
pub const REFERENCE_ONLY: &[&str] = &[PRIMARY_OBJECT, MEMBER_ORDER, DEFAULT_WEB_OBJECT];

/// Content model type of a repository resource.
///
/// Containment forms a strict hierarchy: AdminUnit > Collection > Folder >
/// Work > FileObject, with Folders nesting and Works admitted directly
/// into Collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceType {
    /// Top-level administrative unit.
    AdminUnit,
    /// A curated collection of folders and works.
    Collection,
    /// An intermediate container; folders may nest.
    Folder,
    /// An intellectual object owning one or more files.
    Work,
    /// A single file; always a leaf.
    FileObject,
    /// The root record of an in-flight deposit.
    DepositRecord,
}

impl ResourceType {
    /// Wire form of this type tag.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AdminUnit => "AdminUnit",
            Self::Collection => "Collection",
            Self::Folder => "Folder",
            Self::Work => "Work",
            Self::FileObject => "FileObject",
            Self::DepositRecord => "DepositRecord",
        }
    }

    /// Parse the wire form.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "AdminUnit" => Some(Self::AdminUnit),
            "Collection" => Some(Self::Collection),
            "Folder" => Some(Self::Folder),
            "Work" => Some(Self::Work),
            "FileObject" => Some(Self::FileObject),
            "DepositRecord" => Some(Self::DepositRecord),
            _ => None,
        }
    }

    /// Whether this type may directly contain a child of the given type.
    pub fn can_contain(&self, child: ResourceType) -> bool {
        use ResourceType::*;
        match self {
            DepositRecord => matches!(child, AdminUnit | Collection | Folder | Work | FileObject),
            AdminUnit => matches!(child, Collection),
            Collection => matches!(child, Folder | Work),
            Folder => matches!(child, Folder | Work),
            Work => matches!(child, FileObject),
            FileObject => false,
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
