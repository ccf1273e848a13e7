// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! FITS characterization service client.
//!
//! FITS aggregates several identification tools (DROID, JHOVE, the file
//! utility, Exiftool) behind one servlet. The tools frequently disagree, so
//! a single identity is resolved from the report via a fixed ranking: a
//! specific mimetype beats a generic one, and ties break by source-tool
//! priority.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::error::{JobError, Result};
use crate::paths::sanitize_path;

/// Mimetypes too generic to prefer over anything else.
const GENERIC_TYPES: &[&str] = &["application/octet-stream", "text/plain", ""];

/// Tie-break order between identification tools, most trusted first.
const TOOL_PRIORITY: &[&str] = &["Droid", "Jhove", "file utility", "Exiftool", "FITS"];

/// One `<identity>` element from a FITS report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FitsIdentity {
    /// Detected mimetype, if the tool reported one.
    pub mimetype: Option<String>,
    /// Human-readable format designation ("JPEG File Interchange Format").
    pub format: Option<String>,
    /// Names of the tools asserting this identity.
    pub tools: Vec<String>,
}

/// Parsed FITS examination report.
#[derive(Debug, Clone)]
pub struct FitsReport {
    /// All identities asserted in the report, in document order.
    pub identities: Vec<FitsIdentity>,
    /// File size in bytes from the `<fileinfo>` section.
    pub size: Option<u64>,
    /// The raw XML response, embedded verbatim into the techmd report.
    pub raw_xml: String,
}

impl FitsReport {
    /// Pick the winning identity per the ranking policy, or `None` when the
    /// report asserts no identities at all.
    pub fn resolve_identity(&self) -> Option<&FitsIdentity> {
        self.identities.iter().min_by_key(|id| rank_identity(id))
    }
}

/// Ranking key for an identity: lower sorts first.
fn rank_identity(identity: &FitsIdentity) -> (u8, usize) {
    let specificity = match identity.mimetype.as_deref() {
        Some(m) if !GENERIC_TYPES.contains(&m) => 0,
        _ => 1,
    };
    let tool_rank = identity
        .tools
        .iter()
        .filter_map(|tool| {
            TOOL_PRIORITY
                .iter()
                .position(|p| p.eq_ignore_ascii_case(tool))
        })
        .min()
        .unwrap_or(TOOL_PRIORITY.len());
    (specificity, tool_rank)
}

/// Resolve the final mimetype from the detected and client-provided values.
///
/// A specific detected mimetype wins over anything provided; a specific
/// provided mimetype is retained when detection was absent or generic; when
/// both are generic or absent, whichever exists is kept, defaulting to
/// `application/octet-stream`.
pub fn resolve_mimetype(detected: Option<&str>, provided: Option<&str>) -> String {
    let is_specific = |m: &str| !GENERIC_TYPES.contains(&m);
    match (detected, provided) {
        (Some(d), _) if is_specific(d) => d.to_string(),
        (_, Some(p)) if is_specific(p) => p.to_string(),
        (Some(d), _) if !d.is_empty() => d.to_string(),
        (_, Some(p)) if !p.is_empty() => p.to_string(),
        _ => "application/octet-stream".to_string(),
    }
}

/// File characterization behind a trait so jobs can run against a stub.
#[async_trait]
pub trait CharacterizationService: Send + Sync {
    /// Examine one staged file and return the parsed report.
    async fn examine(&self, path: &Path) -> Result<FitsReport>;
}

/// HTTP client for the FITS servlet.
#[derive(Debug, Clone)]
pub struct FitsHttpClient {
    base_uri: String,
    timeout: Duration,
}

impl FitsHttpClient {
    /// Create a client against `base_uri` (no trailing slash), bounding each
    /// request by `timeout`.
    pub fn new(base_uri: impl Into<String>, timeout: Duration) -> Self {
        let mut base_uri = base_uri.into();
        while base_uri.ends_with('/') {
            base_uri.pop();
        }
        Self { base_uri, timeout }
    }

    fn examine_url(&self, path: &str) -> String {
        format!(
            "{}/examine?file={}",
            self.base_uri,
            urlencoding::encode(path)
        )
    }
}

#[async_trait]
impl CharacterizationService for FitsHttpClient {
    async fn examine(&self, path: &Path) -> Result<FitsReport> {
        let sanitized = sanitize_path(&path.to_string_lossy());
        let url = self.examine_url(&sanitized);
        let timeout = self.timeout;
        debug!(url = %url, "requesting characterization");

        // ureq is blocking; keep the runtime free while the servlet works.
        let body = tokio::task::spawn_blocking(move || -> Result<String> {
            let response = ureq::get(&url)
                .timeout(timeout)
                .call()
                .map_err(|e| JobError::failed_simple(format!("characterization request failed: {e}")))?;
            if response.status() != 200 {
                return Err(JobError::failed_simple(format!(
                    "characterization service returned HTTP {}",
                    response.status()
                )));
            }
            response
                .into_string()
                .map_err(|e| JobError::failed_simple(format!("characterization response unreadable: {e}")))
        })
        .await
        .map_err(|e| JobError::repository("characterization request", e.to_string()))??;

        parse_fits_report(&body)
    }
}

/// Parse a FITS XML response. Namespace prefixes vary between FITS
/// versions, so elements are matched by local name.
pub fn parse_fits_report(xml: &str) -> Result<FitsReport> {
    let doc = roxmltree::Document::parse(xml)
        .map_err(|e| JobError::failed_simple(format!("unparseable characterization report: {e}")))?;

    let mut identities = Vec::new();
    for identity in doc
        .descendants()
        .filter(|n| n.has_tag_name_local("identity"))
    {
        let tools = identity
            .children()
            .filter(|n| n.has_tag_name_local("tool"))
            .filter_map(|n| n.attribute("toolname"))
            .map(str::to_string)
            .collect();
        identities.push(FitsIdentity {
            mimetype: identity.attribute("mimetype").map(str::to_string),
            format: identity.attribute("format").map(str::to_string),
            tools,
        });
    }

    let size = doc
        .descendants()
        .find(|n| n.has_tag_name_local("size"))
        .and_then(|n| n.text())
        .and_then(|t| t.trim().parse::<u64>().ok());

    Ok(FitsReport {
        identities,
        size,
        raw_xml: xml.to_string(),
    })
}

trait LocalName {
    fn has_tag_name_local(&self, name: &str) -> bool;
}

impl LocalName for roxmltree::Node<'_, '_> {
    fn has_tag_name_local(&self, name: &str) -> bool {
        self.is_element() && self.tag_name().name() == name
    }
}
