// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Technical metadata extraction job.
//!
//! Runs every staged file through the characterization service, writes one
//! namespaced techmd report per FileObject, and corrects the graph's
//! mimetype from the resolved identification. A file whose report already
//! exists on disk is not re-examined on resume; its graph triples are
//! rebuilt from the stored report instead, so an interruption between
//! report write and graph save loses nothing.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::{debug, info, instrument};

use preserva_model::pid::{Pid, TECHNICAL_METADATA};
use preserva_model::premis::{PremisAgent, PremisEvent, PremisEventType};
use preserva_model::vocab::{MIMETYPE, SIZE};

use crate::error::{JobError, Result};
use crate::job::{DepositJob, JobContext};
use crate::runner::{FailurePolicy, ObjectTaskRunner};
use crate::services::fits::{resolve_mimetype, parse_fits_report, CharacterizationService};

use super::{staged_entry, staged_files, StagedFile};

/// PREMIS v3 namespace for the report wrapper.
const PREMIS_NS: &str = "http://www.loc.gov/premis/v3";
/// FITS output namespace.
const FITS_NS: &str = "http://hul.harvard.edu/ois/xml/ns/fits/fits_output";

/// Resolved characterization for one datastream.
#[derive(Debug, Clone)]
struct Characterization {
    mimetype: String,
    format: Option<String>,
    size: Option<u64>,
}

/// Characterize every staged file and record format, mimetype, and size.
pub struct ExtractTechnicalMetadataJob {
    service: Arc<dyn CharacterizationService>,
}

impl ExtractTechnicalMetadataJob {
    /// Create the job around a characterization service.
    pub fn new(service: Arc<dyn CharacterizationService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl DepositJob for ExtractTechnicalMetadataJob {
    fn name(&self) -> &'static str {
        "extract technical metadata"
    }

    #[instrument(skip_all, fields(deposit_id = %ctx.deposit_id))]
    async fn run(&self, ctx: &JobContext) -> Result<()> {
        ctx.register(self.name()).await?;
        let mut graph = ctx.graphs.open_writable(&ctx.deposit_id)?;
        let techmd_dir = ctx.graphs.techmd_dir(&ctx.deposit_id);
        tokio::fs::create_dir_all(&techmd_dir).await.map_err(|e| {
            JobError::repository("techmd dir", format!("{}: {}", techmd_dir.display(), e))
        })?;

        let staged = staged_files(ctx, &graph);
        let objects: Vec<Pid> = staged.iter().map(|(pid, _)| pid.clone()).collect();
        let table: Arc<HashMap<Pid, StagedFile>> = Arc::new(staged.into_iter().collect());

        let results: Arc<Mutex<Vec<(Pid, Characterization)>>> = Arc::new(Mutex::new(Vec::new()));

        let runner = ObjectTaskRunner::new(ctx, FailurePolicy::FailFast);
        let outcome = {
            let service = self.service.clone();
            let premis = ctx.premis.clone();
            let task_table = table.clone();
            let task_results = results.clone();
            let techmd_dir = techmd_dir.clone();
            runner
                .run(ctx, &objects, move |object| {
                    let table = task_table.clone();
                    let results = task_results.clone();
                    let service = service.clone();
                    let premis = premis.clone();
                    let techmd_dir = techmd_dir.clone();
                    async move {
                        let entry = staged_entry(&table, &object)?.clone();
                        let report_path = report_path(&techmd_dir, &entry.file_object);

                        let characterization = if report_path.exists() {
                            debug!(report = %report_path.display(), "report exists, skipping examination");
                            let characterization =
                                rebuild_from_report(&report_path, entry.mimetype.clone()).await?;
                            // A crash between report write and event log leaves
                            // the report without provenance; log it here once.
                            let already_logged = premis
                                .events_for(&entry.file_object)?
                                .iter()
                                .any(|e| e.event_type == PremisEventType::FormatIdentification);
                            if !already_logged {
                                premis.write_event(
                                    &entry.file_object,
                                    &identification_event(&characterization),
                                )?;
                            }
                            characterization
                        } else {
                            let report = service.examine(&entry.path).await?;
                            let identity = report.resolve_identity();
                            let mimetype = resolve_mimetype(
                                identity.and_then(|id| id.mimetype.as_deref()),
                                entry.mimetype.as_deref(),
                            );
                            let characterization = Characterization {
                                mimetype,
                                format: identity.and_then(|id| id.format.clone()),
                                size: report.size,
                            };
                            write_report(&report_path, &characterization, &report.raw_xml)
                                .await?;

                            premis.write_event(
                                &entry.file_object,
                                &identification_event(&characterization),
                            )?;
                            characterization
                        };

                        results
                            .lock()
                            .map_err(|_| {
                                JobError::repository("techmd results", "results mutex poisoned")
                            })?
                            .push((object, characterization));
                        Ok(())
                    }
                })
                .await
        };

        // Persist graph updates for everything characterized so far, even
        // on interruption; resumed runs rebuild the rest.
        let collected = results
            .lock()
            .map_err(|_| JobError::repository("techmd results", "results mutex poisoned"))?
            .clone();
        for (datastream, characterization) in &collected {
            graph.set_single(datastream, MIMETYPE, &characterization.mimetype);
            if let Some(size) = characterization.size
                && graph.first_object(datastream, SIZE).is_none()
            {
                graph.add(datastream, SIZE, &size.to_string());
            }
            // The report itself becomes a datastream of the FileObject.
            graph.add_datastream(&datastream.base(), TECHNICAL_METADATA);
        }
        ctx.graphs.save(&ctx.deposit_id, &graph)?;

        outcome?;
        info!(files = collected.len(), "technical metadata extracted");
        Ok(())
    }
}

fn identification_event(characterization: &Characterization) -> PremisEvent {
    let mut event = PremisEvent::success(
        PremisEventType::FormatIdentification,
        format!("File identified as {}", characterization.mimetype),
    )
    .with_agent(PremisAgent::Fits);
    if let Some(format) = &characterization.format {
        event = event.with_note(format.clone());
    }
    event
}

/// Report file for a FileObject, named by its local identifier.
fn report_path(techmd_dir: &Path, file_object: &Pid) -> PathBuf {
    techmd_dir.join(format!("{}.xml", file_object.local_id()))
}

/// Rebuild a characterization from a previously written report.
async fn rebuild_from_report(
    report_path: &Path,
    provided: Option<String>,
) -> Result<Characterization> {
    let xml = tokio::fs::read_to_string(report_path).await.map_err(|e| {
        JobError::repository(
            "techmd report read",
            format!("{}: {}", report_path.display(), e),
        )
    })?;
    let report = parse_fits_report(&xml)?;
    let identity = report.resolve_identity();
    Ok(Characterization {
        mimetype: resolve_mimetype(
            identity.and_then(|id| id.mimetype.as_deref()),
            provided.as_deref(),
        ),
        format: identity.and_then(|id| id.format.clone()),
        size: report.size,
    })
}

/// Write the namespaced report: PREMIS objectCharacteristics wrapping the
/// raw tool output. Written to a temp sibling and renamed so a crash never
/// leaves a partial report that would suppress re-examination on resume.
async fn write_report(
    report_path: &Path,
    characterization: &Characterization,
    raw_xml: &str,
) -> Result<()> {
    let embedded = raw_xml
        .trim_start()
        .strip_prefix("<?xml")
        .and_then(|rest| rest.split_once("?>"))
        .map(|(_, body)| body.trim_start())
        .unwrap_or(raw_xml);

    let mut doc = String::new();
    doc.push_str(r#"<?xml version="1.0" encoding="UTF-8"?>"#);
    doc.push('\n');
    doc.push_str(&format!(
        r#"<premis:objectCharacteristics xmlns:premis="{}" xmlns:fits="{}">"#,
        PREMIS_NS, FITS_NS
    ));
    doc.push('\n');
    if let Some(size) = characterization.size {
        doc.push_str(&format!("  <premis:size>{}</premis:size>\n", size));
    }
    doc.push_str(&format!(
        "  <premis:format><premis:formatDesignation><premis:formatName>{}</premis:formatName></premis:formatDesignation></premis:format>\n",
        xml_escape(characterization.format.as_deref().unwrap_or(&characterization.mimetype))
    ));
    doc.push_str(embedded);
    doc.push('\n');
    doc.push_str("</premis:objectCharacteristics>\n");

    let tmp = report_path.with_extension("xml.tmp");
    tokio::fs::write(&tmp, &doc).await.map_err(|e| {
        JobError::repository("techmd report write", format!("{}: {}", tmp.display(), e))
    })?;
    tokio::fs::rename(&tmp, report_path).await.map_err(|e| {
        JobError::repository(
            "techmd report write",
            format!("{}: {}", report_path.display(), e),
        )
    })?;
    Ok(())
}

fn xml_escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;

    const FITS_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<fits xmlns="http://hul.harvard.edu/ois/xml/ns/fits/fits_output">
  <identification>
    <identity format="JPEG File Interchange Format" mimetype="image/jpeg">
      <tool toolname="Droid" toolversion="6.4"/>
    </identity>
  </identification>
  <fileinfo><size>512</size></fileinfo>
</fits>"#;

    #[tokio::test]
    async fn test_report_round_trips_through_rebuild() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("abc.xml");
        let characterization = Characterization {
            mimetype: "image/jpeg".to_string(),
            format: Some("JPEG File Interchange Format".to_string()),
            size: Some(512),
        };
        write_report(&path, &characterization, FITS_XML).await.unwrap();
        assert!(path.exists());
        assert!(!path.with_extension("xml.tmp").exists());

        let rebuilt = rebuild_from_report(&path, None).await.unwrap();
        assert_eq!(rebuilt.mimetype, "image/jpeg");
        assert_eq!(rebuilt.size, Some(512));
        assert_eq!(
            rebuilt.format.as_deref(),
            Some("JPEG File Interchange Format")
        );
    }

    #[test]
    fn test_report_path_uses_local_id() {
        let pid = Pid::parse("uuid:0bd93a5c-2c46-4dcb-a5f0-4ff0f7b02f2c").unwrap();
        assert_eq!(
            report_path(Path::new("/d/techmd"), &pid),
            PathBuf::from("/d/techmd/0bd93a5c-2c46-4dcb-a5f0-4ff0f7b02f2c.xml")
        );
    }

    #[test]
    fn test_xml_escape() {
        assert_eq!(xml_escape("a<b>&\"c\""), "a&lt;b&gt;&amp;&quot;c&quot;");
    }
}
