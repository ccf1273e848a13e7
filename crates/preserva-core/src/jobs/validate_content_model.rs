// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Content model validation job.
//!
//! Walks the deposit subtree depth-first and evaluates every structural
//! rule on every node, collecting all violations before failing. Rules:
//! every node carries a known type, containment follows the content model,
//! no node is contained by more than one parent, a Work's primaryObject
//! and defaultWebObject must be its own FileObject children, staged
//! FileObjects carry a stagingLocation, and memberOrder must be a
//! pipe-delimited permutation of the direct children's local identifiers.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use tracing::{info, instrument};

use preserva_model::graph::DepositGraph;
use preserva_model::pid::{Pid, ORIGINAL_FILE, PID_PREFIX};
use preserva_model::vocab::{
    ResourceType, DEFAULT_WEB_OBJECT, MEMBER_ORDER, PRIMARY_OBJECT, STAGING_LOCATION,
};

use crate::error::{Result, ValidationReport};
use crate::job::{DepositJob, JobContext};

const KIND_TYPE: &str = "unknown type";
const KIND_CONTAINMENT: &str = "containment";
const KIND_REFERENCE: &str = "object reference";
const KIND_STAGING: &str = "staging location";
const KIND_MEMBER_ORDER: &str = "member order";

/// Validate the deposit's structure against the content model.
#[derive(Debug, Default)]
pub struct ValidateContentModelJob;

impl ValidateContentModelJob {
    /// Create the job.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DepositJob for ValidateContentModelJob {
    fn name(&self) -> &'static str {
        "validate content model"
    }

    #[instrument(skip_all, fields(deposit_id = %ctx.deposit_id))]
    async fn run(&self, ctx: &JobContext) -> Result<()> {
        ctx.register(self.name()).await?;
        let graph = ctx.graphs.open_read_only(&ctx.deposit_id)?;

        let report = validate(&graph);
        info!(violations = report.len(), "content model validated");
        report.into_result(self.name())
    }
}

/// Evaluate every rule over the whole subtree.
///
/// A node reachable through two containment edges would otherwise be
/// visited (and later dispatched to file jobs) twice, so each node is
/// checked once and its containment edges are counted.
pub(crate) fn validate(graph: &DepositGraph) -> ValidationReport {
    let mut report = ValidationReport::new();
    let mut visited: HashSet<Pid> = HashSet::new();
    let mut containments: HashMap<Pid, usize> = HashMap::new();
    for node in graph.walk_depth_first(graph.root()) {
        if !visited.insert(node.clone()) {
            continue;
        }
        for child in graph.children(&node) {
            *containments.entry(child).or_default() += 1;
        }
        check_node(graph, &node, &mut report);
    }

    let mut multiple: Vec<&Pid> = containments
        .iter()
        .filter(|(_, edges)| **edges > 1)
        .map(|(child, _)| child)
        .collect();
    multiple.sort_unstable();
    for node in multiple {
        report.add(
            node.as_str(),
            KIND_CONTAINMENT,
            "contained by more than one parent",
        );
    }
    report
}

fn check_node(graph: &DepositGraph, node: &Pid, report: &mut ValidationReport) {
    let Some(node_type) = graph.resource_type(node) else {
        report.add(
            node.as_str(),
            KIND_TYPE,
            match graph.type_tag(node) {
                Some(tag) => format!("unrecognized type '{}'", tag),
                None => "no type recorded".to_string(),
            },
        );
        return;
    };

    let children = graph.children(node);
    for child in &children {
        if let Some(child_type) = graph.resource_type(child)
            && !node_type.can_contain(child_type)
        {
            report.add(
                child.as_str(),
                KIND_CONTAINMENT,
                format!(
                    "{} cannot be contained by {} '{}'",
                    child_type.as_str(),
                    node_type.as_str(),
                    node
                ),
            );
        }
    }

    if node_type == ResourceType::Work {
        check_reference(graph, node, &children, PRIMARY_OBJECT, report);
        check_reference(graph, node, &children, DEFAULT_WEB_OBJECT, report);
    }

    if node_type == ResourceType::FileObject
        && let Some(datastream) = graph.datastream(node, ORIGINAL_FILE)
        && graph.first_object(&datastream, STAGING_LOCATION).is_none()
    {
        report.add(
            node.as_str(),
            KIND_STAGING,
            "originalFile datastream has no staging location",
        );
    }

    if let Some(order) = graph.first_object(node, MEMBER_ORDER) {
        check_member_order(graph, node, &children, order, report);
    }
}

/// primaryObject/defaultWebObject must point at one of the node's own
/// FileObject children.
fn check_reference(
    graph: &DepositGraph,
    node: &Pid,
    children: &[Pid],
    predicate: &str,
    report: &mut ValidationReport,
) {
    let Some(target) = graph.first_object(node, predicate) else {
        return;
    };
    let is_own_file_child = children.iter().any(|child| {
        child.as_str() == target && graph.resource_type(child) == Some(ResourceType::FileObject)
    });
    if !is_own_file_child {
        report.add(
            node.as_str(),
            KIND_REFERENCE,
            format!(
                "{} '{}' is not a FileObject child of this Work",
                predicate, target
            ),
        );
    }
}

/// memberOrder must list each direct child's local id exactly once.
fn check_member_order(
    graph: &DepositGraph,
    node: &Pid,
    children: &[Pid],
    order: &str,
    report: &mut ValidationReport,
) {
    let child_ids: HashSet<&str> = children.iter().map(|c| c.local_id()).collect();

    let mut seen: HashSet<&str> = HashSet::new();
    let mut duplicates: Vec<&str> = Vec::new();
    let mut foreign: Vec<&str> = Vec::new();
    for id in order.split('|') {
        let id = id.trim().trim_start_matches(PID_PREFIX);
        if id.is_empty() {
            continue;
        }
        if !seen.insert(id) && !duplicates.contains(&id) {
            duplicates.push(id);
        }
        if !child_ids.contains(id) && !foreign.contains(&id) {
            foreign.push(id);
        }
    }

    let mut missing: Vec<&str> = children
        .iter()
        .map(|c| c.local_id())
        .filter(|id| !seen.contains(id))
        .collect();
    missing.sort_unstable();

    for id in missing {
        report.add(
            node.as_str(),
            KIND_MEMBER_ORDER,
            format!("member '{}' is missing from memberOrder", id),
        );
    }
    for id in foreign {
        report.add(
            node.as_str(),
            KIND_MEMBER_ORDER,
            format!("'{}' in memberOrder is not a member", id),
        );
    }
    for id in duplicates {
        report.add(
            node.as_str(),
            KIND_MEMBER_ORDER,
            format!("'{}' appears more than once in memberOrder", id),
        );
    }
}
