// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The in-memory deposit graph.
//!
//! A [`DepositGraph`] is an insertion-ordered set of subject-predicate-object
//! triples with typed accessors for the fixed vocabulary. Worker tasks may
//! write leaf-scoped triples for their own object concurrently with other
//! objects' workers only through external coordination; the graph itself is
//! not thread-safe for concurrent mutation. Structural (edge) mutation is
//! single-threaded pre/post phases by contract.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::pid::Pid;
use crate::vocab::{self, ResourceType};

/// One subject-predicate-object statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Triple {
    /// Subject resource.
    pub subject: Pid,
    /// Predicate from the fixed vocabulary.
    pub predicate: String,
    /// Object value: a literal or a rendered PID.
    pub object: String,
}

/// The object graph of one deposit.
#[derive(Debug, Clone)]
pub struct DepositGraph {
    root: Pid,
    /// Subjects in first-insertion order, for stable serialization.
    order: Vec<Pid>,
    /// Per-subject properties in insertion order.
    properties: HashMap<Pid, Vec<(String, String)>>,
}

impl DepositGraph {
    /// Create a graph containing only the deposit root record.
    pub fn new(deposit: Pid) -> Self {
        let mut graph = Self {
            root: deposit.clone(),
            order: Vec::new(),
            properties: HashMap::new(),
        };
        graph.set_type(&deposit, ResourceType::DepositRecord);
        graph
    }

    /// Rebuild a graph from persisted triples. The first subject is the root.
    pub fn from_triples(root: Pid, triples: Vec<Triple>) -> Self {
        let mut graph = Self {
            root,
            order: Vec::new(),
            properties: HashMap::new(),
        };
        for t in triples {
            graph.add(&t.subject, &t.predicate, &t.object);
        }
        graph
    }

    /// The deposit root PID.
    pub fn root(&self) -> &Pid {
        &self.root
    }

    /// Add one triple. Duplicate statements are ignored.
    pub fn add(&mut self, subject: &Pid, predicate: &str, object: &str) {
        if !self.properties.contains_key(subject) {
            self.order.push(subject.clone());
        }
        let props = self.properties.entry(subject.clone()).or_default();
        if !props
            .iter()
            .any(|(p, o)| p == predicate && o == object)
        {
            props.push((predicate.to_string(), object.to_string()));
        }
    }

    /// Replace any existing values of `predicate` on `subject` with one value.
    ///
    /// Used for corrections such as overriding a client-supplied mimetype.
    pub fn set_single(&mut self, subject: &Pid, predicate: &str, object: &str) {
        if let Some(props) = self.properties.get_mut(subject) {
            props.retain(|(p, _)| p != predicate);
        }
        self.add(subject, predicate, object);
    }

    /// Remove one triple if present.
    pub fn remove(&mut self, subject: &Pid, predicate: &str, object: &str) {
        if let Some(props) = self.properties.get_mut(subject) {
            props.retain(|(p, o)| !(p == predicate && o == object));
        }
    }

    /// First object value of `predicate` on `subject`.
    pub fn first_object(&self, subject: &Pid, predicate: &str) -> Option<&str> {
        self.properties
            .get(subject)?
            .iter()
            .find(|(p, _)| p == predicate)
            .map(|(_, o)| o.as_str())
    }

    /// All object values of `predicate` on `subject`, in insertion order.
    pub fn objects(&self, subject: &Pid, predicate: &str) -> Vec<&str> {
        self.properties
            .get(subject)
            .map(|props| {
                props
                    .iter()
                    .filter(|(p, _)| p == predicate)
                    .map(|(_, o)| o.as_str())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Tag `subject` with a single content model type.
    pub fn set_type(&mut self, subject: &Pid, rtype: ResourceType) {
        self.set_single(subject, vocab::RDF_TYPE, rtype.as_str());
    }

    /// The content model type of `subject`, if tagged with a known type.
    pub fn resource_type(&self, subject: &Pid) -> Option<ResourceType> {
        self.first_object(subject, vocab::RDF_TYPE)
            .and_then(ResourceType::parse)
    }

    /// Raw type tag, including unknown values (for validation diagnostics).
    pub fn type_tag(&self, subject: &Pid) -> Option<&str> {
        self.first_object(subject, vocab::RDF_TYPE)
    }

    /// Add a containment edge from `parent` to `child`.
    pub fn add_child(&mut self, parent: &Pid, child: &Pid) {
        self.add(parent, vocab::CONTAINS, child.as_str());
    }

    /// Direct children of `parent`, in insertion order.
    pub fn children(&self, parent: &Pid) -> Vec<Pid> {
        self.objects(parent, vocab::CONTAINS)
            .into_iter()
            .filter_map(|o| Pid::parse(o).ok())
            .collect()
    }

    /// All subjects carrying the given type tag, in insertion order.
    pub fn subjects_of_type(&self, rtype: ResourceType) -> Vec<Pid> {
        self.order
            .iter()
            .filter(|pid| self.resource_type(pid) == Some(rtype))
            .cloned()
            .collect()
    }

    /// Preorder depth-first walk of the containment tree from `start`.
    pub fn walk_depth_first(&self, start: &Pid) -> Vec<Pid> {
        let mut out = Vec::new();
        let mut stack = vec![start.clone()];
        while let Some(pid) = stack.pop() {
            out.push(pid.clone());
            let mut children = self.children(&pid);
            children.reverse();
            stack.extend(children);
        }
        out
    }

    /// All FileObjects reachable from the deposit root, in walk order.
    pub fn file_objects(&self) -> Vec<Pid> {
        self.walk_depth_first(&self.root)
            .into_iter()
            .filter(|pid| self.resource_type(pid) == Some(ResourceType::FileObject))
            .collect()
    }

    /// Attach a datastream sub-resource to a FileObject and return its PID.
    ///
    /// Idempotent: re-attaching the same component returns the same PID.
    pub fn add_datastream(&mut self, file_object: &Pid, component: &str) -> Pid {
        let ds = file_object.qualified(component);
        self.add(file_object, vocab::HAS_DATASTREAM, ds.as_str());
        ds
    }

    /// The datastream sub-resource of `file_object` with the given component,
    /// if attached.
    pub fn datastream(&self, file_object: &Pid, component: &str) -> Option<Pid> {
        let ds = file_object.qualified(component);
        self.objects(file_object, vocab::HAS_DATASTREAM)
            .into_iter()
            .any(|o| o == ds.as_str())
            .then_some(ds)
    }

    /// Number of statements in the graph.
    pub fn len(&self) -> usize {
        self.properties.values().map(Vec::len).sum()
    }

    /// Whether the graph holds no statements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterate all statements in stable (subject-insertion) order.
    pub fn triples(&self) -> impl Iterator<Item = Triple> + '_ {
        self.order.iter().flat_map(move |subject| {
            self.properties
                .get(subject)
                .into_iter()
                .flatten()
                .map(move |(p, o)| Triple {
                    subject: subject.clone(),
                    predicate: p.clone(),
                    object: o.clone(),
                })
        })
    }
}
