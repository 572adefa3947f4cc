//! Converting container nodes to documents and replaying mutations back.
//!
//! The read direction walks the container into a [`Document`]; the write
//! direction applies only the recorded change log plus any keys new to the
//! container. Per-node write failures are collected, not fatal: the save
//! completes for every unaffected node and reports what failed.

use std::collections::BTreeMap;
use tracing::{debug, warn};

use silo_types::{Kind, Result, Scalar, SiloError};

use crate::document::{ChangeRecord, Document};
use crate::engine::{EngineHandle, OpenMode};
use crate::registry::Registry;
use crate::tree::{self, Dataset, Group, Node};

/// One node that could not be written. The rest of the save proceeded.
#[derive(Debug)]
pub struct FailedNode {
    pub path: String,
    pub key: String,
    pub kind: Kind,
    pub message: String,
}

/// Outcome of a save: how many nodes were written and which failed.
#[derive(Debug, Default)]
pub struct SaveReport {
    pub name: String,
    pub written: usize,
    pub failed: Vec<FailedNode>,
}

impl SaveReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Whether the recorded changes can be patched in place, or whether some
/// key already exists under a structurally different kind. Kind conflicts
/// force a full rewrite — container codecs cannot change a node's kind in
/// place, and the decision is global rather than per-key.
enum WritePlan {
    Patch,
    FullRewrite,
}

// ── Read direction ─────────────────────────────────────────────────────────

/// Read a container into a mutable [`Document`].
pub fn read_document(registry: &mut Registry, name: &str) -> Result<Document> {
    let handle = registry.get(name, OpenMode::Read, false)?;
    let root = read_group(handle.as_ref(), "/")?;
    Ok(Document::from_root(root, false))
}

fn read_group(handle: &dyn EngineHandle, path: &str) -> Result<Group> {
    let info = handle.node(path)?;
    let mut group = Group::new();
    for (name, value) in info.attrs {
        group.insert(name, Node::Attribute(value));
    }
    for name in info.children {
        let child_path = tree::join(path, &name);
        let child = handle.node(&child_path)?;
        let node = match child.kind {
            Kind::Group => Node::Group(read_group(handle, &child_path)?),
            Kind::Dataset => Node::Dataset(Dataset {
                value: child
                    .value
                    .ok_or_else(|| SiloError::Other(format!("dataset '{child_path}' has no value")))?,
                attrs: child.attrs,
            }),
            Kind::Attribute => Node::Attribute(
                child
                    .value
                    .ok_or_else(|| SiloError::Other(format!("attribute '{child_path}' has no value")))?,
            ),
        };
        group.insert(name, node);
    }
    Ok(group)
}

// ── Write direction ────────────────────────────────────────────────────────

/// Persist a document's recorded changes (plus any new keys) to `name`.
///
/// Streaming documents are read-only views and are refused outright. The
/// handle is closed at the end so the write is finalized; a reload observes
/// the saved content.
pub fn save(registry: &mut Registry, doc: &mut Document, name: &str) -> Result<SaveReport> {
    if doc.is_streaming() || registry.is_remote(name) {
        return Err(SiloError::CannotPersistStreamingNode);
    }

    let mut report = SaveReport {
        name: name.to_string(),
        ..Default::default()
    };
    let changes = doc.changes().latest();

    {
        let handle = registry.get(name, OpenMode::Append, true)?;

        match plan_for(handle.as_ref(), &changes) {
            WritePlan::FullRewrite => {
                warn!("save '{name}': kind conflict in recorded changes; rewriting whole tree");
                handle.clear()?;
                let root = doc.root().clone();
                write_group_contents(handle.as_mut(), "/", &root, &mut report);
                doc.changes_mut().clear();
            }
            WritePlan::Patch => {
                debug!(
                    "save '{name}': applying {} recorded change(s)",
                    changes.len()
                );
                let mut retry = Vec::new();
                for rec in changes {
                    match apply_change(handle.as_mut(), &rec) {
                        Ok(n) => report.written += n,
                        Err(e) => {
                            warn!(
                                "save '{name}': failed to write {} '{}' under '{}': {e}",
                                rec.kind, rec.key, rec.path
                            );
                            report.failed.push(FailedNode {
                                path: rec.path.clone(),
                                key: rec.key.clone(),
                                kind: rec.kind,
                                message: e.to_string(),
                            });
                            retry.push(rec);
                        }
                    }
                }
                // Applied changes are spent; failed ones stay eligible for
                // the next save.
                doc.changes_mut().clear();
                for rec in retry {
                    doc.changes_mut().push(rec);
                }

                let root = doc.root().clone();
                apply_new_keys(handle.as_mut(), "/", &root, &mut report);
            }
        }
    }

    // Finalize: publish pending writes.
    registry.close(Some(name))?;
    Ok(report)
}

/// Scan recorded changes against the open handle for kind conflicts.
fn plan_for(handle: &dyn EngineHandle, changes: &[ChangeRecord]) -> WritePlan {
    for rec in changes {
        let existing = match handle.node(&rec.path) {
            Ok(info) => {
                if info.attrs.contains_key(&rec.key) {
                    Some(Kind::Attribute)
                } else if info.children.contains(&rec.key) {
                    handle
                        .node(&tree::join(&rec.path, &rec.key))
                        .ok()
                        .map(|child| child.kind)
                } else {
                    None
                }
            }
            // Parent absent: the whole subtree is new, nothing to conflict.
            Err(_) => None,
        };
        if let Some(kind) = existing {
            if kind != rec.kind {
                debug!(
                    "'{}' under '{}' is a {kind} in the container but a {} in the change log",
                    rec.key, rec.path, rec.kind
                );
                return WritePlan::FullRewrite;
            }
        }
    }
    WritePlan::Patch
}

/// Apply one recorded change. Returns the number of nodes written.
fn apply_change(handle: &mut dyn EngineHandle, rec: &ChangeRecord) -> Result<usize> {
    let node_path = tree::join(&rec.path, &rec.key);
    match &rec.value {
        Node::Attribute(value) => {
            // Not every codec supports in-place attribute update:
            // delete-then-recreate is the uniform policy.
            if handle.delete_attribute(&rec.path, &rec.key).is_ok() {
                debug!("replaced attribute '{node_path}'");
            }
            handle.create_attribute(&rec.path, &rec.key, value)?;
            Ok(1)
        }
        Node::Dataset(ds) => {
            // Datasets are immutable in place: recreate, then re-attach
            // the attributes carried on the in-memory value.
            handle.create_dataset(&node_path, &ds.value)?;
            let mut written = 1;
            for (attr, value) in &ds.attrs {
                handle.create_attribute(&node_path, attr, value)?;
                written += 1;
            }
            Ok(written)
        }
        Node::Group(group) => {
            handle.create_group(&node_path)?;
            let mut written = 1;
            for (name, child) in &group.children {
                written += write_node(handle, &node_path, name, child)?;
            }
            Ok(written)
        }
    }
}

/// Write one in-memory node (and its subtree) under `path`.
fn write_node(
    handle: &mut dyn EngineHandle,
    path: &str,
    key: &str,
    node: &Node,
) -> Result<usize> {
    let rec = ChangeRecord {
        path: path.to_string(),
        key: key.to_string(),
        kind: node.kind(),
        value: node.clone(),
    };
    apply_change(handle, &rec)
}

/// Write every child of `group`, aggregating per-node failures.
fn write_group_contents(
    handle: &mut dyn EngineHandle,
    path: &str,
    group: &Group,
    report: &mut SaveReport,
) {
    for (name, child) in &group.children {
        match write_node(handle, path, name, child) {
            Ok(n) => report.written += n,
            Err(e) => {
                warn!(
                    "failed to write {} '{name}' under '{path}': {e}",
                    child.kind()
                );
                report.failed.push(FailedNode {
                    path: path.to_string(),
                    key: name.clone(),
                    kind: child.kind(),
                    message: e.to_string(),
                });
            }
        }
    }
}

/// Write keys present in memory but absent from the container, recursing
/// into existing groups and datasets for nested additions.
fn apply_new_keys(
    handle: &mut dyn EngineHandle,
    path: &str,
    group: &Group,
    report: &mut SaveReport,
) {
    let info = match handle.node(path) {
        Ok(info) => info,
        Err(_) => return, // parent missing: covered by the change log
    };

    for (name, child) in &group.children {
        let in_attrs = info.attrs.contains_key(name);
        let in_children = info.children.contains(name);
        if !in_attrs && !in_children {
            match write_node(handle, path, name, child) {
                Ok(n) => report.written += n,
                Err(e) => {
                    warn!(
                        "failed to write new {} '{name}' under '{path}': {e}",
                        child.kind()
                    );
                    report.failed.push(FailedNode {
                        path: path.to_string(),
                        key: name.clone(),
                        kind: child.kind(),
                        message: e.to_string(),
                    });
                }
            }
            continue;
        }
        let child_path = tree::join(path, name);
        match child {
            Node::Group(g) => apply_new_keys(handle, &child_path, g, report),
            Node::Dataset(ds) => {
                apply_new_dataset_attrs(handle, &child_path, &ds.attrs, report)
            }
            Node::Attribute(_) => {}
        }
    }
}

/// New attributes on a dataset that already exists in the container.
fn apply_new_dataset_attrs(
    handle: &mut dyn EngineHandle,
    path: &str,
    attrs: &BTreeMap<String, Scalar>,
    report: &mut SaveReport,
) {
    let existing = match handle.node(path) {
        Ok(info) => info.attrs,
        Err(_) => return,
    };
    for (name, value) in attrs {
        if existing.contains_key(name) {
            continue;
        }
        match handle.create_attribute(path, name, value) {
            Ok(()) => report.written += 1,
            Err(e) => {
                warn!("failed to write new attribute '{name}' on '{path}': {e}");
                report.failed.push(FailedNode {
                    path: path.to_string(),
                    key: name.clone(),
                    kind: Kind::Attribute,
                    message: e.to_string(),
                });
            }
        }
    }
}
