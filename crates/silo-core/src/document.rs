//! The caller-facing mutable tree and its change log.
//!
//! Every mutation goes through an explicit setter that records a
//! [`ChangeRecord`]; nothing touches the backing store until
//! [`crate::marshal::save`] replays the log.

use silo_types::{Kind, Result, Scalar, SiloError};

use crate::tree::{self, Dataset, Group, Node};

/// One recorded mutation: `key` under the group or dataset at `path` was
/// set to `value`. Latest record per `(path, key)` wins at save time.
#[derive(Debug, Clone)]
pub struct ChangeRecord {
    pub path: String,
    pub key: String,
    pub kind: Kind,
    pub value: Node,
}

/// Append-only ordered mutation log, scoped to one document.
#[derive(Debug, Default)]
pub struct ChangeLog {
    records: Vec<ChangeRecord>,
}

impl ChangeLog {
    pub fn push(&mut self, record: ChangeRecord) {
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// The last record for each `(path, key)` pair, in first-appearance
    /// order. Earlier overridden records are dropped.
    pub fn latest(&self) -> Vec<ChangeRecord> {
        let mut out: Vec<ChangeRecord> = Vec::new();
        for rec in &self.records {
            match out
                .iter_mut()
                .find(|r| r.path == rec.path && r.key == rec.key)
            {
                Some(slot) => *slot = rec.clone(),
                None => out.push(rec.clone()),
            }
        }
        out
    }
}

/// A mutable in-memory container tree.
///
/// Documents produced by the lazy remote resolver are tagged streaming and
/// are read-only views: [`crate::marshal::save`] refuses them.
#[derive(Debug, Default)]
pub struct Document {
    root: Group,
    changes: ChangeLog,
    streaming: bool,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_root(root: Group, streaming: bool) -> Self {
        Self {
            root,
            changes: ChangeLog::default(),
            streaming,
        }
    }

    pub fn root(&self) -> &Group {
        &self.root
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    pub fn pending_changes(&self) -> usize {
        self.changes.len()
    }

    pub(crate) fn changes(&self) -> &ChangeLog {
        &self.changes
    }

    pub(crate) fn changes_mut(&mut self) -> &mut ChangeLog {
        &mut self.changes
    }

    /// Resolve a path to a node. Paths into a dataset's attribute map
    /// resolve via [`Document::scalar`] instead — attributes of a dataset
    /// are scalars, not nodes.
    pub fn node(&self, path: &str) -> Option<&Node> {
        let path = tree::normalize(path);
        let mut segs = tree::segments(&path);
        let first = match segs.next() {
            Some(s) => s,
            None => return None, // the root group is not a Node
        };
        let mut current = self.root.get(first)?;
        for seg in segs {
            current = current.as_group()?.get(seg)?;
        }
        Some(current)
    }

    /// The scalar value at a path: an attribute's value, a dataset's value,
    /// or an attribute attached to a dataset (`/dataset/metadata`).
    pub fn scalar(&self, path: &str) -> Option<&Scalar> {
        if let Some(node) = self.node(path) {
            return node.scalar();
        }
        let (parent, key) = tree::parent_and_key(path)?;
        match self.node(&parent)? {
            Node::Dataset(ds) => ds.attrs.get(&key),
            _ => None,
        }
    }

    /// Child names of the group at `path` (the root for `"/"`).
    pub fn keys(&self, path: &str) -> Option<Vec<String>> {
        let group = self.group_at(&tree::normalize(path))?;
        Some(group.keys().map(str::to_string).collect())
    }

    fn group_at(&self, path: &str) -> Option<&Group> {
        if path == "/" {
            return Some(&self.root);
        }
        self.node(path)?.as_group()
    }

    /// Set `key` under the node at `path`, recording the change.
    ///
    /// Kind resolution: an existing dataset key keeps its dataset kind when
    /// assigned a bare scalar (the value is replaced, attributes are kept);
    /// setting anything on a dataset node attaches an attribute; otherwise
    /// the structural tag of the new value is honored. Setting a value
    /// equal to the current one records nothing.
    pub fn set(&mut self, path: &str, key: &str, value: impl Into<Node>) -> Result<()> {
        self.set_inner(path, key, value.into(), false)
    }

    /// Set `key` as an attribute regardless of the value's tag or any
    /// existing kind at that key.
    pub fn set_attr(&mut self, path: &str, key: &str, value: impl Into<Scalar>) -> Result<()> {
        self.set_inner(path, key, Node::Attribute(value.into()), true)
    }

    fn set_inner(&mut self, path: &str, key: &str, value: Node, force_attr: bool) -> Result<()> {
        let path = tree::normalize(path);
        if key.is_empty() || key.contains('/') {
            return Err(SiloError::Other(format!("invalid key: '{key}'")));
        }

        enum Target<'a> {
            Group(&'a mut Group),
            Dataset(&'a mut Dataset),
        }

        let target = if path == "/" {
            Target::Group(&mut self.root)
        } else {
            let current: &mut Node = {
                let mut segs = tree::segments(&path);
                let first = segs.next().expect("non-root path has a segment");
                let mut node = self
                    .root
                    .children
                    .get_mut(first)
                    .ok_or_else(|| SiloError::NodeNotFound(path.clone()))?;
                for seg in segs {
                    node = match node {
                        Node::Group(g) => g
                            .children
                            .get_mut(seg)
                            .ok_or_else(|| SiloError::NodeNotFound(path.clone()))?,
                        _ => return Err(SiloError::NodeNotFound(path.clone())),
                    };
                }
                node
            };
            match current {
                Node::Group(g) => Target::Group(g),
                Node::Dataset(ds) => Target::Dataset(ds),
                Node::Attribute(_) => {
                    return Err(SiloError::Other(format!(
                        "cannot set keys on attribute '{path}'"
                    )));
                }
            }
        };

        let record = match target {
            Target::Dataset(ds) => {
                // Anything set on a dataset node is an attribute of it.
                let scalar = match value {
                    Node::Attribute(s) => s,
                    Node::Dataset(d) => d.value,
                    Node::Group(_) => {
                        return Err(SiloError::Other(format!(
                            "cannot attach a group to dataset '{path}'"
                        )));
                    }
                };
                if ds.attrs.get(key) == Some(&scalar) {
                    return Ok(());
                }
                ds.attrs.insert(key.to_string(), scalar.clone());
                ChangeRecord {
                    path,
                    key: key.to_string(),
                    kind: Kind::Attribute,
                    value: Node::Attribute(scalar),
                }
            }
            Target::Group(group) => {
                let coerced = if force_attr {
                    value
                } else {
                    match (group.children.get(key), value) {
                        // A bare scalar assigned to an existing dataset key
                        // replaces the value and keeps the attributes.
                        (Some(Node::Dataset(old)), Node::Attribute(s)) => {
                            Node::Dataset(Dataset {
                                value: s,
                                attrs: old.attrs.clone(),
                            })
                        }
                        (_, v) => v,
                    }
                };
                if group.children.get(key) == Some(&coerced) {
                    return Ok(());
                }
                group.children.insert(key.to_string(), coerced.clone());
                ChangeRecord {
                    path,
                    key: key.to_string(),
                    kind: coerced.kind(),
                    value: coerced,
                }
            }
        };

        self.changes.push(record);
        Ok(())
    }
}
