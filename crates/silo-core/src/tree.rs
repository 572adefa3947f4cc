//! The in-memory node model: groups, datasets, attributes.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use silo_types::{Kind, Scalar};

/// A node in the container tree. The kind tag is structural — after a caller
/// replaces a node's value, the writer still knows what to emit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Node {
    Group(Group),
    Dataset(Dataset),
    Attribute(Scalar),
}

/// A named node holding uniquely-named children. Group attributes live in
/// the same namespace as child nodes, as `Node::Attribute` entries — the
/// flat view callers enumerate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub children: BTreeMap<String, Node>,
}

/// A leaf holding a value plus its own attribute map. A bare scalar cannot
/// carry side-channel attribute data, so dataset leaves are always this
/// boxed form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub value: Scalar,
    pub attrs: BTreeMap<String, Scalar>,
}

impl Node {
    pub fn kind(&self) -> Kind {
        match self {
            Node::Group(_) => Kind::Group,
            Node::Dataset(_) => Kind::Dataset,
            Node::Attribute(_) => Kind::Attribute,
        }
    }

    /// The scalar payload of a dataset or attribute.
    pub fn scalar(&self) -> Option<&Scalar> {
        match self {
            Node::Dataset(ds) => Some(&ds.value),
            Node::Attribute(s) => Some(s),
            Node::Group(_) => None,
        }
    }

    pub fn as_group(&self) -> Option<&Group> {
        match self {
            Node::Group(g) => Some(g),
            _ => None,
        }
    }
}

impl Group {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Node> {
        self.children.get(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, node: impl Into<Node>) -> Option<Node> {
        self.children.insert(name.into(), node.into())
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Child names in enumeration order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.children.keys().map(String::as_str)
    }
}

impl Dataset {
    pub fn new(value: impl Into<Scalar>) -> Self {
        Self {
            value: value.into(),
            attrs: BTreeMap::new(),
        }
    }

    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<Scalar>) -> Self {
        self.attrs.insert(name.into(), value.into());
        self
    }
}

impl From<Group> for Node {
    fn from(g: Group) -> Self {
        Node::Group(g)
    }
}

impl From<Dataset> for Node {
    fn from(ds: Dataset) -> Self {
        Node::Dataset(ds)
    }
}

impl From<Scalar> for Node {
    fn from(s: Scalar) -> Self {
        Node::Attribute(s)
    }
}

impl From<&str> for Node {
    fn from(s: &str) -> Self {
        Node::Attribute(Scalar::from(s))
    }
}

// ── Path helpers ───────────────────────────────────────────────────────────

/// Normalize a container path: leading slash, no empty segments.
pub fn normalize(path: &str) -> String {
    let mut out = String::from("/");
    for seg in path.split('/').filter(|s| !s.is_empty()) {
        if out.len() > 1 {
            out.push('/');
        }
        out.push_str(seg);
    }
    out
}

/// Path segments of a normalized path; empty for the root.
pub fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

/// Join a parent path and a child name.
pub fn join(parent: &str, name: &str) -> String {
    let parent = normalize(parent);
    if parent == "/" {
        format!("/{name}")
    } else {
        format!("{parent}/{name}")
    }
}

/// Split a normalized path into its parent path and final segment.
/// Returns `None` for the root.
pub fn parent_and_key(path: &str) -> Option<(String, String)> {
    let path = normalize(path);
    if path == "/" {
        return None;
    }
    match path.rfind('/') {
        Some(0) => Some(("/".to_string(), path[1..].to_string())),
        Some(n) => Some((path[..n].to_string(), path[n + 1..].to_string())),
        None => None,
    }
}
