//! In-memory reference engine. Thread-safe via Mutex.
//!
//! Containers live as encoded bytes (see [`crate::format`]) in a shared
//! map. A handle decodes on open, mutates a working tree, and publishes
//! re-encoded bytes on close — writes made through a handle are invisible
//! to readers until the handle closes, the same finalize-on-close contract
//! real container codecs have.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use silo_types::{Kind, NodeInfo, Result, Scalar, SiloError};

use crate::format;
use crate::tree::{self, Dataset, Group, Node};

use super::{Engine, EngineHandle, OpenMode};

type SharedStore = Arc<Mutex<HashMap<String, Vec<u8>>>>;

/// In-memory container engine backed by a shared byte store.
#[derive(Clone, Default)]
pub struct MemEngine {
    store: SharedStore,
}

impl MemEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a container exists under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.store.lock().unwrap().contains_key(name)
    }

    /// The encoded bytes of a container, as a reader over HTTP would see
    /// them. Used by byte-level equivalence tests and remote-access tests.
    pub fn raw(&self, name: &str) -> Option<Vec<u8>> {
        self.store.lock().unwrap().get(name).cloned()
    }
}

impl Engine for MemEngine {
    fn open(&self, name: &str, mode: OpenMode) -> Result<Box<dyn EngineHandle>> {
        let root = match mode {
            OpenMode::Write => Group::new(),
            OpenMode::Read | OpenMode::Append => {
                let store = self.store.lock().unwrap();
                let bytes = store.get(name).ok_or_else(|| SiloError::ContainerOpen {
                    name: name.to_string(),
                    reason: "no such container".to_string(),
                })?;
                format::decode_root(bytes)?
            }
        };
        Ok(Box::new(MemHandle {
            name: name.to_string(),
            mode,
            root,
            store: self.store.clone(),
        }))
    }

    fn create_empty(&self, name: &str) -> Result<()> {
        let bytes = format::encode_root(&Group::new())?;
        self.store.lock().unwrap().insert(name.to_string(), bytes);
        Ok(())
    }
}

struct MemHandle {
    name: String,
    mode: OpenMode,
    root: Group,
    store: SharedStore,
}

impl MemHandle {
    fn lookup(&self, path: &str) -> Option<&Node> {
        let path = tree::normalize(path);
        let mut segs = tree::segments(&path);
        let first = segs.next()?;
        let mut current = self.root.get(first)?;
        for seg in segs {
            current = current.as_group()?.get(seg)?;
        }
        Some(current)
    }

    /// Mutable group at `path`, creating missing intermediate groups.
    fn group_mut(&mut self, path: &str) -> Result<&mut Group> {
        let path = tree::normalize(path);
        let mut current = &mut self.root;
        for seg in tree::segments(&path) {
            let entry = current
                .children
                .entry(seg.to_string())
                .or_insert_with(|| Node::Group(Group::new()));
            current = match entry {
                Node::Group(g) => g,
                _ => {
                    return Err(SiloError::Other(format!(
                        "'{seg}' in '{path}' is not a group"
                    )));
                }
            };
        }
        Ok(current)
    }

    fn writable(&self) -> Result<()> {
        if self.mode.is_writable() {
            Ok(())
        } else {
            Err(SiloError::Other(format!(
                "container '{}' is open read-only",
                self.name
            )))
        }
    }
}

/// Split a group's flat child namespace into the engine view: attribute
/// entries become the attrs map, groups and datasets become children.
fn group_info(group: &Group) -> NodeInfo {
    let mut attrs = std::collections::BTreeMap::new();
    let mut children = Vec::new();
    for (name, node) in &group.children {
        match node {
            Node::Attribute(s) => {
                attrs.insert(name.clone(), s.clone());
            }
            _ => children.push(name.clone()),
        }
    }
    NodeInfo::group(attrs, children)
}

impl EngineHandle for MemHandle {
    fn node(&self, path: &str) -> Result<NodeInfo> {
        let path = tree::normalize(path);
        if path == "/" {
            return Ok(group_info(&self.root));
        }
        match self.lookup(&path) {
            Some(Node::Group(g)) => Ok(group_info(g)),
            Some(Node::Dataset(ds)) => Ok(NodeInfo::dataset(ds.value.clone(), ds.attrs.clone())),
            Some(Node::Attribute(s)) => Ok(NodeInfo {
                kind: Kind::Attribute,
                attrs: Default::default(),
                children: Vec::new(),
                value: Some(s.clone()),
            }),
            None => Err(SiloError::NodeNotFound(path)),
        }
    }

    fn exists(&self, path: &str) -> bool {
        tree::normalize(path) == "/" || self.lookup(path).is_some()
    }

    fn create_group(&mut self, path: &str) -> Result<()> {
        self.writable()?;
        self.group_mut(path)?;
        Ok(())
    }

    fn create_dataset(&mut self, path: &str, value: &Scalar) -> Result<()> {
        self.writable()?;
        let (parent, key) = tree::parent_and_key(path)
            .ok_or_else(|| SiloError::Other("cannot create a dataset at the root".to_string()))?;
        self.group_mut(&parent)?
            .insert(key, Dataset::new(value.clone()));
        Ok(())
    }

    fn create_attribute(&mut self, path: &str, name: &str, value: &Scalar) -> Result<()> {
        self.writable()?;
        let path = tree::normalize(path);
        if path == "/" {
            self.root.insert(name, Node::Attribute(value.clone()));
            return Ok(());
        }
        // Attach to a dataset's attribute map or into a group's namespace.
        let (parent, key) = tree::parent_and_key(&path).expect("non-root path");
        let group = self.group_mut(&parent)?;
        match group.children.get_mut(&key) {
            Some(Node::Dataset(ds)) => {
                ds.attrs.insert(name.to_string(), value.clone());
                Ok(())
            }
            Some(Node::Group(g)) => {
                g.insert(name, Node::Attribute(value.clone()));
                Ok(())
            }
            Some(Node::Attribute(_)) => Err(SiloError::Other(format!(
                "cannot attach attribute to attribute '{path}'"
            ))),
            None => Err(SiloError::NodeNotFound(path)),
        }
    }

    fn delete_attribute(&mut self, path: &str, name: &str) -> Result<()> {
        self.writable()?;
        let path = tree::normalize(path);
        let removed = if path == "/" {
            matches!(self.root.children.remove(name), Some(Node::Attribute(_)))
        } else {
            let (parent, key) = tree::parent_and_key(&path).expect("non-root path");
            let group = self.group_mut(&parent)?;
            match group.children.get_mut(&key) {
                Some(Node::Dataset(ds)) => ds.attrs.remove(name).is_some(),
                Some(Node::Group(g)) => {
                    matches!(g.children.remove(name), Some(Node::Attribute(_)))
                }
                _ => false,
            }
        };
        if removed {
            Ok(())
        } else {
            Err(SiloError::NodeNotFound(tree::join(&path, name)))
        }
    }

    fn clear(&mut self) -> Result<()> {
        self.writable()?;
        self.root = Group::new();
        Ok(())
    }

    fn close(self: Box<Self>) -> Result<()> {
        if self.mode.is_writable() {
            let bytes = format::encode_root(&self.root)?;
            self.store.lock().unwrap().insert(self.name, bytes);
        }
        Ok(())
    }
}
