//! On-demand resolution of a remote container tree.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use silo_core::Document;
use silo_core::tree::{self, Dataset, Group, Node};
use silo_types::{Kind, NodeInfo, Result, Scalar, SiloError, SliceSpec};

use crate::fetch::RangeFetcher;
use crate::protocol::{Reply, Request};
use crate::proxy::{Callbacks, LazyProxy};
use crate::source::SourceCodec;

/// Remote access tuning.
pub struct StreamOptions {
    pub chunk_size: u64,
    pub cache_capacity: usize,
    /// Per-request deadline; `None` blocks until the worker answers.
    pub deadline: Option<Duration>,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            chunk_size: 1 << 20,
            cache_capacity: 50,
            deadline: None,
        }
    }
}

/// Explicit resolution state of a group child. Resolution happens on the
/// first [`LazyTree::get`] of the child's path, never as a side effect of
/// enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Unresolved,
    Resolved,
}

#[derive(Debug, Clone)]
pub struct ChildState {
    pub name: String,
    pub state: Resolution,
}

/// One resolved level of the remote tree.
#[derive(Debug, Clone)]
pub struct LazyNode {
    pub path: String,
    pub kind: Kind,
    pub attrs: BTreeMap<String, Scalar>,
    pub value: Option<Scalar>,
    pub children: Vec<ChildState>,
}

/// A remote container resolved one level at a time through the proxy.
/// Every node served from here is a read-only streaming view.
#[derive(Debug)]
pub struct LazyTree {
    proxy: LazyProxy,
    deadline: Option<Duration>,
    resolved: HashMap<String, LazyNode>,
}

impl LazyTree {
    /// Open a remote container. Nothing beyond the content length is
    /// fetched until a node is requested.
    pub fn open(
        codec: Box<dyn SourceCodec>,
        fetcher: Arc<dyn RangeFetcher>,
        url: &str,
        options: StreamOptions,
        callbacks: Callbacks,
    ) -> Result<Self> {
        let proxy = LazyProxy::spawn(codec, fetcher, callbacks);
        let tree = Self {
            proxy,
            deadline: options.deadline,
            resolved: HashMap::new(),
        };
        match tree.request(Request::Load {
            url: url.to_string(),
            chunk_size: options.chunk_size,
            capacity: options.cache_capacity,
        })? {
            Reply::Loaded => Ok(tree),
            Reply::Error(reason) => Err(SiloError::ContainerOpen {
                name: url.to_string(),
                reason,
            }),
            Reply::Node(_) => Err(SiloError::Protocol(
                "node reply to a load request".to_string(),
            )),
        }
    }

    fn request(&self, request: Request) -> Result<Reply> {
        match self.deadline {
            Some(deadline) => self.proxy.send_with_deadline(request, deadline),
            None => self.proxy.send(request),
        }
    }

    /// Resolve one level at `path`. Each remote path is fetched at most
    /// once per session; later calls return the memoized node.
    pub fn get(&mut self, path: &str) -> Result<&LazyNode> {
        let path = tree::normalize(path);
        if !self.resolved.contains_key(&path) {
            let info = self.fetch(&path)?;
            let node = self.materialize(&path, info);
            self.mark_resolved(&path);
            self.resolved.insert(path.clone(), node);
        }
        Ok(self.resolved.get(&path).expect("just resolved"))
    }

    fn fetch(&self, path: &str) -> Result<NodeInfo> {
        match self.request(Request::Get {
            path: path.to_string(),
            slice: None,
        })? {
            Reply::Node(info) => Ok(info),
            Reply::Error(msg) => {
                debug!("remote resolution of '{path}' failed: {msg}");
                Err(SiloError::NodeNotFound(path.to_string()))
            }
            Reply::Loaded => Err(SiloError::Protocol(
                "load reply to a get request".to_string(),
            )),
        }
    }

    fn materialize(&self, path: &str, info: NodeInfo) -> LazyNode {
        let children = info
            .children
            .into_iter()
            .map(|name| {
                let state = if self.resolved.contains_key(&tree::join(path, &name)) {
                    Resolution::Resolved
                } else {
                    Resolution::Unresolved
                };
                ChildState { name, state }
            })
            .collect();
        LazyNode {
            path: path.to_string(),
            kind: info.kind,
            attrs: info.attrs,
            value: info.value,
            children,
        }
    }

    /// Flip the parent's marker for a freshly resolved child.
    fn mark_resolved(&mut self, path: &str) {
        if let Some((parent, key)) = tree::parent_and_key(path) {
            if let Some(node) = self.resolved.get_mut(&parent) {
                if let Some(child) = node.children.iter_mut().find(|c| c.name == key) {
                    child.state = Resolution::Resolved;
                }
            }
        }
    }

    /// Partial read of a dataset's array value. Not memoized.
    pub fn dataset_slice(&self, path: &str, slice: SliceSpec) -> Result<Scalar> {
        let path = tree::normalize(path);
        match self.request(Request::Get {
            path: path.clone(),
            slice: Some(slice),
        })? {
            Reply::Node(info) => info.value.ok_or(SiloError::NodeNotFound(path)),
            Reply::Error(_) => Err(SiloError::NodeNotFound(path)),
            Reply::Loaded => Err(SiloError::Protocol(
                "load reply to a get request".to_string(),
            )),
        }
    }

    /// Materialize the whole remote tree into a streaming [`Document`] —
    /// readable, but refused by save.
    pub fn to_document(&mut self) -> Result<Document> {
        let root = self.materialize_group("/")?;
        Ok(Document::from_root(root, true))
    }

    fn materialize_group(&mut self, path: &str) -> Result<Group> {
        let node = self.get(path)?.clone();
        let mut group = Group::new();
        for (name, value) in node.attrs {
            group.insert(name, Node::Attribute(value));
        }
        for child in node.children {
            let child_path = tree::join(path, &child.name);
            let resolved = self.get(&child_path)?.clone();
            let child_node = match resolved.kind {
                Kind::Group => Node::Group(self.materialize_group(&child_path)?),
                Kind::Dataset => Node::Dataset(Dataset {
                    value: resolved
                        .value
                        .ok_or_else(|| SiloError::NodeNotFound(child_path.clone()))?,
                    attrs: resolved.attrs,
                }),
                Kind::Attribute => Node::Attribute(
                    resolved
                        .value
                        .ok_or_else(|| SiloError::NodeNotFound(child_path.clone()))?,
                ),
            };
            group.insert(child.name, child_node);
        }
        Ok(group)
    }

    pub fn violations(&self) -> u64 {
        self.proxy.violations()
    }
}
