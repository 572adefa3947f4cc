//! Reference codec: the encoded-tree container format read lazily through
//! a [`ByteSource`].

use std::collections::BTreeMap;

use silo_core::format;
use silo_core::tree::{self, Group, Node};
use silo_types::{Kind, NodeInfo, Result, SliceSpec};

use crate::cache::ByteSource;
use crate::source::{SourceCodec, SourceReader};

/// Reads a container in the `format` module's encoding. The byte stream is
/// pulled through the source in pieces on the first node lookup, so a
/// chunked backing fetches incrementally rather than as one giant range.
pub struct EncodedTreeCodec;

const READ_STEP: usize = 64 * 1024;

impl SourceCodec for EncodedTreeCodec {
    fn open(&self, source: Box<dyn ByteSource>) -> Result<Box<dyn SourceReader>> {
        Ok(Box::new(EncodedTreeReader { source, root: None }))
    }
}

struct EncodedTreeReader {
    source: Box<dyn ByteSource>,
    root: Option<Group>,
}

impl EncodedTreeReader {
    /// Decode on first use; a failed decode leaves `root` unset so a later
    /// lookup can retry after a transient fetch failure.
    fn root(&mut self) -> Result<&Group> {
        if self.root.is_none() {
            let len = self.source.len() as usize;
            let mut bytes = vec![0u8; len];
            let mut off = 0;
            while off < len {
                let hi = (off + READ_STEP).min(len);
                self.source.read_at(off as u64, &mut bytes[off..hi])?;
                off = hi;
            }
            self.root = Some(format::decode_root(&bytes)?);
        }
        Ok(self.root.as_ref().expect("decoded above"))
    }
}

impl SourceReader for EncodedTreeReader {
    fn node(&mut self, path: &str, slice: Option<SliceSpec>) -> Result<NodeInfo> {
        let path = tree::normalize(path);
        let root = self.root()?;
        if path == "/" {
            return Ok(group_info(root));
        }
        let mut current = root
            .get(first_segment(&path))
            .ok_or_else(|| silo_types::SiloError::NodeNotFound(path.clone()))?;
        for seg in tree::segments(&path).skip(1) {
            current = current
                .as_group()
                .and_then(|g| g.get(seg))
                .ok_or_else(|| silo_types::SiloError::NodeNotFound(path.clone()))?;
        }
        Ok(match current {
            Node::Group(g) => group_info(g),
            Node::Dataset(ds) => {
                let value = match slice {
                    Some(s) => ds.value.slice(s.start, s.end),
                    None => ds.value.clone(),
                };
                NodeInfo::dataset(value, ds.attrs.clone())
            }
            Node::Attribute(s) => NodeInfo {
                kind: Kind::Attribute,
                attrs: BTreeMap::new(),
                children: Vec::new(),
                value: Some(match slice {
                    Some(spec) => s.slice(spec.start, spec.end),
                    None => s.clone(),
                }),
            },
        })
    }
}

fn first_segment(path: &str) -> &str {
    tree::segments(path).next().unwrap_or_default()
}

/// Split a group's flat namespace into the wire view: attribute entries
/// become the attrs map, groups and datasets become children.
fn group_info(group: &Group) -> NodeInfo {
    let mut attrs = BTreeMap::new();
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
