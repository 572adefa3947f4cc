use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::kind::Kind;
use crate::scalar::Scalar;

/// One resolved level of a container node, as returned by an engine handle
/// or shipped across the cache-worker boundary.
///
/// Groups carry `children` (names only — children resolve on demand);
/// datasets and attributes carry `value`. Both may carry attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub kind: Kind,
    pub attrs: BTreeMap<String, Scalar>,
    /// Child names, present for groups only.
    pub children: Vec<String>,
    /// Node value, present for datasets and attributes only.
    pub value: Option<Scalar>,
}

impl NodeInfo {
    pub fn group(attrs: BTreeMap<String, Scalar>, children: Vec<String>) -> Self {
        Self {
            kind: Kind::Group,
            attrs,
            children,
            value: None,
        }
    }

    pub fn dataset(value: Scalar, attrs: BTreeMap<String, Scalar>) -> Self {
        Self {
            kind: Kind::Dataset,
            attrs,
            children: Vec::new(),
            value: Some(value),
        }
    }
}

/// Element range for partial dataset reads. Inclusive start, exclusive end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SliceSpec {
    pub start: usize,
    pub end: usize,
}
