use serde::{Deserialize, Serialize};
use std::fmt;

/// Structural tag carried by every node.
///
/// The tag decides which engine write call persists a node, so it travels
/// with the value itself rather than being inferred at write time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Kind {
    /// A named node holding child nodes.
    Group,
    /// A named node holding a scalar/array value plus attributes.
    Dataset,
    /// A named scalar/array value attached to a group or dataset. No children.
    Attribute,
}

impl Kind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Kind::Group => "group",
            Kind::Dataset => "dataset",
            Kind::Attribute => "attribute",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
