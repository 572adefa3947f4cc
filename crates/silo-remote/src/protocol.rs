//! Message shapes between the proxy and the cache worker.
//!
//! Strictly split: a [`Outbound::Reply`] answers exactly one request by
//! correlation id; an [`Outbound::Event`] is broadcast and consumes no id.

use silo_types::{NodeInfo, SliceSpec};

/// A request stamped with its correlation id.
#[derive(Debug)]
pub struct RequestEnvelope {
    pub id: u64,
    pub request: Request,
}

#[derive(Debug, Clone)]
pub enum Request {
    /// Establish a virtual file view over `url`. Nothing is fetched
    /// eagerly; a second `Load` replaces the first.
    Load {
        url: String,
        chunk_size: u64,
        capacity: usize,
    },
    /// Resolve one level of the node at `path`.
    Get {
        path: String,
        slice: Option<SliceSpec>,
    },
}

#[derive(Debug)]
pub enum Outbound {
    Reply { id: u64, reply: Reply },
    Event(Event),
}

#[derive(Debug, Clone)]
pub enum Reply {
    Loaded,
    Node(NodeInfo),
    Error(String),
}

#[derive(Debug, Clone, Copy)]
pub enum Event {
    Progress { ratio: f64, total_len: u64, id: u64 },
    Success { from_remote: bool, id: u64 },
}
