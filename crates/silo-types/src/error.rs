use thiserror::Error;

use crate::kind::Kind;

pub type Result<T> = std::result::Result<T, SiloError>;

#[derive(Debug, Error)]
pub enum SiloError {
    #[error("cannot open container '{name}': {reason}")]
    ContainerOpen { name: String, reason: String },

    #[error("node not found: '{0}'")]
    NodeNotFound(String),

    #[error("no worker channel available")]
    ChannelUnavailable,

    #[error("request {id} timed out")]
    RequestTimeout { id: u64 },

    #[error("cannot persist a streaming (remote-backed) tree")]
    CannotPersistStreamingNode,

    #[error("invalid destination name: '{0}'")]
    InvalidDestination(String),

    #[error("failed to write {kind} '{key}' under '{path}': {cause}")]
    NodeWrite {
        path: String,
        key: String,
        kind: Kind,
        cause: String,
    },

    #[error("protocol violation: {0}")]
    Protocol(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] rmp_serde::encode::Error),

    #[error("deserialization error: {0}")]
    Deserialization(#[from] rmp_serde::decode::Error),

    #[error("{0}")]
    Other(String),
}
