//! In-memory node trees bridged to hierarchical binary containers.
//!
//! The core pieces: the [`engine`] capability traits the container codec is
//! consumed through, the [`registry::Registry`] that owns open handles, the
//! mutable [`document::Document`] tree with its change log, and the
//! [`marshal`] module that reads containers into documents and replays only
//! recorded mutations back.

pub mod document;
pub mod engine;
pub mod format;
pub mod manager;
pub mod marshal;
pub mod registry;
pub mod tree;

pub use silo_types::{Kind, NodeInfo, Result, Scalar, SiloError, SliceSpec};

pub use document::Document;
pub use manager::Silo;

#[cfg(test)]
mod testutil;
