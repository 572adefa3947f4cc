//! The capability interface the container codec is consumed through.
//!
//! The core never parses the container format itself: everything goes
//! through [`Engine`] (open/create) and [`EngineHandle`] (node reads and
//! writes). [`mem::MemEngine`] is the in-memory reference implementation.

pub mod mem;

use std::fmt;

use silo_types::{NodeInfo, Result, Scalar};

/// Access mode for an open container handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    Read,
    Write,
    Append,
}

impl OpenMode {
    pub fn is_writable(&self) -> bool {
        !matches!(self, OpenMode::Read)
    }
}

impl fmt::Display for OpenMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OpenMode::Read => "read",
            OpenMode::Write => "write",
            OpenMode::Append => "append",
        };
        f.write_str(s)
    }
}

/// Opens containers by name. Implemented by the container codec adapter.
pub trait Engine: Send + Sync {
    /// Open a container. `Read` and `Append` require the container to
    /// exist; `Write` starts from an empty root.
    fn open(&self, name: &str, mode: OpenMode) -> Result<Box<dyn EngineHandle>>;

    /// Write an empty container under `name`, so a subsequent open can
    /// succeed. Used by the registry's create-on-open-failure path.
    fn create_empty(&self, name: &str) -> Result<()>;
}

/// An open container. Mutations are only durable after [`close`] — some
/// codecs finalize pending writes on close, which is why the registry
/// closes before reopening in a different mode.
///
/// [`close`]: EngineHandle::close
pub trait EngineHandle {
    /// One resolved level of the node at `path`.
    fn node(&self, path: &str) -> Result<NodeInfo>;

    fn exists(&self, path: &str) -> bool;

    /// Create a group at `path`, creating missing intermediate groups.
    fn create_group(&mut self, path: &str) -> Result<()>;

    /// Create a dataset at `path`, replacing any existing dataset there.
    fn create_dataset(&mut self, path: &str, value: &Scalar) -> Result<()>;

    /// Attach an attribute to the group or dataset at `path`.
    fn create_attribute(&mut self, path: &str, name: &str, value: &Scalar) -> Result<()>;

    fn delete_attribute(&mut self, path: &str, name: &str) -> Result<()>;

    /// Discard all content, leaving an empty root group.
    fn clear(&mut self) -> Result<()>;

    /// Finalize pending writes and release the handle.
    fn close(self: Box<Self>) -> Result<()>;
}

impl std::fmt::Debug for dyn EngineHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn EngineHandle")
    }
}
