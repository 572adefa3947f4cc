//! Top-level manager owning the registry.

use std::sync::Arc;

use silo_types::Result;

use crate::document::Document;
use crate::engine::Engine;
use crate::marshal::{self, SaveReport};
use crate::registry::Registry;

/// Owns the container registry and exposes the load/save surface. The
/// registry is constructed here and torn down on [`Silo::close`] — there is
/// no ambient global state.
pub struct Silo {
    registry: Registry,
}

impl Silo {
    pub fn new(engine: Arc<dyn Engine>) -> Self {
        Self {
            registry: Registry::new(engine),
        }
    }

    /// Read the container `name` into a mutable document.
    pub fn load(&mut self, name: &str) -> Result<Document> {
        marshal::read_document(&mut self.registry, name)
    }

    /// Persist a document's recorded changes to `name`, creating the
    /// container if needed.
    pub fn save(&mut self, doc: &mut Document, name: &str) -> Result<SaveReport> {
        marshal::save(&mut self.registry, doc, name)
    }

    /// Close one handle, or all of them when `name` is `None`.
    pub fn close(&mut self, name: Option<&str>) -> Result<()> {
        self.registry.close(name)
    }

    pub fn registry(&mut self) -> &mut Registry {
        &mut self.registry
    }
}
