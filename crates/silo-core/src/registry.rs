//! The container registry: sole owner of open engine handles.
//!
//! At most one handle is open per container name. Requesting a different
//! mode closes the previous handle first — closing is what finalizes
//! pending writes for some codecs, so the ordering is load-bearing.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use silo_types::{Result, SiloError};

use crate::engine::{Engine, EngineHandle, OpenMode};

struct Slot {
    open: Option<(OpenMode, Box<dyn EngineHandle>)>,
    /// Set for names registered as remote streams; such names are never
    /// valid save destinations.
    remote_url: Option<String>,
}

impl Slot {
    fn empty() -> Self {
        Self {
            open: None,
            remote_url: None,
        }
    }
}

pub struct Registry {
    engine: Arc<dyn Engine>,
    slots: HashMap<String, Slot>,
}

impl Registry {
    pub fn new(engine: Arc<dyn Engine>) -> Self {
        Self {
            engine,
            slots: HashMap::new(),
        }
    }

    pub fn engine(&self) -> &Arc<dyn Engine> {
        &self.engine
    }

    /// Names currently registered, open or not.
    pub fn names(&self) -> Vec<String> {
        self.slots.keys().cloned().collect()
    }

    pub fn is_remote(&self, name: &str) -> bool {
        self.slots
            .get(name)
            .is_some_and(|s| s.remote_url.is_some())
    }

    /// Record `name` as backed by a remote URL. Remote names are read-only
    /// views and are rejected as save destinations.
    pub fn register_remote(&mut self, name: &str, url: &str) {
        let slot = self.slots.entry(name.to_string()).or_insert_with(Slot::empty);
        slot.remote_url = Some(url.to_string());
    }

    /// An open handle for `name` in `mode`, reusing a same-mode handle and
    /// closing a differently-moded one first.
    ///
    /// If the open fails and `create` is set, an empty container is written
    /// and the open retried once; a second failure is `ContainerOpen`.
    pub fn get(
        &mut self,
        name: &str,
        mode: OpenMode,
        create: bool,
    ) -> Result<&mut Box<dyn EngineHandle>> {
        validate_name(name)?;

        let need_open = match self.slots.get_mut(name) {
            Some(slot) => match &slot.open {
                Some((open_mode, _)) if *open_mode == mode => false,
                Some(_) => {
                    // One open handle per name: close the old mode before
                    // reopening.
                    let (old_mode, handle) = slot.open.take().expect("slot checked open");
                    debug!("closing '{name}' ({old_mode}) before reopening as {mode}");
                    handle.close()?;
                    true
                }
                None => true,
            },
            None => true,
        };

        if need_open {
            let handle = match self.engine.open(name, mode) {
                Ok(h) => h,
                Err(first_err) if create => {
                    debug!("open '{name}' failed ({first_err}); creating empty container");
                    self.engine.create_empty(name)?;
                    self.engine
                        .open(name, mode)
                        .map_err(|e| SiloError::ContainerOpen {
                            name: name.to_string(),
                            reason: e.to_string(),
                        })?
                }
                Err(e) => return Err(e),
            };
            let slot = self
                .slots
                .entry(name.to_string())
                .or_insert_with(Slot::empty);
            slot.open = Some((mode, handle));
        }

        let slot = self.slots.get_mut(name).expect("slot present after open");
        let (_, handle) = slot.open.as_mut().expect("slot holds an open handle");
        Ok(handle)
    }

    /// Close one handle, or every registered handle when `name` is `None`
    /// (full teardown). Slots are evicted either way.
    pub fn close(&mut self, name: Option<&str>) -> Result<()> {
        match name {
            Some(name) => {
                if let Some(slot) = self.slots.remove(name) {
                    if let Some((mode, handle)) = slot.open {
                        debug!("closing '{name}' ({mode})");
                        handle.close()?;
                    }
                }
                Ok(())
            }
            None => {
                let mut first_err = None;
                for (name, slot) in self.slots.drain() {
                    if let Some((mode, handle)) = slot.open {
                        debug!("closing '{name}' ({mode})");
                        if let Err(e) = handle.close() {
                            first_err.get_or_insert(e);
                        }
                    }
                }
                match first_err {
                    Some(e) => Err(e),
                    None => Ok(()),
                }
            }
        }
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name.contains('/') {
        return Err(SiloError::InvalidDestination(name.to_string()));
    }
    Ok(())
}
