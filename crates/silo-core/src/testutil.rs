use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use silo_types::{NodeInfo, Result, Scalar, SiloError};

use crate::document::Document;
use crate::engine::mem::MemEngine;
use crate::engine::{Engine, EngineHandle, OpenMode};
use crate::tree::{Dataset, Group, Node};

/// Engine wrapper that records every write call as `"op path"` strings.
/// Used to assert that saves touch exactly the nodes they should.
#[derive(Clone)]
pub struct RecordingEngine {
    inner: MemEngine,
    pub ops: Arc<Mutex<Vec<String>>>,
}

impl RecordingEngine {
    pub fn new() -> Self {
        Self {
            inner: MemEngine::new(),
            ops: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn mem(&self) -> &MemEngine {
        &self.inner
    }

    pub fn take_ops(&self) -> Vec<String> {
        std::mem::take(&mut self.ops.lock().unwrap())
    }

    pub fn write_ops(&self) -> Vec<String> {
        self.ops.lock().unwrap().clone()
    }
}

impl Engine for RecordingEngine {
    fn open(&self, name: &str, mode: OpenMode) -> Result<Box<dyn EngineHandle>> {
        let handle = self.inner.open(name, mode)?;
        Ok(Box::new(RecordingHandle {
            inner: handle,
            ops: self.ops.clone(),
        }))
    }

    fn create_empty(&self, name: &str) -> Result<()> {
        self.ops
            .lock()
            .unwrap()
            .push(format!("create_empty {name}"));
        self.inner.create_empty(name)
    }
}

struct RecordingHandle {
    inner: Box<dyn EngineHandle>,
    ops: Arc<Mutex<Vec<String>>>,
}

impl RecordingHandle {
    fn log(&self, entry: String) {
        self.ops.lock().unwrap().push(entry);
    }
}

impl EngineHandle for RecordingHandle {
    fn node(&self, path: &str) -> Result<NodeInfo> {
        self.inner.node(path)
    }

    fn exists(&self, path: &str) -> bool {
        self.inner.exists(path)
    }

    fn create_group(&mut self, path: &str) -> Result<()> {
        self.log(format!("create_group {path}"));
        self.inner.create_group(path)
    }

    fn create_dataset(&mut self, path: &str, value: &Scalar) -> Result<()> {
        self.log(format!("create_dataset {path}"));
        self.inner.create_dataset(path, value)
    }

    fn create_attribute(&mut self, path: &str, name: &str, value: &Scalar) -> Result<()> {
        self.log(format!("create_attribute {path}#{name}"));
        self.inner.create_attribute(path, name, value)
    }

    fn delete_attribute(&mut self, path: &str, name: &str) -> Result<()> {
        self.log(format!("delete_attribute {path}#{name}"));
        self.inner.delete_attribute(path, name)
    }

    fn clear(&mut self) -> Result<()> {
        self.log("clear".to_string());
        self.inner.clear()
    }

    fn close(self: Box<Self>) -> Result<()> {
        self.inner.close()
    }
}

/// Engine wrapper that fails dataset creation at chosen paths, for testing
/// per-node failure aggregation.
#[derive(Clone)]
pub struct FlakyEngine {
    inner: MemEngine,
    deny: Arc<Mutex<HashSet<String>>>,
}

impl FlakyEngine {
    pub fn new() -> Self {
        Self {
            inner: MemEngine::new(),
            deny: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn deny_dataset(&self, path: &str) {
        self.deny.lock().unwrap().insert(path.to_string());
    }

    pub fn allow_all(&self) {
        self.deny.lock().unwrap().clear();
    }

    pub fn mem(&self) -> &MemEngine {
        &self.inner
    }
}

impl Engine for FlakyEngine {
    fn open(&self, name: &str, mode: OpenMode) -> Result<Box<dyn EngineHandle>> {
        let handle = self.inner.open(name, mode)?;
        Ok(Box::new(FlakyHandle {
            inner: handle,
            deny: self.deny.clone(),
        }))
    }

    fn create_empty(&self, name: &str) -> Result<()> {
        self.inner.create_empty(name)
    }
}

struct FlakyHandle {
    inner: Box<dyn EngineHandle>,
    deny: Arc<Mutex<HashSet<String>>>,
}

impl EngineHandle for FlakyHandle {
    fn node(&self, path: &str) -> Result<NodeInfo> {
        self.inner.node(path)
    }

    fn exists(&self, path: &str) -> bool {
        self.inner.exists(path)
    }

    fn create_group(&mut self, path: &str) -> Result<()> {
        self.inner.create_group(path)
    }

    fn create_dataset(&mut self, path: &str, value: &Scalar) -> Result<()> {
        if self.deny.lock().unwrap().contains(path) {
            return Err(SiloError::Other(format!("injected failure at {path}")));
        }
        self.inner.create_dataset(path, value)
    }

    fn create_attribute(&mut self, path: &str, name: &str, value: &Scalar) -> Result<()> {
        self.inner.create_attribute(path, name, value)
    }

    fn delete_attribute(&mut self, path: &str, name: &str) -> Result<()> {
        self.inner.delete_attribute(path, name)
    }

    fn clear(&mut self) -> Result<()> {
        self.inner.clear()
    }

    fn close(self: Box<Self>) -> Result<()> {
        self.inner.close()
    }
}

/// The tree from the write-path acceptance scenario: a top-level attribute,
/// a dataset carrying its own attribute, and a group with both.
pub fn sample_root() -> Group {
    let mut root = Group::new();
    root.insert("attribute", Node::Attribute(Scalar::from("A")));
    root.insert("dataset", Dataset::new("D").with_attr("metadata", "M"));
    let mut group = Group::new();
    group.insert("attribute", Node::Attribute(Scalar::from("A2")));
    group.insert("dataset", Dataset::new("D2"));
    root.insert("group", Node::Group(group));
    root
}

pub fn sample_document() -> Document {
    Document::from_root(sample_root(), false)
}
