use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use silo_core::format;
use silo_core::tree::{Dataset, Group, Node};
use silo_types::{NodeInfo, Result, Scalar, SiloError, SliceSpec};

use crate::cache::ByteSource;
use crate::codec::EncodedTreeCodec;
use crate::fetch::RangeFetcher;
use crate::source::{SourceCodec, SourceReader};

/// Serves a byte buffer as a remote resource, counting range fetches.
pub struct FakeFetcher {
    data: Vec<u8>,
    fetches: AtomicUsize,
    fail: AtomicBool,
}

impl FakeFetcher {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data,
            fetches: AtomicUsize::new(0),
            fail: AtomicBool::new(false),
        }
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Make every subsequent range request fail until switched off.
    pub fn fail_ranges(&self, on: bool) {
        self.fail.store(on, Ordering::SeqCst);
    }
}

impl RangeFetcher for FakeFetcher {
    fn content_length(&self, _url: &str) -> Result<u64> {
        Ok(self.data.len() as u64)
    }

    fn fetch_range(&self, url: &str, from: u64, to: u64) -> Result<Vec<u8>> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(SiloError::Http(format!(
                "simulated network failure for '{url}'"
            )));
        }
        let end = (to + 1).min(self.data.len() as u64);
        if from >= end {
            return Err(SiloError::Http(format!("range {from}-{to} out of bounds")));
        }
        self.fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self.data[from as usize..end as usize].to_vec())
    }
}

/// Codec wrapper counting `node()` calls, to prove memoization.
pub struct CountingCodec {
    calls: Arc<AtomicUsize>,
}

impl CountingCodec {
    pub fn new() -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Self {
                calls: calls.clone(),
            },
            calls,
        )
    }
}

impl SourceCodec for CountingCodec {
    fn open(&self, source: Box<dyn ByteSource>) -> Result<Box<dyn SourceReader>> {
        let inner = EncodedTreeCodec.open(source)?;
        Ok(Box::new(CountingReader {
            inner,
            calls: self.calls.clone(),
        }))
    }
}

struct CountingReader {
    inner: Box<dyn SourceReader>,
    calls: Arc<AtomicUsize>,
}

impl SourceReader for CountingReader {
    fn node(&mut self, path: &str, slice: Option<SliceSpec>) -> Result<NodeInfo> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.node(path, slice)
    }
}

/// Encoded container with the same shape the write-path tests use.
pub fn encoded_sample() -> Vec<u8> {
    let mut root = Group::new();
    root.insert("attribute", Node::Attribute(Scalar::from("A")));
    root.insert("dataset", Dataset::new("D").with_attr("metadata", "M"));
    let mut group = Group::new();
    group.insert("attribute", Node::Attribute(Scalar::from("A2")));
    group.insert("dataset", Dataset::new("D2"));
    root.insert("group", Node::Group(group));
    format::encode_root(&root).expect("encodable sample tree")
}

/// Spin until `cond` holds, panicking after five seconds. Worker events
/// are asynchronous, so assertions on them need to wait.
pub fn wait_until(what: &str, cond: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !cond() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        std::thread::sleep(Duration::from_millis(5));
    }
}
