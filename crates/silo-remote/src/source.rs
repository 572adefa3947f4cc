//! Capability seam between the cache worker and the container decoder.
//!
//! The worker never parses the container format itself: it hands the
//! chunked byte view to a [`SourceCodec`] and serves node lookups through
//! the returned [`SourceReader`].

use silo_types::{NodeInfo, Result, SliceSpec};

use crate::cache::ByteSource;

/// Opens a decoder over a random-access byte view.
pub trait SourceCodec: Send {
    fn open(&self, source: Box<dyn ByteSource>) -> Result<Box<dyn SourceReader>>;
}

/// Resolves one level of the container tree per call.
pub trait SourceReader {
    fn node(&mut self, path: &str, slice: Option<SliceSpec>) -> Result<NodeInfo>;
}
