//! Lazy access to remote containers over HTTP byte-range requests.
//!
//! A remote container is never downloaded in full: a [`cache::ChunkCache`]
//! serves arbitrary byte ranges through an LRU-bounded store of fetched
//! chunks, a worker thread owns the cache and the decoding reader, and the
//! [`proxy::LazyProxy`] correlates caller requests with worker replies by
//! id. The [`lazy::LazyTree`] on top resolves the remote node tree one
//! level at a time, memoizing each path.

pub mod cache;
pub mod codec;
pub mod fetch;
pub mod lazy;
pub mod protocol;
pub mod proxy;
pub mod source;
mod worker;

pub use cache::{ByteSource, ChunkCache, ChunkedSource};
pub use codec::EncodedTreeCodec;
pub use fetch::{HttpRangeFetcher, RangeFetcher, RetryConfig};
pub use lazy::{ChildState, LazyNode, LazyTree, Resolution, StreamOptions};
pub use proxy::{Callbacks, LazyProxy};
pub use source::{SourceCodec, SourceReader};

#[cfg(test)]
mod tests;
#[cfg(test)]
mod testutil;
