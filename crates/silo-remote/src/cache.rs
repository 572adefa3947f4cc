//! LRU-bounded chunk cache over a range fetcher.

use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use tracing::debug;

use silo_types::{Result, SiloError};

use crate::fetch::RangeFetcher;

/// Random-access byte view a codec reads a remote container through.
pub trait ByteSource: Send {
    fn len(&self) -> u64;
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()>;
}

/// Called after each chunk lands with `(bytes_cached, total_len)`.
pub type NotifyFn = Box<dyn Fn(u64, u64) + Send>;

/// A virtual random-access view of a remote resource.
///
/// Nothing is fetched at construction beyond the content length. Reads are
/// satisfied chunk by chunk: a hit bumps recency, a miss fetches exactly
/// the chunk's byte range and evicts the least-recently-used entry once
/// the configured capacity (count of chunks) is exceeded.
pub struct ChunkCache {
    url: String,
    chunk_size: u64,
    total_len: u64,
    lru: LruCache<u64, Vec<u8>>,
    fetcher: Arc<dyn RangeFetcher>,
    fetches: u64,
    bytes_cached: u64,
    notify: Option<NotifyFn>,
}

impl ChunkCache {
    pub fn new(
        fetcher: Arc<dyn RangeFetcher>,
        url: &str,
        chunk_size: u64,
        capacity: usize,
    ) -> Result<Self> {
        if chunk_size == 0 {
            return Err(SiloError::Other("chunk size must be non-zero".to_string()));
        }
        let total_len = fetcher.content_length(url)?;
        debug!("remote resource '{url}' is {total_len} bytes");
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Ok(Self {
            url: url.to_string(),
            chunk_size,
            total_len,
            lru: LruCache::new(capacity),
            fetcher,
            fetches: 0,
            bytes_cached: 0,
            notify: None,
        })
    }

    pub fn set_notify(&mut self, notify: NotifyFn) {
        self.notify = Some(notify);
    }

    pub fn total_len(&self) -> u64 {
        self.total_len
    }

    /// Number of range requests issued so far.
    pub fn fetch_count(&self) -> u64 {
        self.fetches
    }

    /// Read `len` bytes at `offset`, fetching missing chunks on demand.
    pub fn read(&mut self, offset: u64, len: u64) -> Result<Vec<u8>> {
        let end = offset.checked_add(len).ok_or_else(|| {
            SiloError::Other(format!("range {offset}+{len} overflows u64"))
        })?;
        if end > self.total_len {
            return Err(SiloError::Http(format!(
                "range {offset}+{len} past end of '{}' ({} bytes)",
                self.url, self.total_len
            )));
        }
        let mut out = Vec::with_capacity(len as usize);
        let mut pos = offset;
        while pos < end {
            let idx = pos / self.chunk_size;
            let chunk_start = idx * self.chunk_size;
            self.ensure_chunk(idx)?;
            let chunk = self.lru.get(&idx).expect("chunk just ensured");
            let lo = (pos - chunk_start) as usize;
            let hi = ((end - chunk_start) as usize).min(chunk.len());
            out.extend_from_slice(&chunk[lo..hi]);
            pos = chunk_start + hi as u64;
        }
        Ok(out)
    }

    fn ensure_chunk(&mut self, idx: u64) -> Result<()> {
        if self.lru.get(&idx).is_some() {
            return Ok(());
        }
        let from = idx * self.chunk_size;
        let to = (from + self.chunk_size).min(self.total_len) - 1;
        debug!("chunk {idx} miss for '{}': fetching bytes {from}-{to}", self.url);
        let bytes = self.fetcher.fetch_range(&self.url, from, to)?;
        self.fetches += 1;
        self.bytes_cached += bytes.len() as u64;
        if let Some((evicted_idx, evicted)) = self.lru.push(idx, bytes) {
            if evicted_idx != idx {
                self.bytes_cached -= evicted.len() as u64;
                debug!("evicted chunk {evicted_idx} of '{}'", self.url);
            }
        }
        if let Some(notify) = &self.notify {
            notify(self.bytes_cached, self.total_len);
        }
        Ok(())
    }
}

/// Adapts a [`ChunkCache`] to the [`ByteSource`] a codec reads through.
pub struct ChunkedSource {
    cache: ChunkCache,
}

impl ChunkedSource {
    pub fn new(cache: ChunkCache) -> Self {
        Self { cache }
    }
}

impl ByteSource for ChunkedSource {
    fn len(&self) -> u64 {
        self.cache.total_len()
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let bytes = self.cache.read(offset, buf.len() as u64)?;
        buf.copy_from_slice(&bytes);
        Ok(())
    }
}
