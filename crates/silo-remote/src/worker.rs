//! The cache worker thread.
//!
//! Owns the chunk cache and the open source reader exclusively; the caller
//! side never touches cache entries. One virtual file is active at a time.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, warn};

use silo_types::SliceSpec;

use crate::cache::{ChunkCache, ChunkedSource};
use crate::fetch::RangeFetcher;
use crate::protocol::{Event, Outbound, Reply, Request, RequestEnvelope};
use crate::source::{SourceCodec, SourceReader};

pub(crate) fn run(
    codec: Box<dyn SourceCodec>,
    fetcher: Arc<dyn RangeFetcher>,
    req_rx: Receiver<RequestEnvelope>,
    out_tx: Sender<Outbound>,
) {
    let mut worker = Worker {
        codec,
        fetcher,
        reader: None,
        current_id: Arc::new(AtomicU64::new(0)),
        out_tx,
    };
    for env in req_rx {
        worker.current_id.store(env.id, Ordering::SeqCst);
        let reply = match env.request {
            Request::Load {
                url,
                chunk_size,
                capacity,
            } => worker.load(&url, chunk_size, capacity),
            Request::Get { path, slice } => worker.get(&path, slice),
        };
        if worker
            .out_tx
            .send(Outbound::Reply { id: env.id, reply })
            .is_err()
        {
            break; // dispatcher gone
        }
    }
    debug!("cache worker shutting down");
}

struct Worker {
    codec: Box<dyn SourceCodec>,
    fetcher: Arc<dyn RangeFetcher>,
    reader: Option<Box<dyn SourceReader>>,
    /// Id of the request currently being served, read by the progress hook.
    current_id: Arc<AtomicU64>,
    out_tx: Sender<Outbound>,
}

impl Worker {
    fn load(&mut self, url: &str, chunk_size: u64, capacity: usize) -> Reply {
        if url.is_empty() {
            return Reply::Error("no URL provided".to_string());
        }
        if self.reader.take().is_some() {
            debug!("replacing previously loaded container with '{url}'");
        }
        // Only the content length is resolved here; chunks are fetched on
        // demand as the codec reads.
        let mut cache =
            match ChunkCache::new(self.fetcher.clone(), url, chunk_size, capacity) {
                Ok(cache) => cache,
                Err(e) => {
                    warn!("cannot reach remote container '{url}': {e}");
                    return Reply::Error(e.to_string());
                }
            };
        let events = self.out_tx.clone();
        let request_id = self.current_id.clone();
        cache.set_notify(Box::new(move |cached, total| {
            let ratio = if total == 0 {
                1.0
            } else {
                cached as f64 / total as f64
            };
            let _ = events.send(Outbound::Event(Event::Progress {
                ratio,
                total_len: total,
                id: request_id.load(Ordering::SeqCst),
            }));
        }));
        match self.codec.open(Box::new(ChunkedSource::new(cache))) {
            Ok(reader) => {
                self.reader = Some(reader);
                let _ = self.out_tx.send(Outbound::Event(Event::Success {
                    from_remote: true,
                    id: self.current_id.load(Ordering::SeqCst),
                }));
                Reply::Loaded
            }
            Err(e) => {
                warn!("failed to open remote container '{url}': {e}");
                Reply::Error(e.to_string())
            }
        }
    }

    /// Failures are scoped to the triggering request; the worker stays up
    /// and later requests remain servable.
    fn get(&mut self, path: &str, slice: Option<SliceSpec>) -> Reply {
        match self.reader.as_mut() {
            None => Reply::Error("no container loaded".to_string()),
            Some(reader) => match reader.node(path, slice) {
                Ok(info) => Reply::Node(info),
                Err(e) => {
                    warn!("remote read of '{path}' failed: {e}");
                    Reply::Error(e.to_string())
                }
            },
        }
    }
}
