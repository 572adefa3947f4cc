//! Correlation-id RPC between the caller and the cache worker.
//!
//! Replies may arrive in any order relative to requests; correctness
//! depends only on id matching. Events bypass the pending table entirely.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded, unbounded};
use tracing::{debug, error};

use silo_types::{Result, SiloError};

use crate::fetch::RangeFetcher;
use crate::protocol::{Event, Outbound, Reply, Request, RequestEnvelope};
use crate::source::SourceCodec;
use crate::worker;

/// Out-of-band event subscribers. Progress and completion are broadcast,
/// not answers to a specific request; callers that care subscribe here.
#[derive(Default)]
pub struct Callbacks {
    pub on_progress: Option<Box<dyn Fn(f64, u64) + Send>>,
    pub on_success: Option<Box<dyn Fn(bool) + Send>>,
}

type PendingTable = Arc<Mutex<HashMap<u64, Sender<Reply>>>>;

#[derive(Debug)]
pub struct LazyProxy {
    req_tx: Option<Sender<RequestEnvelope>>,
    pending: PendingTable,
    next_id: AtomicU64,
    violations: Arc<AtomicU64>,
    worker: Option<JoinHandle<()>>,
    dispatcher: Option<JoinHandle<()>>,
}

impl LazyProxy {
    /// Start the cache worker and the reply dispatcher.
    pub fn spawn(
        codec: Box<dyn SourceCodec>,
        fetcher: Arc<dyn RangeFetcher>,
        callbacks: Callbacks,
    ) -> Self {
        let (req_tx, req_rx) = bounded::<RequestEnvelope>(1);
        let (out_tx, out_rx) = unbounded::<Outbound>();
        let handle = std::thread::spawn(move || worker::run(codec, fetcher, req_rx, out_tx));
        let mut proxy = Self::wire(Some(req_tx), out_rx, callbacks);
        proxy.worker = Some(handle);
        proxy
    }

    /// Wire a proxy over existing channels, starting only the dispatcher.
    pub(crate) fn wire(
        req_tx: Option<Sender<RequestEnvelope>>,
        out_rx: Receiver<Outbound>,
        callbacks: Callbacks,
    ) -> Self {
        let pending: PendingTable = Arc::new(Mutex::new(HashMap::new()));
        let violations = Arc::new(AtomicU64::new(0));
        let table = pending.clone();
        let counter = violations.clone();
        let dispatcher =
            std::thread::spawn(move || dispatch(out_rx, table, counter, callbacks));
        Self {
            req_tx,
            pending,
            next_id: AtomicU64::new(1),
            violations,
            worker: None,
            dispatcher: Some(dispatcher),
        }
    }

    /// Send a request and block until its reply arrives.
    pub fn send(&self, request: Request) -> Result<Reply> {
        let (id, rx) = self.transmit(request)?;
        match rx.recv() {
            Ok(reply) => Ok(reply),
            Err(_) => {
                self.pending.lock().unwrap().remove(&id);
                Err(SiloError::ChannelUnavailable)
            }
        }
    }

    /// Like [`send`], but gives up after `deadline`, evicting the stale
    /// pending entry.
    ///
    /// [`send`]: LazyProxy::send
    pub fn send_with_deadline(&self, request: Request, deadline: Duration) -> Result<Reply> {
        let (id, rx) = self.transmit(request)?;
        match rx.recv_timeout(deadline) {
            Ok(reply) => Ok(reply),
            Err(RecvTimeoutError::Timeout) => {
                self.pending.lock().unwrap().remove(&id);
                Err(SiloError::RequestTimeout { id })
            }
            Err(RecvTimeoutError::Disconnected) => {
                self.pending.lock().unwrap().remove(&id);
                Err(SiloError::ChannelUnavailable)
            }
        }
    }

    /// Stamp a fresh correlation id, register the pending entry, transmit.
    fn transmit(&self, request: Request) -> Result<(u64, Receiver<Reply>)> {
        let req_tx = self.req_tx.as_ref().ok_or(SiloError::ChannelUnavailable)?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = bounded(1);
        self.pending.lock().unwrap().insert(id, tx);
        if req_tx.send(RequestEnvelope { id, request }).is_err() {
            self.pending.lock().unwrap().remove(&id);
            return Err(SiloError::ChannelUnavailable);
        }
        Ok((id, rx))
    }

    /// Replies that matched no pending request.
    pub fn violations(&self) -> u64 {
        self.violations.load(Ordering::Relaxed)
    }

    /// Drop the request channel (ending the worker loop) and join both
    /// threads. Subsequent sends fail with `ChannelUnavailable`.
    pub fn shutdown(&mut self) {
        self.req_tx = None;
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.dispatcher.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for LazyProxy {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn dispatch(
    out_rx: Receiver<Outbound>,
    pending: PendingTable,
    violations: Arc<AtomicU64>,
    callbacks: Callbacks,
) {
    for msg in out_rx {
        match msg {
            Outbound::Reply { id, reply } => {
                let entry = pending.lock().unwrap().remove(&id);
                match entry {
                    // The caller may have timed out and gone away.
                    Some(tx) => {
                        let _ = tx.send(reply);
                    }
                    None => {
                        error!("reply with unknown correlation id {id}; dropping");
                        violations.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }
            Outbound::Event(Event::Progress {
                ratio, total_len, ..
            }) => {
                if let Some(on_progress) = &callbacks.on_progress {
                    on_progress(ratio, total_len);
                }
            }
            Outbound::Event(Event::Success { from_remote, .. }) => {
                if let Some(on_success) = &callbacks.on_success {
                    on_success(from_remote);
                }
            }
        }
    }
    debug!("reply dispatcher shutting down");
}
