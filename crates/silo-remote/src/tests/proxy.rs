use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crossbeam_channel::{bounded, unbounded};

use silo_types::SiloError;

use crate::protocol::{Event, Outbound, Reply, Request, RequestEnvelope};
use crate::proxy::{Callbacks, LazyProxy};
use crate::testutil::wait_until;

fn get(path: &str) -> Request {
    Request::Get {
        path: path.to_string(),
        slice: None,
    }
}

#[test]
fn out_of_order_replies_resolve_by_correlation_id() {
    let (req_tx, req_rx) = bounded::<RequestEnvelope>(4);
    let (out_tx, out_rx) = unbounded::<Outbound>();
    let proxy = Arc::new(LazyProxy::wire(Some(req_tx), out_rx, Callbacks::default()));

    let p1 = proxy.clone();
    let caller_a = std::thread::spawn(move || p1.send(get("/a")).unwrap());
    let first = req_rx.recv().unwrap();

    let p2 = proxy.clone();
    let caller_b = std::thread::spawn(move || p2.send(get("/b")).unwrap());
    let second = req_rx.recv().unwrap();

    // Answer the second request before the first.
    out_tx
        .send(Outbound::Reply {
            id: second.id,
            reply: Reply::Error("for second".to_string()),
        })
        .unwrap();
    out_tx
        .send(Outbound::Reply {
            id: first.id,
            reply: Reply::Error("for first".to_string()),
        })
        .unwrap();
    drop(out_tx);

    let reply_a = caller_a.join().unwrap();
    let reply_b = caller_b.join().unwrap();
    assert!(matches!(reply_a, Reply::Error(msg) if msg == "for first"));
    assert!(matches!(reply_b, Reply::Error(msg) if msg == "for second"));
    assert_eq!(proxy.violations(), 0);
}

#[test]
fn unmatched_reply_is_a_counted_violation() {
    let (req_tx, _req_rx) = bounded::<RequestEnvelope>(1);
    let (out_tx, out_rx) = unbounded::<Outbound>();
    let proxy = LazyProxy::wire(Some(req_tx), out_rx, Callbacks::default());

    out_tx
        .send(Outbound::Reply {
            id: 999,
            reply: Reply::Loaded,
        })
        .unwrap();
    drop(out_tx);

    wait_until("violation count", || proxy.violations() == 1);
}

#[test]
fn events_bypass_the_pending_table() {
    let (req_tx, _req_rx) = bounded::<RequestEnvelope>(1);
    let (out_tx, out_rx) = unbounded::<Outbound>();

    let ratios: Arc<Mutex<Vec<f64>>> = Arc::new(Mutex::new(Vec::new()));
    let succeeded = Arc::new(AtomicBool::new(false));
    let ratios_sink = ratios.clone();
    let success_sink = succeeded.clone();
    let callbacks = Callbacks {
        on_progress: Some(Box::new(move |ratio, _total| {
            ratios_sink.lock().unwrap().push(ratio);
        })),
        on_success: Some(Box::new(move |from_remote| {
            success_sink.store(from_remote, Ordering::SeqCst);
        })),
    };
    let proxy = LazyProxy::wire(Some(req_tx), out_rx, callbacks);

    out_tx
        .send(Outbound::Event(Event::Progress {
            ratio: 0.5,
            total_len: 100,
            id: 1,
        }))
        .unwrap();
    out_tx
        .send(Outbound::Event(Event::Success {
            from_remote: true,
            id: 1,
        }))
        .unwrap();
    drop(out_tx);

    wait_until("success callback", || succeeded.load(Ordering::SeqCst));
    assert_eq!(*ratios.lock().unwrap(), vec![0.5]);
    assert_eq!(proxy.violations(), 0);
}

#[test]
fn send_without_channel_fails_fast() {
    let (out_tx, out_rx) = unbounded::<Outbound>();
    let proxy = LazyProxy::wire(None, out_rx, Callbacks::default());
    drop(out_tx);

    let err = proxy.send(get("/a")).unwrap_err();
    assert!(matches!(err, SiloError::ChannelUnavailable));
}

#[test]
fn send_after_shutdown_fails_fast() {
    let (req_tx, req_rx) = bounded::<RequestEnvelope>(1);
    let (out_tx, out_rx) = unbounded::<Outbound>();
    let mut proxy = LazyProxy::wire(Some(req_tx), out_rx, Callbacks::default());

    drop(out_tx);
    drop(req_rx);
    proxy.shutdown();

    let err = proxy.send(get("/a")).unwrap_err();
    assert!(matches!(err, SiloError::ChannelUnavailable));
}

#[test]
fn deadline_fires_and_evicts_the_pending_entry() {
    let (req_tx, req_rx) = bounded::<RequestEnvelope>(1);
    let (out_tx, out_rx) = unbounded::<Outbound>();
    let proxy = LazyProxy::wire(Some(req_tx), out_rx, Callbacks::default());

    // Nobody answers: the deadline must fire.
    let err = proxy
        .send_with_deadline(get("/slow"), Duration::from_millis(20))
        .unwrap_err();
    let id = match err {
        SiloError::RequestTimeout { id } => id,
        other => panic!("expected timeout, got {other}"),
    };

    // A late reply to the evicted entry is a violation, not a delivery.
    let envelope = req_rx.recv().unwrap();
    assert_eq!(envelope.id, id);
    out_tx
        .send(Outbound::Reply {
            id,
            reply: Reply::Loaded,
        })
        .unwrap();
    drop(out_tx);
    wait_until("late-reply violation", || proxy.violations() == 1);
}
