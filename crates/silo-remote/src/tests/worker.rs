use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::codec::EncodedTreeCodec;
use crate::protocol::{Reply, Request};
use crate::proxy::{Callbacks, LazyProxy};
use crate::testutil::{FakeFetcher, encoded_sample, wait_until};

fn load(url: &str) -> Request {
    Request::Load {
        url: url.to_string(),
        chunk_size: 16,
        capacity: 64,
    }
}

fn get(path: &str) -> Request {
    Request::Get {
        path: path.to_string(),
        slice: None,
    }
}

fn spawn_proxy(callbacks: Callbacks) -> (Arc<FakeFetcher>, LazyProxy) {
    let fetcher = Arc::new(FakeFetcher::new(encoded_sample()));
    let proxy = LazyProxy::spawn(Box::new(EncodedTreeCodec), fetcher.clone(), callbacks);
    (fetcher, proxy)
}

#[test]
fn empty_url_is_refused() {
    let (_fetcher, proxy) = spawn_proxy(Callbacks::default());
    let reply = proxy.send(load("")).unwrap();
    assert!(matches!(reply, Reply::Error(msg) if msg.contains("URL")));
}

#[test]
fn get_before_load_is_an_error() {
    let (_fetcher, proxy) = spawn_proxy(Callbacks::default());
    let reply = proxy.send(get("/")).unwrap();
    assert!(matches!(reply, Reply::Error(msg) if msg.contains("no container")));
}

#[test]
fn load_fetches_nothing_eagerly() {
    let (fetcher, proxy) = spawn_proxy(Callbacks::default());
    let reply = proxy.send(load("http://example.com/t.bin")).unwrap();
    assert!(matches!(reply, Reply::Loaded));
    assert_eq!(fetcher.fetch_count(), 0);

    let reply = proxy.send(get("/")).unwrap();
    assert!(matches!(reply, Reply::Node(_)));
    assert!(fetcher.fetch_count() > 0);
}

#[test]
fn range_failure_is_scoped_and_the_worker_survives() {
    let (fetcher, proxy) = spawn_proxy(Callbacks::default());
    proxy.send(load("http://example.com/t.bin")).unwrap();

    fetcher.fail_ranges(true);
    let reply = proxy.send(get("/")).unwrap();
    assert!(matches!(reply, Reply::Error(_)));

    // Same worker, same channel: once the network recovers the next
    // request succeeds.
    fetcher.fail_ranges(false);
    let reply = proxy.send(get("/")).unwrap();
    assert!(matches!(reply, Reply::Node(info) if info.children == ["dataset", "group"]));
}

#[test]
fn second_load_replaces_the_first() {
    let (_fetcher, proxy) = spawn_proxy(Callbacks::default());
    proxy.send(load("http://example.com/a.bin")).unwrap();
    proxy.send(get("/")).unwrap();

    let reply = proxy.send(load("http://example.com/b.bin")).unwrap();
    assert!(matches!(reply, Reply::Loaded));
    let reply = proxy.send(get("/dataset")).unwrap();
    assert!(matches!(reply, Reply::Node(_)));
}

#[test]
fn success_event_is_emitted_after_load() {
    let succeeded = Arc::new(AtomicBool::new(false));
    let sink = succeeded.clone();
    let callbacks = Callbacks {
        on_progress: None,
        on_success: Some(Box::new(move |from_remote| {
            sink.store(from_remote, Ordering::SeqCst);
        })),
    };

    let (_fetcher, proxy) = spawn_proxy(callbacks);
    proxy.send(load("http://example.com/t.bin")).unwrap();
    wait_until("success event", || succeeded.load(Ordering::SeqCst));
}

#[test]
fn progress_events_track_cached_ratio() {
    let ratios: Arc<Mutex<Vec<f64>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = ratios.clone();
    let callbacks = Callbacks {
        on_progress: Some(Box::new(move |ratio, _total| {
            sink.lock().unwrap().push(ratio);
        })),
        on_success: None,
    };

    let (_fetcher, proxy) = spawn_proxy(callbacks);
    proxy.send(load("http://example.com/t.bin")).unwrap();
    proxy.send(get("/")).unwrap();

    // The decode pulls the whole container through the cache, so the last
    // progress report reaches 1.0.
    wait_until("progress to completion", || {
        ratios
            .lock()
            .unwrap()
            .last()
            .is_some_and(|r| (r - 1.0).abs() < 1e-9)
    });
    let ratios = ratios.lock().unwrap();
    assert!(ratios.windows(2).all(|w| w[0] <= w[1]));
}
