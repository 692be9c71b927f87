//! Ping/pong liveness behavior over the in-memory transport.

#![allow(clippy::panic, clippy::unwrap_used, clippy::expect_used, missing_docs)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use relay_hub::transport::Frame;
use relay_hub::transport::memory::{MemoryPeer, MemoryTransport};
use relay_hub::{Hub, HubConfig, HubError, RequestInfo};
use tokio::time::Instant;

fn recording_hub(config: HubConfig) -> (Hub, Arc<Mutex<Vec<HubError>>>) {
    let hub = Hub::new(config);
    let errors = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&errors);
    hub.on_error(move |_, err| sink.lock().unwrap().push(err.clone()));
    (hub, errors)
}

/// Plays an idle peer: sends no data, answers every ping, records frames.
async fn answer_pings(mut peer: MemoryPeer) -> Vec<Frame> {
    let mut seen = Vec::new();
    while let Some(frame) = peer.recv().await {
        if let Frame::Ping(payload) = &frame {
            let _ = peer.send(Frame::Pong(payload.clone()));
        }
        seen.push(frame);
    }
    seen
}

#[tokio::test(start_paused = true)]
async fn ping_period_beyond_pong_wait_times_out_idle_peer() {
    let config = HubConfig {
        pong_wait: Duration::from_secs(1),
        ping_period: Duration::from_secs(2),
        ..HubConfig::default()
    };
    assert!(!config.has_valid_liveness());
    let (hub, errors) = recording_hub(config);

    let (transport, peer) = MemoryTransport::pair();
    let peer_task = tokio::spawn(answer_pings(peer));

    let started = Instant::now();
    let runner = hub.clone();
    let result = runner
        .handle_transport(transport, RequestInfo::default())
        .await;
    let elapsed = started.elapsed();

    assert_eq!(result, Ok(()));
    assert!(elapsed >= Duration::from_secs(1));
    assert!(elapsed < Duration::from_secs(2));
    assert_eq!(*errors.lock().unwrap(), vec![HubError::ReadTimeout]);
    assert!(hub.is_empty());

    let frames = peer_task.await.unwrap();
    assert!(
        !frames.iter().any(|f| matches!(f, Frame::Ping(_))),
        "the read deadline expired before the first ping"
    );
}

#[tokio::test(start_paused = true)]
async fn answered_pings_keep_idle_session_alive() {
    let config = HubConfig {
        pong_wait: Duration::from_secs(1),
        ping_period: Duration::from_millis(500),
        ..HubConfig::default()
    };
    let (hub, errors) = recording_hub(config);
    let pongs = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&pongs);
    hub.on_pong(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let (transport, peer) = MemoryTransport::pair();
    let peer_task = tokio::spawn(answer_pings(peer));
    let runner = hub.clone();
    let session_task = tokio::spawn(async move {
        runner
            .handle_transport(transport, RequestInfo::default())
            .await
    });

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(hub.len(), 1);
    assert!(errors.lock().unwrap().is_empty());
    assert!(pongs.load(Ordering::SeqCst) >= 15);

    hub.close().unwrap();
    assert_eq!(session_task.await.unwrap(), Ok(()));
    assert!(hub.is_empty());
    assert!(errors.lock().unwrap().is_empty());

    let frames = peer_task.await.unwrap();
    assert_eq!(frames.last(), Some(&Frame::Close(None)));
}

#[tokio::test(start_paused = true)]
async fn silent_peer_is_dropped_after_pong_wait() {
    let config = HubConfig {
        pong_wait: Duration::from_secs(3),
        ping_period: Duration::from_secs(1),
        ..HubConfig::default()
    };
    let (hub, errors) = recording_hub(config);

    // Holds the peer open without ever answering.
    let (transport, _peer) = MemoryTransport::pair();
    let started = Instant::now();
    let result = hub.handle_transport(transport, RequestInfo::default()).await;

    assert_eq!(result, Ok(()));
    assert!(started.elapsed() >= Duration::from_secs(3));
    assert_eq!(*errors.lock().unwrap(), vec![HubError::ReadTimeout]);
}
