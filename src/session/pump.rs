//! Read and write pumps driving one session's transport.
//!
//! The write pump runs on its own task; the read pump runs inline in the
//! task that owns the session. Whichever stops first cancels the other,
//! and [`run`] returns only after both have stopped.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use tokio::sync::mpsc;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::Session;
use crate::domain::{Envelope, EnvelopeKind};
use crate::error::HubError;
use crate::transport::{Frame, FrameRead, FrameWrite, Transport, TransportError};

/// Status reported when a peer's close frame carries no code.
const CLOSE_NO_STATUS: u16 = 1005;

/// Stand-in for "never" when a configured duration overflows the clock.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Runs both pumps until the connection ends, then marks the session closed.
///
/// The transport halves are dropped before this returns.
pub(crate) async fn run<T: Transport>(
    session: &Arc<Session>,
    transport: T,
    output: mpsc::Receiver<Envelope>,
) {
    let (reader, writer) = transport.split();
    let shutdown = CancellationToken::new();

    let write_task = tokio::spawn(write_pump(
        Arc::clone(session),
        writer,
        output,
        shutdown.clone(),
    ));

    read_pump(session, reader, &shutdown).await;
    shutdown.cancel();
    session.finish();

    if let Err(e) = write_task.await {
        tracing::error!(session_id = %session.id(), error = %e, "write pump panicked");
    }
}

async fn read_pump<R: FrameRead>(
    session: &Arc<Session>,
    mut reader: R,
    shutdown: &CancellationToken,
) {
    let config = session.config();
    let limit = config.max_message_size;
    let mut deadline = deadline_after(config.pong_wait);

    loop {
        let next = tokio::select! {
            biased;
            () = shutdown.cancelled() => break,
            next = tokio::time::timeout_at(deadline, reader.read_frame()) => next,
        };

        let frame = match next {
            Ok(Some(Ok(frame))) => frame,
            Ok(Some(Err(e))) => {
                session.report(&HubError::Transport(e));
                break;
            }
            Ok(None) => {
                session.report(&HubError::Transport(TransportError::ConnectionClosed));
                break;
            }
            Err(_) => {
                session.report(&HubError::ReadTimeout);
                break;
            }
        };

        match frame {
            Frame::Text(payload) | Frame::Binary(payload) if payload.len() > limit => {
                session.report(&HubError::MessageTooLarge {
                    size: payload.len(),
                    limit,
                });
                break;
            }
            Frame::Text(payload) => session.handlers().message(session, &payload),
            Frame::Binary(payload) => session.handlers().message_binary(session, &payload),
            Frame::Pong(_) => {
                deadline = deadline_after(config.pong_wait);
                session.handlers().pong(session);
            }
            // Answered by the transport.
            Frame::Ping(_) => {}
            Frame::Close(reason) => {
                let (code, reason) =
                    reason.map_or((CLOSE_NO_STATUS, String::new()), |r| (r.code, r.reason));
                session.handlers().close(session, code, &reason);
                session.report(&HubError::PeerClosed { code, reason });
                break;
            }
        }
    }

    tracing::debug!(session_id = %session.id(), "read pump stopped");
}

async fn write_pump<W: FrameWrite>(
    session: Arc<Session>,
    mut writer: W,
    mut output: mpsc::Receiver<Envelope>,
    shutdown: CancellationToken,
) {
    // Cancels the read pump on every exit path, unwinding included.
    let _stop_reader = shutdown.clone().drop_guard();
    let config = session.config();
    let write_wait = config.write_wait;
    let mut ticker = ping_ticker(config.ping_period);

    loop {
        // The ticker is polled ahead of the queue so a queue that never
        // empties cannot starve liveness pings.
        tokio::select! {
            biased;
            () = shutdown.cancelled() => break,
            () = next_ping(&mut ticker) => {
                if let Err(e) = write_frame(&mut writer, Frame::Ping(Bytes::new()), write_wait).await {
                    session.report(&e);
                    break;
                }
            }
            envelope = output.recv() => {
                // Queue closed and drained.
                let Some(envelope) = envelope else { break };

                if let Err(e) = write_frame(&mut writer, Frame::from_envelope(&envelope), write_wait).await {
                    session.report(&e);
                    break;
                }

                match envelope.kind() {
                    EnvelopeKind::Close => break,
                    EnvelopeKind::Text => session.handlers().message_sent(&session, envelope.payload()),
                    EnvelopeKind::Binary => {
                        session.handlers().message_sent_binary(&session, envelope.payload());
                    }
                    EnvelopeKind::Ping => {}
                }
            }
        }
    }

    tracing::debug!(session_id = %session.id(), "write pump stopped");
}

fn deadline_after(wait: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(wait).unwrap_or_else(|| now + FAR_FUTURE)
}

/// A zero period disables pings.
fn ping_ticker(period: Duration) -> Option<Interval> {
    if period.is_zero() {
        return None;
    }
    let mut ticker = tokio::time::interval_at(deadline_after(period), period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    Some(ticker)
}

async fn next_ping(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn write_frame<W: FrameWrite>(
    writer: &mut W,
    frame: Frame,
    wait: Duration,
) -> Result<(), HubError> {
    match tokio::time::timeout(wait, writer.write_frame(frame)).await {
        Ok(result) => result.map_err(HubError::from),
        Err(_) => Err(HubError::WriteTimeout),
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::config::HubConfig;
    use crate::hub::HandlerRegistry;
    use crate::transport::memory::{MemoryReader, MemoryTransport};

    /// Memory transport whose write half is replaced by `W`.
    struct SwappedWriter<W> {
        inner: MemoryTransport,
        writer: W,
    }

    impl<W: FrameWrite> Transport for SwappedWriter<W> {
        type Reader = MemoryReader;
        type Writer = W;

        fn split(self) -> (MemoryReader, W) {
            let (reader, _) = self.inner.split();
            (reader, self.writer)
        }
    }

    /// Writer that never completes a write.
    struct StalledWriter;

    impl FrameWrite for StalledWriter {
        async fn write_frame(&mut self, _frame: Frame) -> Result<(), TransportError> {
            std::future::pending().await
        }
    }

    /// Writer that panics on its first write.
    struct PanickingWriter;

    impl FrameWrite for PanickingWriter {
        async fn write_frame(&mut self, _frame: Frame) -> Result<(), TransportError> {
            panic!("writer blew up");
        }
    }

    fn recording_session(
        config: HubConfig,
    ) -> (Arc<Session>, mpsc::Receiver<Envelope>, Arc<Mutex<Vec<HubError>>>) {
        let handlers = Arc::new(HandlerRegistry::new());
        let errors = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&errors);
        handlers.set_error(move |_, err| {
            if let Ok(mut errors) = sink.lock() {
                errors.push(err.clone());
            }
        });
        let (session, rx) = Session::detached(config, handlers);
        (session, rx, errors)
    }

    fn recorded(errors: &Mutex<Vec<HubError>>) -> Vec<HubError> {
        errors.lock().map(|e| e.clone()).unwrap_or_default()
    }

    #[tokio::test]
    async fn queued_messages_flush_before_close_frame() {
        let (session, rx, _errors) = recording_session(HubConfig::default());
        let (transport, mut peer) = MemoryTransport::pair();

        tokio_test::assert_ok!(session.write("one"));
        tokio_test::assert_ok!(session.write_binary(vec![2u8]));
        tokio_test::assert_ok!(session.close());

        run(&session, transport, rx).await;

        assert_eq!(peer.recv().await, Some(Frame::Text(Bytes::from_static(b"one"))));
        assert_eq!(peer.recv().await, Some(Frame::Binary(Bytes::from_static(&[2]))));
        assert_eq!(peer.recv().await, Some(Frame::Close(None)));
        assert_eq!(peer.recv().await, None);
        assert_eq!(session.state(), crate::SessionState::Closed);
    }

    #[tokio::test]
    async fn oversized_frame_ends_session() {
        let config = HubConfig {
            max_message_size: 4,
            ..HubConfig::default()
        };
        let (session, rx, errors) = recording_session(config);
        let (transport, peer) = MemoryTransport::pair();

        tokio_test::assert_ok!(peer.send_text("too long"));
        run(&session, transport, rx).await;

        assert_eq!(
            recorded(&errors),
            vec![HubError::MessageTooLarge { size: 8, limit: 4 }]
        );
        assert!(session.is_closed());
    }

    #[tokio::test]
    async fn transport_error_is_passed_through() {
        let (session, rx, errors) = recording_session(HubConfig::default());
        let (transport, peer) = MemoryTransport::pair();

        let failure = TransportError::Io("connection reset".to_string());
        tokio_test::assert_ok!(peer.fail(failure.clone()));
        run(&session, transport, rx).await;

        assert_eq!(recorded(&errors), vec![HubError::Transport(failure)]);
    }

    #[tokio::test]
    async fn peer_close_frame_reaches_close_handler() {
        let (session, rx, errors) = recording_session(HubConfig::default());
        let seen = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&seen);
        session.handlers().set_close(move |_, code, reason| {
            if let Ok(mut seen) = sink.lock() {
                *seen = Some((code, reason.to_string()));
            }
        });

        let (transport, peer) = MemoryTransport::pair();
        tokio_test::assert_ok!(peer.send(Frame::Close(Some(crate::transport::CloseReason {
            code: 1001,
            reason: "going away".to_string(),
        }))));
        run(&session, transport, rx).await;

        let seen = seen.lock().map(|s| s.clone()).unwrap_or_default();
        assert_eq!(seen, Some((1001, "going away".to_string())));
        assert_eq!(
            recorded(&errors),
            vec![HubError::PeerClosed {
                code: 1001,
                reason: "going away".to_string(),
            }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn pings_are_sent_every_period() {
        let config = HubConfig {
            ping_period: Duration::from_millis(100),
            pong_wait: Duration::from_millis(1_000),
            ..HubConfig::default()
        };
        let (session, rx, _errors) = recording_session(config);
        let (transport, mut peer) = MemoryTransport::pair();

        let task_session = Arc::clone(&session);
        let handle = tokio::spawn(async move { run(&task_session, transport, rx).await });

        for _ in 0..3 {
            let Some(frame) = peer.recv().await else {
                panic!("session ended early");
            };
            assert_eq!(frame, Frame::Ping(Bytes::new()));
            tokio_test::assert_ok!(peer.send(Frame::Pong(Bytes::new())));
        }

        tokio_test::assert_ok!(session.close());
        tokio_test::assert_ok!(handle.await);
    }

    #[tokio::test]
    async fn sent_callbacks_fire_in_queue_order() {
        let (session, rx, _errors) = recording_session(HubConfig::default());
        let sent = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&sent);
        session.handlers().set_message_sent(move |_, payload| {
            if let Ok(mut sent) = sink.lock() {
                sent.push(format!("text:{}", String::from_utf8_lossy(payload)));
            }
        });
        let sink = Arc::clone(&sent);
        session.handlers().set_message_sent_binary(move |_, payload| {
            if let Ok(mut sent) = sink.lock() {
                sent.push(format!("binary:{}", String::from_utf8_lossy(payload)));
            }
        });
        let (transport, _peer) = MemoryTransport::pair();

        tokio_test::assert_ok!(session.write("a"));
        tokio_test::assert_ok!(session.write_binary(&b"b"[..]));
        tokio_test::assert_ok!(session.write("c"));
        tokio_test::assert_ok!(session.close());
        run(&session, transport, rx).await;

        let sent = sent.lock().map(|s| s.clone()).unwrap_or_default();
        assert_eq!(sent, vec!["text:a", "binary:b", "text:c"]);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_write_times_out() {
        let config = HubConfig {
            write_wait: Duration::from_secs(1),
            ..HubConfig::default()
        };
        let (session, rx, errors) = recording_session(config);
        let (inner, _peer) = MemoryTransport::pair();
        let transport = SwappedWriter {
            inner,
            writer: StalledWriter,
        };

        tokio_test::assert_ok!(session.write("stuck"));
        run(&session, transport, rx).await;

        assert_eq!(recorded(&errors), vec![HubError::WriteTimeout]);
        assert_eq!(session.state(), crate::SessionState::Closed);
    }

    #[tokio::test]
    async fn write_to_gone_peer_reports_connection_closed() {
        let (session, rx, errors) = recording_session(HubConfig::default());
        let (transport, mut peer) = MemoryTransport::pair();
        peer.close_receiver();

        tokio_test::assert_ok!(session.write("lost"));
        run(&session, transport, rx).await;

        assert_eq!(
            recorded(&errors),
            vec![HubError::Transport(TransportError::ConnectionClosed)]
        );
        assert!(session.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_writer_still_stops_reader() {
        let (session, rx, _errors) = recording_session(HubConfig::default());
        let (inner, _peer) = MemoryTransport::pair();
        let transport = SwappedWriter {
            inner,
            writer: PanickingWriter,
        };

        tokio_test::assert_ok!(session.write("boom"));
        // Well inside the read deadline, so only the write pump can end this.
        let finished =
            tokio::time::timeout(Duration::from_secs(1), run(&session, transport, rx)).await;

        assert!(finished.is_ok());
        assert_eq!(session.state(), crate::SessionState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_ping_period_disables_pings() {
        let config = HubConfig {
            ping_period: Duration::ZERO,
            ..HubConfig::default()
        };
        let (session, rx, errors) = recording_session(config);
        let (transport, mut peer) = MemoryTransport::pair();

        let task_session = Arc::clone(&session);
        let handle = tokio::spawn(async move { run(&task_session, transport, rx).await });

        tokio_test::assert_ok!(session.write("still works"));
        tokio::time::sleep(Duration::from_secs(30)).await;
        tokio_test::assert_ok!(session.close());
        tokio_test::assert_ok!(handle.await);

        assert_eq!(
            peer.recv().await,
            Some(Frame::Text(Bytes::from_static(b"still works")))
        );
        assert_eq!(peer.recv().await, Some(Frame::Close(None)));
        assert_eq!(peer.recv().await, None);
        assert!(recorded(&errors).is_empty());
    }

    #[tokio::test]
    async fn unbounded_durations_do_not_overflow() {
        let config = HubConfig {
            write_wait: Duration::MAX,
            pong_wait: Duration::MAX,
            ping_period: Duration::MAX,
            ..HubConfig::default()
        };
        let (session, rx, errors) = recording_session(config);
        let (transport, mut peer) = MemoryTransport::pair();

        tokio_test::assert_ok!(session.write("x"));
        tokio_test::assert_ok!(session.close());
        run(&session, transport, rx).await;

        assert_eq!(peer.recv().await, Some(Frame::Text(Bytes::from_static(b"x"))));
        assert_eq!(peer.recv().await, Some(Frame::Close(None)));
        assert!(recorded(&errors).is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn pings_keep_flowing_while_queue_stays_busy() {
        let config = HubConfig {
            ping_period: Duration::from_millis(50),
            pong_wait: Duration::from_millis(300),
            ..HubConfig::default()
        };
        let (session, rx, errors) = recording_session(config);
        // Every delivered message queues another, so the queue never drains.
        session.handlers().set_message_sent(|session, payload| {
            let _ = session.write(payload.clone());
        });
        let (transport, mut peer) = MemoryTransport::pair();

        let pings = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&pings);
        let answering = tokio::spawn(async move {
            while let Some(frame) = peer.recv().await {
                if matches!(frame, Frame::Ping(_)) {
                    counter.fetch_add(1, Ordering::SeqCst);
                    if peer.send(Frame::Pong(Bytes::new())).is_err() {
                        break;
                    }
                }
            }
        });

        for _ in 0..8 {
            tokio_test::assert_ok!(session.write("busy"));
        }
        let task_session = Arc::clone(&session);
        let handle = tokio::spawn(async move { run(&task_session, transport, rx).await });

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(!session.is_closed(), "session timed out under load");
        assert!(pings.load(Ordering::SeqCst) >= 3);

        tokio_test::assert_ok!(session.close());
        tokio_test::assert_ok!(handle.await);
        tokio_test::assert_ok!(answering.await);
        assert!(recorded(&errors).is_empty());
    }
}
