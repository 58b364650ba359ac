//! Driver spawns and manages the background packet reader

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace};

use crate::config::ListenerConfig;
use crate::protocol::PacketCodec;
use crate::state::ListenerState;
use crate::{ListenerError, Result};

/// Handle to a running reader task.
pub(crate) struct DriverHandle {
    cancel: CancellationToken,
    join: JoinHandle<()>,
}

impl DriverHandle {
    /// Ask the reader to stop without waiting for it.
    pub(crate) fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Stop the reader and wait for it, bounded by `join_timeout`.
    ///
    /// A reader that outlives the timeout is a bug, reported as the
    /// non-retryable [`ListenerError::ShutdownTimeout`].
    pub(crate) async fn shutdown(self, join_timeout: Duration) -> Result<()> {
        self.cancel.cancel();
        match tokio::time::timeout(join_timeout, self.join).await {
            Ok(Ok(())) => {
                debug!("Packet reader joined");
                Ok(())
            }
            Ok(Err(join_error)) => Err(ListenerError::background_task(format!(
                "Packet reader supervisor failed: {}",
                join_error
            ))),
            Err(_) => {
                error!(
                    timeout = ?join_timeout,
                    "Packet reader did not stop within the join timeout; this should never happen"
                );
                Err(ListenerError::ShutdownTimeout { duration: join_timeout })
            }
        }
    }
}

/// Driver spawns the background packet reader.
///
/// The reader owns the stream and the codec. It dispatches decoded packets to
/// the shared state one at a time, holding the lock only for a single packet,
/// and stops dispatching whenever a run boundary pauses reads. Any error ends
/// the task and is stored in the state as a deferred error.
pub struct Driver;

impl Driver {
    /// Spawn the reader for `stream`.
    ///
    /// The reader runs as its own task under a supervisor so that a panic in a
    /// packet handler is recorded as a deferred failure like any other error.
    pub(crate) fn spawn<S>(stream: S, state: Arc<Mutex<ListenerState>>, config: ListenerConfig) -> DriverHandle
    where
        S: AsyncRead + Unpin + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let cancel_reader = cancel.clone();
        let reader_state = state.clone();

        let join = tokio::spawn(async move {
            let reader = tokio::spawn(async move {
                Self::packet_reader_task(stream, &reader_state, &config, &cancel_reader).await
            });

            let outcome = match reader.await {
                Ok(result) => result,
                Err(join_error) if join_error.is_panic() => {
                    Err(ListenerError::background_task(panic_message(join_error.into_panic())))
                }
                Err(join_error) => Err(ListenerError::background_task(join_error.to_string())),
            };

            if let Err(e) = outcome {
                state.lock().record_background_failure(e);
            }
        });

        DriverHandle { cancel, join }
    }

    /// Reader task: read, decode, dispatch until cancelled or failed.
    async fn packet_reader_task<S>(
        mut stream: S,
        state: &Mutex<ListenerState>,
        config: &ListenerConfig,
        cancel: &CancellationToken,
    ) -> Result<()>
    where
        S: AsyncRead + Unpin,
    {
        info!("Packet reader task started");
        let mut codec = PacketCodec::new();
        let mut chunk = vec![0u8; config.read_chunk_size];
        let mut dispatched = 0u64;

        loop {
            if cancel.is_cancelled() {
                info!("Packet reader cancelled");
                break;
            }

            let paused = state.lock().run.reads_paused();
            if paused {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        info!("Packet reader cancelled while paused");
                        break;
                    }
                    _ = tokio::time::sleep(config.pause_poll()) => continue,
                }
            }

            if codec.has_pending() {
                dispatched += Self::dispatch_pending(&mut codec, state)?;
                continue;
            }

            // Bounded read so cancellation is observed even on an idle stream
            let read = tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Packet reader cancelled during read");
                    break;
                }
                read = tokio::time::timeout(config.receive_timeout(), stream.read(&mut chunk)) => read,
            };

            let n = match read {
                Err(_) => {
                    trace!(timeout = ?config.receive_timeout(), "No data within receive timeout");
                    continue;
                }
                Ok(Ok(0)) => return Err(ListenerError::disconnected("server closed the connection")),
                Ok(Ok(n)) => n,
                Ok(Err(e)) => return Err(ListenerError::io("reading from stream", e)),
            };

            let decoded = codec.feed(&chunk[..n])?;
            if decoded == 0 {
                tokio::time::sleep(config.idle_sleep()).await;
            } else {
                dispatched += Self::dispatch_pending(&mut codec, state)?;
            }
        }

        info!(
            dispatched,
            decoded = codec.packets_decoded(),
            "Packet reader task ended"
        );
        Ok(())
    }

    /// Dispatch queued packets until the queue empties or reads pause.
    fn dispatch_pending(codec: &mut PacketCodec, state: &Mutex<ListenerState>) -> Result<u64> {
        let mut dispatched = 0;
        while codec.has_pending() {
            let mut guard = state.lock();
            if guard.run.reads_paused() {
                debug!(pending = codec.pending(), "Reads paused at run boundary");
                break;
            }
            let Some(packet) = codec.pop() else {
                break;
            };
            guard.handle_packet(packet)?;
            dispatched += 1;
        }
        Ok(dispatched)
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    let message = match payload.downcast_ref::<&str>() {
        Some(text) => (*text).to_string(),
        None => payload.downcast_ref::<String>().cloned().unwrap_or_else(|| "unknown panic".to_string()),
    };
    format!("packet reader panicked: {}", message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::RunStatusCode;
    use crate::test_utils::{init_tracing, instrument_xml, packets};
    use crate::{InstrumentLayout, Timestamp, XmlInstrumentLoader};
    use tokio::io::AsyncWriteExt;

    fn test_config() -> ListenerConfig {
        ListenerConfig {
            receive_timeout_ms: 50,
            idle_sleep_ms: 1,
            pause_poll_ms: 5,
            join_timeout_ms: 1_000,
            ..Default::default()
        }
    }

    fn shared_state() -> Arc<Mutex<ListenerState>> {
        let mut state = ListenerState::new(false, Arc::new(XmlInstrumentLoader));
        state.begin_streaming(Timestamp::ZERO);
        state.connected = true;
        Arc::new(Mutex::new(state))
    }

    async fn wait_for<F>(state: &Mutex<ListenerState>, mut condition: F) -> bool
    where
        F: FnMut(&ListenerState) -> bool,
    {
        for _ in 0..200 {
            if condition(&state.lock()) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        false
    }

    #[tokio::test]
    async fn closed_stream_becomes_deferred_disconnect() {
        init_tracing();
        let state = shared_state();
        let (client, server) = tokio::io::duplex(1024);
        let handle = Driver::spawn(client, state.clone(), test_config());
        drop(server);

        assert!(wait_for(&state, |s| !s.connected).await);
        let err = state.lock().check_background().unwrap_err();
        assert!(matches!(err, ListenerError::Disconnected { .. }));
        handle.shutdown(Duration::from_secs(1)).await.expect("task already finished");
    }

    #[tokio::test]
    async fn framing_error_is_deferred() {
        init_tracing();
        let state = shared_state();
        let (client, mut server) = tokio::io::duplex(1024);
        let _handle = Driver::spawn(client, state.clone(), test_config());

        let mut garbage = packets::heartbeat(Timestamp::ZERO);
        garbage[0] = 1;
        server.write_all(&garbage).await.unwrap();

        assert!(wait_for(&state, |s| !s.connected).await);
        let err = state.lock().check_background().unwrap_err();
        assert!(matches!(err, ListenerError::Framing { .. }));
    }

    #[tokio::test]
    async fn paused_reads_hold_packets_until_resumed() {
        init_tracing();
        let state = shared_state();
        state.lock().run.end_run();

        let (client, mut server) = tokio::io::duplex(64 * 1024);
        let _handle = Driver::spawn(client, state.clone(), test_config());

        let ts = Timestamp::new(10, 0);
        server.write_all(&packets::beamline_info(ts, "BL9", "TST", "TEST")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(state.lock().instrument_name.is_none());

        state.lock().run.advance();
        assert!(wait_for(&state, |s| s.instrument_name.is_some()).await);
    }

    #[tokio::test]
    async fn new_run_stops_dispatch_mid_chunk() {
        init_tracing();
        let state = shared_state();
        let (client, mut server) = tokio::io::duplex(64 * 1024);
        let _handle = Driver::spawn(client, state.clone(), test_config());

        let ts = Timestamp::new(10, 0);
        let mut chunk = packets::geometry(ts, &instrument_xml("TEST", 1, 2, 0, &[]));
        chunk.extend(packets::beamline_info(ts, "BL9", "TST", "TEST"));
        chunk.extend(packets::run_status(ts, 5, RunStatusCode::NewRun));
        chunk.extend(packets::annotation(ts, crate::protocol::MarkerType::Pause, 0, ""));
        server.write_all(&chunk).await.unwrap();

        assert!(wait_for(&state, |s| s.run.reads_paused()).await);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!state.lock().run_paused);

        state.lock().advance_run_status().expect("boundary observed");
        assert!(wait_for(&state, |s| s.run_paused).await);
    }

    #[tokio::test]
    async fn shutdown_is_prompt_on_idle_stream() {
        init_tracing();
        let state = shared_state();
        let (client, _server) = tokio::io::duplex(1024);
        let config = ListenerConfig { receive_timeout_ms: 30_000, join_timeout_ms: 30_000, ..Default::default() };
        let handle = Driver::spawn(client, state.clone(), config);

        tokio::time::sleep(Duration::from_millis(20)).await;
        let started = std::time::Instant::now();
        handle.shutdown(Duration::from_secs(2)).await.expect("reader stops on cancel");
        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(state.lock().check_background().is_ok());
    }

    #[tokio::test]
    async fn handler_panic_becomes_deferred_failure() {
        init_tracing();
        let loader = |_: &str, _: &str| -> Result<InstrumentLayout> { panic!("loader bug") };
        let mut state = ListenerState::new(false, Arc::new(loader));
        state.begin_streaming(Timestamp::ZERO);
        state.connected = true;
        let state = Arc::new(Mutex::new(state));

        let (client, mut server) = tokio::io::duplex(64 * 1024);
        let handle = Driver::spawn(client, state.clone(), test_config());

        let ts = Timestamp::new(10, 0);
        let mut chunk = packets::geometry(ts, &instrument_xml("TEST", 1, 2, 0, &[]));
        chunk.extend(packets::beamline_info(ts, "BL9", "TST", "TEST"));
        server.write_all(&chunk).await.unwrap();

        assert!(wait_for(&state, |s| !s.connected).await);
        let err = state.lock().check_background().unwrap_err();
        assert!(matches!(err, ListenerError::BackgroundTask { .. }));
        assert!(err.to_string().contains("loader bug"));
        assert!(!err.is_retryable());
        assert!(matches!(state.lock().check_background(), Err(ListenerError::Disconnected { .. })));
        handle.shutdown(Duration::from_secs(1)).await.expect("supervisor finished cleanly");
    }

    #[tokio::test]
    async fn join_timeout_is_fatal() {
        init_tracing();
        let handle = DriverHandle { cancel: CancellationToken::new(), join: tokio::spawn(std::future::pending()) };

        let err = handle.shutdown(Duration::from_millis(20)).await.unwrap_err();
        assert!(matches!(err, ListenerError::ShutdownTimeout { .. }));
        assert!(!err.is_retryable());
    }
}
