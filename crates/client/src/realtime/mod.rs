//! The realtime order channel.
//!
//! A persistent duplex WebSocket connection, independent of the GraphQL
//! transport, delivering push events for a store scope. The connection is
//! owned by a background task running an explicit state machine:
//!
//! ```text
//! CONNECTING -> OPEN -> (frames...) -> CLOSED -> CONNECTING (after a fixed
//! 3 s delay) -> ... -> GIVEN_UP after 5 consecutive failed reconnects
//! without an intervening OPEN
//! ```
//!
//! The reconnect delay is fixed, not exponential - a deliberately different
//! policy from the transport's retry backoff. Connection trouble is
//! non-fatal: it drives the state machine and surfaces to the UI as a
//! passive degraded indicator through [`RealtimeHandle::status_stream`],
//! never as a blocking error. `GIVEN_UP` is signalled exactly once.
//!
//! Malformed inbound frames are logged and dropped. Outbound sends are
//! fire-and-forget UI signals: when the channel is not open they are
//! dropped with a warning, never queued.
//!
//! Deliberate teardown via [`RealtimeHandle::shutdown`] cancels the
//! connection task *and* any pending reconnect timer; without this a
//! dismissed view would leak a reconnect loop.

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};
use url::Url;

use clementine_core::RealtimeEvent;

use crate::config::RealtimeConfig;

/// Connection state of the realtime channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Connecting,
    Open,
    Closed,
    /// Terminal: reconnects exhausted; realtime updates are unavailable
    /// until a new channel is opened.
    GivenUp,
}

/// Handle to a running realtime channel.
///
/// Dropping the handle without calling [`shutdown`](Self::shutdown) also
/// stops the task (the shutdown signal's sender is dropped), but shutdown
/// is the explicit teardown path and waits for the task to finish.
pub struct RealtimeHandle {
    status: watch::Receiver<ChannelState>,
    outbound: mpsc::UnboundedSender<Value>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl RealtimeHandle {
    /// Current channel state.
    #[must_use]
    pub fn status(&self) -> ChannelState {
        *self.status.borrow()
    }

    /// Watch stream of state transitions, for a degraded-mode indicator.
    #[must_use]
    pub fn status_stream(&self) -> watch::Receiver<ChannelState> {
        self.status.clone()
    }

    /// Send a fire-and-forget message to the server.
    ///
    /// A no-op with a warning when the channel is not open; outbound
    /// messages are never queued.
    pub fn send(&self, message: Value) {
        if self.status() != ChannelState::Open {
            warn!("realtime channel is not open, dropping outbound message");
            return;
        }
        let _ = self.outbound.send(message);
    }

    /// Tear the channel down: closes the socket if open and cancels any
    /// pending reconnect timer.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        let _ = self.task.await;
    }
}

/// Open a realtime channel to `url`.
///
/// Returns the handle and the stream of validated [`RealtimeEvent`]s;
/// frames that do not parse into the event union never appear on it.
#[must_use]
pub fn connect(
    url: Url,
    config: RealtimeConfig,
) -> (RealtimeHandle, mpsc::UnboundedReceiver<RealtimeEvent>) {
    let (status_tx, status_rx) = watch::channel(ChannelState::Connecting);
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let task = tokio::spawn(run(url, config, status_tx, outbound_rx, events_tx, shutdown_rx));

    (
        RealtimeHandle {
            status: status_rx,
            outbound: outbound_tx,
            shutdown: shutdown_tx,
            task,
        },
        events_rx,
    )
}

/// Why a live connection ended.
enum CloseReason {
    Shutdown,
    Closed,
}

async fn run(
    url: Url,
    config: RealtimeConfig,
    status: watch::Sender<ChannelState>,
    mut outbound: mpsc::UnboundedReceiver<Value>,
    events: mpsc::UnboundedSender<RealtimeEvent>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut failed_attempts: u32 = 0;

    loop {
        status.send_replace(ChannelState::Connecting);

        tokio::select! {
            _ = shutdown.changed() => return,
            result = tokio_tungstenite::connect_async(url.as_str()) => match result {
                Ok((stream, _)) => {
                    // An open connection resets the consecutive-failure count.
                    failed_attempts = 0;
                    info!(url = %url, "realtime channel open");
                    status.send_replace(ChannelState::Open);

                    let reason = drive(stream, &mut outbound, &events, &mut shutdown).await;
                    status.send_replace(ChannelState::Closed);
                    if matches!(reason, CloseReason::Shutdown) {
                        return;
                    }
                    debug!("realtime channel closed, scheduling reconnect");
                }
                Err(e) => {
                    failed_attempts += 1;
                    warn!(
                        error = %e,
                        attempt = failed_attempts,
                        "realtime connect failed"
                    );
                    status.send_replace(ChannelState::Closed);

                    if failed_attempts >= config.max_reconnect_attempts {
                        warn!("realtime reconnects exhausted, giving up");
                        status.send_replace(ChannelState::GivenUp);
                        return;
                    }
                }
            }
        }

        // Fixed-interval reconnect timer, cancelled by teardown.
        tokio::select! {
            _ = shutdown.changed() => return,
            () = tokio::time::sleep(config.reconnect_interval) => {}
        }
    }
}

async fn drive<S>(
    stream: tokio_tungstenite::WebSocketStream<S>,
    outbound: &mut mpsc::UnboundedReceiver<Value>,
    events: &mpsc::UnboundedSender<RealtimeEvent>,
    shutdown: &mut watch::Receiver<bool>,
) -> CloseReason
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    let (mut sink, mut source) = stream.split();

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                let _ = sink.send(Message::Close(None)).await;
                return CloseReason::Shutdown;
            }
            message = outbound.recv() => {
                let Some(message) = message else {
                    // Handle dropped without shutdown; treat as teardown.
                    let _ = sink.send(Message::Close(None)).await;
                    return CloseReason::Shutdown;
                };
                if sink.send(Message::text(message.to_string())).await.is_err() {
                    return CloseReason::Closed;
                }
            }
            frame = source.next() => match frame {
                None => return CloseReason::Closed,
                Some(Err(e)) => {
                    // Transport-level error forces a close, which drives the
                    // reconnect transition in the caller.
                    warn!(error = %e, "realtime transport error");
                    return CloseReason::Closed;
                }
                Some(Ok(Message::Text(text))) => {
                    match serde_json::from_str::<RealtimeEvent>(&text) {
                        Ok(event) => {
                            if events.send(event).is_err() {
                                // Nobody is consuming events anymore.
                                return CloseReason::Shutdown;
                            }
                        }
                        Err(e) => {
                            warn!(error = %e, "dropping malformed realtime frame");
                        }
                    }
                }
                Some(Ok(Message::Close(_))) => return CloseReason::Closed,
                // Pings are answered by the protocol layer; binary frames
                // are not part of the event contract.
                Some(Ok(_)) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn fast_config(max_reconnect_attempts: u32) -> RealtimeConfig {
        RealtimeConfig {
            reconnect_interval: Duration::from_millis(20),
            max_reconnect_attempts,
        }
    }

    /// Nothing listens on this port, so connects fail fast.
    fn dead_url() -> Url {
        Url::parse("ws://127.0.0.1:1/ws/store/s1").unwrap()
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts_exactly_once() {
        let (handle, _events) = connect(dead_url(), fast_config(3));

        let mut status = handle.status_stream();
        let mut given_up = 0;
        // The watch coalesces intermediate states; wait for the terminal one.
        while status.changed().await.is_ok() {
            if *status.borrow() == ChannelState::GivenUp {
                given_up += 1;
            }
        }
        assert_eq!(given_up, 1);
        assert_eq!(handle.status(), ChannelState::GivenUp);
    }

    #[tokio::test]
    async fn test_send_when_not_open_is_dropped() {
        let (handle, _events) = connect(dead_url(), fast_config(1));
        // Never opens; the send must not panic or queue.
        handle.send(serde_json::json!({"type": "PING"}));
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_cancels_pending_reconnect() {
        let config = RealtimeConfig {
            reconnect_interval: Duration::from_secs(3600),
            max_reconnect_attempts: 5,
        };
        let (handle, _events) = connect(dead_url(), config);

        // Give the first connect attempt time to fail and enter the timer.
        tokio::time::sleep(Duration::from_millis(100)).await;

        // Must return promptly rather than waiting out the hour-long timer.
        tokio::time::timeout(Duration::from_secs(2), handle.shutdown())
            .await
            .expect("shutdown must cancel the reconnect timer");
    }
}
