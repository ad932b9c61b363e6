//! One connection generation to the gateway.
//!
//! A session owns the WebSocket from connect through disconnect: it sends the
//! registration frame, logs the ack, then serves jobs while a background task
//! queues heartbeats. All outbound frames go through the session loop, which
//! is the only writer on the sink. When the loop exits the heartbeat task is
//! cancelled and joined, so nothing lingers to write on a dead connection.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;

use crate::config::Settings;
use crate::dispatch::Dispatcher;
use crate::error::SessionError;
use crate::protocol::{self, Inbound};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = futures::stream::SplitSink<WsStream, Message>;
type InFlight = Pin<Box<dyn Future<Output = Option<Value>> + Send>>;

/// One client session, reusable across reconnects: `run_once` performs a full
/// connection generation each time it is called.
pub struct Session {
    url: String,
    registration: Value,
    dispatcher: Arc<Dispatcher>,
    heartbeat_interval: Duration,
}

impl Session {
    pub fn new(settings: &Settings, dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            url: settings.session_url(),
            registration: protocol::registration_frame(settings),
            dispatcher,
            heartbeat_interval: settings.heartbeat_interval,
        }
    }

    /// Connect, register, and serve until the connection dies. Returns the
    /// transport failure that ended the generation.
    pub async fn run_once(&self) -> Result<(), SessionError> {
        tracing::info!(url = %self.url, role = %self.dispatcher.role(), "Connecting to gateway");
        let (socket, _response) =
            connect_async(&self.url)
                .await
                .map_err(|e| SessionError::Connect {
                    url: self.url.clone(),
                    reason: e.to_string(),
                })?;
        let (mut sink, mut stream) = socket.split();

        // Registration is always the first frame of a generation.
        send_json(&mut sink, &self.registration).await?;
        match stream.next().await {
            Some(Ok(Message::Text(ack))) => {
                tracing::info!(ack = %ack.as_str(), "Registered with gateway");
            }
            Some(Ok(Message::Close(_))) => {
                return Err(SessionError::Handshake("closed before ack".into()));
            }
            Some(Ok(other)) => tracing::info!(ack = ?other, "Registered with gateway"),
            Some(Err(e)) => return Err(SessionError::Handshake(e.to_string())),
            None => return Err(SessionError::Handshake("closed before ack".into())),
        }

        let (frame_tx, mut frame_rx) = mpsc::channel::<Value>(16);
        let cancel = CancellationToken::new();
        let heartbeat = tokio::spawn(heartbeat_loop(
            frame_tx.clone(),
            self.heartbeat_interval,
            cancel.clone(),
        ));

        let outcome = self.serve(&mut sink, &mut stream, &mut frame_rx).await;

        // Stop the heartbeat deterministically before dropping the socket.
        cancel.cancel();
        drop(frame_tx);
        let _ = heartbeat.await;

        outcome
    }

    /// Receive loop. Jobs run one at a time in arrival order — the next frame
    /// is not read until the in-flight job completes — but heartbeats keep
    /// flowing to the wire while a job is running.
    async fn serve(
        &self,
        sink: &mut WsSink,
        stream: &mut futures::stream::SplitStream<WsStream>,
        frame_rx: &mut mpsc::Receiver<Value>,
    ) -> Result<(), SessionError> {
        let mut in_flight: Option<InFlight> = None;
        loop {
            let idle = in_flight.is_none();
            tokio::select! {
                queued = frame_rx.recv() => {
                    // Only heartbeats travel through the queue; the sender
                    // side stays open for the lifetime of this loop.
                    let Some(frame) = queued else { return Ok(()) };
                    send_json(sink, &frame).await?;
                }
                result = finish(&mut in_flight) => {
                    in_flight = None;
                    if let Some(frame) = result {
                        send_json(sink, &frame).await?;
                    }
                }
                message = stream.next(), if idle => {
                    match message {
                        None => return Err(SessionError::Closed),
                        Some(Err(e)) => return Err(SessionError::Receive(e.to_string())),
                        Some(Ok(Message::Text(text))) => {
                            if let Some(frame) = decode(&text) {
                                let dispatcher = Arc::clone(&self.dispatcher);
                                in_flight =
                                    Some(Box::pin(async move { dispatcher.dispatch(frame).await }));
                            }
                        }
                        Some(Ok(Message::Close(_))) => return Err(SessionError::Closed),
                        Some(Ok(_)) => {} // binary / ping / pong
                    }
                }
            }
        }
    }
}

/// Awaits the in-flight job, or pends forever when there is none so the
/// select arm stays quiet. The job stays stored in `in_flight`, so partial
/// progress survives the other arms winning the select.
async fn finish(in_flight: &mut Option<InFlight>) -> Option<Value> {
    match in_flight {
        Some(job) => job.await,
        None => std::future::pending().await,
    }
}

/// Queues a heartbeat frame every interval until cancelled. A closed queue
/// means the session writer is gone, which ends this loop silently — the
/// receive side owns the authoritative termination signal.
async fn heartbeat_loop(tx: mpsc::Sender<Value>, interval: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    ticker.tick().await; // the first tick fires immediately
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => {
                if tx.send(protocol::heartbeat()).await.is_err() {
                    return;
                }
            }
        }
    }
}

async fn send_json(sink: &mut WsSink, frame: &Value) -> Result<(), SessionError> {
    sink.send(Message::Text(frame.to_string().into()))
        .await
        .map_err(|e| SessionError::Send(e.to_string()))
}

/// Decode one inbound frame. Undecodable frames are dropped with a warning;
/// they never end the session.
fn decode(text: &str) -> Option<Inbound> {
    match serde_json::from_str(text) {
        Ok(frame) => Some(frame),
        Err(e) => {
            tracing::warn!(error = %e, "Dropping undecodable frame");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_drops_malformed_frames() {
        assert!(decode("{not json").is_none());
        assert!(decode("").is_none());
    }

    #[test]
    fn decode_accepts_job_frames() {
        let frame = decode(r#"{"type":"job","job_id":"a","action":"x","payload":{}}"#);
        assert!(matches!(frame, Some(Inbound::Job { .. })));
    }

    #[test]
    fn decode_maps_unknown_types_to_ignored() {
        let frame = decode(r#"{"type":"totally_new","data":[1,2]}"#);
        assert!(matches!(frame, Some(Inbound::Ignored)));
    }

    #[tokio::test]
    async fn finish_pends_without_a_job() {
        let mut in_flight: Option<InFlight> = None;
        let outcome =
            tokio::time::timeout(Duration::from_millis(20), finish(&mut in_flight)).await;
        assert!(outcome.is_err(), "finish resolved with no job in flight");
    }

    #[tokio::test]
    async fn finish_yields_the_job_result() {
        let mut in_flight: Option<InFlight> =
            Some(Box::pin(async { Some(protocol::heartbeat()) }));
        assert_eq!(finish(&mut in_flight).await, Some(protocol::heartbeat()));
    }

    #[tokio::test]
    async fn heartbeat_loop_stops_on_cancel() {
        let (tx, mut rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(heartbeat_loop(tx, Duration::from_millis(10), cancel.clone()));

        // At least one heartbeat arrives, then cancellation joins the task.
        let frame = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("no heartbeat emitted")
            .unwrap();
        assert_eq!(frame, protocol::heartbeat());

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("heartbeat task did not stop on cancel")
            .unwrap();
    }

    #[tokio::test]
    async fn heartbeat_loop_stops_when_queue_closes() {
        let (tx, rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(heartbeat_loop(tx, Duration::from_millis(10), cancel));
        drop(rx);
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("heartbeat task did not stop on closed queue")
            .unwrap();
    }
}
