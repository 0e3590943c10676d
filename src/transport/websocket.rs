use super::{Endpoint, InboundMessage, StreamTransport, TransportConnector};
use crate::error::TransportError;
use async_trait::async_trait;
use async_tungstenite::tokio::{connect_async, ConnectStream};
use async_tungstenite::tungstenite::Message;
use async_tungstenite::WebSocketStream;
use bytes::Bytes;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::time::timeout;
use tracing::{debug, info, warn};

type WsStream = WebSocketStream<ConnectStream>;

const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Opens WebSocket connections with a bounded handshake
pub struct WebSocketConnector {
    handshake_timeout: Duration,
    pong_timeout: Duration,
}

impl WebSocketConnector {
    pub fn new(handshake_timeout: Duration, pong_timeout: Duration) -> Self {
        Self {
            handshake_timeout,
            pong_timeout,
        }
    }
}

impl Default for WebSocketConnector {
    fn default() -> Self {
        Self::new(Duration::from_secs(30), Duration::from_secs(10))
    }
}

#[async_trait]
impl TransportConnector for WebSocketConnector {
    async fn connect(
        &self,
        endpoint: &Endpoint,
        generation: u64,
    ) -> Result<Arc<dyn StreamTransport>, TransportError> {
        debug!(
            "Opening WebSocket to {} (generation {}, timeout {:?})",
            endpoint, generation, self.handshake_timeout
        );

        let (stream, response) =
            match timeout(self.handshake_timeout, connect_async(endpoint.url())).await {
                Ok(Ok(pair)) => pair,
                Ok(Err(e)) => {
                    return Err(TransportError::ConnectFailed {
                        endpoint: endpoint.to_string(),
                        details: e.to_string(),
                    })
                }
                Err(_) => {
                    return Err(TransportError::HandshakeTimeout {
                        endpoint: endpoint.to_string(),
                        timeout: self.handshake_timeout,
                    })
                }
            };

        info!(
            "WebSocket connected to {} (generation {}, status {})",
            endpoint,
            generation,
            response.status()
        );

        Ok(Arc::new(WebSocketTransport::new(
            generation,
            stream,
            self.pong_timeout,
        )))
    }
}

/// A single WebSocket connection, split into independently locked halves
///
/// A ping only succeeds once the matching pong has been read, so someone must be driving
/// `receive` (normally `receive_loop`) while `ping` waits.
pub struct WebSocketTransport {
    generation: u64,
    sink: Mutex<SplitSink<WsStream, Message>>,
    stream: Mutex<SplitStream<WsStream>>,
    connected: AtomicBool,
    closed: AtomicBool,
    pong: Notify,
    pong_timeout: Duration,
}

impl WebSocketTransport {
    fn new(generation: u64, stream: WsStream, pong_timeout: Duration) -> Self {
        let (sink, stream) = StreamExt::split(stream);
        Self {
            generation,
            sink: Mutex::new(sink),
            stream: Mutex::new(stream),
            connected: AtomicBool::new(true),
            closed: AtomicBool::new(false),
            pong: Notify::new(),
            pong_timeout,
        }
    }

    fn mark_failed(&self) {
        if self.connected.swap(false, Ordering::AcqRel) {
            debug!("WebSocket generation {} marked as failed", self.generation);
        }
    }

    async fn send_message(
        &self,
        message: Message,
        wrap: fn(String) -> TransportError,
    ) -> Result<(), TransportError> {
        if !self.connected.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }

        let mut sink = self.sink.lock().await;
        sink.send(message).await.map_err(|e| {
            self.mark_failed();
            wrap(e.to_string())
        })
    }
}

#[async_trait]
impl StreamTransport for WebSocketTransport {
    fn generation(&self) -> u64 {
        self.generation
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    async fn send_binary(&self, payload: Bytes) -> Result<(), TransportError> {
        self.send_message(Message::binary(payload), |details| {
            TransportError::SendFailed { details }
        })
        .await
    }

    async fn send_text(&self, text: &str) -> Result<(), TransportError> {
        self.send_message(Message::text(text.to_string()), |details| {
            TransportError::SendFailed { details }
        })
        .await
    }

    async fn ping(&self) -> Result<(), TransportError> {
        // Registered before sending so a fast pong cannot slip past
        let pong = self.pong.notified();
        tokio::pin!(pong);
        pong.as_mut().enable();

        self.send_message(Message::Ping(Default::default()), |details| {
            TransportError::PingFailed { details }
        })
        .await?;

        match timeout(self.pong_timeout, pong).await {
            Ok(()) => Ok(()),
            Err(_) => {
                self.mark_failed();
                Err(TransportError::PingFailed {
                    details: format!("no pong within {:?}", self.pong_timeout),
                })
            }
        }
    }

    async fn receive(&self) -> Result<InboundMessage, TransportError> {
        if !self.connected.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }

        let mut stream = self.stream.lock().await;
        match stream.next().await {
            Some(Ok(Message::Binary(data))) => Ok(InboundMessage::Binary(Bytes::from(data))),
            Some(Ok(Message::Text(text))) => Ok(InboundMessage::Text(text.as_str().to_owned())),
            Some(Ok(Message::Pong(_))) => {
                self.pong.notify_waiters();
                Ok(InboundMessage::Control)
            }
            Some(Ok(Message::Close(frame))) => {
                debug!(
                    "WebSocket generation {} closed by peer: {:?}",
                    self.generation, frame
                );
                self.mark_failed();
                Err(TransportError::Closed)
            }
            Some(Ok(_)) => Ok(InboundMessage::Control),
            Some(Err(e)) => {
                self.mark_failed();
                Err(TransportError::ReceiveFailed {
                    details: e.to_string(),
                })
            }
            None => {
                self.mark_failed();
                Err(TransportError::Closed)
            }
        }
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let was_connected = self.connected.swap(false, Ordering::AcqRel);

        let result = timeout(CLOSE_TIMEOUT, async {
            let mut sink = self.sink.lock().await;
            if was_connected {
                let _ = sink.send(Message::Close(None)).await;
            }
            sink.close().await
        })
        .await;

        match result {
            Ok(Ok(())) => debug!("WebSocket generation {} closed", self.generation),
            Ok(Err(e)) => debug!(
                "WebSocket generation {} close error: {}",
                self.generation, e
            ),
            Err(_) => warn!(
                "WebSocket generation {} close timed out after {:?}",
                self.generation, CLOSE_TIMEOUT
            ),
        }
    }
}
