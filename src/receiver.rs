//! Consumer end of the frame stream: accepts one producer at a time and accounts for what it sends.

use crate::error::TransportError;
use crate::recorder::STOP_RECORDING;
use async_tungstenite::tokio::accept_async;
use async_tungstenite::tungstenite::Message;
use futures::StreamExt;
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Progress is logged every this many frames
const PROGRESS_INTERVAL: u64 = 100;

/// Totals across all producer sessions
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReceiverStats {
    pub sessions: u64,
    pub active_sessions: u32,
    pub frames: u64,
    pub bytes: u64,
    pub text_messages: u64,
    pub stop_requests: u64,
    /// Connections turned away because another producer was streaming
    pub rejected: u64,
}

/// WebSocket server receiving JPEG frames from a single producer at a time
pub struct FrameReceiver {
    local_addr: SocketAddr,
    stats: Arc<Mutex<ReceiverStats>>,
    cancel: CancellationToken,
    accept_task: Mutex<Option<JoinHandle<()>>>,
}

impl FrameReceiver {
    /// Bind `address` and start accepting producers
    pub async fn bind(address: &str) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(address)
            .await
            .map_err(|e| TransportError::BindFailed {
                address: address.to_string(),
                details: e.to_string(),
            })?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| TransportError::BindFailed {
                address: address.to_string(),
                details: e.to_string(),
            })?;

        let stats = Arc::new(Mutex::new(ReceiverStats::default()));
        let cancel = CancellationToken::new();

        let accept_task = tokio::spawn(accept_loop(
            listener,
            Arc::clone(&stats),
            cancel.clone(),
        ));

        info!("Frame receiver listening on {}", local_addr);
        Ok(Self {
            local_addr,
            stats,
            cancel,
            accept_task: Mutex::new(Some(accept_task)),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn stats(&self) -> ReceiverStats {
        self.stats.lock().clone()
    }

    /// Stop accepting and end all sessions
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let accept_task = self.accept_task.lock().take();
        if let Some(task) = accept_task {
            let _ = task.await;
        }
        info!("Frame receiver on {} stopped", self.local_addr);
    }
}

impl Drop for FrameReceiver {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn accept_loop(
    listener: TcpListener,
    stats: Arc<Mutex<ReceiverStats>>,
    cancel: CancellationToken,
) {
    let slots = Arc::new(Semaphore::new(1));

    loop {
        let accepted = tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => accepted,
        };

        match accepted {
            Ok((stream, peer)) => {
                let Ok(permit) = Arc::clone(&slots).try_acquire_owned() else {
                    warn!("Rejecting producer {}: a session is already active", peer);
                    stats.lock().rejected += 1;
                    drop(stream);
                    continue;
                };
                tokio::spawn(handle_session(
                    stream,
                    peer,
                    permit,
                    Arc::clone(&stats),
                    cancel.child_token(),
                ));
            }
            Err(e) => warn!("Accept failed: {}", e),
        }
    }
    debug!("Accept loop exiting");
}

async fn handle_session(
    stream: TcpStream,
    peer: SocketAddr,
    permit: OwnedSemaphorePermit,
    stats: Arc<Mutex<ReceiverStats>>,
    cancel: CancellationToken,
) {
    let mut ws = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!("WebSocket handshake with {} failed: {}", peer, e);
            return;
        }
    };

    let session = {
        let mut stats = stats.lock();
        stats.sessions += 1;
        stats.active_sessions += 1;
        stats.sessions
    };
    info!("Producer {} connected (session {})", peer, session);

    let mut frames: u64 = 0;
    let mut bytes: u64 = 0;

    loop {
        let message = tokio::select! {
            _ = cancel.cancelled() => break,
            message = ws.next() => message,
        };

        match message {
            Some(Ok(Message::Binary(data))) => {
                frames += 1;
                bytes += data.len() as u64;
                {
                    let mut stats = stats.lock();
                    stats.frames += 1;
                    stats.bytes += data.len() as u64;
                }
                if frames % PROGRESS_INTERVAL == 0 {
                    info!("Session {}: {} frames received", session, frames);
                }
            }
            Some(Ok(Message::Text(text))) => {
                let is_stop = text.as_str() == STOP_RECORDING;
                {
                    let mut stats = stats.lock();
                    stats.text_messages += 1;
                    if is_stop {
                        stats.stop_requests += 1;
                    }
                }
                if is_stop {
                    info!(
                        "Session {} stopped by producer: {} frames, {} bytes",
                        session, frames, bytes
                    );
                } else {
                    info!("Session {} text message: {}", session, text.as_str());
                }
            }
            Some(Ok(Message::Close(_))) | None => break,
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                warn!("Session {} read error: {}", session, e);
                break;
            }
        }
    }

    // Free the slot before the session stops counting as active
    drop(permit);
    stats.lock().active_sessions -= 1;
    info!(
        "Producer {} disconnected (session {}): {} frames, {} bytes",
        peer, session, frames, bytes
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_tungstenite::tokio::connect_async;
    use futures::SinkExt;
    use std::time::Duration;

    #[tokio::test]
    async fn test_bind_failure_is_reported() {
        let first = FrameReceiver::bind("127.0.0.1:0").await.unwrap();
        let address = first.local_addr().to_string();

        let err = FrameReceiver::bind(&address).await.err().unwrap();
        assert!(matches!(err, TransportError::BindFailed { .. }));
        assert!(!err.is_recoverable());
    }

    #[tokio::test]
    async fn test_counts_frames_and_stop_requests() {
        let receiver = FrameReceiver::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", receiver.local_addr());

        let (mut ws, _) = connect_async(url.as_str()).await.unwrap();
        for i in 0..3u8 {
            ws.send(Message::binary(vec![0xFF, 0xD8, i, 0xFF, 0xD9]))
                .await
                .unwrap();
        }
        ws.send(Message::text("hello")).await.unwrap();
        ws.send(Message::text(STOP_RECORDING)).await.unwrap();
        ws.close(None).await.unwrap();

        for _ in 0..100 {
            if receiver.stats().active_sessions == 0 && receiver.stats().sessions == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        let stats = receiver.stats();
        assert_eq!(stats.sessions, 1);
        assert_eq!(stats.frames, 3);
        assert_eq!(stats.bytes, 15);
        assert_eq!(stats.text_messages, 2);
        assert_eq!(stats.stop_requests, 1);

        receiver.shutdown().await;
    }

    #[tokio::test]
    async fn test_second_producer_rejected_while_first_streams() {
        let receiver = FrameReceiver::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", receiver.local_addr());

        let (mut first, _) = connect_async(url.as_str()).await.unwrap();
        first
            .send(Message::binary(vec![0xFF, 0xD8, 0xFF, 0xD9]))
            .await
            .unwrap();

        assert!(connect_async(url.as_str()).await.is_err());

        first.close(None).await.unwrap();
        for _ in 0..100 {
            if receiver.stats().active_sessions == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        let (mut third, _) = connect_async(url.as_str()).await.unwrap();
        third.close(None).await.unwrap();
        for _ in 0..100 {
            if receiver.stats().sessions == 2 && receiver.stats().active_sessions == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        let stats = receiver.stats();
        assert_eq!(stats.sessions, 2);
        assert_eq!(stats.rejected, 1);
        assert_eq!(stats.frames, 1);

        receiver.shutdown().await;
    }
}
