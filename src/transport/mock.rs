use super::{Endpoint, InboundMessage, StreamTransport, TransportConnector};
use crate::error::TransportError;
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Message observed on the simulated wire
#[derive(Debug, Clone, PartialEq)]
pub enum WireMessage {
    Binary { generation: u64, data: Bytes },
    Text { generation: u64, text: String },
}

/// Scriptable connector for exercising reconnect logic without a network
pub struct MockConnector {
    failures: Mutex<VecDeque<TransportError>>,
    reachable: AtomicBool,
    attempts: AtomicU32,
    wire: Arc<Mutex<Vec<WireMessage>>>,
    transports: Mutex<Vec<Arc<MockTransport>>>,
    connect_delay: Mutex<Duration>,
}

impl MockConnector {
    /// Create a connector where every attempt succeeds
    pub fn new() -> Self {
        Self {
            failures: Mutex::new(VecDeque::new()),
            reachable: AtomicBool::new(true),
            attempts: AtomicU32::new(0),
            wire: Arc::new(Mutex::new(Vec::new())),
            transports: Mutex::new(Vec::new()),
            connect_delay: Mutex::new(Duration::ZERO),
        }
    }

    /// Fail the next `count` connection attempts
    pub fn fail_next(&self, count: usize) {
        let mut failures = self.failures.lock();
        for _ in 0..count {
            failures.push_back(TransportError::ConnectFailed {
                endpoint: "mock".to_string(),
                details: "scripted failure".to_string(),
            });
        }
    }

    /// While unreachable every connection attempt fails
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Every later connection attempt takes `delay` before resolving
    pub fn set_connect_delay(&self, delay: Duration) {
        *self.connect_delay.lock() = delay;
    }

    /// Number of connection attempts so far
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Most recently created transport
    pub fn current(&self) -> Option<Arc<MockTransport>> {
        self.transports.lock().last().cloned()
    }

    /// Everything sent over every transport, in order
    pub fn wire(&self) -> Vec<WireMessage> {
        self.wire.lock().clone()
    }

    /// Binary payloads sent so far
    pub fn sent_binaries(&self) -> Vec<Bytes> {
        self.wire
            .lock()
            .iter()
            .filter_map(|m| match m {
                WireMessage::Binary { data, .. } => Some(data.clone()),
                WireMessage::Text { .. } => None,
            })
            .collect()
    }

    /// Text messages sent so far
    pub fn sent_texts(&self) -> Vec<String> {
        self.wire
            .lock()
            .iter()
            .filter_map(|m| match m {
                WireMessage::Text { text, .. } => Some(text.clone()),
                WireMessage::Binary { .. } => None,
            })
            .collect()
    }
}

impl Default for MockConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TransportConnector for MockConnector {
    async fn connect(
        &self,
        endpoint: &Endpoint,
        generation: u64,
    ) -> Result<Arc<dyn StreamTransport>, TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        let delay = *self.connect_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if let Some(error) = self.failures.lock().pop_front() {
            debug!("Mock connect to {} failed (scripted)", endpoint);
            return Err(error);
        }

        if !self.reachable.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectFailed {
                endpoint: endpoint.to_string(),
                details: "network unreachable".to_string(),
            });
        }

        let transport = Arc::new(MockTransport::new(generation, Arc::clone(&self.wire)));
        self.transports.lock().push(Arc::clone(&transport));
        Ok(transport)
    }
}

/// In-memory transport recording what is sent
pub struct MockTransport {
    generation: u64,
    connected: AtomicBool,
    fail_sends: AtomicBool,
    fail_pings: AtomicBool,
    pings: AtomicU32,
    closes: AtomicU32,
    lost: CancellationToken,
    wire: Arc<Mutex<Vec<WireMessage>>>,
}

impl MockTransport {
    fn new(generation: u64, wire: Arc<Mutex<Vec<WireMessage>>>) -> Self {
        Self {
            generation,
            connected: AtomicBool::new(true),
            fail_sends: AtomicBool::new(false),
            fail_pings: AtomicBool::new(false),
            pings: AtomicU32::new(0),
            closes: AtomicU32::new(0),
            lost: CancellationToken::new(),
            wire,
        }
    }

    /// Simulate the remote side vanishing: the receive loop fails
    pub fn sever(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.lost.cancel();
    }

    /// Make subsequent sends fail
    pub fn set_fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent pings fail
    pub fn set_fail_pings(&self, fail: bool) {
        self.fail_pings.store(fail, Ordering::SeqCst);
    }

    pub fn ping_count(&self) -> u32 {
        self.pings.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> u32 {
        self.closes.load(Ordering::SeqCst)
    }

    fn check_send(&self) -> Result<(), TransportError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        if self.fail_sends.load(Ordering::SeqCst) {
            self.connected.store(false, Ordering::SeqCst);
            return Err(TransportError::SendFailed {
                details: "scripted send failure".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl StreamTransport for MockTransport {
    fn generation(&self) -> u64 {
        self.generation
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn send_binary(&self, payload: Bytes) -> Result<(), TransportError> {
        self.check_send()?;
        self.wire.lock().push(WireMessage::Binary {
            generation: self.generation,
            data: payload,
        });
        Ok(())
    }

    async fn send_text(&self, text: &str) -> Result<(), TransportError> {
        self.check_send()?;
        self.wire.lock().push(WireMessage::Text {
            generation: self.generation,
            text: text.to_string(),
        });
        Ok(())
    }

    async fn ping(&self) -> Result<(), TransportError> {
        self.pings.fetch_add(1, Ordering::SeqCst);
        if !self.connected.load(Ordering::SeqCst) || self.fail_pings.load(Ordering::SeqCst) {
            self.connected.store(false, Ordering::SeqCst);
            return Err(TransportError::PingFailed {
                details: "scripted ping failure".to_string(),
            });
        }
        Ok(())
    }

    async fn receive(&self) -> Result<InboundMessage, TransportError> {
        self.lost.cancelled().await;
        Err(TransportError::ReceiveFailed {
            details: "connection lost".to_string(),
        })
    }

    async fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);
        self.lost.cancel();
    }
}
