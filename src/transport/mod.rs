mod endpoint;
mod mock;
mod websocket;
#[cfg(test)]
mod tests;

pub use endpoint::Endpoint;
pub use mock::{MockConnector, MockTransport, WireMessage};
pub use websocket::{WebSocketConnector, WebSocketTransport};

use crate::error::TransportError;
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use tracing::{debug, trace};

/// Message read from the consumer side of a connection
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    Binary(Bytes),
    Text(String),
    /// Ping, pong or raw frame handled by the protocol layer
    Control,
}

/// One logical connection to a remote consumer.
///
/// Connected from a successful connect until the first failed operation or `close`; an
/// instance never becomes connected again, so reconnecting means a new instance.
#[async_trait]
pub trait StreamTransport: Send + Sync {
    /// Identifier assigned by the connector, unique per connection attempt
    fn generation(&self) -> u64;

    fn is_connected(&self) -> bool;

    async fn send_binary(&self, payload: Bytes) -> Result<(), TransportError>;

    async fn send_text(&self, text: &str) -> Result<(), TransportError>;

    /// Liveness check; a failure means the connection is lost
    async fn ping(&self) -> Result<(), TransportError>;

    /// Read the next inbound message
    async fn receive(&self) -> Result<InboundMessage, TransportError>;

    /// Read until the connection fails and return the failure
    async fn receive_loop(&self) -> TransportError {
        loop {
            match self.receive().await {
                Ok(InboundMessage::Text(text)) => {
                    debug!("Generation {} received text: {}", self.generation(), text);
                }
                Ok(InboundMessage::Binary(data)) => {
                    debug!(
                        "Generation {} received {} binary bytes",
                        self.generation(),
                        data.len()
                    );
                }
                Ok(InboundMessage::Control) => {
                    trace!("Generation {} received control frame", self.generation());
                }
                Err(e) => return e,
            }
        }
    }

    /// Graceful shutdown; safe to call more than once
    async fn close(&self);
}

/// Opens transports to an endpoint
#[async_trait]
pub trait TransportConnector: Send + Sync {
    async fn connect(
        &self,
        endpoint: &Endpoint,
        generation: u64,
    ) -> Result<Arc<dyn StreamTransport>, TransportError>;
}
