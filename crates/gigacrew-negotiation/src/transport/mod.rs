//! Negotiation channel abstraction.
//!
//! The protocol only needs to send text, receive text and learn when the
//! channel closed or failed. Any duplex message channel fits.

use async_trait::async_trait;
use thiserror::Error;

pub mod channel;
pub mod websocket;

pub use channel::ChannelTransport;
pub use websocket::WebSocketTransport;

#[derive(Debug, Error)]
pub enum TransportError {
	#[error("Connection error: {0}")]
	Connection(String),
	#[error("Channel closed")]
	Closed,
}

/// What the peer side of the channel produced next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
	Message(String),
	Closed,
	Error(String),
}

#[async_trait]
pub trait NegotiationTransport: Send {
	async fn send(&mut self, text: String) -> Result<(), TransportError>;

	/// Waits for the next inbound message, close or failure.
	async fn next_event(&mut self) -> TransportEvent;

	async fn close(&mut self);
}
