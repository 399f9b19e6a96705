//! In-process transport backed by a pair of unbounded channels.

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{NegotiationTransport, TransportError, TransportEvent};

pub struct ChannelTransport {
	outbound: Option<mpsc::UnboundedSender<String>>,
	inbound: mpsc::UnboundedReceiver<String>,
}

impl ChannelTransport {
	/// Two connected ends of one channel.
	pub fn pair() -> (Self, Self) {
		let (a_tx, a_rx) = mpsc::unbounded_channel();
		let (b_tx, b_rx) = mpsc::unbounded_channel();
		(
			Self {
				outbound: Some(a_tx),
				inbound: b_rx,
			},
			Self {
				outbound: Some(b_tx),
				inbound: a_rx,
			},
		)
	}
}

#[async_trait]
impl NegotiationTransport for ChannelTransport {
	async fn send(&mut self, text: String) -> Result<(), TransportError> {
		let outbound = self.outbound.as_ref().ok_or(TransportError::Closed)?;
		outbound.send(text).map_err(|_| TransportError::Closed)
	}

	async fn next_event(&mut self) -> TransportEvent {
		match self.inbound.recv().await {
			Some(text) => TransportEvent::Message(text),
			None => TransportEvent::Closed,
		}
	}

	async fn close(&mut self) {
		self.outbound.take();
		self.inbound.close();
	}
}
