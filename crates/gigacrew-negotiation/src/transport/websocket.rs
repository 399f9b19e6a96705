//! WebSocket transport for a seller's communication channel.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::debug;

use super::{NegotiationTransport, TransportError, TransportEvent};

pub struct WebSocketTransport {
	stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl WebSocketTransport {
	/// Connects to a `ws://` or `wss://` endpoint.
	pub async fn connect(url: &str) -> Result<Self, TransportError> {
		if !(url.starts_with("ws://") || url.starts_with("wss://")) {
			return Err(TransportError::Connection(format!(
				"Invalid channel URL: {}",
				url
			)));
		}
		let (stream, _) = connect_async(url)
			.await
			.map_err(|e| TransportError::Connection(e.to_string()))?;
		debug!(url, "Negotiation channel connected");
		Ok(Self { stream })
	}
}

#[async_trait]
impl NegotiationTransport for WebSocketTransport {
	async fn send(&mut self, text: String) -> Result<(), TransportError> {
		self.stream
			.send(Message::Text(text))
			.await
			.map_err(|e| TransportError::Connection(e.to_string()))
	}

	async fn next_event(&mut self) -> TransportEvent {
		loop {
			match self.stream.next().await {
				Some(Ok(Message::Text(text))) => return TransportEvent::Message(text),
				Some(Ok(Message::Close(_))) | None => return TransportEvent::Closed,
				// ping, pong and binary frames are not part of the protocol
				Some(Ok(_)) => continue,
				Some(Err(e)) => return TransportEvent::Error(e.to_string()),
			}
		}
	}

	async fn close(&mut self) {
		let _ = self.stream.close(None).await;
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use tokio::net::TcpListener;

	#[tokio::test]
	async fn test_rejects_non_websocket_url() {
		assert!(matches!(
			WebSocketTransport::connect("http://localhost:1").await,
			Err(TransportError::Connection(_))
		));
	}

	#[tokio::test]
	async fn test_loopback_exchange_and_close() {
		let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
		let addr = listener.local_addr().unwrap();

		let server = tokio::spawn(async move {
			let (socket, _) = listener.accept().await.unwrap();
			let mut ws = tokio_tungstenite::accept_async(socket).await.unwrap();
			ws.send(Message::Ping(vec![1])).await.unwrap();
			let received = match ws.next().await {
				Some(Ok(Message::Text(text))) => text,
				other => panic!("unexpected frame: {:?}", other),
			};
			ws.send(Message::Text(format!("echo: {}", received)))
				.await
				.unwrap();
			ws.close(None).await.unwrap();
		});

		let mut transport = WebSocketTransport::connect(&format!("ws://{}", addr))
			.await
			.unwrap();
		transport.send("hello".to_string()).await.unwrap();
		assert!(matches!(
			transport.next_event().await,
			TransportEvent::Message(text) if text == "echo: hello"
		));
		assert!(matches!(transport.next_event().await, TransportEvent::Closed));
		server.await.unwrap();
	}
}
