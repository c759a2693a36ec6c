use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use super::{Transport, TransportFuture, TransportParts, TransportReceiver};
use crate::error::{Error, Result};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Transport over a WebSocket, one text message per frame.
pub struct WebSocketTransport {
	stream: WsStream,
	message_tx: mpsc::UnboundedSender<String>,
}

impl WebSocketTransport {
	/// Connects to a `ws://` or `wss://` endpoint exposed by the engine.
	pub async fn connect(url: &str) -> Result<(Self, mpsc::UnboundedReceiver<String>)> {
		let (stream, response) = tokio_tungstenite::connect_async(url)
			.await
			.map_err(|e| Error::TransportError(format!("WebSocket connect to {url} failed: {e}")))?;
		tracing::debug!(url, status = %response.status(), "websocket connected");

		let (message_tx, message_rx) = mpsc::unbounded_channel();
		Ok((Self { stream, message_tx }, message_rx))
	}

	pub fn into_parts(self) -> (WebSocketTransportSender, WebSocketTransportReceiver) {
		let (sink, stream) = self.stream.split();
		(
			WebSocketTransportSender { sink },
			WebSocketTransportReceiver {
				stream,
				message_tx: self.message_tx,
			},
		)
	}

	pub fn into_transport_parts(self, message_rx: mpsc::UnboundedReceiver<String>) -> TransportParts {
		let (sender, receiver) = self.into_parts();
		TransportParts {
			sender: Box::new(sender),
			receiver: Box::new(receiver),
			message_rx,
		}
	}
}

/// Writing half of a [`WebSocketTransport`].
pub struct WebSocketTransportSender {
	sink: SplitSink<WsStream, WsMessage>,
}

impl Transport for WebSocketTransportSender {
	fn send(&mut self, frame: String) -> TransportFuture<'_> {
		Box::pin(async move {
			self.sink
				.send(WsMessage::Text(frame))
				.await
				.map_err(|e| Error::TransportError(format!("WebSocket send failed: {e}")))
		})
	}
}

/// Reading half of a [`WebSocketTransport`].
pub struct WebSocketTransportReceiver {
	stream: SplitStream<WsStream>,
	message_tx: mpsc::UnboundedSender<String>,
}

impl TransportReceiver for WebSocketTransportReceiver {
	fn run(self: Box<Self>) -> TransportFuture<'static> {
		let Self {
			mut stream,
			message_tx,
		} = *self;

		Box::pin(async move {
			while let Some(message) = stream.next().await {
				let frame = match message {
					Ok(WsMessage::Text(text)) => text,
					Ok(WsMessage::Binary(bytes)) => match String::from_utf8(bytes) {
						Ok(text) => text,
						Err(e) => {
							tracing::warn!(error = %e, "dropping non UTF-8 binary frame");
							continue;
						}
					},
					Ok(WsMessage::Close(close)) => {
						tracing::debug!(?close, "websocket closed by peer");
						return Ok(());
					}
					Ok(_) => continue,
					Err(e) => return Err(Error::TransportError(format!("WebSocket read failed: {e}"))),
				};

				if message_tx.send(frame).is_err() {
					tracing::debug!("frame receiver dropped, stopping websocket reader");
					return Ok(());
				}
			}
			Ok(())
		})
	}
}
