//! Frame transports between the connection actor and the engine.
//!
//! A transport is split into a sending half ([`Transport`]) driven by the actor's
//! writer task and a receiving half ([`TransportReceiver`]) whose `run` loop pushes
//! every inbound text frame into an unbounded channel. When that loop ends, for any
//! reason, the channel closes and the actor treats the connection as terminated.
//!
//! - [`PipeTransport`]: 4-byte little-endian length prefix + UTF-8 JSON, over any
//!   `AsyncRead`/`AsyncWrite` pair (driver stdio, TCP or Unix socket halves).
//! - [`WebSocketTransport`]: one text message per frame.

use std::future::Future;
use std::pin::Pin;

use tokio::sync::mpsc;

use crate::error::Result;

mod pipe;
mod websocket;

pub use pipe::{MAX_FRAME_SIZE, PipeTransport, PipeTransportReceiver, PipeTransportSender};
pub use websocket::{WebSocketTransport, WebSocketTransportReceiver, WebSocketTransportSender};

/// Boxed future returned by transport halves.
pub type TransportFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

/// Sending half of a transport.
pub trait Transport: Send {
	/// Writes one frame.
	fn send(&mut self, frame: String) -> TransportFuture<'_>;
}

/// Receiving half of a transport.
pub trait TransportReceiver: Send {
	/// Reads frames until the stream ends or fails.
	fn run(self: Box<Self>) -> TransportFuture<'static>;
}

/// Everything a connection needs from a transport.
pub struct TransportParts {
	pub sender: Box<dyn Transport>,
	pub receiver: Box<dyn TransportReceiver>,
	pub message_rx: mpsc::UnboundedReceiver<String>,
}
