use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

use super::{Transport, TransportFuture, TransportParts, TransportReceiver};
use crate::error::{Error, Result};

/// Largest inbound frame the reader accepts. Longer length prefixes end the stream.
pub const MAX_FRAME_SIZE: usize = 256 * 1024 * 1024;

/// Length-prefixed frame transport over a byte stream pair.
///
/// Frame format: `len(data).to_le_bytes()` (u32) followed by `data`.
pub struct PipeTransport<W, R> {
	stdin: W,
	stdout: R,
	message_tx: mpsc::UnboundedSender<String>,
}

impl<W, R> PipeTransport<W, R>
where
	W: AsyncWrite + Unpin + Send + 'static,
	R: AsyncRead + Unpin + Send + 'static,
{
	/// Creates a transport writing to `stdin` and reading from `stdout`.
	///
	/// Returns the transport and the receiver its read loop feeds.
	pub fn new(stdin: W, stdout: R) -> (Self, mpsc::UnboundedReceiver<String>) {
		let (message_tx, message_rx) = mpsc::unbounded_channel();
		(
			Self {
				stdin,
				stdout,
				message_tx,
			},
			message_rx,
		)
	}

	/// Writes one frame.
	pub async fn send(&mut self, frame: String) -> Result<()> {
		write_frame(&mut self.stdin, frame.as_bytes()).await
	}

	/// Reads frames until EOF, a read error, or the receiver is dropped.
	pub async fn run(&mut self) -> Result<()> {
		read_frames(&mut self.stdout, &self.message_tx).await
	}

	/// Splits into independently owned halves.
	pub fn into_parts(self) -> (PipeTransportSender<W>, PipeTransportReceiver<R>) {
		(
			PipeTransportSender { stdin: self.stdin },
			PipeTransportReceiver {
				stdout: self.stdout,
				message_tx: self.message_tx,
			},
		)
	}

	/// Packages both halves with the frame receiver returned by [`PipeTransport::new`].
	pub fn into_transport_parts(self, message_rx: mpsc::UnboundedReceiver<String>) -> TransportParts {
		let (sender, receiver) = self.into_parts();
		TransportParts {
			sender: Box::new(sender),
			receiver: Box::new(receiver),
			message_rx,
		}
	}
}

/// Writing half of a [`PipeTransport`].
pub struct PipeTransportSender<W> {
	stdin: W,
}

impl<W: AsyncWrite + Unpin + Send> PipeTransportSender<W> {
	pub async fn send(&mut self, frame: String) -> Result<()> {
		write_frame(&mut self.stdin, frame.as_bytes()).await
	}
}

impl<W: AsyncWrite + Unpin + Send> Transport for PipeTransportSender<W> {
	fn send(&mut self, frame: String) -> TransportFuture<'_> {
		Box::pin(async move { write_frame(&mut self.stdin, frame.as_bytes()).await })
	}
}

/// Reading half of a [`PipeTransport`].
pub struct PipeTransportReceiver<R> {
	stdout: R,
	message_tx: mpsc::UnboundedSender<String>,
}

impl<R: AsyncRead + Unpin + Send + 'static> TransportReceiver for PipeTransportReceiver<R> {
	fn run(self: Box<Self>) -> TransportFuture<'static> {
		let mut this = *self;
		Box::pin(async move { read_frames(&mut this.stdout, &this.message_tx).await })
	}
}

async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, data: &[u8]) -> Result<()> {
	let length = u32::try_from(data.len())
		.map_err(|_| Error::TransportError(format!("Frame too large: {} bytes", data.len())))?;

	writer
		.write_all(&length.to_le_bytes())
		.await
		.map_err(|e| Error::TransportError(format!("Failed to write length prefix: {e}")))?;
	writer
		.write_all(data)
		.await
		.map_err(|e| Error::TransportError(format!("Failed to write frame: {e}")))?;
	writer
		.flush()
		.await
		.map_err(|e| Error::TransportError(format!("Failed to flush frame: {e}")))?;

	tracing::trace!(len = length, "frame written");
	Ok(())
}

async fn read_frames<R: AsyncRead + Unpin>(reader: &mut R, message_tx: &mpsc::UnboundedSender<String>) -> Result<()> {
	let mut len_buf = [0u8; 4];
	loop {
		reader
			.read_exact(&mut len_buf)
			.await
			.map_err(|e| Error::TransportError(format!("Failed to read length prefix: {e}")))?;
		let length = u32::from_le_bytes(len_buf) as usize;
		if length > MAX_FRAME_SIZE {
			return Err(Error::TransportError(format!(
				"Frame of {length} bytes exceeds limit of {MAX_FRAME_SIZE} bytes"
			)));
		}

		let mut data = vec![0u8; length];
		reader
			.read_exact(&mut data)
			.await
			.map_err(|e| Error::TransportError(format!("Failed to read frame body ({length} bytes): {e}")))?;

		let frame = match String::from_utf8(data) {
			Ok(frame) => frame,
			Err(e) => {
				tracing::warn!(len = length, error = %e, "dropping non UTF-8 frame");
				continue;
			}
		};

		if message_tx.send(frame).is_err() {
			tracing::debug!("frame receiver dropped, stopping pipe reader");
			return Ok(());
		}
	}
}
