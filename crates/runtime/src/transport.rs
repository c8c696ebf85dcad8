//! Transport layer for BiDi connections.
//!
//! A transport moves whole text frames in both directions. It is split into a
//! sending half ([`Transport`]) owned by the connection's writer task and a
//! receiving half ([`TransportReceiver`]) whose run loop parses each inbound frame
//! as JSON and forwards it to an unbounded channel. Frames that are not valid
//! JSON are dropped with a warning and never reach the router.
//!
//! Two implementations are provided:
//!
//! - [`PipeTransport`]: any `AsyncWrite`/`AsyncRead` pair, each frame terminated
//!   by a single NUL byte (the remote-debugging pipe convention)
//! - [`WebSocketTransport`]: text frames over `tokio-tungstenite`

use std::future::Future;
use std::pin::Pin;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Frame terminator used by [`PipeTransport`].
pub const FRAME_DELIMITER: u8 = 0;

/// Boxed future returned by transport operations.
pub type TransportFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

/// Sending half of a transport.
pub trait Transport: Send {
	/// Writes one complete text frame.
	fn send(&mut self, frame: String) -> TransportFuture<'_>;

	/// Closes the outbound direction. The remote end observes EOF or a Close frame.
	fn close(&mut self) -> TransportFuture<'_>;
}

/// Receiving half of a transport.
pub trait TransportReceiver: Send {
	/// Reads frames until the remote end closes or the message channel is dropped.
	///
	/// A clean end of stream returns `Ok(())`.
	fn run(self: Box<Self>) -> TransportFuture<'static>;
}

/// Both halves of a transport plus the channel its receiver feeds.
pub struct TransportParts {
	pub sender: Box<dyn Transport>,
	pub receiver: Box<dyn TransportReceiver>,
	pub message_rx: mpsc::UnboundedReceiver<Value>,
}

impl std::fmt::Debug for TransportParts {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("TransportParts").finish_non_exhaustive()
	}
}

/// Parses one inbound frame and forwards it.
///
/// Returns `false` when the message channel is closed and reading should stop.
fn forward_frame(message_tx: &mpsc::UnboundedSender<Value>, text: &str) -> bool {
	match serde_json::from_str::<Value>(text) {
		Ok(value) => message_tx.send(value).is_ok(),
		Err(e) => {
			warn!(error = %e, len = text.len(), "Dropping malformed frame");
			true
		}
	}
}

/// Transport over a byte pipe with NUL-terminated frames.
pub struct PipeTransport<W, R> {
	writer: W,
	reader: R,
	message_tx: mpsc::UnboundedSender<Value>,
}

impl<W, R> PipeTransport<W, R>
where
	W: AsyncWrite + Unpin + Send + 'static,
	R: AsyncRead + Unpin + Send + 'static,
{
	/// Creates a transport writing to `writer` and reading from `reader`.
	///
	/// Returns the transport and the receiving end of its message channel.
	pub fn new(writer: W, reader: R) -> (Self, mpsc::UnboundedReceiver<Value>) {
		let (message_tx, message_rx) = mpsc::unbounded_channel();
		(
			Self {
				writer,
				reader,
				message_tx,
			},
			message_rx,
		)
	}

	/// Splits into independently owned sending and receiving halves.
	pub fn into_parts(self) -> (PipeTransportSender<W>, PipeTransportReceiver<R>) {
		(
			PipeTransportSender {
				writer: self.writer,
			},
			PipeTransportReceiver {
				reader: self.reader,
				message_tx: self.message_tx,
			},
		)
	}

	/// Splits into boxed halves ready for [`Connection::new`](crate::Connection::new).
	pub fn into_transport_parts(self, message_rx: mpsc::UnboundedReceiver<Value>) -> TransportParts {
		let (sender, receiver) = self.into_parts();
		TransportParts {
			sender: Box::new(sender),
			receiver: Box::new(receiver),
			message_rx,
		}
	}

	/// Writes one frame without splitting the transport.
	pub async fn send(&mut self, frame: &str) -> Result<()> {
		write_frame(&mut self.writer, frame).await
	}

	/// Runs the read loop in place.
	pub async fn run(&mut self) -> Result<()> {
		read_frames(&mut self.reader, &self.message_tx).await
	}
}

async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, frame: &str) -> Result<()> {
	if frame.as_bytes().contains(&FRAME_DELIMITER) {
		return Err(Error::TransportError(
			"frame contains a NUL byte and cannot be delimited".to_string(),
		));
	}
	writer.write_all(frame.as_bytes()).await?;
	writer.write_all(&[FRAME_DELIMITER]).await?;
	writer.flush().await?;
	Ok(())
}

async fn read_frames<R: AsyncRead + Unpin>(
	reader: R,
	message_tx: &mpsc::UnboundedSender<Value>,
) -> Result<()> {
	let mut reader = BufReader::new(reader);
	let mut buf = Vec::new();
	loop {
		buf.clear();
		let read = reader.read_until(FRAME_DELIMITER, &mut buf).await?;
		if read == 0 {
			debug!("Pipe closed by remote end");
			return Ok(());
		}
		if buf.last() != Some(&FRAME_DELIMITER) {
			return Err(Error::TransportError(format!(
				"Unexpected EOF inside a frame ({} bytes buffered)",
				buf.len()
			)));
		}
		buf.pop();
		if buf.is_empty() {
			continue;
		}
		match std::str::from_utf8(&buf) {
			Ok(text) => {
				if !forward_frame(message_tx, text) {
					debug!("Message channel closed, stopping pipe reader");
					return Ok(());
				}
			}
			Err(e) => warn!(error = %e, "Dropping frame with invalid UTF-8"),
		}
	}
}

/// Sending half of [`PipeTransport`].
pub struct PipeTransportSender<W> {
	writer: W,
}

impl<W> Transport for PipeTransportSender<W>
where
	W: AsyncWrite + Unpin + Send,
{
	fn send(&mut self, frame: String) -> TransportFuture<'_> {
		Box::pin(async move { write_frame(&mut self.writer, &frame).await })
	}

	fn close(&mut self) -> TransportFuture<'_> {
		Box::pin(async move {
			self.writer.shutdown().await?;
			Ok(())
		})
	}
}

/// Receiving half of [`PipeTransport`].
pub struct PipeTransportReceiver<R> {
	reader: R,
	message_tx: mpsc::UnboundedSender<Value>,
}

impl<R> TransportReceiver for PipeTransportReceiver<R>
where
	R: AsyncRead + Unpin + Send + 'static,
{
	fn run(self: Box<Self>) -> TransportFuture<'static> {
		let PipeTransportReceiver { reader, message_tx } = *self;
		Box::pin(async move { read_frames(reader, &message_tx).await })
	}
}

/// Transport over a WebSocket connection.
pub struct WebSocketTransport<S> {
	stream: WebSocketStream<S>,
	message_tx: mpsc::UnboundedSender<Value>,
}

impl WebSocketTransport<MaybeTlsStream<TcpStream>> {
	/// Connects to a `ws://` or `wss://` endpoint.
	pub async fn connect(url: &str) -> Result<(Self, mpsc::UnboundedReceiver<Value>)> {
		debug!(url, "Connecting WebSocket transport");
		let (stream, response) = connect_async(url)
			.await
			.map_err(|e| Error::ConnectionFailed(format!("{url}: {e}")))?;
		debug!(status = %response.status(), "WebSocket handshake complete");
		Ok(Self::from_stream(stream))
	}
}

impl<S> WebSocketTransport<S>
where
	S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
	/// Wraps an already-established WebSocket stream.
	pub fn from_stream(stream: WebSocketStream<S>) -> (Self, mpsc::UnboundedReceiver<Value>) {
		let (message_tx, message_rx) = mpsc::unbounded_channel();
		(Self { stream, message_tx }, message_rx)
	}

	pub fn into_parts(self) -> (WebSocketTransportSender<S>, WebSocketTransportReceiver<S>) {
		let (sink, stream) = self.stream.split();
		(
			WebSocketTransportSender { sink },
			WebSocketTransportReceiver {
				stream,
				message_tx: self.message_tx,
			},
		)
	}

	pub fn into_transport_parts(self, message_rx: mpsc::UnboundedReceiver<Value>) -> TransportParts {
		let (sender, receiver) = self.into_parts();
		TransportParts {
			sender: Box::new(sender),
			receiver: Box::new(receiver),
			message_rx,
		}
	}
}

/// Sending half of [`WebSocketTransport`].
pub struct WebSocketTransportSender<S> {
	sink: SplitSink<WebSocketStream<S>, WsMessage>,
}

impl<S> Transport for WebSocketTransportSender<S>
where
	S: AsyncRead + AsyncWrite + Unpin + Send,
{
	fn send(&mut self, frame: String) -> TransportFuture<'_> {
		Box::pin(async move {
			self.sink
				.send(WsMessage::Text(frame))
				.await
				.map_err(|e| Error::TransportError(e.to_string()))
		})
	}

	fn close(&mut self) -> TransportFuture<'_> {
		Box::pin(async move {
			self.sink
				.close()
				.await
				.map_err(|e| Error::TransportError(e.to_string()))
		})
	}
}

/// Receiving half of [`WebSocketTransport`].
pub struct WebSocketTransportReceiver<S> {
	stream: SplitStream<WebSocketStream<S>>,
	message_tx: mpsc::UnboundedSender<Value>,
}

impl<S> TransportReceiver for WebSocketTransportReceiver<S>
where
	S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
	fn run(self: Box<Self>) -> TransportFuture<'static> {
		let WebSocketTransportReceiver {
			mut stream,
			message_tx,
		} = *self;
		Box::pin(async move {
			use tokio_tungstenite::tungstenite::Error as WsError;

			while let Some(message) = stream.next().await {
				match message {
					Ok(WsMessage::Text(text)) => {
						if !forward_frame(&message_tx, &text) {
							break;
						}
					}
					Ok(WsMessage::Binary(data)) => {
						warn!(len = data.len(), "Dropping binary WebSocket frame");
					}
					Ok(WsMessage::Close(frame)) => {
						debug!(?frame, "WebSocket closed by remote end");
						break;
					}
					Ok(_) => {}
					Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => break,
					Err(e) => return Err(Error::TransportError(e.to_string())),
				}
			}
			Ok(())
		})
	}
}
