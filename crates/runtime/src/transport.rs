//! Transport traits and the WebSocket client transport.

use std::future::Future;
use std::pin::Pin;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value as JsonValue;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Sending half of a transport.
pub trait Transport: Send {
	/// Sends one JSON frame to the peer.
	fn send(&mut self, message: JsonValue) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

	/// Closes the sending half; later sends fail.
	fn close(&mut self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
		Box::pin(async { Ok(()) })
	}
}

/// Receiving half of a transport.
///
/// `run` reads frames until the peer closes or an error occurs, forwarding
/// each frame to the paired `message_rx` in arrival order.
pub trait TransportReceiver: Send {
	fn run(self: Box<Self>) -> Pin<Box<dyn Future<Output = Result<()>> + Send>>;
}

/// A transport split into independently owned halves.
pub struct TransportParts {
	pub sender: Box<dyn Transport>,
	pub receiver: Box<dyn TransportReceiver>,
	pub message_rx: mpsc::UnboundedReceiver<JsonValue>,
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket client transport (`ws://` or `wss://`).
pub struct WebSocketTransport {
	stream: WsStream,
	message_tx: mpsc::UnboundedSender<JsonValue>,
}

impl WebSocketTransport {
	/// Connects to a broker endpoint.
	///
	/// Returns the transport and the receiver that inbound frames will be
	/// delivered on once the receiver half is running.
	pub async fn connect(endpoint: &str) -> Result<(Self, mpsc::UnboundedReceiver<JsonValue>)> {
		validate_endpoint(endpoint)?;

		let (stream, response) = tokio_tungstenite::connect_async(endpoint).await?;
		debug!(target = "dyad.transport", %endpoint, status = %response.status(), "websocket connected");

		let (message_tx, message_rx) = mpsc::unbounded_channel();
		Ok((Self { stream, message_tx }, message_rx))
	}

	/// Splits the transport into sender and receiver halves.
	pub fn into_transport_parts(self, message_rx: mpsc::UnboundedReceiver<JsonValue>) -> TransportParts {
		let (sink, stream) = self.stream.split();

		TransportParts {
			sender: Box::new(WebSocketSender { sink }),
			receiver: Box::new(WebSocketReceiver {
				stream,
				message_tx: self.message_tx,
			}),
			message_rx,
		}
	}
}

fn validate_endpoint(endpoint: &str) -> Result<()> {
	let Some((scheme, rest)) = endpoint.split_once("://") else {
		return Err(Error::InvalidEndpoint {
			endpoint: endpoint.to_string(),
			reason: "missing scheme".to_string(),
		});
	};

	if scheme != "ws" && scheme != "wss" {
		return Err(Error::InvalidEndpoint {
			endpoint: endpoint.to_string(),
			reason: format!("unsupported scheme `{scheme}` (expected ws or wss)"),
		});
	}

	if rest.is_empty() {
		return Err(Error::InvalidEndpoint {
			endpoint: endpoint.to_string(),
			reason: "missing host".to_string(),
		});
	}

	Ok(())
}

struct WebSocketSender {
	sink: SplitSink<WsStream, Message>,
}

impl Transport for WebSocketSender {
	fn send(&mut self, message: JsonValue) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
		Box::pin(async move {
			let text = serde_json::to_string(&message)?;
			self.sink.send(Message::Text(text)).await?;
			Ok(())
		})
	}

	fn close(&mut self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
		Box::pin(async move {
			match self.sink.close().await {
				Ok(()) => Ok(()),
				Err(err) => {
					let err = Error::from(err);
					if err.is_closed() { Ok(()) } else { Err(err) }
				}
			}
		})
	}
}

struct WebSocketReceiver {
	stream: SplitStream<WsStream>,
	message_tx: mpsc::UnboundedSender<JsonValue>,
}

impl TransportReceiver for WebSocketReceiver {
	fn run(mut self: Box<Self>) -> Pin<Box<dyn Future<Output = Result<()>> + Send>> {
		Box::pin(async move {
			while let Some(frame) = self.stream.next().await {
				let parsed = match frame? {
					Message::Text(text) => serde_json::from_str::<JsonValue>(&text),
					Message::Binary(bytes) => serde_json::from_slice::<JsonValue>(&bytes),
					Message::Close(frame) => {
						debug!(target = "dyad.transport", ?frame, "peer closed websocket");
						break;
					}
					_ => continue,
				};

				match parsed {
					Ok(value) => {
						if self.message_tx.send(value).is_err() {
							break;
						}
					}
					Err(err) => warn!(target = "dyad.transport", error = %err, "dropping non-JSON frame"),
				}
			}
			Ok(())
		})
	}
}
