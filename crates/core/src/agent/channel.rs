//! Typed client channel over a transport.

use dyad_protocol::{ClientMessage, ServerMessage, server_from_value};
use dyad_runtime::{Transport, TransportParts, WebSocketTransport};
use serde_json::Value as JsonValue;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::Result;

/// Owned, ordered, bidirectional channel to the broker.
///
/// Drives the transport's receiver on a background task and decodes inbound
/// frames into [`ServerMessage`]s.
pub struct ClientChannel {
	sender: Box<dyn Transport>,
	inbound: mpsc::UnboundedReceiver<JsonValue>,
	receiver_task: JoinHandle<()>,
}

impl ClientChannel {
	pub fn new(parts: TransportParts) -> Self {
		let TransportParts {
			sender,
			receiver,
			message_rx,
		} = parts;

		let receiver_task = tokio::spawn(async move {
			if let Err(err) = receiver.run().await {
				debug!(target = "dyad.agent", error = %err, "transport receiver stopped");
			}
		});

		Self {
			sender,
			inbound: message_rx,
			receiver_task,
		}
	}

	/// Opens a WebSocket channel to `url`.
	pub async fn connect(url: &str) -> Result<Self> {
		let (transport, message_rx) = WebSocketTransport::connect(url).await?;
		Ok(Self::new(transport.into_transport_parts(message_rx)))
	}

	pub async fn send(&mut self, message: &ClientMessage) -> Result<()> {
		let value = serde_json::to_value(message).map_err(dyad_runtime::Error::from)?;
		self.sender.send(value).await?;
		Ok(())
	}

	/// Next decodable broker message, or `None` once the channel has closed.
	///
	/// Frames that do not decode are logged and skipped. Cancel safe.
	pub async fn recv(&mut self) -> Option<ServerMessage> {
		loop {
			let value = self.inbound.recv().await?;
			match server_from_value(value) {
				Ok(message) => return Some(message),
				Err(err) => warn!(target = "dyad.agent", error = %err, "dropping undecodable broker frame"),
			}
		}
	}

	pub async fn close(&mut self) {
		if let Err(err) = self.sender.close().await {
			debug!(target = "dyad.agent", error = %err, "error closing channel");
		}
		self.inbound.close();
	}
}

impl Drop for ClientChannel {
	fn drop(&mut self) {
		self.receiver_task.abort();
	}
}

#[cfg(test)]
mod tests {
	use dyad_runtime::FakeTransportBuilder;
	use serde_json::json;

	use super::*;

	#[tokio::test]
	async fn skips_unknown_and_malformed_frames() {
		let (parts, controller) = FakeTransportBuilder::new().build();
		let mut channel = ClientChannel::new(parts);

		controller.inject(json!({"type": "TELEPORT"}));
		controller.inject(json!({"type": "RUN_MATCHER", "label": 3}));
		controller.inject(json!({"type": "WAIT_FOR_PARTNER"}));
		controller.disconnect();

		assert_eq!(channel.recv().await, Some(ServerMessage::WaitForPartner));
		assert_eq!(channel.recv().await, None);
	}

	#[tokio::test]
	async fn send_encodes_typed_messages() {
		let (parts, controller) = FakeTransportBuilder::new().build();
		let mut channel = ClientChannel::new(parts);
		channel.send(&ClientMessage::InstructionsDone).await.unwrap();
		assert_eq!(controller.take_sent(), vec![json!({"type": "INSTRUCTIONS_DONE"})]);

		channel.close().await;
		assert!(controller.is_closed());
		assert!(channel.send(&ClientMessage::FeedbackDone).await.is_err());
	}
}
