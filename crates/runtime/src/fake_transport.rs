//! Fake transport for unit testing clients without a network.
//!
//! Provides an in-memory transport: tests inject broker frames through the
//! controller and inspect what the client sent.
//!
//! # Example
//!
//! ```ignore
//! let (parts, controller) = FakeTransportBuilder::new().build();
//! let agent = SessionAgent::new(participant, ClientChannel::new(parts), renderer);
//! let run = tokio::spawn(agent.run());
//!
//! controller.wait_for_sent(1, Duration::from_secs(1)).await;
//! controller.inject(json!({"type": "ENTER_WAITING_ROOM"}));
//! controller.disconnect();
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value as JsonValue;
use tokio::sync::{Notify, mpsc};

use crate::Result;
use crate::error::Error;
use crate::transport::{Transport, TransportParts, TransportReceiver};

/// Builder for creating fake transport instances.
pub struct FakeTransportBuilder {
	// Nothing needed for now, but allows future extensibility
}

impl FakeTransportBuilder {
	/// Create a new fake transport builder.
	pub fn new() -> Self {
		Self {}
	}

	/// Build the fake transport and return both parts and a controller.
	pub fn build(self) -> (TransportParts, FakeTransportController) {
		let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
		let (message_tx, message_rx) = mpsc::unbounded_channel();
		let shared = Arc::new(SentLog::default());

		let sender = FakeTransportSender {
			log: Arc::clone(&shared),
		};

		let receiver = FakeTransportReceiver { inbound_rx, message_tx };

		let controller = FakeTransportController {
			inbound_tx: Mutex::new(Some(inbound_tx)),
			log: shared,
		};

		let parts = TransportParts {
			sender: Box::new(sender),
			receiver: Box::new(receiver),
			message_rx,
		};

		(parts, controller)
	}
}

impl Default for FakeTransportBuilder {
	fn default() -> Self {
		Self::new()
	}
}

#[derive(Default)]
struct SentLog {
	sent: Mutex<Vec<JsonValue>>,
	closed: Mutex<bool>,
	notify: Notify,
}

/// Controller for injecting inbound frames and inspecting sent ones.
pub struct FakeTransportController {
	inbound_tx: Mutex<Option<mpsc::UnboundedSender<JsonValue>>>,
	log: Arc<SentLog>,
}

impl FakeTransportController {
	/// Inject a raw JSON frame as if the peer had sent it.
	pub fn inject(&self, message: JsonValue) {
		if let Some(tx) = self.inbound_tx.lock().as_ref() {
			let _ = tx.send(message);
		}
	}

	/// Simulate the peer dropping the connection.
	///
	/// Frames injected before this call are still delivered first.
	pub fn disconnect(&self) {
		self.inbound_tx.lock().take();
	}

	/// Take all sent frames, clearing the buffer.
	pub fn take_sent(&self) -> Vec<JsonValue> {
		std::mem::take(&mut *self.log.sent.lock())
	}

	/// Snapshot of all frames sent so far.
	pub fn sent(&self) -> Vec<JsonValue> {
		self.log.sent.lock().clone()
	}

	/// Whether the client closed its sending half.
	pub fn is_closed(&self) -> bool {
		*self.log.closed.lock()
	}

	/// Wait until at least `count` frames have been sent, or `timeout` elapses.
	///
	/// Returns a snapshot of the sent frames either way.
	pub async fn wait_for_sent(&self, count: usize, timeout: Duration) -> Vec<JsonValue> {
		let deadline = tokio::time::Instant::now() + timeout;
		loop {
			let notified = self.log.notify.notified();
			{
				let sent = self.log.sent.lock();
				if sent.len() >= count {
					return sent.clone();
				}
			}
			if tokio::time::timeout_at(deadline, notified).await.is_err() {
				return self.sent();
			}
		}
	}
}

struct FakeTransportSender {
	log: Arc<SentLog>,
}

impl Transport for FakeTransportSender {
	fn send(&mut self, message: JsonValue) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
		let log = Arc::clone(&self.log);
		Box::pin(async move {
			if *log.closed.lock() {
				return Err(Error::ConnectionClosed);
			}
			log.sent.lock().push(message);
			log.notify.notify_waiters();
			Ok(())
		})
	}

	fn close(&mut self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
		let log = Arc::clone(&self.log);
		Box::pin(async move {
			*log.closed.lock() = true;
			log.notify.notify_waiters();
			Ok(())
		})
	}
}

struct FakeTransportReceiver {
	inbound_rx: mpsc::UnboundedReceiver<JsonValue>,
	message_tx: mpsc::UnboundedSender<JsonValue>,
}

impl TransportReceiver for FakeTransportReceiver {
	fn run(mut self: Box<Self>) -> Pin<Box<dyn Future<Output = Result<()>> + Send>> {
		Box::pin(async move {
			while let Some(message) = self.inbound_rx.recv().await {
				if self.message_tx.send(message).is_err() {
					break;
				}
			}
			Ok(())
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[tokio::test]
	async fn test_fake_transport_send_capture() {
		let (mut parts, controller) = FakeTransportBuilder::new().build();

		parts.sender.send(json!({"type": "REGISTER", "participant_id": "p1"})).await.unwrap();
		parts.sender.send(json!({"type": "INSTRUCTIONS_DONE"})).await.unwrap();

		let sent = controller.take_sent();
		assert_eq!(sent.len(), 2);
		assert_eq!(sent[0]["type"], "REGISTER");
		assert_eq!(sent[1]["type"], "INSTRUCTIONS_DONE");
		assert!(controller.take_sent().is_empty());
	}

	#[tokio::test]
	async fn test_fake_transport_preserves_inbound_order() {
		let (parts, controller) = FakeTransportBuilder::new().build();
		let mut rx = parts.message_rx;
		let recv_task = tokio::spawn(parts.receiver.run());

		for n in 0..5 {
			controller.inject(json!({"seq": n}));
		}
		controller.disconnect();

		for n in 0..5 {
			let frame = rx.recv().await.expect("frame should arrive");
			assert_eq!(frame["seq"], n);
		}
		assert!(rx.recv().await.is_none(), "channel should close after disconnect");
		recv_task.await.unwrap().unwrap();
	}

	#[tokio::test]
	async fn test_fake_transport_rejects_send_after_close() {
		let (mut parts, controller) = FakeTransportBuilder::new().build();
		parts.sender.close().await.unwrap();

		assert!(controller.is_closed());
		let err = parts.sender.send(json!({"type": "FEEDBACK_DONE"})).await.unwrap_err();
		assert!(err.is_closed());
	}

	#[tokio::test]
	async fn test_wait_for_sent_times_out_with_snapshot() {
		let (_parts, controller) = FakeTransportBuilder::new().build();
		let sent = controller.wait_for_sent(1, Duration::from_millis(20)).await;
		assert!(sent.is_empty());
	}
}
