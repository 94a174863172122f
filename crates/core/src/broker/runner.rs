//! Event loop task for one dyad.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::dyad::{DyadEvent, DyadSession, Effect};
use super::{BrokerEvent, MemberLink};
use crate::sink::TrialSink;

/// Owns a [`DyadSession`] and applies its effects until it finishes.
pub(crate) struct DyadRunner {
	session: DyadSession,
	links: [MemberLink; 2],
	events: mpsc::UnboundedReceiver<DyadEvent>,
	sink: Arc<dyn TrialSink>,
	broker: mpsc::UnboundedSender<BrokerEvent>,
}

impl DyadRunner {
	pub(crate) fn new(
		session: DyadSession,
		links: [MemberLink; 2],
		events: mpsc::UnboundedReceiver<DyadEvent>,
		sink: Arc<dyn TrialSink>,
		broker: mpsc::UnboundedSender<BrokerEvent>,
	) -> Self {
		Self {
			session,
			links,
			events,
			sink,
			broker,
		}
	}

	pub(crate) fn spawn(self, initial: Vec<Effect>) -> JoinHandle<()> {
		tokio::spawn(self.run(initial))
	}

	async fn run(mut self, initial: Vec<Effect>) {
		let dyad = self.session.id();
		self.apply(initial);

		while !self.session.is_finished() {
			let Some(event) = self.events.recv().await else {
				debug!(target = "dyad.dyad", %dyad, "broker dropped the dyad route");
				break;
			};
			let effects = self.session.handle(event);
			self.apply(effects);
		}

		let phase = self.session.phase();
		info!(target = "dyad.dyad", %dyad, %phase, "dyad released");
		let _ = self.broker.send(BrokerEvent::DyadReleased { dyad, phase });
	}

	fn apply(&self, effects: Vec<Effect>) {
		for effect in effects {
			match effect {
				Effect::Send { to, message } => {
					let link = &self.links[to.index()];
					let kind = message.kind();
					if !link.send(message) {
						debug!(target = "dyad.dyad", dyad = %self.session.id(), participant = %link.participant(), kind, "member channel already closed");
					}
				}
				Effect::Record(outcome) => self.sink.record(&outcome),
			}
		}
	}
}
