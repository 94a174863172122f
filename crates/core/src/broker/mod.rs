//! Pairing broker.
//!
//! A single coordination task owns the [`WaitingPool`] and the routing table
//! from connections to dyads. Connection tasks talk to it through a
//! [`BrokerHandle`]; every dyad runs its own task fed by the broker.

mod dyad;
mod pool;
mod runner;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dyad_protocol::{ClientMessage, ParticipantId, ServerMessage, Slot};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub use dyad::{DyadEvent, DyadId, DyadPhase, DyadSession, Effect};
pub use pool::{PoolOutcome, WaitingPool};

use crate::config::ExperimentConfig;
use crate::error::{Error, Result};
use crate::plan::TrialPlan;
use crate::sink::TrialSink;
use runner::DyadRunner;

/// Broker-assigned identifier of one accepted connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(u64);

impl ConnectionId {
	pub fn new(value: u64) -> Self {
		Self(value)
	}
}

impl fmt::Display for ConnectionId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "conn-{}", self.0)
	}
}

/// Instruction for a connection's writer task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outgoing {
	Message(ServerMessage),
	Close,
}

/// Sending side of a registered member's connection.
#[derive(Debug, Clone)]
pub struct MemberLink {
	conn: ConnectionId,
	participant: ParticipantId,
	tx: mpsc::UnboundedSender<Outgoing>,
}

impl MemberLink {
	pub fn conn(&self) -> ConnectionId {
		self.conn
	}

	pub fn participant(&self) -> &ParticipantId {
		&self.participant
	}

	/// Queues a message; returns `false` when the connection is gone.
	pub fn send(&self, message: ServerMessage) -> bool {
		self.tx.send(Outgoing::Message(message)).is_ok()
	}

	pub fn close(&self) {
		let _ = self.tx.send(Outgoing::Close);
	}
}

/// Input to the coordination task.
#[derive(Debug)]
pub enum BrokerEvent {
	Connected {
		conn: ConnectionId,
		outbound: mpsc::UnboundedSender<Outgoing>,
	},
	Message {
		conn: ConnectionId,
		message: ClientMessage,
	},
	Disconnected {
		conn: ConnectionId,
	},
	DyadReleased {
		dyad: DyadId,
		phase: DyadPhase,
	},
	Stats {
		reply: oneshot::Sender<BrokerStats>,
	},
	Shutdown,
}

/// Snapshot of broker occupancy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrokerStats {
	pub connections: usize,
	pub waiting: usize,
	pub active_dyads: usize,
	pub completed_dyads: u64,
	pub dropped_dyads: u64,
}

#[derive(Debug, Clone)]
enum Membership {
	Unregistered,
	Waiting(ParticipantId),
	Paired {
		participant: ParticipantId,
		dyad: DyadId,
		slot: Slot,
	},
	/// The dyad ended or the connection was refused; further messages are ignored.
	Released,
}

#[derive(Debug)]
struct Connection {
	outbound: mpsc::UnboundedSender<Outgoing>,
	membership: Membership,
}

#[derive(Debug)]
struct DyadRoute {
	events: mpsc::UnboundedSender<DyadEvent>,
	members: [(ParticipantId, ConnectionId); 2],
}

/// Coordination state: waiting pool, connections and dyad routes.
pub struct Broker {
	experiment: Arc<ExperimentConfig>,
	sink: Arc<dyn TrialSink>,
	rng: StdRng,
	events: mpsc::UnboundedSender<BrokerEvent>,
	pool: WaitingPool<ConnectionId>,
	connections: HashMap<ConnectionId, Connection>,
	/// Participant ids currently waiting or inside a live dyad.
	registered: HashMap<ParticipantId, ConnectionId>,
	dyads: HashMap<DyadId, DyadRoute>,
	next_dyad: u64,
	completed: u64,
	dropped: u64,
}

impl Broker {
	/// Creates a broker whose dyad tasks report back on `events`.
	pub fn new(experiment: ExperimentConfig, sink: Arc<dyn TrialSink>, seed: Option<u64>, events: mpsc::UnboundedSender<BrokerEvent>) -> Self {
		let rng = match seed {
			Some(seed) => StdRng::seed_from_u64(seed),
			None => StdRng::from_entropy(),
		};
		Self {
			experiment: Arc::new(experiment),
			sink,
			rng,
			events,
			pool: WaitingPool::new(),
			connections: HashMap::new(),
			registered: HashMap::new(),
			dyads: HashMap::new(),
			next_dyad: 1,
			completed: 0,
			dropped: 0,
		}
	}

	/// Starts the coordination task.
	pub fn spawn(experiment: ExperimentConfig, sink: Arc<dyn TrialSink>, seed: Option<u64>) -> (BrokerHandle, JoinHandle<()>) {
		let (tx, rx) = mpsc::unbounded_channel();
		let broker = Self::new(experiment, sink, seed, tx.clone());
		let task = tokio::spawn(broker.run(rx));
		(BrokerHandle::new(tx), task)
	}

	pub async fn run(mut self, mut rx: mpsc::UnboundedReceiver<BrokerEvent>) {
		info!(target = "dyad.broker", trials = self.experiment.targets.len(), "broker started");
		while let Some(event) = rx.recv().await {
			if !self.handle_event(event) {
				break;
			}
		}
		info!(target = "dyad.broker", completed = self.completed, dropped = self.dropped, "broker stopped");
	}

	/// Applies one event. Returns `false` once the broker should stop.
	pub fn handle_event(&mut self, event: BrokerEvent) -> bool {
		match event {
			BrokerEvent::Connected { conn, outbound } => {
				debug!(target = "dyad.broker", %conn, "connection opened");
				self.connections.insert(
					conn,
					Connection {
						outbound,
						membership: Membership::Unregistered,
					},
				);
			}
			BrokerEvent::Message { conn, message } => self.on_message(conn, message),
			BrokerEvent::Disconnected { conn } => self.on_disconnect(conn),
			BrokerEvent::DyadReleased { dyad, phase } => self.on_release(dyad, phase),
			BrokerEvent::Stats { reply } => {
				let _ = reply.send(self.stats());
			}
			BrokerEvent::Shutdown => {
				info!(target = "dyad.broker", connections = self.connections.len(), "shutting down");
				for connection in self.connections.values() {
					let _ = connection.outbound.send(Outgoing::Close);
				}
				return false;
			}
		}
		true
	}

	pub fn stats(&self) -> BrokerStats {
		BrokerStats {
			connections: self.connections.len(),
			waiting: self.pool.len(),
			active_dyads: self.dyads.len(),
			completed_dyads: self.completed,
			dropped_dyads: self.dropped,
		}
	}

	fn on_message(&mut self, conn: ConnectionId, message: ClientMessage) {
		if let ClientMessage::Register { participant_id } = message {
			self.on_register(conn, participant_id);
			return;
		}

		let Some(connection) = self.connections.get(&conn) else {
			debug!(target = "dyad.broker", %conn, kind = message.kind(), "message from unknown connection");
			return;
		};

		match &connection.membership {
			Membership::Paired { dyad, slot, .. } => {
				if let Some(route) = self.dyads.get(dyad) {
					let _ = route.events.send(DyadEvent::Message { from: *slot, message });
				}
			}
			Membership::Unregistered | Membership::Waiting(_) => {
				warn!(target = "dyad.broker", %conn, kind = message.kind(), "message before pairing; dropped");
			}
			Membership::Released => {
				debug!(target = "dyad.broker", %conn, kind = message.kind(), "message after session end; dropped");
			}
		}
	}

	fn on_register(&mut self, conn: ConnectionId, participant: ParticipantId) {
		let Some(connection) = self.connections.get_mut(&conn) else {
			debug!(target = "dyad.broker", %conn, %participant, "registration from unknown connection");
			return;
		};

		if !matches!(connection.membership, Membership::Unregistered) {
			warn!(target = "dyad.broker", %conn, %participant, "connection registered twice; closing");
			let _ = connection.outbound.send(Outgoing::Close);
			return;
		}

		if self.registered.contains_key(&participant) {
			warn!(target = "dyad.broker", %conn, %participant, "participant id already in use; closing");
			connection.membership = Membership::Released;
			let _ = connection.outbound.send(Outgoing::Close);
			return;
		}

		match self.pool.pop_or_insert(participant.clone(), conn) {
			PoolOutcome::Inserted => self.park(conn, participant),
			PoolOutcome::Matched {
				waiting_id,
				waiting,
				newcomer_id,
				newcomer,
			} => self.form_dyad((waiting_id, waiting), (newcomer_id, newcomer)),
			PoolOutcome::Rejected { id, entry } => {
				warn!(target = "dyad.broker", conn = %entry, participant = %id, "participant id already waiting; closing");
				self.close(entry);
			}
		}
	}

	/// Records a participant the pool just accepted and tells it to wait.
	fn park(&mut self, conn: ConnectionId, participant: ParticipantId) {
		info!(target = "dyad.broker", %conn, %participant, "participant waiting for a partner");
		self.registered.insert(participant.clone(), conn);
		if let Some(connection) = self.connections.get_mut(&conn) {
			connection.membership = Membership::Waiting(participant);
			let _ = connection.outbound.send(Outgoing::Message(ServerMessage::EnterWaitingRoom));
		}
	}

	fn form_dyad(&mut self, (waiting_id, waiting_conn): (ParticipantId, ConnectionId), (newcomer_id, newcomer_conn): (ParticipantId, ConnectionId)) {
		let Some(link_a) = self.link(waiting_conn, &waiting_id) else {
			warn!(target = "dyad.broker", conn = %waiting_conn, participant = %waiting_id, "waiting connection vanished");
			self.registered.remove(&waiting_id);
			self.on_register(newcomer_conn, newcomer_id);
			return;
		};
		let Some(link_b) = self.link(newcomer_conn, &newcomer_id) else {
			return;
		};

		let id = DyadId::new(self.next_dyad);
		self.next_dyad += 1;

		let plan = TrialPlan::generate(&self.experiment, &mut self.rng);
		let first_director = plan.get(0).map(|trial| trial.director);
		let (session, initial) = DyadSession::start(id, [waiting_id.clone(), newcomer_id.clone()], plan, Arc::clone(&self.experiment));

		let (tx, rx) = mpsc::unbounded_channel();
		DyadRunner::new(session, [link_a, link_b], rx, Arc::clone(&self.sink), self.events.clone()).spawn(initial);

		for (participant, conn, slot) in [(&waiting_id, waiting_conn, Slot::A), (&newcomer_id, newcomer_conn, Slot::B)] {
			if let Some(connection) = self.connections.get_mut(&conn) {
				connection.membership = Membership::Paired {
					participant: participant.clone(),
					dyad: id,
					slot,
				};
			}
		}
		self.registered.insert(newcomer_id.clone(), newcomer_conn);

		info!(
			target = "dyad.broker",
			dyad = %id,
			a = %waiting_id,
			b = %newcomer_id,
			first_director = ?first_director,
			"dyad formed"
		);
		self.dyads.insert(
			id,
			DyadRoute {
				events: tx,
				members: [(waiting_id, waiting_conn), (newcomer_id, newcomer_conn)],
			},
		);
	}

	fn on_disconnect(&mut self, conn: ConnectionId) {
		let Some(connection) = self.connections.remove(&conn) else {
			return;
		};

		match connection.membership {
			Membership::Waiting(participant) => {
				self.pool.remove(&participant);
				self.registered.remove(&participant);
				info!(target = "dyad.broker", %conn, %participant, "waiting participant left");
			}
			Membership::Paired { participant, dyad, slot } => {
				debug!(target = "dyad.broker", %conn, %participant, %dyad, "paired participant disconnected");
				if let Some(route) = self.dyads.get(&dyad) {
					let _ = route.events.send(DyadEvent::Disconnected { slot });
				}
			}
			Membership::Unregistered | Membership::Released => {
				debug!(target = "dyad.broker", %conn, "connection closed");
			}
		}
	}

	fn on_release(&mut self, dyad: DyadId, phase: DyadPhase) {
		let Some(route) = self.dyads.remove(&dyad) else {
			return;
		};

		for (participant, conn) in route.members {
			if self.registered.get(&participant) == Some(&conn) {
				self.registered.remove(&participant);
			}
			if let Some(connection) = self.connections.get_mut(&conn) {
				connection.membership = Membership::Released;
			}
		}

		match phase {
			DyadPhase::Complete => self.completed += 1,
			DyadPhase::Dropped => self.dropped += 1,
			_ => {}
		}
	}

	fn link(&self, conn: ConnectionId, participant: &ParticipantId) -> Option<MemberLink> {
		self.connections.get(&conn).map(|connection| MemberLink {
			conn,
			participant: participant.clone(),
			tx: connection.outbound.clone(),
		})
	}

	fn close(&self, conn: ConnectionId) {
		if let Some(connection) = self.connections.get(&conn) {
			let _ = connection.outbound.send(Outgoing::Close);
		}
	}

	/// Panics if any participant is both waiting and paired, or in two dyads.
	#[cfg(test)]
	fn assert_exclusive(&self) {
		let mut seen = std::collections::HashSet::new();
		for route in self.dyads.values() {
			for (participant, _) in &route.members {
				assert!(seen.insert(participant.clone()), "{participant} is in two dyads");
			}
		}
		for participant in self.pool.ids() {
			assert!(!seen.contains(participant), "{participant} is waiting and paired");
		}
		assert!(self.pool.len() <= 1, "pool holds {} entries", self.pool.len());
	}
}

/// Cloneable front door to a running broker task.
#[derive(Debug, Clone)]
pub struct BrokerHandle {
	events: mpsc::UnboundedSender<BrokerEvent>,
	next_conn: Arc<AtomicU64>,
}

impl BrokerHandle {
	pub fn new(events: mpsc::UnboundedSender<BrokerEvent>) -> Self {
		Self {
			events,
			next_conn: Arc::new(AtomicU64::new(1)),
		}
	}

	/// Announces a new connection and returns its id plus the writer queue.
	pub fn connect(&self) -> (ConnectionId, mpsc::UnboundedReceiver<Outgoing>) {
		let conn = ConnectionId(self.next_conn.fetch_add(1, Ordering::Relaxed));
		let (outbound, rx) = mpsc::unbounded_channel();
		let _ = self.events.send(BrokerEvent::Connected { conn, outbound });
		(conn, rx)
	}

	/// Forwards a decoded client message. Returns `false` if the broker is gone.
	pub fn deliver(&self, conn: ConnectionId, message: ClientMessage) -> bool {
		self.events.send(BrokerEvent::Message { conn, message }).is_ok()
	}

	pub fn disconnect(&self, conn: ConnectionId) {
		let _ = self.events.send(BrokerEvent::Disconnected { conn });
	}

	pub async fn stats(&self) -> Result<BrokerStats> {
		let (reply, rx) = oneshot::channel();
		self.events.send(BrokerEvent::Stats { reply }).map_err(|_| Error::BrokerClosed)?;
		rx.await.map_err(|_| Error::BrokerClosed)
	}

	pub fn shutdown(&self) {
		let _ = self.events.send(BrokerEvent::Shutdown);
	}

	pub fn is_closed(&self) -> bool {
		self.events.is_closed()
	}
}
