//! FIFO waiting pool for unpaired participants.

use std::collections::VecDeque;

use dyad_protocol::ParticipantId;

/// Result of [`WaitingPool::pop_or_insert`].
#[derive(Debug, PartialEq, Eq)]
pub enum PoolOutcome<T> {
	/// The pool was empty; the newcomer now waits.
	Inserted,
	/// The longest-waiting entry was removed and should be paired with the newcomer.
	Matched {
		waiting_id: ParticipantId,
		waiting: T,
		newcomer_id: ParticipantId,
		newcomer: T,
	},
	/// The id is already waiting; nothing changed.
	Rejected { id: ParticipantId, entry: T },
}

/// Unpaired participants in arrival order.
///
/// With immediate pairing the pool never holds more than one entry, but the
/// ordering holds for any size.
#[derive(Debug)]
pub struct WaitingPool<T> {
	entries: VecDeque<(ParticipantId, T)>,
}

impl<T> Default for WaitingPool<T> {
	fn default() -> Self {
		Self { entries: VecDeque::new() }
	}
}

impl<T> WaitingPool<T> {
	pub fn new() -> Self {
		Self::default()
	}

	/// Pairs the newcomer with the longest waiter, or parks it if nobody waits.
	///
	/// A participant is never matched with itself.
	pub fn pop_or_insert(&mut self, id: ParticipantId, entry: T) -> PoolOutcome<T> {
		if self.contains(&id) {
			return PoolOutcome::Rejected { id, entry };
		}

		match self.entries.pop_front() {
			Some((waiting_id, waiting)) => PoolOutcome::Matched {
				waiting_id,
				waiting,
				newcomer_id: id,
				newcomer: entry,
			},
			None => {
				self.entries.push_back((id, entry));
				PoolOutcome::Inserted
			}
		}
	}

	/// Removes `id` if it is waiting.
	pub fn remove(&mut self, id: &ParticipantId) -> Option<T> {
		let index = self.entries.iter().position(|(waiting, _)| waiting == id)?;
		self.entries.remove(index).map(|(_, entry)| entry)
	}

	pub fn contains(&self, id: &ParticipantId) -> bool {
		self.entries.iter().any(|(waiting, _)| waiting == id)
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	pub fn ids(&self) -> impl Iterator<Item = &ParticipantId> {
		self.entries.iter().map(|(id, _)| id)
	}
}
