use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque participant identifier chosen by the client when it connects.
///
/// Used for bookkeeping and data labeling only, never for authentication.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(String);

impl ParticipantId {
	pub fn new(id: impl Into<String>) -> Self {
		Self(id.into())
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for ParticipantId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl From<&str> for ParticipantId {
	fn from(value: &str) -> Self {
		Self::new(value)
	}
}

impl From<String> for ParticipantId {
	fn from(value: String) -> Self {
		Self(value)
	}
}

/// Role a dyad member plays in a single trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
	/// Sees the target object and picks a label for it.
	Director,
	/// Sees the label and guesses the target object.
	Matcher,
}

impl Role {
	pub fn other(self) -> Self {
		match self {
			Role::Director => Role::Matcher,
			Role::Matcher => Role::Director,
		}
	}
}

impl fmt::Display for Role {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Role::Director => write!(f, "director"),
			Role::Matcher => write!(f, "matcher"),
		}
	}
}

/// Position of a member inside a dyad.
///
/// `A` is the participant that waited in the pool, `B` the one whose
/// registration completed the pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Slot {
	A,
	B,
}

impl Slot {
	pub const BOTH: [Slot; 2] = [Slot::A, Slot::B];

	pub fn other(self) -> Self {
		match self {
			Slot::A => Slot::B,
			Slot::B => Slot::A,
		}
	}

	pub fn index(self) -> usize {
		match self {
			Slot::A => 0,
			Slot::B => 1,
		}
	}
}

impl fmt::Display for Slot {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Slot::A => write!(f, "A"),
			Slot::B => write!(f, "B"),
		}
	}
}

/// Communicative success of a trial: `1` when the matcher guessed the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Score(u8);

impl Score {
	pub const SUCCESS: Score = Score(1);
	pub const FAILURE: Score = Score(0);

	/// Scores a guess against the target object.
	pub fn for_guess(target_object: &str, guess: &str) -> Self {
		if target_object == guess { Self::SUCCESS } else { Self::FAILURE }
	}

	pub fn value(self) -> u8 {
		self.0
	}

	pub fn is_success(self) -> bool {
		self == Self::SUCCESS
	}
}

impl fmt::Display for Score {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn score_matches_target() {
		assert_eq!(Score::for_guess("object4", "object4"), Score::SUCCESS);
		assert_eq!(Score::for_guess("object4", "object5"), Score::FAILURE);
		assert_eq!(Score::for_guess("object4", "object4").value(), 1);
		assert_eq!(Score::for_guess("object4", "object5").value(), 0);
	}

	#[test]
	fn score_is_case_sensitive() {
		assert_eq!(Score::for_guess("object4", "Object4"), Score::FAILURE);
	}

	#[test]
	fn slot_other_round_trips() {
		for slot in Slot::BOTH {
			assert_ne!(slot, slot.other());
			assert_eq!(slot, slot.other().other());
		}
		assert_eq!(Slot::A.index(), 0);
		assert_eq!(Slot::B.index(), 1);
	}

	#[test]
	fn participant_id_serializes_as_plain_string() {
		let id = ParticipantId::new("p-123");
		assert_eq!(serde_json::to_string(&id).unwrap(), "\"p-123\"");
		assert_eq!(id.to_string(), "p-123");
	}
}
