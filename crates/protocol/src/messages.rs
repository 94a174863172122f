//! Client and broker message enums.
//!
//! Every frame is a JSON object whose `type` key selects the variant:
//!
//! ```json
//! { "type": "REGISTER", "participant_id": "k3v9x0qa1z" }
//! { "type": "RUN_MATCHER", "label": "zop", "object_choices": ["object4", "object5"], "partner_id": "k3v9x0qa1z" }
//! ```

use serde::{Deserialize, Serialize};

use crate::types::{ParticipantId, Role, Score};

/// Message sent by a client session agent to the broker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientMessage {
	/// First message on every channel.
	Register { participant_id: ParticipantId },
	/// Result of a director or matcher trial.
	Response(TrialResponse),
	/// The participant finished reading the pre-interaction instructions.
	InstructionsDone,
	/// The participant finished looking at trial feedback.
	FeedbackDone,
}

impl ClientMessage {
	/// Wire name of this message type.
	pub fn kind(&self) -> &'static str {
		match self {
			ClientMessage::Register { .. } => "REGISTER",
			ClientMessage::Response(_) => "RESPONSE",
			ClientMessage::InstructionsDone => "INSTRUCTIONS_DONE",
			ClientMessage::FeedbackDone => "FEEDBACK_DONE",
		}
	}

	/// Reply kind this message satisfies, if any.
	pub fn reply_kind(&self) -> Option<ReplyKind> {
		match self {
			ClientMessage::Register { .. } => None,
			ClientMessage::Response(TrialResponse::Director { .. }) => Some(ReplyKind::DirectorResponse),
			ClientMessage::Response(TrialResponse::Matcher { .. }) => Some(ReplyKind::MatcherResponse),
			ClientMessage::InstructionsDone => Some(ReplyKind::InstructionsDone),
			ClientMessage::FeedbackDone => Some(ReplyKind::FeedbackDone),
		}
	}
}

/// Payload of a `RESPONSE` message, discriminated by `role`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum TrialResponse {
	Director {
		target_object: String,
		label: String,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		rt_ms: Option<u64>,
	},
	Matcher {
		label: String,
		guess: String,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		rt_ms: Option<u64>,
	},
}

impl TrialResponse {
	pub fn role(&self) -> Role {
		match self {
			TrialResponse::Director { .. } => Role::Director,
			TrialResponse::Matcher { .. } => Role::Matcher,
		}
	}

	pub fn rt_ms(&self) -> Option<u64> {
		match self {
			TrialResponse::Director { rt_ms, .. } | TrialResponse::Matcher { rt_ms, .. } => *rt_ms,
		}
	}
}

/// Instruction sent by the broker to one client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerMessage {
	/// No partner yet; wait indefinitely.
	EnterWaitingRoom,
	/// A partner was found; show the pre-interaction instructions.
	Paired { partner_id: ParticipantId },
	/// The partner is busy; wait indefinitely.
	WaitForPartner,
	RunDirector {
		target_object: String,
		label_choices: Vec<String>,
		partner_id: ParticipantId,
	},
	RunMatcher {
		label: String,
		object_choices: Vec<String>,
		partner_id: ParticipantId,
	},
	RunFeedback {
		score: Score,
		target_object: String,
		label: String,
		guess: String,
	},
	PartnerDropped,
	SessionComplete,
}

impl ServerMessage {
	/// Wire name of this message type.
	pub fn kind(&self) -> &'static str {
		match self {
			ServerMessage::EnterWaitingRoom => "ENTER_WAITING_ROOM",
			ServerMessage::Paired { .. } => "PAIRED",
			ServerMessage::WaitForPartner => "WAIT_FOR_PARTNER",
			ServerMessage::RunDirector { .. } => "RUN_DIRECTOR",
			ServerMessage::RunMatcher { .. } => "RUN_MATCHER",
			ServerMessage::RunFeedback { .. } => "RUN_FEEDBACK",
			ServerMessage::PartnerDropped => "PARTNER_DROPPED",
			ServerMessage::SessionComplete => "SESSION_COMPLETE",
		}
	}

	/// Reply the client owes after handling this instruction.
	///
	/// Wait and terminal instructions expect nothing back.
	pub fn expected_reply(&self) -> Option<ReplyKind> {
		match self {
			ServerMessage::Paired { .. } => Some(ReplyKind::InstructionsDone),
			ServerMessage::RunDirector { .. } => Some(ReplyKind::DirectorResponse),
			ServerMessage::RunMatcher { .. } => Some(ReplyKind::MatcherResponse),
			ServerMessage::RunFeedback { .. } => Some(ReplyKind::FeedbackDone),
			ServerMessage::EnterWaitingRoom
			| ServerMessage::WaitForPartner
			| ServerMessage::PartnerDropped
			| ServerMessage::SessionComplete => None,
		}
	}

	/// Whether this instruction ends the session for the receiving client.
	pub fn is_terminal(&self) -> bool {
		matches!(self, ServerMessage::PartnerDropped | ServerMessage::SessionComplete)
	}

	/// Whether this instruction puts the client into an open-ended wait.
	pub fn is_wait(&self) -> bool {
		matches!(self, ServerMessage::EnterWaitingRoom | ServerMessage::WaitForPartner)
	}
}

/// Kinds of client replies an instruction can be waiting on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyKind {
	InstructionsDone,
	DirectorResponse,
	MatcherResponse,
	FeedbackDone,
}
