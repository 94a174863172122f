//! Rendering collaborator for the session agent.

use std::time::Duration;

use async_trait::async_trait;
use dyad_protocol::{ParticipantId, Role, Score};
use serde::Serialize;

use crate::error::Result;

/// Which open-ended wait the participant is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitKind {
	/// No partner has been found yet.
	WaitingRoom,
	/// The partner is busy with their part of the trial.
	Partner,
}

/// Final screen shown before the agent exits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalScreen {
	SessionComplete,
	PartnerDropped,
	/// The channel failed before the session ended.
	ConnectionLost,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectorTrial {
	pub target_object: String,
	pub label_choices: Vec<String>,
	pub partner_id: ParticipantId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatcherTrial {
	pub label: String,
	pub object_choices: Vec<String>,
	pub partner_id: ParticipantId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedbackView {
	/// Role this participant played in the trial being scored.
	pub role: Role,
	pub score: Score,
	pub target_object: String,
	pub label: String,
	pub guess: String,
}

/// What the participant picked and how long it took.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
	pub choice: String,
	pub elapsed: Duration,
}

impl Selection {
	pub fn new(choice: impl Into<String>, elapsed: Duration) -> Self {
		Self {
			choice: choice.into(),
			elapsed,
		}
	}

	pub fn elapsed_ms(&self) -> u64 {
		u64::try_from(self.elapsed.as_millis()).unwrap_or(u64::MAX)
	}
}

/// Presents instructions to a participant and collects their choices.
///
/// Any call may be abandoned midway when the broker pre-empts it with a
/// terminal instruction, so implementations must tolerate being dropped.
#[async_trait]
pub trait TrialRenderer: Send {
	/// Shows an open-ended wait. Returns immediately; the wait lasts until
	/// [`TrialRenderer::end_waiting`] is called.
	async fn waiting(&mut self, kind: WaitKind);

	async fn end_waiting(&mut self) {}

	/// Pre-interaction instructions, shown once the partner is known.
	async fn instructions(&mut self, partner: &ParticipantId) -> Result<()>;

	async fn director(&mut self, trial: &DirectorTrial) -> Result<Selection>;

	async fn matcher(&mut self, trial: &MatcherTrial) -> Result<Selection>;

	async fn feedback(&mut self, feedback: &FeedbackView) -> Result<()>;

	async fn terminal(&mut self, screen: TerminalScreen);
}
