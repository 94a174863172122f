//! Scripted participant.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dyad_protocol::{ParticipantId, Role, Score};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::Serialize;

use super::render::{DirectorTrial, FeedbackView, MatcherTrial, Selection, TerminalScreen, TrialRenderer, WaitKind};
use crate::error::{Error, Result};

/// How an [`AutoRenderer`] picks among offered choices.
#[derive(Debug, Clone)]
pub enum ChoicePolicy {
	First,
	Random(StdRng),
}

impl ChoicePolicy {
	pub fn seeded(seed: u64) -> Self {
		ChoicePolicy::Random(StdRng::seed_from_u64(seed))
	}

	fn pick(&mut self, choices: &[String]) -> Option<String> {
		match self {
			ChoicePolicy::First => choices.first().cloned(),
			ChoicePolicy::Random(rng) => choices.choose(rng).cloned(),
		}
	}
}

/// Something an [`AutoRenderer`] was asked to show.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RenderEvent {
	Waiting { kind: WaitKind },
	EndWaiting,
	Instructions { partner_id: ParticipantId },
	Director { target_object: String, choice: String },
	Matcher { label: String, choice: String },
	Feedback { role: Role, score: Score },
	Terminal { screen: TerminalScreen },
}

/// Shared log of render events, readable after the renderer moved into an agent.
#[derive(Debug, Clone, Default)]
pub struct Transcript(Arc<Mutex<Vec<RenderEvent>>>);

impl Transcript {
	pub fn events(&self) -> Vec<RenderEvent> {
		self.0.lock().clone()
	}

	fn push(&self, event: RenderEvent) {
		self.0.lock().push(event);
	}
}

/// Robot participant that answers every instruction on its own.
#[derive(Debug)]
pub struct AutoRenderer {
	policy: ChoicePolicy,
	think_time: Duration,
	transcript: Transcript,
}

impl AutoRenderer {
	pub fn new(policy: ChoicePolicy) -> Self {
		Self {
			policy,
			think_time: Duration::ZERO,
			transcript: Transcript::default(),
		}
	}

	/// Delay before each choice and acknowledgement.
	pub fn with_think_time(mut self, think_time: Duration) -> Self {
		self.think_time = think_time;
		self
	}

	pub fn transcript(&self) -> Transcript {
		self.transcript.clone()
	}

	async fn think(&self) {
		if !self.think_time.is_zero() {
			tokio::time::sleep(self.think_time).await;
		}
	}

	async fn choose(&mut self, choices: &[String]) -> Result<Selection> {
		let started = Instant::now();
		self.think().await;
		let choice = self.policy.pick(choices).ok_or_else(|| Error::Render("no choices offered".into()))?;
		Ok(Selection::new(choice, started.elapsed()))
	}
}

impl Default for AutoRenderer {
	fn default() -> Self {
		Self::new(ChoicePolicy::First)
	}
}

#[async_trait]
impl TrialRenderer for AutoRenderer {
	async fn waiting(&mut self, kind: WaitKind) {
		self.transcript.push(RenderEvent::Waiting { kind });
	}

	async fn end_waiting(&mut self) {
		self.transcript.push(RenderEvent::EndWaiting);
	}

	async fn instructions(&mut self, partner: &ParticipantId) -> Result<()> {
		self.transcript.push(RenderEvent::Instructions {
			partner_id: partner.clone(),
		});
		self.think().await;
		Ok(())
	}

	async fn director(&mut self, trial: &DirectorTrial) -> Result<Selection> {
		let selection = self.choose(&trial.label_choices).await?;
		self.transcript.push(RenderEvent::Director {
			target_object: trial.target_object.clone(),
			choice: selection.choice.clone(),
		});
		Ok(selection)
	}

	async fn matcher(&mut self, trial: &MatcherTrial) -> Result<Selection> {
		let selection = self.choose(&trial.object_choices).await?;
		self.transcript.push(RenderEvent::Matcher {
			label: trial.label.clone(),
			choice: selection.choice.clone(),
		});
		Ok(selection)
	}

	async fn feedback(&mut self, feedback: &FeedbackView) -> Result<()> {
		self.transcript.push(RenderEvent::Feedback {
			role: feedback.role,
			score: feedback.score,
		});
		self.think().await;
		Ok(())
	}

	async fn terminal(&mut self, screen: TerminalScreen) {
		self.transcript.push(RenderEvent::Terminal { screen });
	}
}
