//! Client session agent.
//!
//! One agent drives one participant: it registers on its channel, renders
//! each broker instruction through a [`TrialRenderer`], and replies. While a
//! trial is on screen the agent keeps listening, so a terminal instruction or
//! a lost connection cuts the trial short; any other message that arrives in
//! the meantime is handled, in order, once the trial is answered.

pub mod auto;
pub mod channel;
pub mod render;

use std::collections::VecDeque;
use std::future::Future;

use dyad_protocol::{ClientMessage, ParticipantId, Role, ServerMessage, TrialResponse};
use serde::Serialize;
use tracing::{debug, info, warn};

pub use auto::{AutoRenderer, ChoicePolicy, RenderEvent, Transcript};
pub use channel::ClientChannel;
pub use render::{DirectorTrial, FeedbackView, MatcherTrial, Selection, TerminalScreen, TrialRenderer, WaitKind};

use crate::error::Result;

/// How a session ended for this participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentOutcome {
	Completed,
	PartnerDropped,
	ConnectionLost,
}

impl AgentOutcome {
	pub fn screen(self) -> TerminalScreen {
		match self {
			AgentOutcome::Completed => TerminalScreen::SessionComplete,
			AgentOutcome::PartnerDropped => TerminalScreen::PartnerDropped,
			AgentOutcome::ConnectionLost => TerminalScreen::ConnectionLost,
		}
	}
}

/// Where the agent is in its loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentState {
	Registering,
	Idle,
	/// An open-ended wait is on screen; the next inbound message ends it.
	Waiting(WaitKind),
	Rendering,
	Finished(AgentOutcome),
}

/// What happened during a session, returned by [`SessionAgent::run`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
	pub participant_id: ParticipantId,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub partner_id: Option<ParticipantId>,
	pub director_trials: u32,
	pub matcher_trials: u32,
	pub total_score: u32,
	pub outcome: AgentOutcome,
}

enum Step<T> {
	Done(T),
	/// A terminal instruction (or `None` for a lost channel) interrupted rendering.
	Preempted(Option<ServerMessage>),
}

pub struct SessionAgent<R> {
	participant: ParticipantId,
	channel: ClientChannel,
	renderer: R,
	state: AgentState,
	pending: VecDeque<ServerMessage>,
	partner: Option<ParticipantId>,
	last_role: Option<Role>,
	director_trials: u32,
	matcher_trials: u32,
	total_score: u32,
}

impl<R: TrialRenderer> SessionAgent<R> {
	pub fn new(participant: ParticipantId, channel: ClientChannel, renderer: R) -> Self {
		Self {
			participant,
			channel,
			renderer,
			state: AgentState::Registering,
			pending: VecDeque::new(),
			partner: None,
			last_role: None,
			director_trials: 0,
			matcher_trials: 0,
			total_score: 0,
		}
	}

	pub fn state(&self) -> AgentState {
		self.state
	}

	/// Registers and follows broker instructions until the session ends.
	///
	/// Returns an error only when the renderer fails; channel failures end the
	/// session with [`AgentOutcome::ConnectionLost`].
	pub async fn run(mut self) -> Result<SessionSummary> {
		info!(target = "dyad.agent", participant = %self.participant, "registering");
		let register = ClientMessage::Register {
			participant_id: self.participant.clone(),
		};
		if let Err(err) = self.channel.send(&register).await {
			warn!(target = "dyad.agent", error = %err, "registration failed");
			return Ok(self.finish(AgentOutcome::ConnectionLost).await);
		}
		self.state = AgentState::Idle;

		loop {
			let next = match self.pending.pop_front() {
				Some(message) => Some(message),
				None => self.channel.recv().await,
			};
			let Some(message) = next else {
				warn!(target = "dyad.agent", participant = %self.participant, "channel closed before the session ended");
				return Ok(self.finish(AgentOutcome::ConnectionLost).await);
			};

			if let AgentState::Waiting(kind) = self.state {
				debug!(target = "dyad.agent", ?kind, next = message.kind(), "wait ended");
				self.renderer.end_waiting().await;
				self.state = AgentState::Idle;
			}

			match self.dispatch(message).await {
				Ok(None) => {}
				Ok(Some(outcome)) => return Ok(self.finish(outcome).await),
				Err(err) => {
					self.channel.close().await;
					return Err(err);
				}
			}
		}
	}

	async fn dispatch(&mut self, message: ServerMessage) -> Result<Option<AgentOutcome>> {
		debug!(target = "dyad.agent", kind = message.kind(), "instruction received");
		match message {
			ServerMessage::EnterWaitingRoom => {
				self.enter_wait(WaitKind::WaitingRoom).await;
				Ok(None)
			}
			ServerMessage::WaitForPartner => {
				self.enter_wait(WaitKind::Partner).await;
				Ok(None)
			}
			ServerMessage::Paired { partner_id } => {
				info!(target = "dyad.agent", participant = %self.participant, partner = %partner_id, "paired");
				self.partner = Some(partner_id.clone());
				self.state = AgentState::Rendering;
				match interruptible(&mut self.channel, &mut self.pending, self.renderer.instructions(&partner_id)).await {
					Step::Done(result) => result?,
					Step::Preempted(message) => return Ok(Some(preempted_outcome(message))),
				}
				self.reply(ClientMessage::InstructionsDone).await
			}
			ServerMessage::RunDirector {
				target_object,
				label_choices,
				partner_id,
			} => {
				let trial = DirectorTrial {
					target_object,
					label_choices,
					partner_id,
				};
				self.state = AgentState::Rendering;
				let selection = match interruptible(&mut self.channel, &mut self.pending, self.renderer.director(&trial)).await {
					Step::Done(result) => result?,
					Step::Preempted(message) => return Ok(Some(preempted_outcome(message))),
				};
				self.director_trials += 1;
				self.last_role = Some(Role::Director);
				let rt_ms = Some(selection.elapsed_ms());
				self.reply(ClientMessage::Response(TrialResponse::Director {
					target_object: trial.target_object,
					label: selection.choice,
					rt_ms,
				}))
				.await
			}
			ServerMessage::RunMatcher {
				label,
				object_choices,
				partner_id,
			} => {
				let trial = MatcherTrial {
					label,
					object_choices,
					partner_id,
				};
				self.state = AgentState::Rendering;
				let selection = match interruptible(&mut self.channel, &mut self.pending, self.renderer.matcher(&trial)).await {
					Step::Done(result) => result?,
					Step::Preempted(message) => return Ok(Some(preempted_outcome(message))),
				};
				self.matcher_trials += 1;
				self.last_role = Some(Role::Matcher);
				let rt_ms = Some(selection.elapsed_ms());
				self.reply(ClientMessage::Response(TrialResponse::Matcher {
					label: trial.label,
					guess: selection.choice,
					rt_ms,
				}))
				.await
			}
			ServerMessage::RunFeedback {
				score,
				target_object,
				label,
				guess,
			} => {
				self.total_score += u32::from(score.value());
				let view = FeedbackView {
					role: self.last_role.unwrap_or(Role::Matcher),
					score,
					target_object,
					label,
					guess,
				};
				self.state = AgentState::Rendering;
				match interruptible(&mut self.channel, &mut self.pending, self.renderer.feedback(&view)).await {
					Step::Done(result) => result?,
					Step::Preempted(message) => return Ok(Some(preempted_outcome(message))),
				}
				self.reply(ClientMessage::FeedbackDone).await
			}
			ServerMessage::PartnerDropped => Ok(Some(AgentOutcome::PartnerDropped)),
			ServerMessage::SessionComplete => Ok(Some(AgentOutcome::Completed)),
		}
	}

	async fn enter_wait(&mut self, kind: WaitKind) {
		self.renderer.waiting(kind).await;
		self.state = AgentState::Waiting(kind);
	}

	async fn reply(&mut self, message: ClientMessage) -> Result<Option<AgentOutcome>> {
		self.state = AgentState::Idle;
		match self.channel.send(&message).await {
			Ok(()) => Ok(None),
			Err(err) => {
				warn!(target = "dyad.agent", kind = message.kind(), error = %err, "failed to send reply");
				Ok(Some(AgentOutcome::ConnectionLost))
			}
		}
	}

	async fn finish(mut self, outcome: AgentOutcome) -> SessionSummary {
		if let AgentState::Waiting(_) = self.state {
			self.renderer.end_waiting().await;
		}
		self.state = AgentState::Finished(outcome);
		self.renderer.terminal(outcome.screen()).await;
		self.channel.close().await;

		info!(
			target = "dyad.agent",
			participant = %self.participant,
			?outcome,
			score = self.total_score,
			"session finished"
		);
		SessionSummary {
			participant_id: self.participant,
			partner_id: self.partner,
			director_trials: self.director_trials,
			matcher_trials: self.matcher_trials,
			total_score: self.total_score,
			outcome,
		}
	}
}

fn preempted_outcome(message: Option<ServerMessage>) -> AgentOutcome {
	match message {
		Some(ServerMessage::SessionComplete) => AgentOutcome::Completed,
		Some(_) => AgentOutcome::PartnerDropped,
		None => AgentOutcome::ConnectionLost,
	}
}

/// Runs `render` while still reading the channel.
async fn interruptible<T>(channel: &mut ClientChannel, pending: &mut VecDeque<ServerMessage>, render: impl Future<Output = T>) -> Step<T> {
	tokio::pin!(render);
	loop {
		tokio::select! {
			biased;
			output = &mut render => return Step::Done(output),
			inbound = channel.recv() => match inbound {
				Some(message) if message.is_terminal() => return Step::Preempted(Some(message)),
				Some(message) => {
					debug!(target = "dyad.agent", kind = message.kind(), "queued until the current screen is answered");
					pending.push_back(message);
				}
				None => return Step::Preempted(None),
			},
		}
	}
}
