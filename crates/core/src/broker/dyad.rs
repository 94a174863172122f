//! Dyad session state machine.
//!
//! [`DyadSession`] owns no I/O. Each [`DyadEvent`] is turned into a list of
//! [`Effect`]s that the runner applies in order, which keeps every transition
//! testable without sockets or tasks.
//!
//! ```text
//! AWAITING_INSTRUCTIONS_ACK -> DIRECTOR_PENDING -> MATCHER_PENDING -> FEEDBACK_PENDING
//!                                   ^                                      |
//!                                   +------------- next trial -------------+--> COMPLETE
//! any non-terminal state --(member disconnects)--> DROPPED
//! ```

use std::fmt;
use std::sync::Arc;

use dyad_protocol::{ClientMessage, ParticipantId, ReplyKind, Score, ServerMessage, Slot, TrialResponse};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::ExperimentConfig;
use crate::plan::TrialPlan;
use crate::sink::TrialOutcome;

/// Broker-assigned dyad identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DyadId(u64);

impl DyadId {
	pub fn new(value: u64) -> Self {
		Self(value)
	}

	pub fn value(self) -> u64 {
		self.0
	}
}

impl fmt::Display for DyadId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "dyad-{}", self.0)
	}
}

/// Input to the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DyadEvent {
	Message { from: Slot, message: ClientMessage },
	Disconnected { slot: Slot },
}

/// Output of the state machine, applied by the runner in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
	Send { to: Slot, message: ServerMessage },
	Record(TrialOutcome),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DyadPhase {
	AwaitingInstructionsAck,
	DirectorPending,
	MatcherPending,
	FeedbackPending,
	Complete,
	Dropped,
}

impl DyadPhase {
	pub fn is_terminal(self) -> bool {
		matches!(self, DyadPhase::Complete | DyadPhase::Dropped)
	}
}

impl fmt::Display for DyadPhase {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			DyadPhase::AwaitingInstructionsAck => "AWAITING_INSTRUCTIONS_ACK",
			DyadPhase::DirectorPending => "DIRECTOR_PENDING",
			DyadPhase::MatcherPending => "MATCHER_PENDING",
			DyadPhase::FeedbackPending => "FEEDBACK_PENDING",
			DyadPhase::Complete => "COMPLETE",
			DyadPhase::Dropped => "DROPPED",
		};
		f.write_str(name)
	}
}

#[derive(Debug, Clone)]
struct CurrentTrial {
	index: usize,
	target_object: String,
	director: Slot,
	label: Option<String>,
	director_rt_ms: Option<u64>,
}

/// State of one pair of participants.
#[derive(Debug)]
pub struct DyadSession {
	id: DyadId,
	members: [ParticipantId; 2],
	plan: TrialPlan,
	experiment: Arc<ExperimentConfig>,
	phase: DyadPhase,
	next_trial: usize,
	current: Option<CurrentTrial>,
	/// Reply each member still owes; at most one at a time.
	outstanding: [Option<ReplyKind>; 2],
	/// Whether the last message sent to a member was a wait instruction.
	waiting: [bool; 2],
}

impl DyadSession {
	/// Creates the session and the initial `PAIRED` instructions.
	///
	/// `members[0]` is slot A, `members[1]` slot B.
	pub fn start(id: DyadId, members: [ParticipantId; 2], plan: TrialPlan, experiment: Arc<ExperimentConfig>) -> (Self, Vec<Effect>) {
		let mut session = Self {
			id,
			members,
			plan,
			experiment,
			phase: DyadPhase::AwaitingInstructionsAck,
			next_trial: 0,
			current: None,
			outstanding: [None, None],
			waiting: [false, false],
		};

		let mut effects = Vec::with_capacity(2);
		for slot in Slot::BOTH {
			let partner_id = session.member(slot.other()).clone();
			session.send(&mut effects, slot, ServerMessage::Paired { partner_id });
		}
		(session, effects)
	}

	pub fn id(&self) -> DyadId {
		self.id
	}

	pub fn phase(&self) -> DyadPhase {
		self.phase
	}

	pub fn member(&self, slot: Slot) -> &ParticipantId {
		&self.members[slot.index()]
	}

	pub fn members(&self) -> &[ParticipantId; 2] {
		&self.members
	}

	pub fn plan(&self) -> &TrialPlan {
		&self.plan
	}

	/// Index of the trial in progress, if any.
	pub fn trial_index(&self) -> Option<usize> {
		self.current.as_ref().map(|trial| trial.index)
	}

	/// Reply `slot` still owes, if any.
	pub fn outstanding(&self, slot: Slot) -> Option<ReplyKind> {
		self.outstanding[slot.index()]
	}

	pub fn is_finished(&self) -> bool {
		self.phase.is_terminal()
	}

	/// Applies one event and returns the resulting effects.
	pub fn handle(&mut self, event: DyadEvent) -> Vec<Effect> {
		let mut effects = Vec::new();
		match event {
			DyadEvent::Disconnected { slot } => self.on_disconnect(slot, &mut effects),
			DyadEvent::Message { from, message } => self.on_message(from, message, &mut effects),
		}
		effects
	}

	fn on_disconnect(&mut self, slot: Slot, effects: &mut Vec<Effect>) {
		if self.phase.is_terminal() {
			debug!(target = "dyad.dyad", dyad = %self.id, %slot, phase = %self.phase, "disconnect after session end");
			return;
		}

		info!(
			target = "dyad.dyad",
			dyad = %self.id,
			participant = %self.member(slot),
			phase = %self.phase,
			"member disconnected; dropping dyad"
		);
		self.phase = DyadPhase::Dropped;
		self.current = None;
		self.outstanding = [None, None];
		self.send(effects, slot.other(), ServerMessage::PartnerDropped);
	}

	fn on_message(&mut self, from: Slot, message: ClientMessage, effects: &mut Vec<Effect>) {
		if self.phase.is_terminal() {
			debug!(target = "dyad.dyad", dyad = %self.id, %from, kind = message.kind(), "message after session end dropped");
			return;
		}

		let Some(reply) = message.reply_kind() else {
			warn!(target = "dyad.dyad", dyad = %self.id, %from, kind = message.kind(), "message not valid inside a dyad; dropped");
			return;
		};

		let expected = self.outstanding[from.index()];
		if expected != Some(reply) {
			warn!(
				target = "dyad.dyad",
				dyad = %self.id,
				%from,
				kind = message.kind(),
				?expected,
				phase = %self.phase,
				"unexpected reply; dropped"
			);
			return;
		}

		match message {
			ClientMessage::InstructionsDone => self.on_instructions_done(from, effects),
			ClientMessage::FeedbackDone => self.on_feedback_done(from, effects),
			ClientMessage::Response(TrialResponse::Director { target_object, label, rt_ms }) => {
				self.on_director_response(from, target_object, label, rt_ms, effects)
			}
			ClientMessage::Response(TrialResponse::Matcher { label, guess, rt_ms }) => self.on_matcher_response(from, label, guess, rt_ms, effects),
			ClientMessage::Register { .. } => {}
		}
	}

	fn on_instructions_done(&mut self, from: Slot, effects: &mut Vec<Effect>) {
		self.outstanding[from.index()] = None;
		if self.outstanding[from.other().index()].is_some() {
			self.send(effects, from, ServerMessage::WaitForPartner);
		} else {
			self.begin_trial(effects);
		}
	}

	fn on_director_response(&mut self, from: Slot, target_object: String, label: String, rt_ms: Option<u64>, effects: &mut Vec<Effect>) {
		let Some(current) = self.current.as_mut() else {
			return;
		};
		if current.target_object != target_object {
			warn!(
				target = "dyad.dyad",
				dyad = %self.id,
				expected = %current.target_object,
				got = %target_object,
				"director response names a different target; dropped"
			);
			return;
		}

		current.label = Some(label.clone());
		current.director_rt_ms = rt_ms;
		let index = current.index;
		let matcher = current.director.other();

		debug!(target = "dyad.dyad", dyad = %self.id, trial = index, %label, "director responded");
		self.outstanding[from.index()] = None;
		self.phase = DyadPhase::MatcherPending;
		self.send(effects, from, ServerMessage::WaitForPartner);
		let partner_id = self.member(from).clone();
		self.send(
			effects,
			matcher,
			ServerMessage::RunMatcher {
				label,
				object_choices: self.experiment.object_choices(),
				partner_id,
			},
		);
	}

	fn on_matcher_response(&mut self, from: Slot, label: String, guess: String, rt_ms: Option<u64>, effects: &mut Vec<Effect>) {
		let Some(current) = self.current.clone() else {
			return;
		};
		let director_label = current.label.unwrap_or_default();
		if label != director_label {
			warn!(
				target = "dyad.dyad",
				dyad = %self.id,
				expected = %director_label,
				got = %label,
				"matcher echoed a different label; keeping the director's"
			);
		}

		let score = Score::for_guess(&current.target_object, &guess);
		let outcome = TrialOutcome {
			dyad: self.id,
			trial_index: current.index,
			director_id: self.member(current.director).clone(),
			matcher_id: self.member(from).clone(),
			target_object: current.target_object.clone(),
			director_label: director_label.clone(),
			matcher_guess: guess.clone(),
			score,
			director_rt_ms: current.director_rt_ms,
			matcher_rt_ms: rt_ms,
		};

		info!(
			target = "dyad.dyad",
			dyad = %self.id,
			trial = current.index,
			target_object = %current.target_object,
			%guess,
			%score,
			"trial scored"
		);
		self.outstanding[from.index()] = None;
		self.phase = DyadPhase::FeedbackPending;
		for slot in Slot::BOTH {
			self.send(
				effects,
				slot,
				ServerMessage::RunFeedback {
					score,
					target_object: current.target_object.clone(),
					label: director_label.clone(),
					guess: guess.clone(),
				},
			);
		}
		effects.push(Effect::Record(outcome));
	}

	fn on_feedback_done(&mut self, from: Slot, effects: &mut Vec<Effect>) {
		self.outstanding[from.index()] = None;
		if self.outstanding[from.other().index()].is_some() {
			self.send(effects, from, ServerMessage::WaitForPartner);
		} else {
			self.begin_trial(effects);
		}
	}

	fn begin_trial(&mut self, effects: &mut Vec<Effect>) {
		let index = self.next_trial;
		let Some(planned) = self.plan.get(index).cloned() else {
			info!(target = "dyad.dyad", dyad = %self.id, trials = self.plan.len(), "session complete");
			self.phase = DyadPhase::Complete;
			self.current = None;
			for slot in Slot::BOTH {
				self.send(effects, slot, ServerMessage::SessionComplete);
			}
			return;
		};

		self.next_trial += 1;
		let director = planned.director;
		let matcher = planned.matcher();
		debug!(target = "dyad.dyad", dyad = %self.id, trial = index, %director, target_object = %planned.target_object, "trial started");

		self.phase = DyadPhase::DirectorPending;
		self.current = Some(CurrentTrial {
			index,
			target_object: planned.target_object.clone(),
			director,
			label: None,
			director_rt_ms: None,
		});

		let label_choices = self.experiment.label_choices(&planned.target_object);
		let partner_id = self.member(matcher).clone();
		self.send(
			effects,
			director,
			ServerMessage::RunDirector {
				target_object: planned.target_object,
				label_choices,
				partner_id,
			},
		);
		self.send(effects, matcher, ServerMessage::WaitForPartner);
	}

	fn send(&mut self, effects: &mut Vec<Effect>, to: Slot, message: ServerMessage) {
		let i = to.index();
		if matches!(message, ServerMessage::WaitForPartner) {
			if self.waiting[i] {
				return;
			}
			self.waiting[i] = true;
		} else {
			self.waiting[i] = false;
		}

		if let Some(reply) = message.expected_reply() {
			debug_assert!(self.outstanding[i].is_none(), "{to} already owes {:?}", self.outstanding[i]);
			self.outstanding[i] = Some(reply);
		}
		effects.push(Effect::Send { to, message });
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rand::rngs::StdRng;
	use rand::{Rng, SeedableRng};

	fn session(plan: TrialPlan) -> (DyadSession, Vec<Effect>) {
		DyadSession::start(DyadId::new(1), [ParticipantId::new("alice"), ParticipantId::new("bob")], plan, Arc::new(ExperimentConfig::default()))
	}

	fn msg(from: Slot, message: ClientMessage) -> DyadEvent {
		DyadEvent::Message { from, message }
	}

	fn director(target: &str, label: &str) -> ClientMessage {
		ClientMessage::Response(TrialResponse::Director {
			target_object: target.into(),
			label: label.into(),
			rt_ms: Some(500),
		})
	}

	fn matcher(label: &str, guess: &str) -> ClientMessage {
		ClientMessage::Response(TrialResponse::Matcher {
			label: label.into(),
			guess: guess.into(),
			rt_ms: Some(700),
		})
	}

	fn sends(effects: &[Effect]) -> Vec<(Slot, &'static str)> {
		effects
			.iter()
			.filter_map(|effect| match effect {
				Effect::Send { to, message } => Some((*to, message.kind())),
				Effect::Record(_) => None,
			})
			.collect()
	}

	fn records(effects: &[Effect]) -> Vec<&TrialOutcome> {
		effects
			.iter()
			.filter_map(|effect| match effect {
				Effect::Record(outcome) => Some(outcome),
				Effect::Send { .. } => None,
			})
			.collect()
	}

	/// Drives both members through acknowledgements up to the first director instruction.
	fn started(plan: TrialPlan) -> DyadSession {
		let (mut dyad, _) = session(plan);
		dyad.handle(msg(Slot::A, ClientMessage::InstructionsDone));
		dyad.handle(msg(Slot::B, ClientMessage::InstructionsDone));
		dyad
	}

	#[test]
	fn start_pairs_both_members() {
		let (dyad, effects) = session(TrialPlan::alternating(["object4"], Slot::A));
		assert_eq!(sends(&effects), vec![(Slot::A, "PAIRED"), (Slot::B, "PAIRED")]);
		match &effects[0] {
			Effect::Send {
				message: ServerMessage::Paired { partner_id },
				..
			} => assert_eq!(partner_id.as_str(), "bob"),
			other => panic!("unexpected effect {other:?}"),
		}
		assert_eq!(dyad.phase(), DyadPhase::AwaitingInstructionsAck);
	}

	#[test]
	fn first_ack_waits_for_partner() {
		let (mut dyad, _) = session(TrialPlan::alternating(["object4"], Slot::B));
		let effects = dyad.handle(msg(Slot::A, ClientMessage::InstructionsDone));
		assert_eq!(sends(&effects), vec![(Slot::A, "WAIT_FOR_PARTNER")]);

		// A is already waiting and becomes the matcher: no second wait instruction.
		let effects = dyad.handle(msg(Slot::B, ClientMessage::InstructionsDone));
		assert_eq!(sends(&effects), vec![(Slot::B, "RUN_DIRECTOR")]);
		assert_eq!(dyad.phase(), DyadPhase::DirectorPending);
	}

	#[test]
	fn director_response_hands_label_to_matcher() {
		let mut dyad = started(TrialPlan::alternating(["object4"], Slot::A));
		let effects = dyad.handle(msg(Slot::A, director("object4", "zopekil")));
		assert_eq!(sends(&effects), vec![(Slot::A, "WAIT_FOR_PARTNER"), (Slot::B, "RUN_MATCHER")]);
		match &effects[1] {
			Effect::Send {
				message: ServerMessage::RunMatcher {
					label,
					object_choices,
					partner_id,
				},
				..
			} => {
				assert_eq!(label, "zopekil");
				assert_eq!(object_choices, &vec!["object4".to_string(), "object5".to_string()]);
				assert_eq!(partner_id.as_str(), "alice");
			}
			other => panic!("unexpected effect {other:?}"),
		}
		assert_eq!(dyad.phase(), DyadPhase::MatcherPending);
	}

	#[test]
	fn correct_guess_scores_one() {
		let mut dyad = started(TrialPlan::alternating(["object4"], Slot::A));
		dyad.handle(msg(Slot::A, director("object4", "zop")));
		let effects = dyad.handle(msg(Slot::B, matcher("zop", "object4")));

		assert_eq!(sends(&effects), vec![(Slot::A, "RUN_FEEDBACK"), (Slot::B, "RUN_FEEDBACK")]);
		let recorded = records(&effects);
		assert_eq!(recorded.len(), 1);
		assert_eq!(recorded[0].score, Score::SUCCESS);
		assert_eq!(recorded[0].director_id.as_str(), "alice");
		assert_eq!(recorded[0].matcher_id.as_str(), "bob");
		assert_eq!(recorded[0].director_rt_ms, Some(500));
		assert_eq!(recorded[0].matcher_rt_ms, Some(700));
	}

	#[test]
	fn wrong_guess_scores_zero() {
		let mut dyad = started(TrialPlan::alternating(["object4"], Slot::A));
		dyad.handle(msg(Slot::A, director("object4", "zop")));
		let effects = dyad.handle(msg(Slot::B, matcher("zop", "object5")));

		let recorded = records(&effects);
		assert_eq!(recorded[0].score, Score::FAILURE);
		match &effects[0] {
			Effect::Send {
				message: ServerMessage::RunFeedback { score, guess, target_object, .. },
				..
			} => {
				assert_eq!(score.value(), 0);
				assert_eq!(guess, "object5");
				assert_eq!(target_object, "object4");
			}
			other => panic!("unexpected effect {other:?}"),
		}
	}

	#[test]
	fn roles_alternate_over_two_trials() {
		let mut dyad = started(TrialPlan::alternating(["object4", "object5"], Slot::A));
		dyad.handle(msg(Slot::A, director("object4", "zop")));
		dyad.handle(msg(Slot::B, matcher("zop", "object4")));

		let effects = dyad.handle(msg(Slot::B, ClientMessage::FeedbackDone));
		assert_eq!(sends(&effects), vec![(Slot::B, "WAIT_FOR_PARTNER")]);

		// B's wait ends with its director instruction.
		let effects = dyad.handle(msg(Slot::A, ClientMessage::FeedbackDone));
		assert_eq!(sends(&effects), vec![(Slot::B, "RUN_DIRECTOR"), (Slot::A, "WAIT_FOR_PARTNER")]);
		assert_eq!(dyad.trial_index(), Some(1));

		dyad.handle(msg(Slot::B, director("object5", "zopudon")));
		let effects = dyad.handle(msg(Slot::A, matcher("zopudon", "object5")));
		let recorded = records(&effects);
		assert_eq!(recorded[0].director_id.as_str(), "bob");
		assert_eq!(recorded[0].matcher_id.as_str(), "alice");
		assert_eq!(recorded[0].trial_index, 1);

		dyad.handle(msg(Slot::A, ClientMessage::FeedbackDone));
		let effects = dyad.handle(msg(Slot::B, ClientMessage::FeedbackDone));
		assert_eq!(sends(&effects), vec![(Slot::A, "SESSION_COMPLETE"), (Slot::B, "SESSION_COMPLETE")]);
		assert_eq!(dyad.phase(), DyadPhase::Complete);
	}

	#[test]
	fn dropout_while_matcher_pending_notifies_director_only() {
		let mut dyad = started(TrialPlan::alternating(["object4", "object5"], Slot::A));
		dyad.handle(msg(Slot::A, director("object4", "zop")));
		assert_eq!(dyad.phase(), DyadPhase::MatcherPending);

		let effects = dyad.handle(DyadEvent::Disconnected { slot: Slot::B });
		assert_eq!(sends(&effects), vec![(Slot::A, "PARTNER_DROPPED")]);
		assert!(records(&effects).is_empty());
		assert_eq!(dyad.phase(), DyadPhase::Dropped);
		assert_eq!(dyad.outstanding(Slot::A), None);
	}

	#[test]
	fn teardown_is_idempotent() {
		let mut dyad = started(TrialPlan::alternating(["object4"], Slot::A));
		assert_eq!(dyad.handle(DyadEvent::Disconnected { slot: Slot::A }).len(), 1);
		assert!(dyad.handle(DyadEvent::Disconnected { slot: Slot::A }).is_empty());
		assert!(dyad.handle(DyadEvent::Disconnected { slot: Slot::B }).is_empty());
		assert!(dyad.handle(msg(Slot::B, ClientMessage::FeedbackDone)).is_empty());
		assert_eq!(dyad.phase(), DyadPhase::Dropped);
	}

	#[test]
	fn disconnect_after_completion_notifies_nobody() {
		let mut dyad = started(TrialPlan::default());
		assert_eq!(dyad.phase(), DyadPhase::Complete);
		assert!(dyad.handle(DyadEvent::Disconnected { slot: Slot::B }).is_empty());
		assert_eq!(dyad.phase(), DyadPhase::Complete);
	}

	#[test]
	fn responses_from_the_wrong_member_are_dropped() {
		let mut dyad = started(TrialPlan::alternating(["object4"], Slot::A));
		assert!(dyad.handle(msg(Slot::B, director("object4", "zop"))).is_empty());
		assert!(dyad.handle(msg(Slot::A, matcher("zop", "object4"))).is_empty());
		assert!(dyad.handle(msg(Slot::A, ClientMessage::FeedbackDone)).is_empty());
		assert_eq!(dyad.phase(), DyadPhase::DirectorPending);
		assert_eq!(dyad.outstanding(Slot::A), Some(ReplyKind::DirectorResponse));
	}

	#[test]
	fn director_naming_another_target_is_dropped() {
		let mut dyad = started(TrialPlan::alternating(["object4"], Slot::A));
		assert!(dyad.handle(msg(Slot::A, director("object5", "zop"))).is_empty());
		assert_eq!(dyad.phase(), DyadPhase::DirectorPending);
		assert_eq!(dyad.handle(msg(Slot::A, director("object4", "zop"))).len(), 2);
	}

	#[test]
	fn duplicate_acks_are_dropped() {
		let (mut dyad, _) = session(TrialPlan::alternating(["object4"], Slot::A));
		dyad.handle(msg(Slot::A, ClientMessage::InstructionsDone));
		assert!(dyad.handle(msg(Slot::A, ClientMessage::InstructionsDone)).is_empty());
		assert_eq!(dyad.phase(), DyadPhase::AwaitingInstructionsAck);
	}

	/// Replays a whole session with both members answering in random order and
	/// checks that nobody is ever sent a second reply-expecting instruction
	/// before answering the first.
	#[test]
	fn at_most_one_outstanding_instruction_per_member() {
		let mut rng = StdRng::seed_from_u64(11);
		let config = ExperimentConfig::default();

		for _ in 0..50 {
			let plan = TrialPlan::generate(&config, &mut rng);
			let trials = plan.len();
			let (mut dyad, mut effects) = session(plan);
			let mut owed: [Option<ServerMessage>; 2] = [None, None];
			let mut recorded = 0;

			loop {
				for effect in effects.drain(..) {
					match effect {
						Effect::Send { to, message } => {
							if message.expected_reply().is_some() {
								assert!(owed[to.index()].is_none(), "{to} got {message:?} while owing {:?}", owed[to.index()]);
								owed[to.index()] = Some(message);
							}
						}
						Effect::Record(_) => recorded += 1,
					}
				}

				let ready: Vec<Slot> = Slot::BOTH.into_iter().filter(|slot| owed[slot.index()].is_some()).collect();
				if ready.is_empty() {
					break;
				}
				let slot = ready[rng.gen_range(0..ready.len())];
				let reply = match owed[slot.index()].take() {
					Some(ServerMessage::Paired { .. }) => ClientMessage::InstructionsDone,
					Some(ServerMessage::RunFeedback { .. }) => ClientMessage::FeedbackDone,
					Some(ServerMessage::RunDirector { target_object, label_choices, .. }) => director(&target_object, &label_choices[0]),
					Some(ServerMessage::RunMatcher { label, object_choices, .. }) => {
						matcher(&label, &object_choices[rng.gen_range(0..object_choices.len())])
					}
					other => panic!("nothing should be owed for {other:?}"),
				};
				effects = dyad.handle(msg(slot, reply));
			}

			assert_eq!(dyad.phase(), DyadPhase::Complete);
			assert_eq!(recorded, trials);
		}
	}
}
