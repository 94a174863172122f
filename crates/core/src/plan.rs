//! Per-dyad trial plans.

use dyad_protocol::{Role, Slot};
use rand::Rng;
use rand::seq::SliceRandom;
use serde::Serialize;

use crate::config::ExperimentConfig;

/// One scheduled trial: what the director must describe and who directs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannedTrial {
	pub target_object: String,
	pub director: Slot,
}

impl PlannedTrial {
	pub fn matcher(&self) -> Slot {
		self.director.other()
	}

	pub fn role_of(&self, slot: Slot) -> Role {
		if slot == self.director { Role::Director } else { Role::Matcher }
	}
}

/// Ordered trial list fixed when a dyad is created.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct TrialPlan {
	trials: Vec<PlannedTrial>,
}

impl TrialPlan {
	pub fn new(trials: Vec<PlannedTrial>) -> Self {
		Self { trials }
	}

	/// Assigns directors in strict alternation starting from `first_director`.
	pub fn alternating(targets: impl IntoIterator<Item = impl Into<String>>, first_director: Slot) -> Self {
		let mut director = first_director;
		let trials = targets
			.into_iter()
			.map(|target| {
				let trial = PlannedTrial {
					target_object: target.into(),
					director,
				};
				director = director.other();
				trial
			})
			.collect();
		Self { trials }
	}

	/// Builds a plan from the experiment settings, drawing shuffle order and
	/// the first director from `rng`.
	pub fn generate<R: Rng + ?Sized>(config: &ExperimentConfig, rng: &mut R) -> Self {
		let mut targets = config.targets.clone();
		if config.shuffle_targets {
			targets.shuffle(rng);
		}
		let first = if config.random_first_director && rng.gen_bool(0.5) { Slot::B } else { Slot::A };
		Self::alternating(targets, first)
	}

	pub fn get(&self, index: usize) -> Option<&PlannedTrial> {
		self.trials.get(index)
	}

	pub fn len(&self) -> usize {
		self.trials.len()
	}

	pub fn is_empty(&self) -> bool {
		self.trials.is_empty()
	}

	pub fn iter(&self) -> impl Iterator<Item = &PlannedTrial> {
		self.trials.iter()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rand::SeedableRng;
	use rand::rngs::StdRng;

	#[test]
	fn alternating_swaps_roles_every_trial() {
		let plan = TrialPlan::alternating(["object4", "object5", "object4"], Slot::B);
		let directors: Vec<Slot> = plan.iter().map(|t| t.director).collect();
		assert_eq!(directors, vec![Slot::B, Slot::A, Slot::B]);
		assert_eq!(plan.get(1).unwrap().matcher(), Slot::B);
		assert_eq!(plan.get(1).unwrap().role_of(Slot::A), Role::Director);
	}

	#[test]
	fn generate_keeps_target_multiset() {
		let config = ExperimentConfig::default();
		let mut rng = StdRng::seed_from_u64(7);
		for _ in 0..20 {
			let plan = TrialPlan::generate(&config, &mut rng);
			let mut targets: Vec<&str> = plan.iter().map(|t| t.target_object.as_str()).collect();
			targets.sort_unstable();
			let mut expected: Vec<&str> = config.targets.iter().map(String::as_str).collect();
			expected.sort_unstable();
			assert_eq!(targets, expected);
			for pair in plan.trials.windows(2) {
				assert_ne!(pair[0].director, pair[1].director);
			}
		}
	}

	#[test]
	fn generate_without_randomness_is_identity() {
		let config = ExperimentConfig::default()
			.with_targets(["object5", "object4"])
			.with_shuffle(false)
			.with_random_first_director(false);
		let plan = TrialPlan::generate(&config, &mut StdRng::seed_from_u64(0));
		assert_eq!(plan, TrialPlan::alternating(["object5", "object4"], Slot::A));
	}

	#[test]
	fn random_first_director_reaches_both_slots() {
		let config = ExperimentConfig::default().with_random_first_director(true);
		let mut rng = StdRng::seed_from_u64(42);
		let firsts: Vec<Slot> = (0..64).map(|_| TrialPlan::generate(&config, &mut rng).get(0).unwrap().director).collect();
		assert!(firsts.contains(&Slot::A));
		assert!(firsts.contains(&Slot::B));
	}
}
