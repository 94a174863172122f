use std::path::Path;

use dyad::TrialPlan;
use dyad::protocol::Slot;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Serialize;
use serde_json::json;

use super::load_experiment;
use crate::error::Result;
use crate::output::{OutputFormat, ResultBuilder, print_result};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanData {
	pub trials: Vec<PlanRow>,
	pub object_choices: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanRow {
	pub index: usize,
	pub target_object: String,
	pub director: Slot,
	pub label_choices: Vec<String>,
}

pub fn execute(config: Option<&Path>, seed: Option<u64>, format: OutputFormat) -> Result<()> {
	let experiment = load_experiment(config)?;
	let mut rng = match seed {
		Some(seed) => StdRng::seed_from_u64(seed),
		None => StdRng::from_entropy(),
	};
	let plan = TrialPlan::generate(&experiment, &mut rng);

	let data = PlanData {
		trials: plan
			.iter()
			.enumerate()
			.map(|(index, trial)| PlanRow {
				index,
				target_object: trial.target_object.clone(),
				director: trial.director,
				label_choices: experiment.label_choices(&trial.target_object),
			})
			.collect(),
		object_choices: experiment.object_choices(),
	};

	let result = ResultBuilder::new("plan")
		.inputs(json!({ "config": config, "seed": seed }))
		.data(data)
		.build();
	print_result(&result, format);
	Ok(())
}
