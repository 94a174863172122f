//! Experiment and broker configuration.
//!
//! The experiment file is JSON with camelCase keys; every key is optional:
//!
//! ```json
//! {
//!   "vocabulary": [
//!     { "name": "object4", "labels": ["zop", "zopekil"] },
//!     { "name": "object5", "labels": ["zop", "zopudon"] }
//!   ],
//!   "targets": ["object4", "object4", "object4", "object5"],
//!   "shuffleTargets": true,
//!   "randomFirstDirector": true
//! }
//! ```

use std::collections::HashSet;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// An object participants can refer to, with the labels a director may use for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectSpec {
	pub name: String,
	pub labels: Vec<String>,
}

impl ObjectSpec {
	pub fn new(name: impl Into<String>, labels: impl IntoIterator<Item = impl Into<String>>) -> Self {
		Self {
			name: name.into(),
			labels: labels.into_iter().map(Into::into).collect(),
		}
	}
}

/// Ordered list of objects and their label variants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Vocabulary(Vec<ObjectSpec>);

impl Vocabulary {
	pub fn new(objects: Vec<ObjectSpec>) -> Self {
		Self(objects)
	}

	pub fn objects(&self) -> &[ObjectSpec] {
		&self.0
	}

	pub fn get(&self, name: &str) -> Option<&ObjectSpec> {
		self.0.iter().find(|object| object.name == name)
	}

	pub fn contains(&self, name: &str) -> bool {
		self.get(name).is_some()
	}

	/// Labels a director may choose from for `name`, in configured order.
	pub fn labels_for(&self, name: &str) -> Option<&[String]> {
		self.get(name).map(|object| object.labels.as_slice())
	}

	pub fn object_names(&self) -> Vec<String> {
		self.0.iter().map(|object| object.name.clone()).collect()
	}

	pub fn len(&self) -> usize {
		self.0.len()
	}

	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
}

impl Default for Vocabulary {
	fn default() -> Self {
		Self(vec![
			ObjectSpec::new("object4", ["zop", "zopekil"]),
			ObjectSpec::new("object5", ["zop", "zopudon"]),
		])
	}
}

/// Stimuli and trial ordering for every dyad the broker creates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ExperimentConfig {
	pub vocabulary: Vocabulary,
	/// One entry per trial, in presentation order before shuffling.
	pub targets: Vec<String>,
	pub shuffle_targets: bool,
	/// Pick the first director at random; otherwise slot A (the member that waited) directs first.
	pub random_first_director: bool,
	/// Objects offered to the matcher. Defaults to every vocabulary object.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub object_choices: Option<Vec<String>>,
}

impl Default for ExperimentConfig {
	fn default() -> Self {
		let block = ["object4", "object4", "object4", "object5"];
		Self {
			vocabulary: Vocabulary::default(),
			targets: block.iter().chain(block.iter()).map(|s| s.to_string()).collect(),
			shuffle_targets: true,
			random_first_director: true,
			object_choices: None,
		}
	}
}

impl ExperimentConfig {
	/// Reads and validates a config file.
	pub fn load(path: impl AsRef<Path>) -> Result<Self> {
		let path = path.as_ref();
		let raw = std::fs::read_to_string(path).map_err(|source| Error::ConfigRead {
			path: path.to_path_buf(),
			source,
		})?;
		let config: Self = serde_json::from_str(&raw).map_err(|source| Error::ConfigParse {
			path: path.to_path_buf(),
			source,
		})?;
		config.validate()?;
		Ok(config)
	}

	pub fn with_targets(mut self, targets: impl IntoIterator<Item = impl Into<String>>) -> Self {
		self.targets = targets.into_iter().map(Into::into).collect();
		self
	}

	pub fn with_shuffle(mut self, shuffle: bool) -> Self {
		self.shuffle_targets = shuffle;
		self
	}

	pub fn with_random_first_director(mut self, random: bool) -> Self {
		self.random_first_director = random;
		self
	}

	pub fn with_vocabulary(mut self, vocabulary: Vocabulary) -> Self {
		self.vocabulary = vocabulary;
		self
	}

	/// Checks that every trial can be rendered and answered.
	pub fn validate(&self) -> Result<()> {
		if self.vocabulary.len() < 2 {
			return Err(Error::InvalidConfig("vocabulary needs at least two objects".into()));
		}

		let mut seen = HashSet::new();
		for object in self.vocabulary.objects() {
			if !seen.insert(object.name.as_str()) {
				return Err(Error::InvalidConfig(format!("object `{}` is listed twice", object.name)));
			}
			if object.labels.is_empty() {
				return Err(Error::InvalidConfig(format!("object `{}` has no labels", object.name)));
			}
		}

		if self.targets.is_empty() {
			return Err(Error::InvalidConfig("target list is empty".into()));
		}

		for target in &self.targets {
			if !self.vocabulary.contains(target) {
				return Err(Error::InvalidConfig(format!("target `{target}` is not in the vocabulary")));
			}
		}

		if let Some(choices) = &self.object_choices {
			if choices.len() < 2 {
				return Err(Error::InvalidConfig("objectChoices needs at least two objects".into()));
			}
			for choice in choices {
				if !self.vocabulary.contains(choice) {
					return Err(Error::InvalidConfig(format!("object choice `{choice}` is not in the vocabulary")));
				}
			}
			if let Some(missing) = self.targets.iter().find(|target| !choices.contains(target)) {
				return Err(Error::InvalidConfig(format!("target `{missing}` is never offered to the matcher")));
			}
		}

		Ok(())
	}

	/// Objects shown to the matcher.
	pub fn object_choices(&self) -> Vec<String> {
		match &self.object_choices {
			Some(choices) => choices.clone(),
			None => self.vocabulary.object_names(),
		}
	}

	/// Labels shown to the director for `target`.
	pub fn label_choices(&self, target: &str) -> Vec<String> {
		self.vocabulary.labels_for(target).map(<[String]>::to_vec).unwrap_or_default()
	}
}

/// Settings for the broker process.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
	pub bind: SocketAddr,
	/// HTTP path that upgrades to the participant WebSocket.
	pub path: String,
	pub experiment: ExperimentConfig,
	/// Where per-participant trial logs are written, if anywhere.
	pub data_dir: Option<PathBuf>,
	/// Seed for plan generation; `None` draws from the OS.
	pub seed: Option<u64>,
}

impl Default for BrokerConfig {
	fn default() -> Self {
		Self {
			bind: SocketAddr::from((Ipv4Addr::LOCALHOST, 9001)),
			path: "/ws".to_string(),
			experiment: ExperimentConfig::default(),
			data_dir: None,
			seed: None,
		}
	}
}

impl BrokerConfig {
	pub fn with_bind(mut self, bind: SocketAddr) -> Self {
		self.bind = bind;
		self
	}

	pub fn with_path(mut self, path: impl Into<String>) -> Self {
		let path = path.into();
		self.path = if path.starts_with('/') { path } else { format!("/{path}") };
		self
	}

	pub fn with_experiment(mut self, experiment: ExperimentConfig) -> Self {
		self.experiment = experiment;
		self
	}

	pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
		self.data_dir = Some(dir.into());
		self
	}

	pub fn with_seed(mut self, seed: u64) -> Self {
		self.seed = Some(seed);
		self
	}

	pub fn validate(&self) -> Result<()> {
		if self.path == "/healthz" {
			return Err(Error::InvalidConfig("websocket path collides with /healthz".into()));
		}
		self.experiment.validate()
	}
}
