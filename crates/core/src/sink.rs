//! Trial outcome persistence.
//!
//! The broker hands every finished trial to a [`TrialSink`]. Recording is
//! fire-and-forget: a sink must not block the dyad that produced the outcome.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dyad_protocol::{ParticipantId, Score};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::broker::DyadId;
use crate::error::Result;

/// One completed director/matcher exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrialOutcome {
	pub dyad: DyadId,
	pub trial_index: usize,
	pub director_id: ParticipantId,
	pub matcher_id: ParticipantId,
	pub target_object: String,
	pub director_label: String,
	pub matcher_guess: String,
	pub score: Score,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub director_rt_ms: Option<u64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub matcher_rt_ms: Option<u64>,
}

/// Destination for trial outcomes.
pub trait TrialSink: Send + Sync {
	fn record(&self, outcome: &TrialOutcome);
}

/// Discards every outcome.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl TrialSink for NullSink {
	fn record(&self, _outcome: &TrialOutcome) {}
}

/// Keeps outcomes in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
	outcomes: Mutex<Vec<TrialOutcome>>,
}

impl MemorySink {
	pub fn new() -> Arc<Self> {
		Arc::new(Self::default())
	}

	pub fn outcomes(&self) -> Vec<TrialOutcome> {
		self.outcomes.lock().clone()
	}

	pub fn len(&self) -> usize {
		self.outcomes.lock().len()
	}

	pub fn is_empty(&self) -> bool {
		self.outcomes.lock().is_empty()
	}
}

impl TrialSink for MemorySink {
	fn record(&self, outcome: &TrialOutcome) {
		self.outcomes.lock().push(outcome.clone());
	}
}

/// Appends each outcome as a JSON line to `<dir>/<participant>.jsonl`, once
/// for the director and once for the matcher.
///
/// Writes happen on a background task; dropping every clone of the sink lets
/// the task drain and exit.
#[derive(Debug, Clone)]
pub struct JsonlSink {
	tx: mpsc::UnboundedSender<TrialOutcome>,
}

impl JsonlSink {
	/// Creates `dir` and starts the writer task.
	pub fn spawn(dir: impl Into<PathBuf>) -> Result<(Self, JoinHandle<()>)> {
		let dir = dir.into();
		std::fs::create_dir_all(&dir)?;

		let (tx, rx) = mpsc::unbounded_channel();
		let task = tokio::spawn(write_outcomes(dir, rx));
		Ok((Self { tx }, task))
	}
}

impl TrialSink for JsonlSink {
	fn record(&self, outcome: &TrialOutcome) {
		if self.tx.send(outcome.clone()).is_err() {
			warn!(target = "dyad.sink", dyad = %outcome.dyad, trial = outcome.trial_index, "trial writer has stopped; outcome lost");
		}
	}
}

async fn write_outcomes(dir: PathBuf, mut rx: mpsc::UnboundedReceiver<TrialOutcome>) {
	while let Some(outcome) = rx.recv().await {
		let line = match serde_json::to_string(&outcome) {
			Ok(line) => line,
			Err(err) => {
				warn!(target = "dyad.sink", error = %err, "failed to encode trial outcome");
				continue;
			}
		};

		for participant in [&outcome.director_id, &outcome.matcher_id] {
			let path = participant_file(&dir, participant);
			if let Err(err) = append_line(&path, &line).await {
				warn!(target = "dyad.sink", path = %path.display(), error = %err, "failed to append trial outcome");
			}
		}
		debug!(target = "dyad.sink", dyad = %outcome.dyad, trial = outcome.trial_index, "trial outcome written");
	}
}

async fn append_line(path: &Path, line: &str) -> std::io::Result<()> {
	let mut file = tokio::fs::OpenOptions::new().create(true).append(true).open(path).await?;
	file.write_all(line.as_bytes()).await?;
	file.write_all(b"\n").await?;
	file.flush().await
}

/// Participant ids come from clients; keep them from escaping `dir`.
fn participant_file(dir: &Path, participant: &ParticipantId) -> PathBuf {
	let mut name: String = participant
		.as_str()
		.chars()
		.map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
		.collect();
	if name.is_empty() {
		name.push('_');
	}
	dir.join(format!("{name}.jsonl"))
}
