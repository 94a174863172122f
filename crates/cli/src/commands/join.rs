use std::time::Duration;

use anyhow::anyhow;
use dyad::protocol::ParticipantId;
use dyad::{AgentOutcome, AutoRenderer, ChoicePolicy, ClientChannel, SessionAgent, SessionSummary, TrialRenderer};
use rand::Rng;
use rand::distributions::Alphanumeric;
use serde_json::json;
use tracing::info;
use url::Url;

use crate::console::ConsoleRenderer;
use crate::error::{CliError, Result};
use crate::output::{DiagnosticLevel, OutputFormat, ResultBuilder, print_result};

const GENERATED_ID_LEN: usize = 10;

#[derive(Debug)]
pub struct JoinArgs {
	pub url: String,
	pub id: Option<String>,
	pub auto: bool,
	pub seed: Option<u64>,
	pub think_ms: u64,
}

pub async fn execute(args: JoinArgs, format: OutputFormat) -> Result<()> {
	let url = normalize_url(&args.url)?;
	let participant = match args.id {
		Some(id) if id.trim().is_empty() => return Err(CliError::InvalidInput("participant id must not be empty".into())),
		Some(id) => ParticipantId::new(id),
		None => generate_participant_id(),
	};
	let inputs = json!({
		"url": url,
		"participantId": participant,
		"auto": args.auto || args.seed.is_some(),
		"seed": args.seed,
	});

	info!(target = "dyad.agent", %url, participant = %participant, "connecting");
	let channel = ClientChannel::connect(&url).await?;

	let summary = if args.auto || args.seed.is_some() {
		let policy = args.seed.map_or(ChoicePolicy::First, ChoicePolicy::seeded);
		let renderer = AutoRenderer::new(policy).with_think_time(Duration::from_millis(args.think_ms));
		run_session(participant, channel, renderer).await?
	} else {
		run_session(participant, channel, ConsoleRenderer::stdio()).await?
	};

	let builder = ResultBuilder::new("join").inputs(inputs);
	let builder = match summary.outcome {
		AgentOutcome::Completed => builder,
		AgentOutcome::PartnerDropped => builder.diagnostic(DiagnosticLevel::Warning, "partner left before the session finished"),
		AgentOutcome::ConnectionLost => {
			return Err(CliError::ConnectionLost {
				participant: summary.participant_id,
			});
		}
	};
	print_result(&builder.data(summary).build(), format);
	Ok(())
}

async fn run_session<R: TrialRenderer>(participant: ParticipantId, channel: ClientChannel, renderer: R) -> Result<SessionSummary> {
	Ok(SessionAgent::new(participant, channel, renderer).run().await?)
}

/// Accepts `ws`/`wss` URLs as given and rewrites `http`/`https` to them.
pub fn normalize_url(raw: &str) -> Result<String> {
	let mut url = Url::parse(raw).map_err(|err| CliError::InvalidInput(format!("invalid broker url `{raw}`: {err}")))?;
	let scheme = match url.scheme() {
		"ws" | "wss" => None,
		"http" => Some("ws"),
		"https" => Some("wss"),
		other => return Err(CliError::InvalidInput(format!("unsupported url scheme `{other}`"))),
	};
	if let Some(scheme) = scheme {
		url.set_scheme(scheme).map_err(|()| anyhow!("cannot rewrite scheme of {raw}"))?;
	}
	Ok(url.into())
}

fn generate_participant_id() -> ParticipantId {
	let id: String = rand::thread_rng()
		.sample_iter(&Alphanumeric)
		.take(GENERATED_ID_LEN)
		.map(char::from)
		.collect();
	ParticipantId::new(id)
}
