use std::net::SocketAddr;
use std::path::PathBuf;

use dyad::{BrokerConfig, BrokerServer, BrokerStats};
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};

use super::load_experiment;
use crate::error::Result;
use crate::output::{OutputFormat, ResultBuilder, print_result};

#[derive(Debug)]
pub struct ServeArgs {
	pub bind: SocketAddr,
	pub path: String,
	pub config: Option<PathBuf>,
	pub data_dir: Option<PathBuf>,
	pub seed: Option<u64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServeData {
	pub url: String,
	pub stats: BrokerStats,
}

pub async fn execute(args: ServeArgs, format: OutputFormat) -> Result<()> {
	let inputs = json!({
		"bind": args.bind.to_string(),
		"path": args.path,
		"config": args.config,
		"dataDir": args.data_dir,
		"seed": args.seed,
	});

	let mut config = BrokerConfig::default()
		.with_bind(args.bind)
		.with_path(args.path)
		.with_experiment(load_experiment(args.config.as_deref())?);
	if let Some(dir) = args.data_dir {
		config = config.with_data_dir(dir);
	}
	if let Some(seed) = args.seed {
		config = config.with_seed(seed);
	}

	let server = BrokerServer::new(config).bind().await?;
	let url = server.ws_url();
	info!(target = "dyad.server", %url, "press ctrl-c to stop");
	eprintln!("listening on {url}");

	let stats = server.run_until(shutdown_signal()).await?;

	let result = ResultBuilder::new("serve").inputs(inputs).data(ServeData { url, stats }).build();
	print_result(&result, format);
	Ok(())
}

async fn shutdown_signal() {
	if let Err(err) = tokio::signal::ctrl_c().await {
		// Without a signal handler the server runs until killed.
		warn!(target = "dyad.server", error = %err, "cannot listen for ctrl-c");
		std::future::pending::<()>().await;
	}
	info!(target = "dyad.server", "shutting down");
}
