use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "dyad")]
#[command(about = "Pair participants into dyads and run referential communication trials")]
#[command(version)]
pub struct Cli {
	/// Increase verbosity (-v info, -vv debug)
	#[arg(short, long, global = true, action = clap::ArgAction::Count)]
	pub verbose: u8,

	/// Output format for the result envelope
	#[arg(short, long, global = true, value_enum, default_value_t = OutputFormat::Toon)]
	pub format: OutputFormat,

	#[command(subcommand)]
	pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
	/// Run the pairing broker until interrupted
	Serve {
		/// Address to listen on
		#[arg(long, default_value = "127.0.0.1:9001")]
		bind: SocketAddr,

		/// Path that upgrades to the participant WebSocket
		#[arg(long, default_value = "/ws")]
		path: String,

		/// Experiment config file (JSON)
		#[arg(short, long, value_name = "FILE")]
		config: Option<PathBuf>,

		/// Append each participant's trials to <DIR>/<participant>.jsonl
		#[arg(long, value_name = "DIR")]
		data_dir: Option<PathBuf>,

		/// Seed for trial plan generation
		#[arg(long)]
		seed: Option<u64>,
	},

	/// Join a broker as one participant
	Join {
		/// Broker WebSocket URL (http/https are rewritten to ws/wss)
		#[arg(default_value = "ws://127.0.0.1:9001/ws")]
		url: String,

		/// Participant id (random when omitted)
		#[arg(long)]
		id: Option<String>,

		/// Answer automatically instead of prompting
		#[arg(long)]
		auto: bool,

		/// Pick random choices with this seed (implies --auto)
		#[arg(long)]
		seed: Option<u64>,

		/// Delay before each automatic answer (ms)
		#[arg(long, value_name = "MS", default_value_t = 0)]
		think_ms: u64,
	},

	/// Print the trial plan a dyad would receive
	Plan {
		/// Experiment config file (JSON)
		#[arg(short, long, value_name = "FILE")]
		config: Option<PathBuf>,

		/// Seed for plan generation
		#[arg(long)]
		seed: Option<u64>,
	},
}

impl Commands {
	pub fn name(&self) -> &'static str {
		match self {
			Commands::Serve { .. } => "serve",
			Commands::Join { .. } => "join",
			Commands::Plan { .. } => "plan",
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn serve_defaults() {
		let cli = Cli::try_parse_from(["dyad", "serve"]).unwrap();
		assert_eq!(cli.verbose, 0);
		assert_eq!(cli.format, OutputFormat::Toon);
		match cli.command {
			Commands::Serve {
				bind,
				path,
				config,
				data_dir,
				seed,
			} => {
				assert_eq!(bind, "127.0.0.1:9001".parse::<SocketAddr>().unwrap());
				assert_eq!(path, "/ws");
				assert!(config.is_none());
				assert!(data_dir.is_none());
				assert!(seed.is_none());
			}
			other => panic!("unexpected command {other:?}"),
		}
	}

	#[test]
	fn global_flags_after_subcommand() {
		let cli = Cli::try_parse_from(["dyad", "plan", "--seed", "7", "-vv", "-f", "json"]).unwrap();
		assert_eq!(cli.verbose, 2);
		assert_eq!(cli.format, OutputFormat::Json);
		assert!(matches!(cli.command, Commands::Plan { seed: Some(7), .. }));
	}

	#[test]
	fn join_takes_url_and_id() {
		let cli = Cli::try_parse_from(["dyad", "join", "http://lab:8080/ws", "--id", "p1", "--auto", "--think-ms", "50"]).unwrap();
		match cli.command {
			Commands::Join {
				url,
				id,
				auto,
				seed,
				think_ms,
			} => {
				assert_eq!(url, "http://lab:8080/ws");
				assert_eq!(id.as_deref(), Some("p1"));
				assert!(auto);
				assert!(seed.is_none());
				assert_eq!(think_ms, 50);
			}
			other => panic!("unexpected command {other:?}"),
		}
	}

	#[test]
	fn bad_bind_address_is_rejected() {
		assert!(Cli::try_parse_from(["dyad", "serve", "--bind", "localhost"]).is_err());
	}
}
