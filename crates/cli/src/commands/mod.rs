pub mod join;
pub mod plan;
pub mod serve;

use std::path::Path;

use dyad::ExperimentConfig;

use crate::cli::Commands;
use crate::error::Result;
use crate::output::OutputFormat;

pub async fn dispatch(command: Commands, format: OutputFormat) -> Result<()> {
	match command {
		Commands::Serve {
			bind,
			path,
			config,
			data_dir,
			seed,
		} => {
			serve::execute(
				serve::ServeArgs {
					bind,
					path,
					config,
					data_dir,
					seed,
				},
				format,
			)
			.await
		}
		Commands::Join {
			url,
			id,
			auto,
			seed,
			think_ms,
		} => {
			join::execute(
				join::JoinArgs {
					url,
					id,
					auto,
					seed,
					think_ms,
				},
				format,
			)
			.await
		}
		Commands::Plan { config, seed } => plan::execute(config.as_deref(), seed, format),
	}
}

/// Reads the experiment config at `path`, falling back to the built-in one.
fn load_experiment(path: Option<&Path>) -> Result<ExperimentConfig> {
	match path {
		Some(path) => Ok(ExperimentConfig::load(path)?),
		None => Ok(ExperimentConfig::default()),
	}
}
