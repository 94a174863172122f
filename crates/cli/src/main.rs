use clap::Parser;
use dyad_cli::cli::{Cli, Commands};
use dyad_cli::output::{ResultBuilder, print_result};
use dyad_cli::{commands, logging};
use tracing::{Level, error};

#[tokio::main]
async fn main() {
	let cli = Cli::parse();
	let base = match cli.command {
		Commands::Serve { .. } => Level::INFO,
		_ => Level::WARN,
	};
	logging::init_logging(cli.verbose, base);

	let name = cli.command.name();
	let format = cli.format;
	if let Err(err) = commands::dispatch(cli.command, format).await {
		error!(target = "dyad", command = name, error = %err, "command failed");
		let result = ResultBuilder::<()>::new(name).error(err.code(), err.to_string()).build();
		print_result(&result, format);
		std::process::exit(1);
	}
}
