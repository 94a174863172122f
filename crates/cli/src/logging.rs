use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Installs the stderr subscriber. `RUST_LOG` wins over `verbose`.
///
/// `base` is the level used with no `-v`; each `-v` raises it one step.
pub fn init_logging(verbose: u8, base: Level) {
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directives(verbose, base)));

	let _ = tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_writer(std::io::stderr)
		.with_target(true)
		.try_init();
}

fn directives(verbose: u8, base: Level) -> String {
	let level = raise(base, verbose);
	format!("warn,dyad={level},dyad_cli={level},dyad_runtime={level}")
}

fn raise(base: Level, steps: u8) -> Level {
	let order = [Level::ERROR, Level::WARN, Level::INFO, Level::DEBUG, Level::TRACE];
	let start = order.iter().position(|l| *l == base).unwrap_or(1);
	order[(start + usize::from(steps)).min(order.len() - 1)]
}
