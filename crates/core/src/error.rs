use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;

/// Errors produced by the broker, the session agent and their collaborators.
#[derive(Debug, Error)]
pub enum Error {
	#[error("invalid experiment config: {0}")]
	InvalidConfig(String),

	#[error("failed to read {path}: {source}")]
	ConfigRead {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("failed to parse {path}: {source}")]
	ConfigParse {
		path: PathBuf,
		#[source]
		source: serde_json::Error,
	},

	#[error("failed to bind {addr}: {source}")]
	Bind {
		addr: SocketAddr,
		#[source]
		source: std::io::Error,
	},

	#[error(transparent)]
	Transport(#[from] dyad_runtime::Error),

	#[error("renderer failed: {0}")]
	Render(String),

	#[error("broker is not running")]
	BrokerClosed,

	#[error("io error: {0}")]
	Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
