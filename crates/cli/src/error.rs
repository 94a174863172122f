use thiserror::Error;

use crate::output::ErrorCode;

#[derive(Debug, Error)]
pub enum CliError {
	#[error(transparent)]
	Dyad(#[from] dyad::Error),

	#[error("invalid input: {0}")]
	InvalidInput(String),

	#[error("connection to the broker was lost before {participant}'s session ended")]
	ConnectionLost { participant: dyad::protocol::ParticipantId },

	#[error(transparent)]
	Anyhow(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, CliError>;

impl CliError {
	pub fn code(&self) -> ErrorCode {
		match self {
			CliError::Dyad(err) => match err {
				dyad::Error::InvalidConfig(_) | dyad::Error::ConfigRead { .. } | dyad::Error::ConfigParse { .. } => ErrorCode::ConfigError,
				dyad::Error::Bind { .. } => ErrorCode::BindFailed,
				dyad::Error::Transport(_) | dyad::Error::BrokerClosed => ErrorCode::ConnectionFailed,
				dyad::Error::Render(_) => ErrorCode::RenderFailed,
				dyad::Error::Io(_) => ErrorCode::IoError,
			},
			CliError::InvalidInput(_) => ErrorCode::InvalidInput,
			CliError::ConnectionLost { .. } => ErrorCode::ConnectionFailed,
			CliError::Anyhow(err) if err.downcast_ref::<std::io::Error>().is_some() => ErrorCode::IoError,
			CliError::Anyhow(_) => ErrorCode::InternalError,
		}
	}
}
