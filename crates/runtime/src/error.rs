use thiserror::Error;

/// Transport-level failures.
#[derive(Debug, Error)]
pub enum Error {
	#[error("invalid endpoint `{endpoint}`: {reason}")]
	InvalidEndpoint { endpoint: String, reason: String },

	#[error("websocket error: {0}")]
	WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

	#[error("failed to serialize frame: {0}")]
	Serialize(#[from] serde_json::Error),

	#[error("connection closed")]
	ConnectionClosed,
}

impl Error {
	/// Returns `true` when the peer went away rather than misbehaving.
	pub fn is_closed(&self) -> bool {
		use tokio_tungstenite::tungstenite::Error as WsError;

		match self {
			Error::ConnectionClosed => true,
			Error::WebSocket(err) => matches!(err, WsError::ConnectionClosed | WsError::AlreadyClosed | WsError::Io(_)),
			_ => false,
		}
	}
}

pub type Result<T> = std::result::Result<T, Error>;
