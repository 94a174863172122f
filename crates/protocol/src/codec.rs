//! Text-frame encoding and decoding.
//!
//! Decoding first checks the `type` discriminator against the closed set of
//! known message types, so an unrecognized type is reported separately from a
//! known type whose fields are malformed.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::messages::{ClientMessage, ServerMessage};

/// Message types a client may send.
pub const CLIENT_MESSAGE_TYPES: &[&str] = &["REGISTER", "RESPONSE", "INSTRUCTIONS_DONE", "FEEDBACK_DONE"];

/// Message types the broker may send.
pub const SERVER_MESSAGE_TYPES: &[&str] = &[
	"ENTER_WAITING_ROOM",
	"PAIRED",
	"WAIT_FOR_PARTNER",
	"RUN_DIRECTOR",
	"RUN_MATCHER",
	"RUN_FEEDBACK",
	"PARTNER_DROPPED",
	"SESSION_COMPLETE",
];

/// Why an inbound frame could not be turned into a message.
#[derive(Debug, Error)]
pub enum DecodeError {
	#[error("frame is not a JSON object: {0}")]
	NotJson(#[source] serde_json::Error),

	#[error("frame has no string `type` field")]
	MissingType,

	#[error("unknown message type `{0}`")]
	UnknownType(String),

	#[error("malformed `{kind}` message: {source}")]
	Malformed {
		kind: String,
		#[source]
		source: serde_json::Error,
	},
}

impl DecodeError {
	/// Returns `true` when the frame named a type outside the known set.
	pub fn is_unknown_type(&self) -> bool {
		matches!(self, DecodeError::UnknownType(_))
	}
}

/// Decodes a client frame.
pub fn decode_client(text: &str) -> Result<ClientMessage, DecodeError> {
	decode_with(text, CLIENT_MESSAGE_TYPES)
}

/// Decodes a broker frame.
pub fn decode_server(text: &str) -> Result<ServerMessage, DecodeError> {
	decode_with(text, SERVER_MESSAGE_TYPES)
}

/// Decodes an already-parsed client value.
pub fn client_from_value(value: Value) -> Result<ClientMessage, DecodeError> {
	from_value_with(value, CLIENT_MESSAGE_TYPES)
}

/// Decodes an already-parsed broker value.
pub fn server_from_value(value: Value) -> Result<ServerMessage, DecodeError> {
	from_value_with(value, SERVER_MESSAGE_TYPES)
}

/// Encodes any protocol message into a text frame.
pub fn encode<T: Serialize>(message: &T) -> String {
	// Protocol enums only contain strings, numbers and string lists.
	serde_json::to_string(message).unwrap_or_else(|_| String::from("{}"))
}

fn decode_with<T: DeserializeOwned>(text: &str, known: &[&str]) -> Result<T, DecodeError> {
	let value: Value = serde_json::from_str(text).map_err(DecodeError::NotJson)?;
	from_value_with(value, known)
}

fn from_value_with<T: DeserializeOwned>(value: Value, known: &[&str]) -> Result<T, DecodeError> {
	let kind = value.get("type").and_then(Value::as_str).ok_or(DecodeError::MissingType)?.to_string();

	if !known.contains(&kind.as_str()) {
		return Err(DecodeError::UnknownType(kind));
	}

	serde_json::from_value(value).map_err(|source| DecodeError::Malformed { kind, source })
}
