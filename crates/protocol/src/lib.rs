//! Wire types for the dyadic interaction protocol.
//!
//! This crate contains the serde-serializable messages exchanged between a
//! client session agent and the pairing broker. These types represent the
//! "protocol layer" - the shapes of data as they appear on the wire.
//!
//! # Design Philosophy
//!
//! Types in this crate are:
//! * Pure data: No behavior beyond serialization/deserialization
//! * Closed: every message type is an enum variant, unknown types are rejected
//! * Stable: Changes only when the wire protocol changes
//!
//! Pairing, turn-taking and rendering are built on top of these types in `dyad-rs`.

pub mod codec;
pub mod messages;
pub mod types;

pub use codec::*;
pub use messages::*;
pub use types::*;
