//! Transport plumbing shared by dyad clients and tests.
//!
//! A transport is split into three parts (see [`TransportParts`]): a sender
//! half, a receiver half that must be driven by [`TransportReceiver::run`],
//! and an unbounded channel the receiver pushes decoded JSON frames into.
//! Frames arrive in the order the peer sent them; the channel closes once the
//! receiver stops, which is how consumers observe a dropped connection.

pub mod error;
pub mod fake_transport;
pub mod transport;

pub use error::{Error, Result};
pub use fake_transport::{FakeTransportBuilder, FakeTransportController};
pub use transport::{Transport, TransportParts, TransportReceiver, WebSocketTransport};
