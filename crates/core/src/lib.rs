//! Pairing broker and client session agent for two-player referential
//! communication experiments.
//!
//! Participants connect over WebSocket and register. The [`broker`] pairs
//! them first-come first-served into dyads and walks each dyad through
//! alternating director/matcher trials with feedback; a dyad whose member
//! disconnects is torn down and the survivor is told so. The [`agent`] is the
//! client side: it follows broker instructions and renders them through a
//! [`agent::TrialRenderer`].
//!
//! # Example
//!
//! ```ignore
//! use dyad::{AutoRenderer, BrokerConfig, BrokerServer, ClientChannel, SessionAgent};
//!
//! let server = BrokerServer::new(BrokerConfig::default()).bind().await?;
//! let url = server.ws_url();
//! tokio::spawn(server.run_until(std::future::pending()));
//!
//! let channel = ClientChannel::connect(&url).await?;
//! let summary = SessionAgent::new("p1".into(), channel, AutoRenderer::default()).run().await?;
//! println!("{:?}", summary.outcome);
//! ```

pub mod agent;
pub mod broker;
pub mod config;
pub mod error;
pub mod plan;
pub mod server;
pub mod sink;

pub use agent::{AgentOutcome, AutoRenderer, ChoicePolicy, ClientChannel, SessionAgent, SessionSummary, TrialRenderer};
pub use broker::{Broker, BrokerHandle, BrokerStats, DyadId, DyadPhase, DyadSession};
pub use config::{BrokerConfig, ExperimentConfig, ObjectSpec, Vocabulary};
pub use dyad_protocol as protocol;
pub use error::{Error, Result};
pub use plan::{PlannedTrial, TrialPlan};
pub use server::{BoundServer, BrokerServer};
pub use sink::{JsonlSink, MemorySink, NullSink, TrialOutcome, TrialSink};
