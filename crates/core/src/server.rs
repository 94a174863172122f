//! WebSocket front end for the broker.
//!
//! Each accepted socket gets a reader (this task) and a writer task. The
//! reader decodes frames and forwards them to the broker; the writer drains
//! the connection's outbound queue. Neither touches pool or dyad state.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Json;
use dyad_protocol::{decode_client, encode};
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::broker::{Broker, BrokerHandle, BrokerStats, ConnectionId, Outgoing};
use crate::config::BrokerConfig;
use crate::error::{Error, Result};
use crate::sink::{JsonlSink, NullSink, TrialSink};

/// Broker process builder.
pub struct BrokerServer {
	config: BrokerConfig,
	sink: Option<Arc<dyn TrialSink>>,
}

impl BrokerServer {
	pub fn new(config: BrokerConfig) -> Self {
		Self { config, sink: None }
	}

	/// Overrides the sink chosen from `data_dir`.
	pub fn with_sink(mut self, sink: Arc<dyn TrialSink>) -> Self {
		self.sink = Some(sink);
		self
	}

	/// Validates the config, binds the listener and starts the broker task.
	pub async fn bind(self) -> Result<BoundServer> {
		self.config.validate()?;

		let mut writer = None;
		let sink: Arc<dyn TrialSink> = match (self.sink, &self.config.data_dir) {
			(Some(sink), _) => sink,
			(None, Some(dir)) => {
				let (sink, task) = JsonlSink::spawn(dir)?;
				info!(target = "dyad.server", dir = %dir.display(), "recording trials");
				writer = Some(task);
				Arc::new(sink)
			}
			(None, None) => Arc::new(NullSink),
		};

		let listener = TcpListener::bind(self.config.bind).await.map_err(|source| Error::Bind {
			addr: self.config.bind,
			source,
		})?;
		let local_addr = listener.local_addr()?;

		let (broker, broker_task) = Broker::spawn(self.config.experiment.clone(), sink, self.config.seed);
		let router = router(&self.config.path, broker.clone());

		info!(target = "dyad.server", %local_addr, path = %self.config.path, "broker listening");
		Ok(BoundServer {
			listener,
			router,
			broker,
			broker_task,
			writer,
			local_addr,
			path: self.config.path,
		})
	}
}

/// A bound, not yet serving, broker process.
pub struct BoundServer {
	listener: TcpListener,
	router: Router,
	broker: BrokerHandle,
	broker_task: JoinHandle<()>,
	writer: Option<JoinHandle<()>>,
	local_addr: SocketAddr,
	path: String,
}

impl BoundServer {
	pub fn local_addr(&self) -> SocketAddr {
		self.local_addr
	}

	/// `ws://` URL participants connect to.
	pub fn ws_url(&self) -> String {
		format!("ws://{}{}", self.local_addr, self.path)
	}

	pub fn broker(&self) -> BrokerHandle {
		self.broker.clone()
	}

	/// Serves until `shutdown` resolves, then stops the broker.
	pub async fn run_until<F>(self, shutdown: F) -> Result<BrokerStats>
	where
		F: Future<Output = ()> + Send + 'static,
	{
		axum::serve(self.listener, self.router).with_graceful_shutdown(shutdown).await?;

		let stats = self.broker.stats().await.unwrap_or_default();
		self.broker.shutdown();
		let _ = self.broker_task.await;
		if let Some(writer) = self.writer {
			// The writer drains once the last sink clone (held by the broker) is dropped.
			let _ = writer.await;
		}
		info!(target = "dyad.server", ?stats, "broker stopped");
		Ok(stats)
	}
}

#[derive(Clone)]
struct AppState {
	broker: BrokerHandle,
}

#[derive(Debug, Serialize)]
struct Health {
	status: &'static str,
	#[serde(flatten)]
	stats: BrokerStats,
}

fn router(path: &str, broker: BrokerHandle) -> Router {
	Router::new()
		.route(path, get(ws_handler))
		.route("/healthz", get(healthz))
		.with_state(AppState { broker })
}

async fn healthz(State(state): State<AppState>) -> impl IntoResponse {
	match state.broker.stats().await {
		Ok(stats) => (StatusCode::OK, Json(Health { status: "ok", stats })),
		Err(_) => (
			StatusCode::SERVICE_UNAVAILABLE,
			Json(Health {
				status: "stopped",
				stats: BrokerStats::default(),
			}),
		),
	}
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
	ws.on_upgrade(move |socket| handle_socket(socket, state.broker))
}

async fn handle_socket(socket: WebSocket, broker: BrokerHandle) {
	let (conn, mut outbound) = broker.connect();
	let (mut sender, mut receiver) = socket.split();
	debug!(target = "dyad.server", %conn, "websocket accepted");

	let mut writer = tokio::spawn(async move {
		while let Some(item) = outbound.recv().await {
			match item {
				Outgoing::Message(message) => {
					if sender.send(Message::Text(encode(&message).into())).await.is_err() {
						break;
					}
				}
				Outgoing::Close => {
					let _ = sender.send(Message::Close(None)).await;
					break;
				}
			}
		}
		let _ = sender.close().await;
	});

	let reader = read_frames(conn, &mut receiver, &broker);
	tokio::select! {
		_ = reader => {}
		_ = &mut writer => {}
	}

	broker.disconnect(conn);
	writer.abort();
	debug!(target = "dyad.server", %conn, "websocket closed");
}

async fn read_frames(conn: ConnectionId, receiver: &mut futures_util::stream::SplitStream<WebSocket>, broker: &BrokerHandle) {
	while let Some(frame) = receiver.next().await {
		let text = match frame {
			Ok(Message::Text(text)) => text,
			Ok(Message::Binary(_)) => {
				warn!(target = "dyad.server", %conn, "binary frame dropped");
				continue;
			}
			Ok(Message::Close(_)) => break,
			Ok(_) => continue,
			Err(err) => {
				debug!(target = "dyad.server", %conn, error = %err, "websocket error");
				break;
			}
		};

		match decode_client(text.as_str()) {
			Ok(message) => {
				if !broker.deliver(conn, message) {
					break;
				}
			}
			Err(err) if err.is_unknown_type() => warn!(target = "dyad.server", %conn, error = %err, "unknown message type dropped"),
			Err(err) => warn!(target = "dyad.server", %conn, error = %err, "malformed message dropped"),
		}
	}
}
