//! WebSocketTransport against a bare tungstenite peer.

use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;

use dyad_runtime::WebSocketTransport;

#[tokio::test]
async fn websocket_transport_exchanges_json_frames() -> anyhow::Result<()> {
	let listener = TcpListener::bind("127.0.0.1:0").await?;
	let addr = listener.local_addr()?;

	let server = tokio::spawn(async move {
		let (stream, _) = listener.accept().await.unwrap();
		let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
		let (mut ws_tx, mut ws_rx) = ws.split();

		let incoming = ws_rx.next().await.unwrap().unwrap();
		let value: serde_json::Value = serde_json::from_str(incoming.to_text().unwrap()).unwrap();
		assert_eq!(value, json!({"type": "REGISTER", "participant_id": "alice"}));

		ws_tx.send(Message::Text("not json".into())).await.unwrap();
		ws_tx.send(Message::Text(r#"{"type":"ENTER_WAITING_ROOM"}"#.into())).await.unwrap();
		ws_tx.send(Message::Text(r#"{"type":"PAIRED","partner_id":"bob"}"#.into())).await.unwrap();
		ws_tx.close().await.unwrap();
	});

	let url = format!("ws://{addr}/ws");
	let (transport, message_rx) = WebSocketTransport::connect(&url).await?;
	let parts = transport.into_transport_parts(message_rx);

	let mut sender = parts.sender;
	let mut rx = parts.message_rx;
	let recv_task = tokio::spawn(parts.receiver.run());

	sender.send(json!({"type": "REGISTER", "participant_id": "alice"})).await?;

	// The non-JSON frame is skipped; order of the rest is preserved.
	let first = rx.recv().await.expect("waiting room frame");
	assert_eq!(first["type"], "ENTER_WAITING_ROOM");
	let second = rx.recv().await.expect("paired frame");
	assert_eq!(second["type"], "PAIRED");
	assert_eq!(second["partner_id"], "bob");

	assert!(rx.recv().await.is_none(), "channel closes when the peer closes");
	let _ = recv_task.await?;
	server.await?;
	Ok(())
}

#[tokio::test]
async fn websocket_transport_rejects_http_endpoint() {
	let err = WebSocketTransport::connect("http://127.0.0.1:1/ws").await.err().expect("http scheme is rejected");
	assert!(matches!(err, dyad_runtime::Error::InvalidEndpoint { .. }));
}
