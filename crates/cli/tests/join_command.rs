use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use dyad::{BrokerConfig, BrokerServer, ExperimentConfig};
use serde_json::json;
use tokio::process::Command;

fn dyad_binary() -> PathBuf {
	let mut path = std::env::current_exe().expect("current_exe should resolve");
	path.pop();
	path.pop();
	path.push("dyad");
	path
}

async fn join(args: &[&str]) -> (bool, serde_json::Value, String) {
	let output = Command::new(dyad_binary())
		.args(["-f", "json", "join"])
		.args(args)
		.stdin(Stdio::null())
		.output()
		.await
		.expect("failed to execute dyad");

	let stdout = String::from_utf8_lossy(&output.stdout).to_string();
	let stderr = String::from_utf8_lossy(&output.stderr).to_string();
	let parsed = serde_json::from_str::<serde_json::Value>(&stdout).unwrap_or_else(|_| json!({ "raw": stdout }));
	(output.status.success(), parsed, stderr)
}

#[tokio::test]
async fn join_without_broker_reports_connection_failure() {
	let (success, json, _) = join(&["ws://127.0.0.1:1/ws", "--auto", "--id", "p1"]).await;
	assert!(!success);
	assert_eq!(json["ok"], false);
	assert_eq!(json["command"], "join");
	assert_eq!(json["error"]["code"], "CONNECTION_FAILED");
}

#[tokio::test]
async fn join_rejects_non_websocket_url() {
	let (success, json, _) = join(&["ftp://127.0.0.1/ws", "--auto"]).await;
	assert!(!success);
	assert_eq!(json["error"]["code"], "INVALID_INPUT");
}

#[tokio::test]
async fn two_auto_participants_complete_a_session() {
	let experiment = ExperimentConfig::default()
		.with_targets(["object4", "object5", "object4", "object4"])
		.with_random_first_director(false);
	let config = BrokerConfig::default()
		.with_bind("127.0.0.1:0".parse().unwrap())
		.with_experiment(experiment)
		.with_seed(2);
	let server = BrokerServer::new(config).bind().await.unwrap();
	// The CLI accepts http URLs and rewrites them.
	let url = format!("http://{}/ws", server.local_addr());
	let broker = server.broker();
	let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
	let serving = tokio::spawn(server.run_until(async {
		let _ = stop_rx.await;
	}));

	let alice_args = [url.as_str(), "--auto", "--id", "alice"];
	let bob_args = [url.as_str(), "--auto", "--seed", "9", "--id", "bob"];
	let first = join(&alice_args);
	let second = async {
		// alice waits in the pool, bob completes the pair
		tokio::time::sleep(Duration::from_millis(200)).await;
		join(&bob_args).await
	};
	let ((ok_a, a, err_a), (ok_b, b, err_b)) = tokio::time::timeout(Duration::from_secs(20), async { tokio::join!(first, second) })
		.await
		.expect("session should finish");

	assert!(ok_a, "alice failed: {err_a}");
	assert!(ok_b, "bob failed: {err_b}");
	for (summary, me, partner) in [(&a, "alice", "bob"), (&b, "bob", "alice")] {
		assert_eq!(summary["ok"], true);
		assert_eq!(summary["data"]["participantId"], me);
		assert_eq!(summary["data"]["partnerId"], partner);
		assert_eq!(summary["data"]["outcome"], "completed");
		assert_eq!(summary["data"]["directorTrials"], 2);
		assert_eq!(summary["data"]["matcherTrials"], 2);
	}
	assert_eq!(a["data"]["totalScore"], b["data"]["totalScore"]);

	let stats = broker.stats().await.unwrap();
	assert_eq!(stats.completed_dyads, 1);

	let _ = stop_tx.send(());
	serving.await.unwrap().unwrap();
}
