use std::path::{Path, PathBuf};
use std::process::Command;

use serde_json::json;
use tempfile::TempDir;

fn dyad_binary() -> PathBuf {
	let mut path = std::env::current_exe().expect("current_exe should resolve");
	path.pop();
	path.pop();
	path.push("dyad");
	path
}

fn run_json(workdir: &Path, args: &[&str]) -> (bool, serde_json::Value, String) {
	let output = Command::new(dyad_binary())
		.current_dir(workdir)
		.args(["-f", "json"])
		.args(args)
		.output()
		.expect("failed to execute dyad");

	let stdout = String::from_utf8_lossy(&output.stdout).to_string();
	let stderr = String::from_utf8_lossy(&output.stderr).to_string();
	let parsed = serde_json::from_str::<serde_json::Value>(&stdout).unwrap_or_else(|_| json!({ "raw": stdout }));
	(output.status.success(), parsed, stderr)
}

#[test]
fn plan_with_seed_lists_alternating_trials() {
	let tmp = TempDir::new().expect("temp dir should be created");

	let (success, json, stderr) = run_json(tmp.path(), &["plan", "--seed", "4"]);
	assert!(success, "plan failed: {stderr}");
	assert_eq!(json["ok"], true);
	assert_eq!(json["command"], "plan");
	assert_eq!(json["inputs"]["seed"], 4);

	let trials = json["data"]["trials"].as_array().expect("trials array");
	assert_eq!(trials.len(), 8);
	assert_eq!(trials.iter().filter(|t| t["targetObject"] == "object5").count(), 2);
	for pair in trials.windows(2) {
		assert_ne!(pair[0]["director"], pair[1]["director"]);
	}
	assert_eq!(json["data"]["objectChoices"], json!(["object4", "object5"]));
}

#[test]
fn plan_is_reproducible_for_a_seed() {
	let tmp = TempDir::new().expect("temp dir should be created");

	let (_, first, _) = run_json(tmp.path(), &["plan", "--seed", "11"]);
	let (_, second, _) = run_json(tmp.path(), &["plan", "--seed", "11"]);
	assert_eq!(first["data"], second["data"]);
}

#[test]
fn plan_reads_config_file() {
	let tmp = TempDir::new().expect("temp dir should be created");
	let config = tmp.path().join("experiment.json");
	std::fs::write(
		&config,
		r#"{"targets":["object5","object4"],"shuffleTargets":false,"randomFirstDirector":false}"#,
	)
	.expect("config should be written");

	let (success, json, stderr) = run_json(tmp.path(), &["plan", "--config", config.to_str().unwrap()]);
	assert!(success, "plan failed: {stderr}");
	let trials = json["data"]["trials"].as_array().expect("trials array");
	assert_eq!(trials.len(), 2);
	assert_eq!(trials[0]["targetObject"], "object5");
	assert_eq!(trials[0]["director"], "A");
	assert_eq!(trials[0]["labelChoices"], json!(["zop", "zopudon"]));
	assert_eq!(trials[1]["director"], "B");
}

#[test]
fn invalid_config_reports_config_error() {
	let tmp = TempDir::new().expect("temp dir should be created");
	let config = tmp.path().join("experiment.json");
	std::fs::write(&config, r#"{"targets":["object9"]}"#).expect("config should be written");

	let (success, json, _) = run_json(tmp.path(), &["plan", "--config", config.to_str().unwrap()]);
	assert!(!success);
	assert_eq!(json["ok"], false);
	assert_eq!(json["error"]["code"], "CONFIG_ERROR");
	assert!(json["error"]["message"].as_str().unwrap().contains("object9"));
}

#[test]
fn missing_config_reports_config_error() {
	let tmp = TempDir::new().expect("temp dir should be created");

	let (success, json, _) = run_json(tmp.path(), &["plan", "--config", "nope.json"]);
	assert!(!success);
	assert_eq!(json["error"]["code"], "CONFIG_ERROR");
}
