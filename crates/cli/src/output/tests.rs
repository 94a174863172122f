use serde_json::json;

use super::*;

#[test]
fn success_envelope_is_camel_case() {
	let result = ResultBuilder::new("plan").inputs(json!({"seed": 4})).data(json!({"trials": 2})).build();
	assert!(result.ok);

	let value = serde_json::to_value(&result).unwrap();
	assert_eq!(value["ok"], true);
	assert_eq!(value["command"], "plan");
	assert_eq!(value["inputs"]["seed"], 4);
	assert_eq!(value["data"]["trials"], 2);
	assert!(value["durationMs"].is_u64());
	assert!(value.get("error").is_none());
	assert!(value.get("diagnostics").is_none());
}

#[test]
fn error_makes_result_not_ok() {
	let result = ResultBuilder::<()>::new("join").error(ErrorCode::ConnectionFailed, "refused").build();
	assert!(!result.ok);

	let value = serde_json::to_value(&result).unwrap();
	assert_eq!(value["error"]["code"], "CONNECTION_FAILED");
	assert_eq!(value["error"]["message"], "refused");
	assert!(value.get("data").is_none());
}

#[test]
fn data_with_error_is_still_a_failure() {
	let result = ResultBuilder::new("join")
		.data(json!({"outcome": "partner_dropped"}))
		.error(ErrorCode::RenderFailed, "stdin closed")
		.diagnostic(DiagnosticLevel::Warning, "partial session")
		.build();
	assert!(!result.ok);
	assert_eq!(result.diagnostics.len(), 1);
}

#[test]
fn error_codes_display_like_their_wire_form() {
	for code in [ErrorCode::InvalidInput, ErrorCode::ConfigError, ErrorCode::BindFailed, ErrorCode::IoError] {
		assert_eq!(serde_json::to_value(code).unwrap(), json!(code.to_string()));
	}
}

fn render(result: &CommandResult<serde_json::Value>, format: OutputFormat) -> String {
	let mut out = Vec::new();
	write_result(&mut out, result, format).unwrap();
	String::from_utf8(out).unwrap()
}

#[test]
fn ndjson_is_a_single_line() {
	let result = ResultBuilder::new("plan").data(json!({"trials": [1, 2]})).build();
	let text = render(&result, OutputFormat::Ndjson);
	assert_eq!(text.lines().count(), 1);
	let parsed: serde_json::Value = serde_json::from_str(text.trim()).unwrap();
	assert_eq!(parsed["data"]["trials"], json!([1, 2]));
}

#[test]
fn text_lists_data_fields_and_diagnostics() {
	let result = ResultBuilder::new("join")
		.data(json!({"outcome": "partner_dropped", "partnerId": "bob", "trials": ["a", "b"]}))
		.diagnostic(DiagnosticLevel::Warning, "partner left")
		.build();
	let text = render(&result, OutputFormat::Text);
	assert!(text.starts_with("join: ok\n"));
	assert!(text.contains("  outcome: partner_dropped\n"));
	assert!(text.contains("  trials:\n    - a\n    - b\n"));
	assert!(text.contains("  [warning] partner left\n"));
}

#[test]
fn text_shows_error_code() {
	let result = ResultBuilder::<serde_json::Value>::new("serve").error(ErrorCode::BindFailed, "address in use").build();
	let text = render(&result, OutputFormat::Text);
	assert!(text.starts_with("serve: failed\n"));
	assert!(text.contains("error [BIND_FAILED]: address in use"));
}
