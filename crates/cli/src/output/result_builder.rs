use std::io::{self, Write};
use std::time::Instant;

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::output::format::OutputFormat;
use crate::output::model::{CommandError, CommandResult, Diagnostic, DiagnosticLevel, ErrorCode};

/// Builder for constructing command results.
pub struct ResultBuilder<T: Serialize> {
	command: String,
	inputs: Option<serde_json::Value>,
	data: Option<T>,
	error: Option<CommandError>,
	start_time: Instant,
	diagnostics: Vec<Diagnostic>,
}

impl<T: Serialize> ResultBuilder<T> {
	pub fn new(command: impl Into<String>) -> Self {
		Self {
			command: command.into(),
			inputs: None,
			data: None,
			error: None,
			start_time: Instant::now(),
			diagnostics: Vec::new(),
		}
	}

	pub fn inputs(mut self, inputs: serde_json::Value) -> Self {
		self.inputs = Some(inputs);
		self
	}

	pub fn data(mut self, data: T) -> Self {
		self.data = Some(data);
		self
	}

	pub fn error(mut self, code: ErrorCode, message: impl Into<String>) -> Self {
		self.error = Some(CommandError {
			code,
			message: message.into(),
		});
		self
	}

	pub fn diagnostic(mut self, level: DiagnosticLevel, message: impl Into<String>) -> Self {
		self.diagnostics.push(Diagnostic {
			level,
			message: message.into(),
		});
		self
	}

	pub fn build(self) -> CommandResult<T> {
		let ok = self.error.is_none() && self.data.is_some();
		let duration_ms = u64::try_from(self.start_time.elapsed().as_millis()).unwrap_or(u64::MAX);

		CommandResult {
			ok,
			command: self.command,
			inputs: self.inputs,
			data: self.data,
			error: self.error,
			duration_ms: Some(duration_ms),
			diagnostics: self.diagnostics,
		}
	}
}

/// Print a command result to stdout in the specified format.
pub fn print_result<T: Serialize>(result: &CommandResult<T>, format: OutputFormat) {
	let mut stdout = io::stdout().lock();
	if let Err(err) = write_result(&mut stdout, result, format) {
		debug!(target = "dyad", error = %err, "failed to write result");
	}
}

pub fn write_result<W: Write, T: Serialize>(out: &mut W, result: &CommandResult<T>, format: OutputFormat) -> io::Result<()> {
	let value = serde_json::to_value(result)?;
	match format {
		OutputFormat::Toon => writeln!(out, "{}", toon::encode(&value, None)),
		OutputFormat::Json => {
			serde_json::to_writer_pretty(&mut *out, &value)?;
			writeln!(out)
		}
		OutputFormat::Ndjson => {
			serde_json::to_writer(&mut *out, &value)?;
			writeln!(out)
		}
		OutputFormat::Text => write_text(out, &value),
	}
}

/// One line per top-level data field; arrays get one indented line per item.
fn write_text<W: Write>(out: &mut W, value: &Value) -> io::Result<()> {
	let command = value["command"].as_str().unwrap_or_default();
	let status = if value["ok"] == true { "ok" } else { "failed" };
	writeln!(out, "{command}: {status}")?;

	if let Some(error) = value.get("error") {
		writeln!(
			out,
			"  error [{}]: {}",
			error["code"].as_str().unwrap_or_default(),
			error["message"].as_str().unwrap_or_default()
		)?;
	}

	if let Some(Value::Object(data)) = value.get("data") {
		for (key, field) in data {
			match field {
				Value::Array(items) => {
					writeln!(out, "  {key}:")?;
					for item in items {
						writeln!(out, "    - {}", compact(item))?;
					}
				}
				other => writeln!(out, "  {key}: {}", compact(other))?,
			}
		}
	}

	for diag in value["diagnostics"].as_array().into_iter().flatten() {
		writeln!(
			out,
			"  [{}] {}",
			diag["level"].as_str().unwrap_or_default(),
			diag["message"].as_str().unwrap_or_default()
		)?;
	}

	if let Some(duration_ms) = value["durationMs"].as_u64() {
		writeln!(out, "  ({duration_ms}ms)")?;
	}
	Ok(())
}

fn compact(value: &Value) -> String {
	match value {
		Value::String(s) => s.clone(),
		other => other.to_string(),
	}
}
