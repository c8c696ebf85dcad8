//! `log` module payloads.

use serde_json::Value;

use crate::project::{Decode, Projection, ProjectionError};

/// `script.Source`: the realm and browsing context a value originated from.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Source {
	pub realm: String,
	pub context: Option<String>,
}

impl Decode for Source {
	fn decode(p: &Projection<'_>) -> Result<Self, ProjectionError> {
		Ok(Self {
			realm: p.string("realm")?,
			context: p.opt_string("context")?,
		})
	}
}

/// `log.entryAdded` payload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogEntry {
	/// `console` or `javascript`.
	pub entry_type: String,
	/// `debug`, `info`, `warn` or `error`.
	pub level: String,
	pub source: Source,
	pub text: String,
	pub timestamp: u64,
	/// Console method (`log`, `warn`, ...) for console entries.
	pub method: String,
	/// Serialized console arguments.
	pub args: Vec<Value>,
	pub stack_trace: Value,
}

impl Decode for LogEntry {
	fn decode(p: &Projection<'_>) -> Result<Self, ProjectionError> {
		Ok(Self {
			entry_type: p.string("type")?,
			level: p.string("level")?,
			source: p.nested("source")?,
			text: p.string("text")?,
			timestamp: p.u64("timestamp")?,
			method: p.string("method")?,
			args: p.field("args")?,
			stack_trace: p.raw("stack_trace"),
		})
	}
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;
	use crate::project::project;

	#[test]
	fn test_console_entry() {
		let entry: LogEntry = project(&json!({
			"type": "console",
			"level": "warn",
			"source": {"realm": "realm-1", "context": "ctx-1"},
			"text": "x",
			"timestamp": 1700000000123u64,
			"method": "warn",
			"args": [{"type": "string", "value": "x"}]
		}))
		.unwrap();

		assert_eq!(entry.level, "warn");
		assert_eq!(entry.text, "x");
		assert_eq!(entry.source.context.as_deref(), Some("ctx-1"));
		assert_eq!(entry.args.len(), 1);
		assert!(entry.stack_trace.is_null());
	}

	#[test]
	fn test_null_text_defaults() {
		let entry: LogEntry = project(&json!({"level": "error", "text": null})).unwrap();
		assert_eq!(entry.text, "");
		assert_eq!(entry.source, Source::default());
	}
}
