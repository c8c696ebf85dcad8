//! Frame types and inbound classification.
//!
//! Every frame on the wire is a single JSON object. Outbound frames are always
//! [`Command`]s. Inbound frames are classified by [`Message::classify`]:
//!
//! | Shape | Classified as |
//! |-------|---------------|
//! | `{"type": "error", ...}` | [`Message::Error`] (id optional) |
//! | `{"id": n, "result": {...}}` | [`Message::Response`] |
//! | `{"method": "...", "params": {...}}` | [`Message::Event`] |
//! | anything else | [`Message::Unknown`] |

use serde::{Deserialize, Serialize};
use serde_json::Value;

fn empty_object() -> Value {
	Value::Object(serde_json::Map::new())
}

/// Command frame sent to the remote end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
	/// Correlation id, unique among pending commands of one connection.
	pub id: u64,
	/// Method name in `module.command` form.
	pub method: String,
	/// Method parameters.
	#[serde(default = "empty_object")]
	pub params: Value,
}

impl Command {
	pub fn new(id: u64, method: impl Into<String>, params: Value) -> Self {
		let params = if params.is_null() { empty_object() } else { params };
		Self {
			id,
			method: method.into(),
			params,
		}
	}
}

/// Successful command response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
	/// Id of the command this response answers.
	pub id: u64,
	/// Result payload, `null` when the frame carries none.
	#[serde(default)]
	pub result: Value,
}

/// Error frame. Correlated when `id` is present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorFrame {
	/// Id of the failing command, absent for connection-level errors.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub id: Option<u64>,
	/// Error code, e.g. `no such frame`.
	#[serde(default)]
	pub error: String,
	/// Human-readable message.
	#[serde(default)]
	pub message: String,
	/// Remote stack trace, if the endpoint provides one.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub stacktrace: Option<String>,
}

/// Unsolicited event pushed by the remote end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
	/// Event name in `module.event` form.
	pub method: String,
	/// Event payload.
	#[serde(default = "empty_object")]
	pub params: Value,
}

/// Inbound frame after classification.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
	Response(Response),
	Error(ErrorFrame),
	Event(Event),
	/// Valid JSON that matches no known frame shape (forward-compatible catch-all).
	Unknown(Value),
}

impl Message {
	/// Parses and classifies a text frame.
	pub fn parse(text: &str) -> serde_json::Result<Self> {
		Self::classify(serde_json::from_str(text)?)
	}

	/// Classifies an already-parsed frame.
	///
	/// Fails only when a frame has the discriminating keys of a known shape but
	/// their values are unusable (e.g. a non-integer `id`).
	pub fn classify(value: Value) -> serde_json::Result<Self> {
		if !value.is_object() {
			return Ok(Message::Unknown(value));
		}
		if value.get("type").and_then(Value::as_str) == Some("error") {
			return serde_json::from_value(value).map(Message::Error);
		}
		if value.get("id").is_some_and(|id| !id.is_null()) {
			return serde_json::from_value(value).map(Message::Response);
		}
		if value.get("method").is_some() {
			return serde_json::from_value(value).map(Message::Event);
		}
		Ok(Message::Unknown(value))
	}
}
