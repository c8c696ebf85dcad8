//! `script` module payloads.

use serde_json::Value;

use crate::log::Source;
use crate::project::{Decode, Projection, ProjectionError};

/// `script.RealmInfo`, carried by `realmCreated`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RealmInfo {
	pub realm: String,
	pub origin: String,
	/// `window`, `dedicated-worker`, `service-worker`, ...
	pub realm_type: String,
	pub context: Option<String>,
	pub sandbox: Option<String>,
}

impl Decode for RealmInfo {
	fn decode(p: &Projection<'_>) -> Result<Self, ProjectionError> {
		Ok(Self {
			realm: p.string("realm")?,
			origin: p.string("origin")?,
			realm_type: p.string("type")?,
			context: p.opt_string("context")?,
			sandbox: p.opt_string("sandbox")?,
		})
	}
}

/// `script.realmDestroyed` payload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RealmDestroyed {
	pub realm: String,
}

impl Decode for RealmDestroyed {
	fn decode(p: &Projection<'_>) -> Result<Self, ProjectionError> {
		Ok(Self {
			realm: p.string("realm")?,
		})
	}
}

/// `script.message` payload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScriptMessage {
	pub channel: String,
	/// Serialized `script.RemoteValue`.
	pub data: Value,
	pub source: Source,
}

impl Decode for ScriptMessage {
	fn decode(p: &Projection<'_>) -> Result<Self, ProjectionError> {
		Ok(Self {
			channel: p.string("channel")?,
			data: p.raw("data"),
			source: p.nested("source")?,
		})
	}
}
