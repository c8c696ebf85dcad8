//! `network` module payloads.

use crate::project::{Decode, Projection, ProjectionError};

/// HTTP header. The value is flattened from `network.BytesValue`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Header {
	pub name: String,
	pub value: String,
}

impl Decode for Header {
	fn decode(p: &Projection<'_>) -> Result<Self, ProjectionError> {
		// Plain string values come from older endpoints.
		let value = match p.lookup("value") {
			Some(v) if v.is_object() => p.nested::<BytesValue>("value")?.value,
			_ => p.string("value")?,
		};
		Ok(Self {
			name: p.string("name")?,
			value,
		})
	}
}

struct BytesValue {
	value: String,
}

impl Decode for BytesValue {
	fn decode(p: &Projection<'_>) -> Result<Self, ProjectionError> {
		Ok(Self {
			value: p.string("value")?,
		})
	}
}

/// `network.RequestData`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestData {
	/// Request id, stable across redirects.
	pub request: String,
	pub url: String,
	pub method: String,
	pub headers: Vec<Header>,
	pub body_size: u64,
}

impl Decode for RequestData {
	fn decode(p: &Projection<'_>) -> Result<Self, ProjectionError> {
		Ok(Self {
			request: p.string("request")?,
			url: p.string("url")?,
			method: p.string("method")?,
			headers: p.list("headers")?,
			body_size: p.u64("body_size")?,
		})
	}
}

/// `network.ResponseData`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResponseData {
	pub url: String,
	pub protocol: String,
	pub status: u64,
	pub status_text: String,
	pub from_cache: bool,
	pub headers: Vec<Header>,
	pub mime_type: String,
	pub bytes_received: u64,
}

impl Decode for ResponseData {
	fn decode(p: &Projection<'_>) -> Result<Self, ProjectionError> {
		Ok(Self {
			url: p.string("url")?,
			protocol: p.string("protocol")?,
			status: p.u64("status")?,
			status_text: p.string("getStatusText")?,
			from_cache: p.boolean("fromCache")?,
			headers: p.list("headers")?,
			mime_type: p.string("mime_type")?,
			bytes_received: p.u64("bytes_received")?,
		})
	}
}

/// Payload shared by every `network` event.
///
/// `response` is populated for `authRequired`, `responseStarted` and
/// `responseCompleted`; `error_text` only for `fetchError`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NetworkEvent {
	pub context: Option<String>,
	pub is_blocked: bool,
	pub navigation: Option<String>,
	pub redirect_count: u64,
	pub request: RequestData,
	pub timestamp: u64,
	pub intercepts: Vec<String>,
	pub response: Option<ResponseData>,
	pub error_text: String,
}

impl Decode for NetworkEvent {
	fn decode(p: &Projection<'_>) -> Result<Self, ProjectionError> {
		Ok(Self {
			context: p.opt_string("context")?,
			is_blocked: p.boolean("isBlocked")?,
			navigation: p.opt_string("navigation")?,
			redirect_count: p.u64("redirect_count")?,
			request: p.nested("request")?,
			timestamp: p.u64("timestamp")?,
			intercepts: p.field("intercepts")?,
			response: p.nested_opt("response")?,
			error_text: p.string("error_text")?,
		})
	}
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;
	use crate::project::project;

	#[test]
	fn test_response_started() {
		let event: NetworkEvent = project(&json!({
			"context": "ctx-1",
			"isBlocked": false,
			"navigation": null,
			"redirectCount": 0,
			"request": {
				"request": "req-7",
				"url": "https://example.com/app.js",
				"method": "GET",
				"headers": [{"name": "accept", "value": {"type": "string", "value": "*/*"}}]
			},
			"timestamp": 1700000000000u64,
			"response": {
				"url": "https://example.com/app.js",
				"protocol": "http/1.1",
				"status": 200,
				"statusText": "OK",
				"fromCache": true,
				"headers": [],
				"mimeType": "text/javascript"
			}
		}))
		.unwrap();

		assert_eq!(event.context.as_deref(), Some("ctx-1"));
		assert_eq!(event.navigation, None);
		assert_eq!(event.request.request, "req-7");
		assert_eq!(event.request.headers[0].value, "*/*");

		let response = event.response.unwrap();
		assert_eq!(response.status, 200);
		assert_eq!(response.status_text, "OK");
		assert!(response.from_cache);
		assert_eq!(response.mime_type, "text/javascript");
	}

	#[test]
	fn test_fetch_error_without_response() {
		let event: NetworkEvent = project(&json!({
			"context": "ctx-1",
			"request": {"request": "req-1", "url": "https://unreachable.invalid/"},
			"errorText": "NS_ERROR_UNKNOWN_HOST"
		}))
		.unwrap();

		assert_eq!(event.error_text, "NS_ERROR_UNKNOWN_HOST");
		assert!(event.response.is_none());
		assert!(!event.is_blocked);
	}

	#[test]
	fn test_plain_string_header_value() {
		let header: Header = project(&json!({"name": "x-test", "value": "1"})).unwrap();
		assert_eq!(header.value, "1");
	}
}
