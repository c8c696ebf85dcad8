//! Error types for the BiDi runtime.

use std::time::Duration;

use bidi_protocol::{ErrorFrame, ProjectionError};
use thiserror::Error;

/// Result type alias for runtime operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the BiDi runtime.
#[derive(Debug, Error)]
pub enum Error {
	/// No response arrived within the call's timeout.
	#[error("Timeout after {}ms waiting for '{method}' (id={id})", timeout.as_millis())]
	Timeout {
		method: String,
		id: u64,
		timeout: Duration,
	},

	/// The remote end answered with an error frame and retries were exhausted.
	#[error("Protocol error: {error}: {message}")]
	Protocol {
		/// Error code, e.g. `no such frame`.
		error: String,
		/// Human-readable message
		message: String,
		/// Remote stack trace (if available)
		stacktrace: Option<String>,
	},

	/// The connection closed while the operation was pending, or before it started.
	#[error("Connection closed")]
	ConnectionClosed,

	/// A payload could not be projected into the requested shape.
	#[error("Mapping error: {0}")]
	Mapping(#[from] ProjectionError),

	/// Failed to establish the transport.
	#[error("Failed to connect: {0}")]
	ConnectionFailed(String),

	/// Transport-level error.
	#[error("Transport error: {0}")]
	TransportError(String),

	/// Invalid configuration value.
	#[error("Invalid configuration: {0}")]
	InvalidConfig(String),

	/// I/O error.
	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),

	/// JSON serialization/deserialization error.
	#[error("JSON error: {0}")]
	Json(#[from] serde_json::Error),
}

impl Error {
	/// Returns true if this is a timeout error.
	pub fn is_timeout(&self) -> bool {
		matches!(self, Error::Timeout { .. })
	}

	/// Returns true if the connection closed under this operation.
	pub fn is_connection_closed(&self) -> bool {
		matches!(self, Error::ConnectionClosed)
	}

	/// Returns the remote error code if this is a protocol error.
	pub fn error_code(&self) -> Option<&str> {
		match self {
			Error::Protocol { error, .. } => Some(error),
			_ => None,
		}
	}

	/// Returns the remote stack trace if this is a protocol error with one.
	pub fn stack_trace(&self) -> Option<&str> {
		match self {
			Error::Protocol { stacktrace, .. } => stacktrace.as_deref(),
			_ => None,
		}
	}
}

impl From<ErrorFrame> for Error {
	fn from(frame: ErrorFrame) -> Self {
		Error::Protocol {
			error: frame.error,
			message: frame.message,
			stacktrace: frame.stacktrace,
		}
	}
}
