//! Connection configuration.
//!
//! A [`ConnectionConfig`] is built explicitly and handed to
//! [`Connection::with_config`](crate::Connection::with_config). Values can come
//! from code, from serde (e.g. a JSON or TOML settings file owned by the caller),
//! or from environment overrides via [`ConnectionConfig::from_env`].

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::retry::{RetryBounds, RetryPolicy};

pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

pub const ENV_COMMAND_TIMEOUT_MS: &str = "BIDI_COMMAND_TIMEOUT_MS";
pub const ENV_MAX_RETRIES: &str = "BIDI_MAX_RETRIES";
pub const ENV_RETRY_WINDOW_MS: &str = "BIDI_RETRY_WINDOW_MS";
pub const ENV_RETRY_BOUNDS: &str = "BIDI_RETRY_BOUNDS";

/// Per-connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ConnectionConfig {
	/// Default timeout for [`Connection::call`](crate::Connection::call).
	#[serde(rename = "commandTimeoutMs", with = "millis")]
	pub command_timeout: Duration,
	/// Retry policy for error frames.
	pub retry: RetryPolicy,
}

impl Default for ConnectionConfig {
	fn default() -> Self {
		Self {
			command_timeout: DEFAULT_COMMAND_TIMEOUT,
			retry: RetryPolicy::default(),
		}
	}
}

impl ConnectionConfig {
	pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
		self.command_timeout = timeout;
		self
	}

	pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
		self.retry = retry;
		self
	}

	/// Defaults overridden by `BIDI_*` environment variables.
	pub fn from_env() -> Result<Self> {
		Self::default().with_env_overrides(|key| std::env::var(key).ok())
	}

	/// Applies overrides from `lookup`, which maps a variable name to its value.
	pub fn with_env_overrides<F>(mut self, lookup: F) -> Result<Self>
	where
		F: Fn(&str) -> Option<String>,
	{
		if let Some(ms) = lookup(ENV_COMMAND_TIMEOUT_MS) {
			self.command_timeout = Duration::from_millis(parse_number(ENV_COMMAND_TIMEOUT_MS, &ms)?);
		}
		if let Some(count) = lookup(ENV_MAX_RETRIES) {
			self.retry.max_retries = parse_number(ENV_MAX_RETRIES, &count)?;
		}
		if let Some(ms) = lookup(ENV_RETRY_WINDOW_MS) {
			self.retry.retry_window = Duration::from_millis(parse_number(ENV_RETRY_WINDOW_MS, &ms)?);
		}
		if let Some(bounds) = lookup(ENV_RETRY_BOUNDS) {
			self.retry.bounds = match bounds.trim().to_ascii_lowercase().as_str() {
				"either" | "or" => RetryBounds::Either,
				"both" | "and" => RetryBounds::Both,
				other => {
					return Err(Error::InvalidConfig(format!(
						"{ENV_RETRY_BOUNDS}: expected 'either' or 'both', got '{other}'"
					)));
				}
			};
		}
		if self.command_timeout.is_zero() {
			return Err(Error::InvalidConfig(
				"command timeout must be greater than zero".to_string(),
			));
		}
		Ok(self)
	}
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T> {
	raw.trim()
		.parse()
		.map_err(|_| Error::InvalidConfig(format!("{key}: '{raw}' is not a valid number")))
}

/// Serde helpers for `Duration` as integer milliseconds.
pub(crate) mod millis {
	use std::time::Duration;

	use serde::{Deserialize, Deserializer, Serializer};

	pub fn serialize<S>(duration: &Duration, serializer: S) -> std::result::Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.serialize_u64(duration.as_millis() as u64)
	}

	pub fn deserialize<'de, D>(deserializer: D) -> std::result::Result<Duration, D::Error>
	where
		D: Deserializer<'de>,
	{
		u64::deserialize(deserializer).map(Duration::from_millis)
	}
}

#[cfg(test)]
mod tests {
	use std::collections::HashMap;

	use super::*;

	fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
		let vars: HashMap<String, String> = vars
			.iter()
			.map(|(k, v)| (k.to_string(), v.to_string()))
			.collect();
		move |key| vars.get(key).cloned()
	}

	#[test]
	fn test_defaults() {
		let config = ConnectionConfig::default();
		assert_eq!(config.command_timeout, Duration::from_secs(30));
		assert_eq!(config.retry.max_retries, 5);
		assert_eq!(config.retry.retry_window, Duration::from_secs(30));
		assert_eq!(config.retry.bounds, RetryBounds::Either);
	}

	#[test]
	fn test_env_overrides() {
		let config = ConnectionConfig::default()
			.with_env_overrides(lookup(&[
				(ENV_COMMAND_TIMEOUT_MS, "2500"),
				(ENV_MAX_RETRIES, "1"),
				(ENV_RETRY_WINDOW_MS, " 0 "),
				(ENV_RETRY_BOUNDS, "Both"),
			]))
			.unwrap();

		assert_eq!(config.command_timeout, Duration::from_millis(2500));
		assert_eq!(config.retry.max_retries, 1);
		assert_eq!(config.retry.retry_window, Duration::ZERO);
		assert_eq!(config.retry.bounds, RetryBounds::Both);
	}

	#[test]
	fn test_env_rejects_garbage() {
		let err = ConnectionConfig::default()
			.with_env_overrides(lookup(&[(ENV_MAX_RETRIES, "many")]))
			.unwrap_err();
		assert!(err.to_string().contains("BIDI_MAX_RETRIES"));

		let err = ConnectionConfig::default()
			.with_env_overrides(lookup(&[(ENV_RETRY_BOUNDS, "sometimes")]))
			.unwrap_err();
		assert!(matches!(err, Error::InvalidConfig(_)));

		let err = ConnectionConfig::default()
			.with_env_overrides(lookup(&[(ENV_COMMAND_TIMEOUT_MS, "0")]))
			.unwrap_err();
		assert!(matches!(err, Error::InvalidConfig(_)));
	}

	#[test]
	fn test_serde_round_trip() {
		let json = r#"{"commandTimeoutMs": 1000, "retry": {"maxRetries": 0}}"#;
		let config: ConnectionConfig = serde_json::from_str(json).unwrap();
		assert_eq!(config.command_timeout, Duration::from_secs(1));
		assert_eq!(config.retry.max_retries, 0);
		assert_eq!(config.retry.retry_window, Duration::from_secs(30));
	}
}
