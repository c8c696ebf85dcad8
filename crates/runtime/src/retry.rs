//! Retry policy for commands answered with an error frame.
//!
//! The remote end may reject a command transiently, e.g. when it references a
//! browsing context that is mid-navigation. Such errors are retried by
//! re-sending the identical frame (same id) while the caller keeps waiting on
//! the original pending slot.
//!
//! Two bounds limit retries: a count (`max_retries`) and a time window since the
//! first send (`retry_window`). How they combine is selected by [`RetryBounds`].

use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_MAX_RETRIES: u32 = 5;
pub const DEFAULT_RETRY_WINDOW: Duration = Duration::from_secs(30);

/// How the count and window bounds combine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetryBounds {
	/// Retry while *either* bound still allows it. Under a fast burst of errors
	/// this retries until the window closes, regardless of `max_retries`.
	///
	/// The default window equals the default command timeout, so a command that
	/// only ever gets error frames keeps retrying until the call times out and
	/// ends as [`Error::Timeout`](crate::Error::Timeout). Pick [`Both`](Self::Both)
	/// or a window shorter than the timeout to get the protocol error instead.
	#[default]
	Either,
	/// Retry only while *both* bounds allow it.
	Both,
}

/// Outcome of consulting the policy for one error frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
	/// Re-send the original command and keep waiting.
	Retry,
	/// Resolve the caller with the error.
	Fail,
}

/// Bounded retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RetryPolicy {
	pub max_retries: u32,
	#[serde(rename = "retryWindowMs", with = "crate::config::millis")]
	pub retry_window: Duration,
	pub bounds: RetryBounds,
}

impl Default for RetryPolicy {
	fn default() -> Self {
		Self {
			max_retries: DEFAULT_MAX_RETRIES,
			retry_window: DEFAULT_RETRY_WINDOW,
			bounds: RetryBounds::Either,
		}
	}
}

impl RetryPolicy {
	/// Policy that never retries.
	pub fn disabled() -> Self {
		Self {
			max_retries: 0,
			retry_window: Duration::ZERO,
			bounds: RetryBounds::Both,
		}
	}

	pub fn with_max_retries(mut self, max_retries: u32) -> Self {
		self.max_retries = max_retries;
		self
	}

	pub fn with_retry_window(mut self, retry_window: Duration) -> Self {
		self.retry_window = retry_window;
		self
	}

	pub fn with_bounds(mut self, bounds: RetryBounds) -> Self {
		self.bounds = bounds;
		self
	}

	/// Decides whether an error for a command sent `elapsed` ago, already
	/// retried `retries` times, should be retried.
	pub fn decide(&self, elapsed: Duration, retries: u32) -> RetryDecision {
		let within_window = elapsed < self.retry_window;
		let within_count = retries < self.max_retries;
		let retry = match self.bounds {
			RetryBounds::Either => within_window || within_count,
			RetryBounds::Both => within_window && within_count,
		};
		if retry {
			RetryDecision::Retry
		} else {
			RetryDecision::Fail
		}
	}
}
