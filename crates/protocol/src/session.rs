//! `session` module commands and results used for event subscriptions.

use serde::Serialize;

use crate::event_name::EventName;
use crate::project::{Decode, Projection, ProjectionError};

pub const SUBSCRIBE: &str = "session.subscribe";
pub const UNSUBSCRIBE: &str = "session.unsubscribe";

/// Parameters of `session.subscribe`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubscribeParams {
	pub events: Vec<EventName>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub contexts: Option<Vec<String>>,
}

impl SubscribeParams {
	pub fn new(event: EventName, scope: Option<&str>) -> Self {
		Self {
			events: vec![event],
			contexts: scope.map(|ctx| vec![ctx.to_string()]),
		}
	}
}

/// Parameters of `session.unsubscribe`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum UnsubscribeParams {
	/// By subscription id, when the endpoint returned one.
	ById { subscriptions: Vec<String> },
	/// By event name and contexts, for endpoints without subscription ids.
	ByAttributes {
		events: Vec<EventName>,
		#[serde(skip_serializing_if = "Option::is_none")]
		contexts: Option<Vec<String>>,
	},
}

impl UnsubscribeParams {
	pub fn new(token: Option<&str>, event: EventName, scope: Option<&str>) -> Self {
		match token {
			Some(id) => UnsubscribeParams::ById {
				subscriptions: vec![id.to_string()],
			},
			None => UnsubscribeParams::ByAttributes {
				events: vec![event],
				contexts: scope.map(|ctx| vec![ctx.to_string()]),
			},
		}
	}
}

/// Result of `session.subscribe`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubscribeResult {
	/// Subscription id; `None` for endpoints that predate subscription ids.
	pub subscription: Option<String>,
}

impl Decode for SubscribeResult {
	fn decode(p: &Projection<'_>) -> Result<Self, ProjectionError> {
		Ok(Self {
			subscription: p.opt_string("subscription")?,
		})
	}
}
