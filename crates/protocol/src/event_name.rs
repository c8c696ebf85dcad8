//! Catalogue of events this client understands.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Event name not present in the [`EventName`] catalogue.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown event: {0}")]
pub struct UnknownEvent(pub String);

macro_rules! event_names {
	($($(#[$meta:meta])* $variant:ident => $name:literal,)+) => {
		/// Event names, grouped by protocol module.
		#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
		pub enum EventName {
			$($(#[$meta])* #[serde(rename = $name)] $variant,)+
		}

		impl EventName {
			/// Every known event, in catalogue order.
			pub const ALL: &'static [EventName] = &[$(EventName::$variant,)+];

			/// Wire name, e.g. `log.entryAdded`.
			pub fn as_str(self) -> &'static str {
				match self {
					$(EventName::$variant => $name,)+
				}
			}

			/// Looks up a wire name.
			pub fn from_name(name: &str) -> Option<Self> {
				match name {
					$($name => Some(EventName::$variant),)+
					_ => None,
				}
			}
		}
	};
}

event_names! {
	/// A browsing context (tab, window or frame) was created.
	ContextCreated => "browsingContext.contextCreated",
	/// A browsing context was closed.
	ContextDestroyed => "browsingContext.contextDestroyed",
	NavigationStarted => "browsingContext.navigationStarted",
	/// Only the fragment of the URL changed.
	FragmentNavigated => "browsingContext.fragmentNavigated",
	HistoryUpdated => "browsingContext.historyUpdated",
	DomContentLoaded => "browsingContext.domContentLoaded",
	Load => "browsingContext.load",
	DownloadWillBegin => "browsingContext.downloadWillBegin",
	NavigationAborted => "browsingContext.navigationAborted",
	NavigationCommitted => "browsingContext.navigationCommitted",
	NavigationFailed => "browsingContext.navigationFailed",
	UserPromptClosed => "browsingContext.userPromptClosed",
	/// An alert, confirm or prompt dialog opened.
	UserPromptOpened => "browsingContext.userPromptOpened",
	AuthRequired => "network.authRequired",
	BeforeRequestSent => "network.beforeRequestSent",
	FetchError => "network.fetchError",
	ResponseCompleted => "network.responseCompleted",
	ResponseStarted => "network.responseStarted",
	/// Message posted through a `script.ChannelValue`.
	Message => "script.message",
	RealmCreated => "script.realmCreated",
	RealmDestroyed => "script.realmDestroyed",
	/// Console or JavaScript log entry.
	EntryAdded => "log.entryAdded",
	FileDialogOpened => "input.fileDialogOpened",
}

impl EventName {
	/// Protocol module the event belongs to, e.g. `network`.
	pub fn module(self) -> &'static str {
		let name = self.as_str();
		name.split_once('.').map_or(name, |(module, _)| module)
	}
}

impl fmt::Display for EventName {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for EventName {
	type Err = UnknownEvent;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::from_name(s).ok_or_else(|| UnknownEvent(s.to_string()))
	}
}
