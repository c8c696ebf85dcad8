//! Browsing-context extraction from event payloads.
//!
//! Most events carry a top-level `context`. The rest nest it under an
//! event-specific carrier (`source` for log entries, `realm` for realm events),
//! and a few tolerant fallbacks cover wrapper payloads.

use serde_json::Value;

use crate::event_name::EventName;

/// Depth limit for the last-resort search.
const SEARCH_DEPTH: usize = 3;

/// Returns the browsing-context id an event payload refers to, if any.
pub fn context_id(event: EventName, params: &Value) -> Option<String> {
	if let Some(ctx) = string_at(params, &["context"]) {
		return Some(ctx);
	}

	let carriers: &[&[&str]] = match event {
		EventName::EntryAdded => &[&["source", "context"]],
		EventName::Message => &[&["source", "context"], &["realm", "context"]],
		EventName::RealmCreated | EventName::RealmDestroyed => &[&["realm", "context"]],
		_ => &[],
	};
	let fallbacks: &[&[&str]] = &[
		&["target", "context"],
		&["params", "context"],
		&["browsingContext"],
	];

	carriers
		.iter()
		.chain(fallbacks)
		.find_map(|path| string_at(params, path))
		.or_else(|| find_key(params, "context", SEARCH_DEPTH))
}

fn string_at(root: &Value, path: &[&str]) -> Option<String> {
	let value = path.iter().try_fold(root, |node, key| node.get(key))?;
	primitive_to_string(value).filter(|s| !s.is_empty())
}

fn primitive_to_string(value: &Value) -> Option<String> {
	match value {
		Value::String(s) => Some(s.clone()),
		Value::Number(n) => Some(n.to_string()),
		Value::Bool(b) => Some(b.to_string()),
		_ => None,
	}
}

/// Breadth-first search for `key` holding a non-empty primitive.
fn find_key(root: &Value, key: &str, max_depth: usize) -> Option<String> {
	let mut level = vec![root];
	for _ in 0..=max_depth {
		let mut next = Vec::new();
		for node in level {
			match node {
				Value::Object(map) => {
					if let Some(found) = map
						.get(key)
						.and_then(primitive_to_string)
						.filter(|s| !s.is_empty())
					{
						return Some(found);
					}
					next.extend(map.values());
				}
				Value::Array(items) => next.extend(items),
				_ => {}
			}
		}
		if next.is_empty() {
			break;
		}
		level = next;
	}
	None
}
