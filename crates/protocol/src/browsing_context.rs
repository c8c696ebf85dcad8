//! `browsingContext` module payloads.

use crate::project::{Decode, Projection, ProjectionError};

/// `browsingContext.Info`, carried by `contextCreated`/`contextDestroyed`
/// and returned by `getTree`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BrowsingContextInfo {
	pub context: String,
	pub url: String,
	pub parent: Option<String>,
	pub user_context: String,
	pub original_opener: Option<String>,
	pub client_window: String,
	pub children: Vec<BrowsingContextInfo>,
}

impl Decode for BrowsingContextInfo {
	fn decode(p: &Projection<'_>) -> Result<Self, ProjectionError> {
		Ok(Self {
			context: p.string("context")?,
			url: p.string("url")?,
			parent: p.opt_string("parent")?,
			user_context: p.string("user_context")?,
			original_opener: p.opt_string("original_opener")?,
			client_window: p.string("client_window")?,
			children: p.list("children")?,
		})
	}
}

/// `browsingContext.NavigationInfo`, carried by the navigation lifecycle events.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NavigationInfo {
	pub context: String,
	pub navigation: Option<String>,
	pub timestamp: u64,
	pub url: String,
}

impl Decode for NavigationInfo {
	fn decode(p: &Projection<'_>) -> Result<Self, ProjectionError> {
		Ok(Self {
			context: p.string("context")?,
			navigation: p.opt_string("navigation")?,
			timestamp: p.u64("timestamp")?,
			url: p.string("url")?,
		})
	}
}

/// `browsingContext.userPromptOpened` payload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserPromptOpened {
	pub context: String,
	/// How the prompt will be handled: `accept`, `dismiss` or `ignore`.
	pub handler: String,
	pub message: String,
	/// `alert`, `beforeunload`, `confirm` or `prompt`.
	pub prompt_type: String,
	pub default_value: Option<String>,
}

impl Decode for UserPromptOpened {
	fn decode(p: &Projection<'_>) -> Result<Self, ProjectionError> {
		Ok(Self {
			context: p.string("context")?,
			handler: p.string("handler")?,
			message: p.string("message")?,
			prompt_type: p.string("type")?,
			default_value: p.opt_string("default_value")?,
		})
	}
}

/// `browsingContext.userPromptClosed` payload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserPromptClosed {
	pub context: String,
	pub accepted: bool,
	pub prompt_type: String,
	pub user_text: Option<String>,
}

impl Decode for UserPromptClosed {
	fn decode(p: &Projection<'_>) -> Result<Self, ProjectionError> {
		Ok(Self {
			context: p.string("context")?,
			accepted: p.boolean("accepted")?,
			prompt_type: p.string("type")?,
			user_text: p.opt_string("user_text")?,
		})
	}
}

/// Result of `browsingContext.create`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CreateResult {
	pub context: String,
}

impl Decode for CreateResult {
	fn decode(p: &Projection<'_>) -> Result<Self, ProjectionError> {
		Ok(Self {
			context: p.string("getContext")?,
		})
	}
}

/// Result of `browsingContext.navigate` and `browsingContext.reload`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NavigateResult {
	pub navigation: Option<String>,
	pub url: String,
}

impl Decode for NavigateResult {
	fn decode(p: &Projection<'_>) -> Result<Self, ProjectionError> {
		Ok(Self {
			navigation: p.opt_string("navigation")?,
			url: p.string("url")?,
		})
	}
}

/// Result of `browsingContext.getTree`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GetTreeResult {
	pub contexts: Vec<BrowsingContextInfo>,
}

impl Decode for GetTreeResult {
	fn decode(p: &Projection<'_>) -> Result<Self, ProjectionError> {
		Ok(Self {
			contexts: p.list("contexts")?,
		})
	}
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;
	use crate::project::project;

	#[test]
	fn test_create_result() {
		let result: CreateResult = project(&json!({"context": "ctx-1"})).unwrap();
		assert_eq!(result.context, "ctx-1");
	}

	#[test]
	fn test_get_tree_nested_children() {
		let result: GetTreeResult = project(&json!({
			"contexts": [{
				"context": "top",
				"url": "https://example.com/",
				"userContext": "default",
				"parent": null,
				"children": [{"context": "frame", "parent": "top", "children": null}]
			}]
		}))
		.unwrap();

		let top = &result.contexts[0];
		assert_eq!(top.context, "top");
		assert_eq!(top.user_context, "default");
		assert_eq!(top.parent, None);
		assert_eq!(top.children[0].parent.as_deref(), Some("top"));
		assert!(top.children[0].children.is_empty());
	}

	#[test]
	fn test_user_prompt_opened() {
		let prompt: UserPromptOpened = project(&json!({
			"context": "ctx-1",
			"handler": "dismiss",
			"message": "Sure?",
			"type": "confirm"
		}))
		.unwrap();

		assert_eq!(prompt.prompt_type, "confirm");
		assert_eq!(prompt.default_value, None);
	}
}
