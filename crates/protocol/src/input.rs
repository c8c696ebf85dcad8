//! `input` module payloads.

use serde_json::Value;

use crate::project::{Decode, Projection, ProjectionError};

/// `input.fileDialogOpened` payload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileDialogOpened {
	pub context: String,
	/// Shared reference to the `<input type=file>` element, when known.
	pub element: Option<Value>,
	pub multiple: bool,
}

impl Decode for FileDialogOpened {
	fn decode(p: &Projection<'_>) -> Result<Self, ProjectionError> {
		Ok(Self {
			context: p.string("context")?,
			element: p.lookup("element").cloned(),
			multiple: p.boolean("multiple")?,
		})
	}
}
