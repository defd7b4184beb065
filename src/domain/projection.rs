use serde::{Deserialize, Serialize};

/// Rendered, comparable representation of an entity's current state.
/// This is what gets sent to the sink; nothing else about the raw
/// snapshot survives past projection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Projection {
    pub rendered_text: String,
    pub image_ref: Option<String>,
    pub action_url: Option<String>,
}

impl Projection {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            rendered_text: text.into(),
            image_ref: None,
            action_url: None,
        }
    }

    /// Idempotence check: only the generated text is compared. An image
    /// or action-link change alone does not trigger a re-send.
    pub fn same_rendering(&self, other: &Projection) -> bool {
        self.rendered_text == other.rendered_text
    }
}
