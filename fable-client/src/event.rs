//! Typed events carried by the inbound narrative stream.

use serde::{Deserialize, Serialize};

/// One event from the narrative turn stream.
///
/// A turn produces exactly one `TextStructure` event defining its
/// paragraph set. `Image` events reference paragraphs by index and may
/// arrive in any order relative to the structure; `Audio` events carry
/// pre-synthesized narration keyed by the exact sentence text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NarrativeEvent {
    /// Progress message while the backend is generating.
    Status {
        #[serde(default)]
        message: String,
    },

    /// The turn's paragraphs and the three follow-up options.
    TextStructure {
        paragraphs: Vec<String>,
        #[serde(default)]
        options: Vec<String>,
    },

    /// Encoded illustration for the paragraph at `index`.
    Image { index: usize, data: String },

    /// Pre-synthesized narration audio for `text`.
    Audio { text: String, data: String },

    /// The backend finished producing events for this turn.
    Done,

    /// A turn-level failure; halts turn progression.
    Error {
        #[serde(default)]
        message: String,
    },

    /// Image generation failed; narration proceeds without it.
    ImageError,
}

impl NarrativeEvent {
    /// Whether this event ends the stream for the turn.
    pub fn is_terminal(&self) -> bool {
        matches!(self, NarrativeEvent::Done | NarrativeEvent::Error { .. })
    }
}
