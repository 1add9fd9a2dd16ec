//! Playback state for a narrated turn.
//!
//! A turn's narration is a list of segments (paragraphs), each split
//! into sentences. The state machine tracks a cursor over that grid
//! and owns the advancement guard: sentence completion may be signaled
//! both by genuine audio end and by manual skip, and only the first
//! signal per sentence advances the cursor.

use crate::text::split_sentences;
use serde::{Deserialize, Serialize};

/// One paragraph of narration, with an optional scene illustration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NarrativeSegment {
    pub text: String,
    /// Base64-encoded image, attached when the backend delivers it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl NarrativeSegment {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            image: None,
        }
    }
}

/// Position within the segment/sentence grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PlaybackCursor {
    pub segment: usize,
    pub sentence: usize,
}

/// Coarse phase of the playback loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackState {
    /// No turn loaded.
    Idle,
    /// A turn stream is open but narration has not started.
    LoadingTurn,
    /// Narrating segments.
    PlayingSegment,
    /// Narration finished; waiting on a player choice.
    AwaitingChoice,
}

/// Result of advancing past a completed sentence.
#[derive(Debug, Clone, PartialEq)]
pub enum Advance {
    /// Moved to the next sentence of the current segment.
    NextSentence,
    /// Moved to the first sentence of the next segment.
    NextSegment,
    /// The final sentence finished; the options phase begins.
    TurnComplete { options: Vec<String> },
}

/// Cursor and phase tracking for one turn's narration.
pub struct PlaybackStateMachine {
    state: PlaybackState,
    segments: Vec<NarrativeSegment>,
    sentences: Vec<Vec<String>>,
    options: Vec<String>,
    cursor: PlaybackCursor,
    /// Set once the current sentence has been advanced past; re-armed
    /// by `begin_sentence`. Makes completion signals idempotent.
    advanced: bool,
}

impl Default for PlaybackStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaybackStateMachine {
    pub fn new() -> Self {
        Self {
            state: PlaybackState::Idle,
            segments: Vec::new(),
            sentences: Vec::new(),
            options: Vec::new(),
            cursor: PlaybackCursor::default(),
            advanced: false,
        }
    }

    pub fn state(&self) -> &PlaybackState {
        &self.state
    }

    pub fn cursor(&self) -> PlaybackCursor {
        self.cursor
    }

    pub fn segments(&self) -> &[NarrativeSegment] {
        &self.segments
    }

    pub fn options(&self) -> &[String] {
        &self.options
    }

    /// Mark that a turn stream was opened and content is on its way.
    pub fn begin_loading(&mut self) {
        self.state = PlaybackState::LoadingTurn;
    }

    /// Replace all content with a new turn's segments and options.
    ///
    /// Replacement is wholesale; nothing from the previous turn
    /// survives. Segments with no sentences are kept in the list (the
    /// cursor skips them) so image indices stay aligned with the
    /// backend's paragraph order.
    pub fn begin_turn(&mut self, paragraphs: Vec<String>, options: Vec<String>) {
        self.sentences = paragraphs.iter().map(|p| split_sentences(p)).collect();
        self.segments = paragraphs.into_iter().map(NarrativeSegment::new).collect();
        self.options = options;
        self.cursor = PlaybackCursor::default();
        self.advanced = false;

        if self.segments.is_empty() {
            self.state = PlaybackState::AwaitingChoice;
        } else {
            self.state = PlaybackState::PlayingSegment;
            self.skip_empty_segments();
        }
    }

    /// Attach an illustration to the segment at `index`.
    ///
    /// Out-of-range indices are ignored with a warning; images never
    /// interrupt narration.
    pub fn attach_image(&mut self, index: usize, data: impl Into<String>) {
        match self.segments.get_mut(index) {
            Some(segment) => segment.image = Some(data.into()),
            None => log::warn!("image index {index} out of range, dropping"),
        }
    }

    /// The sentence under the cursor, if narration is active.
    pub fn current_sentence(&self) -> Option<&str> {
        if self.state != PlaybackState::PlayingSegment {
            return None;
        }
        self.sentences
            .get(self.cursor.segment)?
            .get(self.cursor.sentence)
            .map(String::as_str)
    }

    /// The illustration for the segment under the cursor; `None`
    /// until (or unless) the backend delivers one.
    pub fn current_image(&self) -> Option<&str> {
        self.segments
            .get(self.cursor.segment)?
            .image
            .as_deref()
    }

    /// The sentence after the cursor within the current segment, used
    /// for prefetching. `None` at a segment boundary.
    pub fn next_sentence_in_segment(&self) -> Option<&str> {
        self.sentences
            .get(self.cursor.segment)?
            .get(self.cursor.sentence + 1)
            .map(String::as_str)
    }

    /// Re-arm the advancement guard for the sentence under the cursor.
    ///
    /// Called when that sentence's narration actually starts.
    pub fn begin_sentence(&mut self) {
        self.advanced = false;
    }

    /// Signal that the current sentence finished (audio end or skip).
    ///
    /// The first signal per sentence advances the cursor; repeats
    /// return `None` until `begin_sentence` re-arms the guard.
    pub fn complete_sentence(&mut self) -> Option<Advance> {
        if self.state != PlaybackState::PlayingSegment || self.advanced {
            return None;
        }
        self.advanced = true;

        let segment_len = self
            .sentences
            .get(self.cursor.segment)
            .map(Vec::len)
            .unwrap_or(0);

        if self.cursor.sentence + 1 < segment_len {
            self.cursor.sentence += 1;
            return Some(Advance::NextSentence);
        }

        self.cursor.segment += 1;
        self.cursor.sentence = 0;
        self.skip_empty_segments();

        if self.cursor.segment < self.segments.len() {
            return Some(Advance::NextSegment);
        }

        self.state = PlaybackState::AwaitingChoice;
        Some(Advance::TurnComplete {
            options: self.options.clone(),
        })
    }

    /// Restore a mid-story position from a save.
    ///
    /// Narration is not replayed; the phase is `AwaitingChoice` when
    /// options exist, otherwise playback resumes at the first segment.
    pub fn restore(&mut self, paragraphs: Vec<String>, options: Vec<String>) {
        let has_options = !options.is_empty();
        self.begin_turn(paragraphs, options);
        if has_options {
            self.state = PlaybackState::AwaitingChoice;
        }
    }

    /// Drop all content and return to idle.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    fn skip_empty_segments(&mut self) {
        while self.cursor.segment < self.segments.len()
            && self
                .sentences
                .get(self.cursor.segment)
                .map(Vec::is_empty)
                .unwrap_or(true)
        {
            self.cursor.segment += 1;
            self.cursor.sentence = 0;
        }
        if self.cursor.segment >= self.segments.len() && !self.segments.is_empty() {
            self.state = PlaybackState::AwaitingChoice;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_plus_one() -> PlaybackStateMachine {
        let mut machine = PlaybackStateMachine::new();
        machine.begin_turn(
            vec![
                "First sentence. Second sentence.".into(),
                "Lone sentence.".into(),
            ],
            vec!["Fight".into(), "Flee".into()],
        );
        machine
    }

    #[test]
    fn test_cursor_walks_segments_and_sentences() {
        let mut machine = two_plus_one();
        assert_eq!(machine.current_sentence(), Some("First sentence."));

        machine.begin_sentence();
        assert_eq!(machine.complete_sentence(), Some(Advance::NextSentence));
        assert_eq!(machine.current_sentence(), Some("Second sentence."));

        machine.begin_sentence();
        assert_eq!(machine.complete_sentence(), Some(Advance::NextSegment));
        assert_eq!(
            machine.cursor(),
            PlaybackCursor {
                segment: 1,
                sentence: 0
            }
        );
        assert_eq!(machine.current_sentence(), Some("Lone sentence."));

        machine.begin_sentence();
        assert_eq!(
            machine.complete_sentence(),
            Some(Advance::TurnComplete {
                options: vec!["Fight".into(), "Flee".into()]
            })
        );
        assert_eq!(machine.state(), &PlaybackState::AwaitingChoice);
        assert_eq!(machine.current_sentence(), None);
    }

    #[test]
    fn test_duplicate_completion_is_ignored() {
        let mut machine = two_plus_one();

        machine.begin_sentence();
        assert_eq!(machine.complete_sentence(), Some(Advance::NextSentence));
        // A second signal for the same sentence (skip racing audio
        // end) does nothing until the next sentence begins.
        assert_eq!(machine.complete_sentence(), None);
        assert_eq!(machine.current_sentence(), Some("Second sentence."));

        machine.begin_sentence();
        assert_eq!(machine.complete_sentence(), Some(Advance::NextSegment));
    }

    #[test]
    fn test_begin_turn_replaces_everything() {
        let mut machine = two_plus_one();
        machine.begin_sentence();
        machine.complete_sentence();

        machine.begin_turn(vec!["Fresh start.".into()], vec![]);
        assert_eq!(machine.cursor(), PlaybackCursor::default());
        assert_eq!(machine.current_sentence(), Some("Fresh start."));
        assert!(machine.options().is_empty());
    }

    #[test]
    fn test_attach_image_in_place() {
        let mut machine = two_plus_one();
        machine.begin_sentence();
        machine.complete_sentence();

        let cursor_before = machine.cursor();
        assert_eq!(machine.current_image(), None);
        machine.attach_image(1, "aW1hZ2U=");

        assert_eq!(machine.cursor(), cursor_before);
        assert_eq!(machine.segments()[1].image.as_deref(), Some("aW1hZ2U="));
        assert!(machine.segments()[0].image.is_none());
    }

    #[test]
    fn test_attach_image_out_of_range_is_dropped() {
        let mut machine = two_plus_one();
        machine.attach_image(7, "aW1hZ2U=");
        assert!(machine.segments().iter().all(|s| s.image.is_none()));
    }

    #[test]
    fn test_empty_turn_goes_straight_to_choice() {
        let mut machine = PlaybackStateMachine::new();
        machine.begin_turn(vec![], vec!["Onward".into()]);
        assert_eq!(machine.state(), &PlaybackState::AwaitingChoice);
    }

    #[test]
    fn test_blank_segments_are_skipped() {
        let mut machine = PlaybackStateMachine::new();
        machine.begin_turn(
            vec!["   ".into(), "Real content.".into()],
            vec![],
        );
        assert_eq!(machine.cursor().segment, 1);
        assert_eq!(machine.current_sentence(), Some("Real content."));
    }

    #[test]
    fn test_restore_with_options_awaits_choice() {
        let mut machine = PlaybackStateMachine::new();
        machine.restore(vec!["Saved scene.".into()], vec!["Continue".into()]);
        assert_eq!(machine.state(), &PlaybackState::AwaitingChoice);
        assert_eq!(machine.options(), ["Continue"]);
    }

    #[test]
    fn test_restore_without_options_resumes_playback() {
        let mut machine = PlaybackStateMachine::new();
        machine.restore(vec!["Saved scene.".into()], vec![]);
        assert_eq!(machine.state(), &PlaybackState::PlayingSegment);
        assert_eq!(machine.current_sentence(), Some("Saved scene."));
    }

    #[test]
    fn test_completion_outside_playback_is_noop() {
        let mut machine = PlaybackStateMachine::new();
        assert_eq!(machine.complete_sentence(), None);

        machine.begin_loading();
        assert_eq!(machine.complete_sentence(), None);
    }

    #[test]
    fn test_next_sentence_prefetch_lookahead() {
        let machine = two_plus_one();
        assert_eq!(
            machine.next_sentence_in_segment(),
            Some("Second sentence.")
        );

        let mut machine = machine;
        machine.begin_sentence();
        machine.complete_sentence();
        // Last sentence of the segment: nothing to look ahead to.
        assert_eq!(machine.next_sentence_in_segment(), None);
    }
}
