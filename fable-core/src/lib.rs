//! Narration engine for AI-narrated interactive stories.
//!
//! Built on top of [`fable_client`], this crate turns a stream of
//! narrative events into paced, sentence-by-sentence narration:
//! - Sentence splitting tuned for speech latency
//! - An audio sequencer with a content-addressed cache and prefetch
//! - A playback state machine with an idempotent advancement guard
//! - A session type orchestrating turns, choices, and saves

pub mod audio;
pub mod persist;
pub mod playback;
pub mod session;
pub mod testing;
pub mod text;

pub use audio::{estimate_duration_ms, AudioCache, AudioSequencer, PlaybackUpdate, SequenceStep};
pub use persist::{PersistError, SavedStory, SAVE_VERSION};
pub use playback::{
    Advance, NarrativeSegment, PlaybackCursor, PlaybackState, PlaybackStateMachine,
};
pub use session::{SessionConfig, SessionError, SessionSignal, StorySession};
pub use text::{split_first_sentence, split_sentences, MIN_SPLIT_LEN};
