//! Streaming client for AI-narrated interactive stories.
//!
//! This crate provides the network-facing half of the engine:
//! - Incremental decoding of the blank-line-framed event stream
//! - A resilient executor with exponential backoff
//! - Ordered provider-fallback chains for text, speech, and images
//! - An HTTP client for the story backend that plugs into both

mod client;
mod decoder;
mod error;
mod event;
mod fallback;
mod retry;

pub use client::{AuthFailureHook, StoryClient, StreamHandle, TurnSource};
pub use decoder::{decode_byte_stream, FrameDecoder};
pub use error::Error;
pub use event::NarrativeEvent;
pub use fallback::{
    execute_with_fallback, HistoryEntry, ImageFallback, ImageProvider, SpeechFallback,
    SpeechProvider, SpeechRequest, TextFallback, TextProvider, TextRequest,
};
pub use retry::{backoff_delay, RetryPolicy, RetryingSpeech, RetryingText};

// Re-exported so downstream provider implementations don't need their
// own async-trait dependency pin.
pub use async_trait::async_trait;
