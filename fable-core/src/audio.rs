//! Audio preparation and chunk sequencing for narration.
//!
//! The sequencer minimizes the gap between "text ready" and "narration
//! starts": when the active speech provider prefers split text, the
//! first sentence is synthesized alone so playback can begin while the
//! remainder is still being generated. A content-addressed cache lets
//! callers warm upcoming sentences ahead of need or inject audio that
//! arrived over the event stream.

use crate::text::split_first_sentence;
use fable_client::{SpeechProvider, SpeechRequest};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Assumed speaking rate for compressed audio, in ms per character.
///
/// Byte length is not a reliable proxy for MPEG duration, so the
/// estimate falls back to text length at an empirical rate.
const MPEG_MS_PER_CHAR: u64 = 60;

/// Byte rate of raw 16-bit mono PCM at 24 kHz.
const PCM_BYTES_PER_SEC: u64 = 48_000;

/// Nominal reveal duration when playback degrades to text-only.
const FALLBACK_DURATION_MS: u64 = 1_000;

/// Estimate the playable duration of an encoded audio payload.
///
/// The payload is classified by sniffing its base64 prefix: `SUQz`
/// decodes to an ID3 tag and `//` to an MPEG frame-sync pattern. For
/// those, duration comes from `text` length; anything else is assumed
/// to be raw 16-bit mono PCM at 24 kHz.
pub fn estimate_duration_ms(audio_b64: &str, text: &str) -> u64 {
    if audio_b64.starts_with("SUQz") || audio_b64.starts_with("//") {
        return text.chars().count() as u64 * MPEG_MS_PER_CHAR;
    }

    let byte_len = audio_b64.len() as u64 * 3 / 4;
    byte_len * 1000 / PCM_BYTES_PER_SEC
}

/// What the presentation layer needs to render one narration step.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackUpdate {
    /// Text to reveal while this chunk plays.
    pub visible_text: String,

    /// Base64-encoded audio, absent when playback is degraded.
    pub audio_data: Option<String>,

    /// Whether a preparation is still outstanding.
    pub is_loading: bool,

    /// Expected playback length for pacing the text reveal.
    pub estimated_duration_ms: u64,
}

/// Outcome of an audio-completion signal.
#[derive(Debug)]
pub enum SequenceStep {
    /// A prepared remainder chunk takes over playback.
    Continue(PlaybackUpdate),

    /// No more chunks for this text; the sentence's narration is done.
    Ended,
}

/// One fully prepared chunk, staged for playback.
#[derive(Debug)]
struct PreparedChunk {
    audio: String,
    visible_text: String,
    duration_ms: u64,
}

/// A remainder chunk whose synthesis is still in flight.
struct PendingChunk {
    text: String,
    task: JoinHandle<Option<String>>,
}

/// Queue of remainder chunks, bounded at one entry.
///
/// Deeper chaining is deliberately unsupported; the bound is explicit
/// so it can be tested rather than implied by a nullable field.
#[derive(Default)]
pub(crate) struct PendingQueue {
    slot: Option<PendingChunk>,
}

impl PendingQueue {
    pub(crate) const CAPACITY: usize = 1;

    fn push(&mut self, chunk: PendingChunk) -> Result<(), PendingChunk> {
        if self.slot.is_some() {
            return Err(chunk);
        }
        self.slot = Some(chunk);
        Ok(())
    }

    fn take(&mut self) -> Option<PendingChunk> {
        self.slot.take()
    }

    fn clear(&mut self) {
        self.slot = None;
    }
}

/// Content-addressed audio cache keyed by the exact synthesized text.
///
/// At most one synthesis is outstanding per distinct key; entries are
/// consumed when claimed and otherwise retained until the turn ends.
#[derive(Default)]
pub struct AudioCache {
    entries: HashMap<String, CacheEntry>,
}

enum CacheEntry {
    Ready(String),
    InFlight(JoinHandle<Option<String>>),
}

impl AudioCache {
    /// Inject externally obtained audio (e.g. from the event stream).
    pub fn insert(&mut self, text: impl Into<String>, audio: impl Into<String>) {
        self.entries.insert(text.into(), CacheEntry::Ready(audio.into()));
    }

    /// Whether an entry (resolved or in flight) exists for `text`.
    pub fn contains(&self, text: &str) -> bool {
        self.entries.contains_key(text)
    }

    /// Number of entries currently held.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry, including in-flight ones.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    fn begin(&mut self, text: String, task: JoinHandle<Option<String>>) {
        self.entries.insert(text, CacheEntry::InFlight(task));
    }

    /// Consume the entry for `text`, waiting for it if still in flight.
    async fn take(&mut self, text: &str) -> Option<String> {
        match self.entries.remove(text)? {
            CacheEntry::Ready(audio) => Some(audio),
            CacheEntry::InFlight(task) => match task.await {
                Ok(audio) => audio,
                Err(err) => {
                    log::warn!("prefetched synthesis task failed: {err}");
                    None
                }
            },
        }
    }
}

/// Prepares and sequences narration audio for one sentence at a time.
pub struct AudioSequencer {
    provider: Arc<dyn SpeechProvider>,
    voice: String,
    genre: String,
    lang: String,
    cache: AudioCache,
    staged: Option<PreparedChunk>,
    pending: PendingQueue,
    full_text: String,
}

impl AudioSequencer {
    /// Create a sequencer over a speech provider (usually a fallback
    /// chain of retry-wrapped providers).
    pub fn new(provider: Arc<dyn SpeechProvider>) -> Self {
        Self {
            provider,
            voice: String::new(),
            genre: String::new(),
            lang: String::new(),
            cache: AudioCache::default(),
            staged: None,
            pending: PendingQueue::default(),
            full_text: String::new(),
        }
    }

    /// Set the voice hint sent with synthesis requests.
    pub fn with_voice(mut self, voice: impl Into<String>) -> Self {
        self.voice = voice.into();
        self
    }

    /// Set the genre hint sent with synthesis requests.
    pub fn with_genre(mut self, genre: impl Into<String>) -> Self {
        self.genre = genre.into();
        self
    }

    /// Set the language hint sent with synthesis requests.
    pub fn with_lang(mut self, lang: impl Into<String>) -> Self {
        self.lang = lang.into();
        self
    }

    /// Access the audio cache.
    pub fn cache(&self) -> &AudioCache {
        &self.cache
    }

    /// Inject externally obtained audio for `text` into the cache,
    /// short-circuiting a future synthesis of the same text.
    pub fn inject(&mut self, text: &str, audio: impl Into<String>) {
        self.cache.insert(text, audio);
    }

    /// Warm the cache for `text` without staging it.
    ///
    /// No-op if an entry for the exact text already exists; this is
    /// what keeps synthesis single-issue per distinct key.
    pub fn prefetch(&mut self, text: &str) {
        if text.trim().is_empty() || self.cache.contains(text) {
            return;
        }
        let task = self.spawn_synthesis(text.to_string());
        self.cache.begin(text.to_string(), task);
    }

    /// Prepare `text` for playback.
    ///
    /// Resolves the first chunk (from the cache when possible) and
    /// stages it; if the provider prefers split text and a non-empty
    /// remainder exists, its synthesis starts immediately after the
    /// first chunk resolves, without waiting for playback to begin.
    pub async fn prepare(&mut self, text: &str) {
        self.staged = None;
        // A stale remainder from an abandoned sentence is dropped
        // here; its in-flight synthesis completes and is discarded.
        self.pending.clear();
        self.full_text = text.to_string();

        // A cached entry always covers the exact full text, so a hit
        // plays as a single chunk regardless of split preference.
        if let Some(audio) = self.cache.take(text).await {
            let duration_ms = estimate_duration_ms(&audio, text);
            self.staged = Some(PreparedChunk {
                audio,
                visible_text: text.to_string(),
                duration_ms,
            });
            return;
        }

        let (first, rest) = if self.provider.prefers_split_text() {
            split_first_sentence(text)
        } else {
            (text.to_string(), String::new())
        };

        let Some(audio) = self.synthesize(&first).await else {
            // Degraded: start() will fall back to text-only playback.
            return;
        };

        let duration_ms = estimate_duration_ms(&audio, &first);
        self.staged = Some(PreparedChunk {
            audio,
            visible_text: first,
            duration_ms,
        });

        if !rest.trim().is_empty() {
            let task = self.spawn_synthesis(rest.clone());
            if let Err(chunk) = self.pending.push(PendingChunk { text: rest, task }) {
                log::warn!("pending queue full, discarding remainder chunk");
                chunk.task.abort();
            }
        }
    }

    /// Promote the staged chunk to active playback.
    ///
    /// When preparation failed or produced nothing, the update carries
    /// the full text with no audio and a nominal duration; the caller
    /// should treat the sequence as ended after revealing it.
    pub fn start(&mut self) -> PlaybackUpdate {
        match self.staged.take() {
            Some(chunk) => PlaybackUpdate {
                visible_text: chunk.visible_text,
                audio_data: Some(chunk.audio),
                is_loading: false,
                estimated_duration_ms: chunk.duration_ms,
            },
            None => PlaybackUpdate {
                visible_text: self.full_text.clone(),
                audio_data: None,
                is_loading: false,
                estimated_duration_ms: FALLBACK_DURATION_MS,
            },
        }
    }

    /// Handle the end of the currently playing chunk.
    ///
    /// A prepared remainder is promoted with the full text visible and
    /// its own recomputed duration; otherwise the sequence has ended.
    pub async fn on_audio_complete(&mut self) -> SequenceStep {
        let Some(chunk) = self.pending.take() else {
            return SequenceStep::Ended;
        };

        match chunk.task.await {
            Ok(Some(audio)) => {
                let duration_ms = estimate_duration_ms(&audio, &chunk.text);
                SequenceStep::Continue(PlaybackUpdate {
                    visible_text: self.full_text.clone(),
                    audio_data: Some(audio),
                    is_loading: false,
                    estimated_duration_ms: duration_ms,
                })
            }
            Ok(None) => SequenceStep::Ended,
            Err(err) => {
                log::warn!("remainder synthesis task failed: {err}");
                SequenceStep::Ended
            }
        }
    }

    /// Drop cached audio and staging from a finished turn.
    pub fn reset(&mut self) {
        self.cache.clear();
        self.staged = None;
        self.pending.clear();
        self.full_text.clear();
    }

    async fn synthesize(&self, text: &str) -> Option<String> {
        if text.trim().is_empty() {
            return None;
        }
        match self.provider.synthesize(&self.request_for(text)).await {
            Ok(audio) => Some(audio),
            Err(err) => {
                log::error!("speech synthesis failed: {err}");
                None
            }
        }
    }

    fn spawn_synthesis(&self, text: String) -> JoinHandle<Option<String>> {
        let provider = Arc::clone(&self.provider);
        let request = self.request_for(&text);
        tokio::spawn(async move {
            match provider.synthesize(&request).await {
                Ok(audio) => Some(audio),
                Err(err) => {
                    log::error!("background synthesis failed: {err}");
                    None
                }
            }
        })
    }

    fn request_for(&self, text: &str) -> SpeechRequest {
        SpeechRequest {
            text: text.to_string(),
            voice: self.voice.clone(),
            genre: self.genre.clone(),
            lang: self.lang.clone(),
        }
    }
}
