//! The story session: one player's ongoing narrated adventure.
//!
//! `StorySession` ties the pieces together: it opens turn streams,
//! routes background events (audio, images, status) to the sequencer
//! and state machine, drives sentence-by-sentence narration, and
//! produces save snapshots.

use crate::audio::{AudioSequencer, PlaybackUpdate, SequenceStep};
use crate::persist::{PersistError, SavedStory};
use crate::playback::{Advance, PlaybackStateMachine};
use fable_client::{HistoryEntry, NarrativeEvent, StreamHandle, TextRequest, TurnSource};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Client(#[from] fable_client::Error),

    #[error("narrative stream failed: {0}")]
    Narrative(String),

    #[error("no turn is active")]
    NoTurn,

    #[error("choice index {index} out of range ({available} available)")]
    InvalidChoice { index: usize, available: usize },

    #[error(transparent)]
    Persist(#[from] PersistError),
}

/// Story-level settings sent with every request.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub genre: String,
    pub voice: String,
    pub language: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            genre: "fantasy".into(),
            voice: "narrator".into(),
            language: "en".into(),
        }
    }
}

impl SessionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_genre(mut self, genre: impl Into<String>) -> Self {
        self.genre = genre.into();
        self
    }

    pub fn with_voice(mut self, voice: impl Into<String>) -> Self {
        self.voice = voice.into();
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }
}

/// What the caller should do after a playback transition.
#[derive(Debug, PartialEq)]
pub enum SessionSignal {
    /// Render this narration step.
    Update(PlaybackUpdate),
    /// The turn's narration finished; present these choices.
    OptionsReady(Vec<String>),
    /// Nothing changed (e.g. a duplicate completion signal).
    Noop,
}

/// One player's story, from opening prompt to save file.
pub struct StorySession {
    config: SessionConfig,
    turns: Arc<dyn TurnSource>,
    sequencer: AudioSequencer,
    playback: PlaybackStateMachine,
    history: Vec<HistoryEntry>,
    stream: Option<StreamHandle>,
    last_request: Option<TextRequest>,
    status: String,
}

impl StorySession {
    pub fn new(
        config: SessionConfig,
        turns: Arc<dyn TurnSource>,
        sequencer: AudioSequencer,
    ) -> Self {
        let sequencer = sequencer
            .with_voice(config.voice.clone())
            .with_genre(config.genre.clone())
            .with_lang(config.language.clone());
        Self {
            config,
            turns,
            sequencer,
            playback: PlaybackStateMachine::new(),
            history: Vec::new(),
            stream: None,
            last_request: None,
            status: String::new(),
        }
    }

    pub fn playback(&self) -> &PlaybackStateMachine {
        &self.playback
    }

    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    /// Most recent status line from the backend.
    pub fn status(&self) -> &str {
        &self.status
    }

    /// Start a turn from a player prompt.
    ///
    /// The prompt joins the conversation history and a turn stream is
    /// opened; this waits for the turn's text structure, then returns
    /// with the stream still live so audio and image events keep
    /// arriving via [`poll_background_events`].
    ///
    /// [`poll_background_events`]: Self::poll_background_events
    pub async fn start_turn(&mut self, prompt: &str) -> Result<(), SessionError> {
        self.history.push(HistoryEntry::user(prompt));
        let request = self.build_request(prompt);
        self.run_turn(request).await
    }

    /// Replay the last request after a failed turn.
    ///
    /// The prompt is already in the history, so nothing is re-pushed.
    pub async fn retry_turn(&mut self) -> Result<(), SessionError> {
        let request = self.last_request.clone().ok_or(SessionError::NoTurn)?;
        self.run_turn(request).await
    }

    async fn run_turn(&mut self, request: TextRequest) -> Result<(), SessionError> {
        // One outstanding stream: replacing the handle aborts the
        // previous turn's connection.
        self.stream = None;
        self.sequencer.reset();
        self.playback.begin_loading();
        self.last_request = Some(request.clone());

        let mut stream = self.turns.open_turn(&request).await?;
        // Images may land before the structure they index into; held
        // here until the segments exist.
        let mut early_images: Vec<(usize, String)> = Vec::new();

        loop {
            match stream.next_event().await {
                Some(NarrativeEvent::Status { message }) => self.status = message,
                Some(NarrativeEvent::TextStructure {
                    paragraphs,
                    options,
                }) => {
                    self.history
                        .push(HistoryEntry::model(paragraphs.join("\n\n")));
                    self.playback.begin_turn(paragraphs, options);
                    for (index, data) in early_images {
                        self.playback.attach_image(index, data);
                    }
                    self.stream = Some(stream);
                    return Ok(());
                }
                Some(NarrativeEvent::Audio { text, data }) => {
                    self.sequencer.inject(&text, data);
                }
                Some(NarrativeEvent::Image { index, data }) => {
                    early_images.push((index, data));
                }
                Some(NarrativeEvent::ImageError) => {
                    log::warn!("backend reported an image generation failure");
                }
                Some(NarrativeEvent::Error { message }) => {
                    return Err(SessionError::Narrative(message));
                }
                Some(NarrativeEvent::Done) | None => {
                    return Err(SessionError::Narrative(
                        "stream ended before any text structure".into(),
                    ));
                }
            }
        }
    }

    /// Drain events that arrived since the last poll.
    ///
    /// Audio events warm the sequencer cache; image events attach to
    /// their segments in place; neither interrupts narration.
    pub fn poll_background_events(&mut self) {
        let Some(stream) = &mut self.stream else {
            return;
        };

        let mut finished = false;
        while let Some(event) = stream.try_next_event() {
            match event {
                NarrativeEvent::Audio { text, data } => self.sequencer.inject(&text, data),
                NarrativeEvent::Image { index, data } => self.playback.attach_image(index, data),
                NarrativeEvent::Status { message } => self.status = message,
                NarrativeEvent::ImageError => {
                    log::warn!("backend reported an image generation failure");
                }
                NarrativeEvent::Error { message } => {
                    log::warn!("stream error after text structure: {message}");
                }
                NarrativeEvent::Done => {
                    finished = true;
                    break;
                }
                NarrativeEvent::TextStructure { .. } => {
                    log::warn!("duplicate text structure event, ignoring");
                }
            }
        }

        if finished {
            self.stream = None;
        }
    }

    /// Prepare and start narrating the sentence under the cursor.
    pub async fn play_current(&mut self) -> Result<PlaybackUpdate, SessionError> {
        self.poll_background_events();

        let sentence = self
            .playback
            .current_sentence()
            .ok_or(SessionError::NoTurn)?
            .to_string();

        // Warm the cache for the following sentence while this one is
        // being prepared and played.
        if let Some(next) = self.playback.next_sentence_in_segment() {
            let next = next.to_string();
            self.sequencer.prefetch(&next);
        }

        self.sequencer.prepare(&sentence).await;
        self.playback.begin_sentence();
        Ok(self.sequencer.start())
    }

    /// Signal that the playing audio chunk ended.
    ///
    /// A prepared remainder chunk continues the same sentence;
    /// otherwise the cursor advances.
    pub async fn audio_ended(&mut self) -> Result<SessionSignal, SessionError> {
        if let SequenceStep::Continue(update) = self.sequencer.on_audio_complete().await {
            return Ok(SessionSignal::Update(update));
        }
        self.advance().await
    }

    /// Skip the rest of the current sentence.
    ///
    /// In-flight synthesis for the abandoned sentence is left to
    /// finish and be discarded.
    pub async fn skip(&mut self) -> Result<SessionSignal, SessionError> {
        self.advance().await
    }

    async fn advance(&mut self) -> Result<SessionSignal, SessionError> {
        match self.playback.complete_sentence() {
            None => Ok(SessionSignal::Noop),
            Some(Advance::NextSentence) | Some(Advance::NextSegment) => {
                let update = self.play_current().await?;
                Ok(SessionSignal::Update(update))
            }
            Some(Advance::TurnComplete { options }) => Ok(SessionSignal::OptionsReady(options)),
        }
    }

    /// Pick one of the presented options and start the next turn.
    pub async fn choose(&mut self, index: usize) -> Result<(), SessionError> {
        let options = self.playback.options();
        let Some(option) = options.get(index) else {
            return Err(SessionError::InvalidChoice {
                index,
                available: options.len(),
            });
        };
        let prompt = format!(
            "I choose option {}: {option}. What happens next?",
            index + 1
        );
        self.start_turn(&prompt).await
    }

    /// Snapshot the session for persistence.
    pub fn to_saved(&self) -> SavedStory {
        let segments = self.playback.segments();
        SavedStory::new(
            self.history.clone(),
            segments.iter().map(|s| s.text.clone()).collect(),
            self.playback.options().to_vec(),
            segments.iter().map(|s| s.image.clone()).collect(),
        )
    }

    /// Rebuild a session from a save.
    ///
    /// Narration is not replayed: when the save holds options the
    /// session waits on the choice, otherwise playback resumes from
    /// the first segment with audio re-synthesized on demand.
    pub fn resume(
        config: SessionConfig,
        turns: Arc<dyn TurnSource>,
        sequencer: AudioSequencer,
        saved: SavedStory,
    ) -> Self {
        let mut session = Self::new(config, turns, sequencer);
        session.history = saved.conversation_history;
        session
            .playback
            .restore(saved.paragraph_texts, saved.current_options);
        for (index, image) in saved.current_images.into_iter().enumerate() {
            if let Some(data) = image {
                session.playback.attach_image(index, data);
            }
        }
        session
    }

    fn build_request(&self, prompt: &str) -> TextRequest {
        TextRequest {
            prompt: prompt.to_string(),
            // History already includes the prompt being sent.
            history: self.history[..self.history.len().saturating_sub(1)].to_vec(),
            voice: self.config.voice.clone(),
            genre: self.config.genre.clone(),
            lang: self.config.language.clone(),
            save_id: None,
        }
    }
}
