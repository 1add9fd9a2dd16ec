//! Scripted providers for exercising the engine without a backend.
//!
//! These are used by this crate's own tests and exported for
//! downstream integration tests and offline demos.

use fable_client::{
    async_trait, Error, ImageProvider, NarrativeEvent, SpeechProvider, SpeechRequest,
    StreamHandle, TextProvider, TextRequest, TurnSource,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Speech provider returning canned payloads and counting calls.
#[derive(Clone)]
pub struct MockSpeech {
    inner: Arc<MockSpeechInner>,
}

struct MockSpeechInner {
    calls: AtomicUsize,
    fail: bool,
    prefers_split: AtomicBool,
    payload: String,
}

impl MockSpeech {
    /// A provider returning a payload sniffed as raw PCM.
    pub fn pcm() -> Self {
        Self {
            inner: Arc::new(MockSpeechInner {
                calls: AtomicUsize::new(0),
                fail: false,
                prefers_split: AtomicBool::new(false),
                payload: "AAAA".repeat(24),
            }),
        }
    }

    /// A provider whose every synthesis fails with a network error.
    pub fn failing() -> Self {
        Self {
            inner: Arc::new(MockSpeechInner {
                calls: AtomicUsize::new(0),
                fail: true,
                prefers_split: AtomicBool::new(false),
                payload: String::new(),
            }),
        }
    }

    /// Mark this provider as wanting first-sentence splitting.
    pub fn with_split_preference(self) -> Self {
        self.inner.prefers_split.store(true, Ordering::SeqCst);
        self
    }

    /// Number of synthesis calls made so far.
    pub fn calls(&self) -> usize {
        self.inner.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SpeechProvider for MockSpeech {
    fn prefers_split_text(&self) -> bool {
        self.inner.prefers_split.load(Ordering::SeqCst)
    }

    async fn synthesize(&self, _request: &SpeechRequest) -> Result<String, Error> {
        self.inner.calls.fetch_add(1, Ordering::SeqCst);
        if self.inner.fail {
            return Err(Error::Network("synth unavailable".into()));
        }
        Ok(self.inner.payload.clone())
    }
}

/// Text provider echoing a fixed response and recording requests.
#[derive(Clone)]
pub struct MockText {
    inner: Arc<MockTextInner>,
}

struct MockTextInner {
    calls: AtomicUsize,
    response: String,
    requests: Mutex<Vec<TextRequest>>,
}

impl MockText {
    pub fn responding(response: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(MockTextInner {
                calls: AtomicUsize::new(0),
                response: response.into(),
                requests: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn calls(&self) -> usize {
        self.inner.calls.load(Ordering::SeqCst)
    }

    /// Prompts received so far, in order.
    pub fn prompts(&self) -> Vec<String> {
        self.inner
            .requests
            .lock()
            .map(|requests| requests.iter().map(|r| r.prompt.clone()).collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl TextProvider for MockText {
    async fn generate(&self, request: &TextRequest) -> Result<String, Error> {
        self.inner.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut requests) = self.inner.requests.lock() {
            requests.push(request.clone());
        }
        Ok(self.inner.response.clone())
    }
}

/// Image provider returning a fixed payload.
#[derive(Clone)]
pub struct MockImage {
    calls: Arc<AtomicUsize>,
    payload: String,
}

impl MockImage {
    pub fn new(payload: impl Into<String>) -> Self {
        Self {
            calls: Arc::new(AtomicUsize::new(0)),
            payload: payload.into(),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImageProvider for MockImage {
    async fn render(&self, _prompt: &str) -> Result<String, Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.payload.clone())
    }
}

/// Turn source replaying scripted event sequences.
///
/// Each `open_turn` consumes the next script in order; opening more
/// turns than scripted yields an empty stream.
pub struct MockTurns {
    scripts: Mutex<Vec<Vec<NarrativeEvent>>>,
    opened: AtomicUsize,
    requests: Mutex<Vec<TextRequest>>,
}

impl MockTurns {
    pub fn new(scripts: Vec<Vec<NarrativeEvent>>) -> Self {
        Self {
            scripts: Mutex::new(scripts),
            opened: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// A source whose single turn delivers `paragraphs` and `options`
    /// followed by a terminal `done`.
    pub fn single_turn(paragraphs: Vec<&str>, options: Vec<&str>) -> Self {
        Self::new(vec![scripted_turn(paragraphs, options)])
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// Requests seen so far, in order.
    pub fn requests(&self) -> Vec<TextRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl TurnSource for MockTurns {
    async fn open_turn(&self, request: &TextRequest) -> Result<StreamHandle, Error> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        let events = self
            .scripts
            .lock()
            .ok()
            .and_then(|mut scripts| {
                if scripts.is_empty() {
                    None
                } else {
                    Some(scripts.remove(0))
                }
            })
            .unwrap_or_default();
        Ok(StreamHandle::from_events(events))
    }
}

/// A complete well-formed turn script: status, structure, done.
pub fn scripted_turn(paragraphs: Vec<&str>, options: Vec<&str>) -> Vec<NarrativeEvent> {
    vec![
        NarrativeEvent::Status {
            message: "weaving the tale".into(),
        },
        NarrativeEvent::TextStructure {
            paragraphs: paragraphs.into_iter().map(String::from).collect(),
            options: options.into_iter().map(String::from).collect(),
        },
        NarrativeEvent::Done,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use fable_client::{
        ImageFallback, RetryPolicy, RetryingSpeech, RetryingText, SpeechFallback, TextFallback,
    };
    use std::time::Duration;

    fn fast_policy(retries: u32) -> RetryPolicy {
        RetryPolicy::new(retries, Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_retry_wrapped_provider_inside_speech_chain() {
        let flaky = MockSpeech::failing();
        let stable = MockSpeech::pcm();

        // The intended production shape: each provider retries its own
        // transient failures before the chain moves to the next one.
        let chain = SpeechFallback::new(vec![
            Arc::new(RetryingSpeech::new(Arc::new(flaky.clone()), fast_policy(2))),
            Arc::new(RetryingSpeech::new(Arc::new(stable.clone()), fast_policy(2))),
        ]);

        let audio = chain.synthesize(&SpeechRequest::default()).await.unwrap();

        assert!(!audio.is_empty());
        // The flaky primary burned its whole retry budget first.
        assert_eq!(flaky.calls(), 2);
        assert_eq!(stable.calls(), 1);
    }

    #[tokio::test]
    async fn test_text_chain_delivers_and_records_prompts() {
        let text = MockText::responding("The hall falls silent.");
        let chain = TextFallback::new(vec![Arc::new(RetryingText::new(
            Arc::new(text.clone()),
            fast_policy(3),
        ))]);

        let request = TextRequest {
            prompt: "What happens next?".into(),
            ..TextRequest::default()
        };
        let reply = chain.generate(&request).await.unwrap();

        assert_eq!(reply, "The hall falls silent.");
        assert_eq!(text.calls(), 1);
        assert_eq!(text.prompts(), ["What happens next?"]);
    }

    #[tokio::test]
    async fn test_image_chain_returns_payload() {
        let image = MockImage::new("aW1hZ2U=");
        let chain = ImageFallback::new(vec![Arc::new(image.clone())]);

        let payload = chain.render("a ruined tower at dusk").await.unwrap();

        assert_eq!(payload, "aW1hZ2U=");
        assert_eq!(image.calls(), 1);
    }
}
