//! Provider capability traits and ordered fallback chains.
//!
//! Providers are opaque, interchangeable capability holders. A chain
//! invokes them in order and returns the first success; why a provider
//! failed is only used to decide to continue. Three independent
//! instantiations back the engine: narrative text, speech synthesis,
//! and image generation.

use crate::error::Error;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;

/// One entry of the conversation history sent with a text request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: String,
    pub text: String,
}

impl HistoryEntry {
    /// A player-authored entry.
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            text: text.into(),
        }
    }

    /// A model-authored entry.
    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: "model".into(),
            text: text.into(),
        }
    }
}

/// A narrative text-generation request.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TextRequest {
    pub prompt: String,
    pub history: Vec<HistoryEntry>,
    pub voice: String,
    pub genre: String,
    pub lang: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub save_id: Option<String>,
}

/// A speech-synthesis request.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SpeechRequest {
    pub text: String,
    pub voice: String,
    pub genre: String,
    pub lang: String,
}

/// Generates narrative text for a turn.
#[async_trait]
pub trait TextProvider: Send + Sync {
    async fn generate(&self, request: &TextRequest) -> Result<String, Error>;
}

/// Synthesizes narration audio, returned base64-encoded.
#[async_trait]
pub trait SpeechProvider: Send + Sync {
    /// Latency-sensitivity preference: whether input text should be
    /// split so the first sentence can start playing sooner.
    fn prefers_split_text(&self) -> bool {
        false
    }

    async fn synthesize(&self, request: &SpeechRequest) -> Result<String, Error>;
}

/// Renders an illustration for a scene description.
#[async_trait]
pub trait ImageProvider: Send + Sync {
    async fn render(&self, prompt: &str) -> Result<String, Error>;
}

/// Run `action` against providers in order until one succeeds.
///
/// Each failing position is logged; if every provider rejects, the
/// last provider's error propagates unchanged. An empty chain yields
/// [`Error::Exhausted`].
pub async fn execute_with_fallback<P, R, F, Fut>(
    providers: &[Arc<P>],
    label: &str,
    mut action: F,
) -> Result<R, Error>
where
    P: ?Sized,
    F: FnMut(Arc<P>) -> Fut,
    Fut: Future<Output = Result<R, Error>>,
{
    let total = providers.len();
    let mut last_error = None;

    for (position, provider) in providers.iter().enumerate() {
        log::debug!("{label}: trying provider {}/{total}", position + 1);
        match action(Arc::clone(provider)).await {
            Ok(value) => return Ok(value),
            Err(err) => {
                log::warn!("{label}: provider {}/{total} failed: {err}", position + 1);
                last_error = Some(err);
            }
        }
    }

    log::error!("{label}: all providers failed");
    Err(last_error.unwrap_or(Error::Exhausted {
        label: label.to_string(),
    }))
}

/// Text generation backed by an ordered provider list.
pub struct TextFallback {
    providers: Vec<Arc<dyn TextProvider>>,
}

impl TextFallback {
    pub fn new(providers: Vec<Arc<dyn TextProvider>>) -> Self {
        Self { providers }
    }
}

#[async_trait]
impl TextProvider for TextFallback {
    async fn generate(&self, request: &TextRequest) -> Result<String, Error> {
        execute_with_fallback(&self.providers, "text fallback", |provider| async move {
            provider.generate(request).await
        })
        .await
    }
}

/// Speech synthesis backed by an ordered provider list.
///
/// The split-text preference follows the primary provider: that is the
/// one expected to serve the request, and a mid-chain switch must not
/// change how the caller already split its input.
pub struct SpeechFallback {
    providers: Vec<Arc<dyn SpeechProvider>>,
}

impl SpeechFallback {
    pub fn new(providers: Vec<Arc<dyn SpeechProvider>>) -> Self {
        Self { providers }
    }
}

#[async_trait]
impl SpeechProvider for SpeechFallback {
    fn prefers_split_text(&self) -> bool {
        self.providers
            .first()
            .map(|p| p.prefers_split_text())
            .unwrap_or(false)
    }

    async fn synthesize(&self, request: &SpeechRequest) -> Result<String, Error> {
        execute_with_fallback(&self.providers, "speech fallback", |provider| async move {
            provider.synthesize(request).await
        })
        .await
    }
}

/// Image generation backed by an ordered provider list.
pub struct ImageFallback {
    providers: Vec<Arc<dyn ImageProvider>>,
}

impl ImageFallback {
    pub fn new(providers: Vec<Arc<dyn ImageProvider>>) -> Self {
        Self { providers }
    }
}

#[async_trait]
impl ImageProvider for ImageFallback {
    async fn render(&self, prompt: &str) -> Result<String, Error> {
        execute_with_fallback(&self.providers, "image fallback", |provider| async move {
            provider.render(prompt).await
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct ScriptedSpeech {
        payload: Option<String>,
        calls: AtomicU32,
        split: bool,
    }

    impl ScriptedSpeech {
        fn ok(payload: &str) -> Arc<Self> {
            Arc::new(Self {
                payload: Some(payload.into()),
                calls: AtomicU32::new(0),
                split: false,
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                payload: None,
                calls: AtomicU32::new(0),
                split: false,
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SpeechProvider for ScriptedSpeech {
        fn prefers_split_text(&self) -> bool {
            self.split
        }

        async fn synthesize(&self, _request: &SpeechRequest) -> Result<String, Error> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.payload.clone().ok_or(Error::Api {
                status: 500,
                message: "synthesis failed".into(),
            })
        }
    }

    #[tokio::test]
    async fn test_short_circuits_on_first_success() {
        let a = ScriptedSpeech::failing();
        let b = ScriptedSpeech::ok("payload-b");
        let c = ScriptedSpeech::ok("payload-c");

        let chain = SpeechFallback::new(vec![a.clone(), b.clone(), c.clone()]);
        let result = chain.synthesize(&SpeechRequest::default()).await.unwrap();

        assert_eq!(result, "payload-b");
        assert_eq!(a.calls(), 1);
        assert_eq!(b.calls(), 1);
        assert_eq!(c.calls(), 0);
    }

    #[tokio::test]
    async fn test_all_failures_yield_last_error() {
        let chain = SpeechFallback::new(vec![ScriptedSpeech::failing(), ScriptedSpeech::failing()]);
        let err = chain
            .synthesize(&SpeechRequest::default())
            .await
            .unwrap_err();

        assert_eq!(err.status(), Some(500));
    }

    #[tokio::test]
    async fn test_empty_chain_is_exhausted() {
        let chain = SpeechFallback::new(Vec::new());
        let err = chain
            .synthesize(&SpeechRequest::default())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Exhausted { .. }));
    }

    #[tokio::test]
    async fn test_split_preference_follows_primary() {
        let primary = Arc::new(ScriptedSpeech {
            payload: Some("x".into()),
            calls: AtomicU32::new(0),
            split: true,
        });
        let secondary = ScriptedSpeech::ok("y");

        let chain = SpeechFallback::new(vec![primary, secondary]);
        assert!(chain.prefers_split_text());

        let reversed = SpeechFallback::new(vec![ScriptedSpeech::ok("y")]);
        assert!(!reversed.prefers_split_text());
    }
}
