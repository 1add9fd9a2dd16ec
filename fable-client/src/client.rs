//! HTTP client for the story backend.
//!
//! `StoryClient` talks to a backend exposing four endpoints: a
//! streamed turn endpoint emitting framed [`NarrativeEvent`]s, and
//! plain JSON endpoints for text, audio, and image generation. The
//! client implements every provider trait, so instances pointed at
//! different backends can sit inside fallback chains.

use crate::decoder::FrameDecoder;
use crate::error::Error;
use crate::event::NarrativeEvent;
use crate::fallback::{ImageProvider, SpeechProvider, SpeechRequest, TextProvider, TextRequest};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Hook invoked when a provider rejects the configured credentials.
pub type AuthFailureHook = Arc<dyn Fn() + Send + Sync>;

/// Capacity of the event channel between the reader task and consumer.
const EVENT_CHANNEL_CAPACITY: usize = 32;

/// Opens narrative turn streams.
///
/// Abstracted as a trait so the engine can be driven by scripted
/// event sequences in tests.
#[async_trait]
pub trait TurnSource: Send + Sync {
    async fn open_turn(&self, request: &TextRequest) -> Result<StreamHandle, Error>;
}

/// Client for one story backend.
#[derive(Clone)]
pub struct StoryClient {
    client: reqwest::Client,
    base_url: String,
    api_token: String,
    on_auth_failure: Option<AuthFailureHook>,
}

impl StoryClient {
    /// Create a client for the given backend with an API token.
    pub fn new(base_url: impl Into<String>, api_token: impl Into<String>) -> Result<Self, Error> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .connect_timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| Error::Config(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_token: api_token.into(),
            on_auth_failure: None,
        })
    }

    /// Create a client from `FABLE_API_URL` and `FABLE_API_TOKEN`.
    pub fn from_env() -> Result<Self, Error> {
        let base_url = std::env::var("FABLE_API_URL")
            .map_err(|_| Error::Config("FABLE_API_URL not set".into()))?;
        let api_token = std::env::var("FABLE_API_TOKEN")
            .map_err(|_| Error::Config("FABLE_API_TOKEN not set".into()))?;
        Self::new(base_url, api_token)
    }

    /// Install a hook fired whenever the backend rejects credentials.
    pub fn with_auth_failure_hook(mut self, hook: AuthFailureHook) -> Self {
        self.on_auth_failure = Some(hook);
        self
    }

    fn build_headers(&self) -> Result<HeaderMap, Error> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(&self.api_token)
                .map_err(|e| Error::Config(format!("invalid API token: {e}")))?,
        );
        Ok(headers)
    }

    fn notify_auth_failure(&self, status: u16) {
        if status == 401 || status == 403 {
            if let Some(hook) = &self.on_auth_failure {
                hook();
            }
        }
    }

    async fn post_json<B: serde::Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<reqwest::Response, Error> {
        let response = self
            .client
            .post(format!("{}{path}", self.base_url))
            .headers(self.build_headers()?)
            .json(body)
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let code = status.as_u16();
            self.notify_auth_failure(code);
            let message = response.text().await.unwrap_or_default();
            return Err(Error::Api {
                status: code,
                message,
            });
        }

        Ok(response)
    }

    /// Open the streamed turn endpoint.
    ///
    /// The connection is read by a background task that feeds a
    /// [`FrameDecoder`] and forwards decoded events over a channel.
    /// Dropping (or aborting) the returned handle tears the connection
    /// down, which is how the one-outstanding-stream invariant is
    /// enforced by callers.
    pub fn stream_turn(&self, request: &TextRequest) -> Result<StreamHandle, Error> {
        let headers = self.build_headers()?;
        let url = format!("{}/game/stream", self.base_url);
        let client = self.client.clone();
        let body = request.clone();
        let on_auth_failure = self.on_auth_failure.clone();

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let task = tokio::spawn(async move {
            let response = match client.post(url).headers(headers).json(&body).send().await {
                Ok(response) => response,
                Err(err) => {
                    let _ = tx
                        .send(NarrativeEvent::Error {
                            message: err.to_string(),
                        })
                        .await;
                    return;
                }
            };

            let status = response.status();
            if !status.is_success() {
                let code = status.as_u16();
                if code == 401 || code == 403 {
                    if let Some(hook) = &on_auth_failure {
                        hook();
                    }
                }
                let _ = tx
                    .send(NarrativeEvent::Error {
                        message: format!("stream connection failed: status {code}"),
                    })
                    .await;
                return;
            }

            let mut bytes = response.bytes_stream();
            let mut decoder = FrameDecoder::new();
            while let Some(chunk) = bytes.next().await {
                let events = match chunk {
                    Ok(bytes) => decoder.feed(&String::from_utf8_lossy(&bytes)),
                    Err(err) => vec![NarrativeEvent::Error {
                        message: err.to_string(),
                    }],
                };
                for event in events {
                    // Receiver gone: the turn was abandoned.
                    if tx.send(event).await.is_err() {
                        return;
                    }
                }
            }
        });

        Ok(StreamHandle {
            events: rx,
            task: Some(task),
        })
    }

    /// Request narrative text (non-streamed).
    pub async fn generate_text(&self, request: &TextRequest) -> Result<String, Error> {
        #[derive(Deserialize)]
        struct TextResponse {
            text: String,
        }

        let response = self.post_json("/ai/text", request).await?;
        let payload: TextResponse = response
            .json()
            .await
            .map_err(|e| Error::Parse(e.to_string()))?;
        Ok(payload.text)
    }

    /// Request narration audio, returned base64-encoded.
    pub async fn generate_audio(&self, request: &SpeechRequest) -> Result<String, Error> {
        #[derive(Deserialize)]
        struct AudioResponse {
            audio: String,
        }

        let response = self.post_json("/ai/audio", request).await?;
        let payload: AudioResponse = response
            .json()
            .await
            .map_err(|e| Error::Parse(e.to_string()))?;
        Ok(payload.audio)
    }

    /// Request a scene illustration, returned base64-encoded.
    pub async fn generate_image(&self, prompt: &str) -> Result<String, Error> {
        #[derive(serde::Serialize)]
        struct ImageRequest<'a> {
            prompt: &'a str,
        }

        #[derive(Deserialize)]
        struct ImageResponse {
            image: Option<String>,
        }

        let response = self.post_json("/ai/image", &ImageRequest { prompt }).await?;
        let payload: ImageResponse = response
            .json()
            .await
            .map_err(|e| Error::Parse(e.to_string()))?;
        payload
            .image
            .ok_or_else(|| Error::Parse("response missing image payload".into()))
    }
}

#[async_trait]
impl TurnSource for StoryClient {
    async fn open_turn(&self, request: &TextRequest) -> Result<StreamHandle, Error> {
        self.stream_turn(request)
    }
}

#[async_trait]
impl TextProvider for StoryClient {
    async fn generate(&self, request: &TextRequest) -> Result<String, Error> {
        self.generate_text(request).await
    }
}

#[async_trait]
impl SpeechProvider for StoryClient {
    async fn synthesize(&self, request: &SpeechRequest) -> Result<String, Error> {
        self.generate_audio(request).await
    }
}

#[async_trait]
impl ImageProvider for StoryClient {
    async fn render(&self, prompt: &str) -> Result<String, Error> {
        self.generate_image(prompt).await
    }
}

/// A live turn stream.
///
/// Events arrive in stream order. At most one stream may be
/// outstanding per session; starting a new turn aborts the previous
/// handle so two turns' events can never interleave.
pub struct StreamHandle {
    events: mpsc::Receiver<NarrativeEvent>,
    task: Option<JoinHandle<()>>,
}

impl StreamHandle {
    /// Build a handle that replays a fixed event sequence.
    ///
    /// Used by tests and scripted sessions; no connection is made.
    pub fn from_events(events: Vec<NarrativeEvent>) -> Self {
        let (tx, rx) = mpsc::channel(events.len().max(1));
        for event in events {
            // Capacity covers the whole script.
            let _ = tx.try_send(event);
        }
        Self {
            events: rx,
            task: None,
        }
    }

    /// Wait for the next event; `None` once the stream is finished.
    pub async fn next_event(&mut self) -> Option<NarrativeEvent> {
        self.events.recv().await
    }

    /// Take an already-delivered event without waiting.
    pub fn try_next_event(&mut self) -> Option<NarrativeEvent> {
        self.events.try_recv().ok()
    }

    /// Tear down the connection.
    pub fn abort(&self) {
        if let Some(task) = &self.task {
            task.abort();
        }
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        self.abort();
    }
}
