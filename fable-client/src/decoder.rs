//! Incremental decoder for the blank-line-framed event stream.
//!
//! The inbound protocol is text/event-stream-like: frames are
//! terminated by a blank line, and only `data:`-prefixed lines inside
//! a frame carry payload (JSON-encoded [`NarrativeEvent`]s). Other
//! field prefixes (`id:`, `event:`, `retry:`) are permitted and
//! ignored. The decoder owns the buffer for exactly one connection and
//! tolerates frames split at arbitrary chunk boundaries, including in
//! the middle of the separator itself.

use crate::event::NarrativeEvent;
use futures::StreamExt;
use tokio_stream::Stream;

/// Incremental frame decoder with a persistent carry-over buffer.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: String,
}

impl FrameDecoder {
    /// Create a decoder with an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and decode every complete frame it finishes.
    ///
    /// Events are returned in stream order. Malformed payload lines
    /// are logged and skipped; they never abort the scan or leave the
    /// buffer unscannable.
    pub fn feed(&mut self, chunk: &str) -> Vec<NarrativeEvent> {
        self.buffer.push_str(chunk);

        let mut events = Vec::new();
        while let Some(boundary) = self.buffer.find("\n\n") {
            let frame: String = self.buffer.drain(..boundary + 2).collect();
            decode_frame(frame.trim(), &mut events);
        }
        events
    }

    /// The unconsumed tail: bytes of a frame still awaiting its
    /// terminator.
    pub fn remainder(&self) -> &str {
        &self.buffer
    }
}

/// Decode one complete frame, appending any events it carries.
fn decode_frame(frame: &str, out: &mut Vec<NarrativeEvent>) {
    if frame.is_empty() {
        return;
    }

    // A frame may hold several lines (id, event, data, retry); only
    // data lines are interpreted here.
    for line in frame.lines() {
        let line = line.trim();
        let Some(payload) = line.strip_prefix("data:") else {
            continue;
        };

        let payload = payload.trim();
        if payload.is_empty() {
            continue;
        }

        match serde_json::from_str::<NarrativeEvent>(payload) {
            Ok(event) => out.push(event),
            Err(err) => {
                log::warn!("dropping malformed event payload ({err}): {payload}");
            }
        }
    }
}

/// Adapt a raw byte stream into a stream of decoded events.
///
/// Read errors surface as [`NarrativeEvent::Error`] items rather than
/// terminating the stream abruptly, so consumers observe them in
/// order.
pub fn decode_byte_stream<S, B, E>(stream: S) -> impl Stream<Item = NarrativeEvent>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    stream
        .scan(FrameDecoder::new(), |decoder, result| {
            let events = match result {
                Ok(bytes) => decoder.feed(&String::from_utf8_lossy(bytes.as_ref())),
                Err(err) => vec![NarrativeEvent::Error {
                    message: err.to_string(),
                }],
            };
            futures::future::ready(Some(events))
        })
        .flat_map(futures::stream::iter)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(message: &str) -> NarrativeEvent {
        NarrativeEvent::Status {
            message: message.into(),
        }
    }

    #[test]
    fn test_single_frame() {
        let mut decoder = FrameDecoder::new();
        let events = decoder.feed("data: {\"type\":\"status\",\"message\":\"Thinking...\"}\n\n");

        assert_eq!(events, vec![status("Thinking...")]);
        assert_eq!(decoder.remainder(), "");
    }

    #[test]
    fn test_multiple_frames_in_one_chunk() {
        let mut decoder = FrameDecoder::new();
        let events = decoder.feed(
            "data: {\"type\":\"status\",\"message\":\"a\"}\n\ndata: {\"type\":\"done\"}\n\n",
        );

        assert_eq!(events, vec![status("a"), NarrativeEvent::Done]);
    }

    #[test]
    fn test_frame_split_across_chunks() {
        let mut decoder = FrameDecoder::new();

        let events = decoder.feed("data: {\"type\":\"status\",\"messa");
        assert!(events.is_empty());
        assert!(decoder.remainder().contains("messa"));

        let events = decoder.feed("ge\":\"Thinking...\"}\n\n");
        assert_eq!(events, vec![status("Thinking...")]);
        assert_eq!(decoder.remainder(), "");
    }

    #[test]
    fn test_separator_split_across_chunks() {
        let mut decoder = FrameDecoder::new();

        let events = decoder.feed("data: {\"type\":\"done\"}\n");
        assert!(events.is_empty());

        let events = decoder.feed("\n");
        assert_eq!(events, vec![NarrativeEvent::Done]);
    }

    #[test]
    fn test_reassembly_is_chunking_invariant() {
        let input = "data: {\"type\":\"status\",\"message\":\"a\"}\n\n\
                     id: 3\nevent: message\ndata: {\"type\":\"image\",\"index\":0,\"data\":\"xyz\"}\n\n\
                     data: {\"type\":\"done\"}\n\n";

        let mut whole = FrameDecoder::new();
        let expected = whole.feed(input);
        assert_eq!(expected.len(), 3);

        // Re-feed the same text one byte at a time.
        for chunk_size in [1, 2, 7] {
            let mut decoder = FrameDecoder::new();
            let mut events = Vec::new();
            let bytes = input.as_bytes();
            for chunk in bytes.chunks(chunk_size) {
                events.extend(decoder.feed(std::str::from_utf8(chunk).unwrap()));
            }
            assert_eq!(events, expected, "chunk size {chunk_size}");
        }
    }

    #[test]
    fn test_multi_line_frame_ignores_metadata() {
        let mut decoder = FrameDecoder::new();
        let events = decoder.feed("id: 1\nevent: message\ndata: {\"type\":\"status\"}\n\n");

        assert_eq!(events, vec![status("")]);
    }

    #[test]
    fn test_malformed_payload_is_skipped() {
        let mut decoder = FrameDecoder::new();
        let events = decoder.feed("data: {invalid}\n\ndata: {\"type\":\"done\"}\n\n");

        assert_eq!(events, vec![NarrativeEvent::Done]);
    }

    #[test]
    fn test_whitespace_frames_are_ignored() {
        let mut decoder = FrameDecoder::new();
        let events = decoder.feed("\n\ndata: {\"type\":\"status\"}\n\n  \n\ndata:\n\n");

        assert_eq!(events, vec![status("")]);
    }

    #[tokio::test]
    async fn test_decode_byte_stream() {
        let chunks: Vec<Result<&[u8], std::io::Error>> = vec![
            Ok(b"data: {\"type\":\"status\",\"mes"),
            Ok(b"sage\":\"go\"}\n\n"),
            Ok(b"data: {\"type\":\"done\"}\n\n"),
        ];
        let events: Vec<_> = decode_byte_stream(futures::stream::iter(chunks))
            .collect()
            .await;

        assert_eq!(events, vec![status("go"), NarrativeEvent::Done]);
    }
}
