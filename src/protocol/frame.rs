//! Incremental decoding of `event:` / `data:` response frames.

use futures::{Stream, StreamExt};
use tracing::warn;

use super::event::ProtocolEvent;
use crate::error::TetherError;

/// One decoded frame: the optional `event:` name and the typed payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub event_name: Option<String>,
    pub event: ProtocolEvent,
}

/// Line-oriented frame decoder.
///
/// Bytes are buffered until a full line is available, so chunk boundaries
/// may fall anywhere, including inside a UTF-8 sequence.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
    event_name: Option<String>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return every frame completed by it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Frame> {
        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.buffer[start..].iter().position(|b| *b == b'\n') {
            let end = start + offset;
            let line = String::from_utf8_lossy(&self.buffer[start..end]).into_owned();
            start = end + 1;
            if let Some(frame) = self.decode_line(&line) {
                frames.push(frame);
            }
        }
        self.buffer.drain(..start);
        frames
    }

    /// Flush an unterminated trailing line once the byte stream has ended.
    pub fn finish(&mut self) -> Vec<Frame> {
        let rest = std::mem::take(&mut self.buffer);
        self.event_name = None;
        if rest.is_empty() {
            return Vec::new();
        }
        let line = String::from_utf8_lossy(&rest).into_owned();
        self.decode_line(&line).into_iter().collect()
    }

    /// Number of bytes waiting for a line terminator.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    fn decode_line(&mut self, line: &str) -> Option<Frame> {
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            // Blank line closes the frame.
            self.event_name = None;
            return None;
        }
        if line.starts_with(':') {
            return None;
        }
        if let Some(name) = field_value(line, "event") {
            self.event_name = Some(name.to_string());
            return None;
        }
        let data = field_value(line, "data")?;
        if data.is_empty() || data == "[DONE]" {
            return None;
        }
        match serde_json::from_str::<ProtocolEvent>(data) {
            Ok(event) => Some(Frame {
                event_name: self.event_name.clone(),
                event,
            }),
            Err(error) => {
                warn!(%error, payload = data, "dropping malformed frame");
                None
            }
        }
    }
}

fn field_value<'a>(line: &'a str, field: &str) -> Option<&'a str> {
    let rest = line.strip_prefix(field)?.strip_prefix(':')?;
    Some(rest.strip_prefix(' ').unwrap_or(rest))
}

/// Decode a byte stream into frames.
///
/// A transport error is yielded once and ends the stream.
pub fn decode_stream<S, B, E>(byte_stream: S) -> impl Stream<Item = Result<Frame, TetherError>>
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send,
    E: Into<TetherError> + Send,
{
    async_stream::stream! {
        let mut decoder = FrameDecoder::new();
        futures::pin_mut!(byte_stream);

        while let Some(chunk) = byte_stream.next().await {
            let chunk = match chunk {
                Ok(c) => c,
                Err(e) => {
                    yield Err(e.into());
                    return;
                }
            };
            for frame in decoder.push(chunk.as_ref()) {
                yield Ok(frame);
            }
        }

        for frame in decoder.finish() {
            yield Ok(frame);
        }
    }
}
