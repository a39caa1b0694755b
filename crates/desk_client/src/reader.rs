//! Chunk reader: byte chunks in, complete text lines out.

use std::pin::Pin;

use async_stream::stream;
use futures_util::{Stream, StreamExt};

use crate::backend::ByteStream;
use crate::error::{DeskError, Result};

pub type LineStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Longest line accepted before the stream is treated as broken.
pub const MAX_LINE_LENGTH: usize = 1024 * 1024;

/// Carries the unterminated tail of one chunk over to the next.
///
/// Splitting happens on raw bytes, so a chunk boundary that falls inside a
/// multi-byte UTF-8 sequence is reassembled before anything is decoded.
#[derive(Debug)]
pub struct LineBuffer {
    pending: Vec<u8>,
    max_line_length: usize,
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::with_max_line_length(MAX_LINE_LENGTH)
    }
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_line_length(max_line_length: usize) -> Self {
        Self {
            pending: Vec::new(),
            max_line_length,
        }
    }

    /// Feed one chunk and drain every line it completes.
    ///
    /// Fails once a line, terminated or not, grows past the length limit.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<String>> {
        let mut lines = Vec::new();
        // Bytes already buffered hold no terminator.
        let mut cursor = self.pending.len();
        let mut line_start = 0;
        self.pending.extend_from_slice(chunk);

        while let Some(offset) = self.pending[cursor..]
            .iter()
            .position(|byte| *byte == b'\n')
        {
            let end = cursor + offset;
            self.check_length(end - line_start)?;
            lines.push(decode_line(&self.pending[line_start..end]));
            line_start = end + 1;
            cursor = line_start;
        }

        self.pending.drain(..line_start);
        self.check_length(self.pending.len())?;
        Ok(lines)
    }

    /// Flush the final line when the stream ended without a terminator.
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let line = decode_line(&self.pending);
        self.pending.clear();
        Some(line)
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    fn check_length(&self, len: usize) -> Result<()> {
        if len > self.max_line_length {
            return Err(DeskError::Stream(format!(
                "line exceeds {} bytes",
                self.max_line_length
            )));
        }
        Ok(())
    }
}

fn decode_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    match std::str::from_utf8(bytes) {
        Ok(line) => line.to_string(),
        Err(err) => {
            log::debug!("Replacing invalid UTF-8 in stream line: {}", err);
            String::from_utf8_lossy(bytes).into_owned()
        }
    }
}

/// Turn a response body into a lazy stream of lines.
///
/// A transport error is yielded once and ends the stream; normal completion
/// simply ends it. Dropping the returned stream releases the body.
pub fn lines(mut body: ByteStream) -> LineStream {
    Box::pin(stream! {
        let mut buffer = LineBuffer::new();
        while let Some(chunk) = body.next().await {
            match chunk {
                Ok(bytes) => match buffer.push(&bytes) {
                    Ok(complete) => {
                        for line in complete {
                            yield Ok(line);
                        }
                    }
                    Err(err) => {
                        log::warn!("Abandoning stream: {}", err);
                        yield Err(err);
                        return;
                    }
                },
                Err(err) => {
                    if buffer.has_pending() {
                        log::debug!("Discarding partial line after transport error");
                    }
                    yield Err(err);
                    return;
                }
            }
        }
        if let Some(line) = buffer.finish() {
            yield Ok(line);
        }
    })
}
