//! Event-stream decoder
//!
//! Incremental parser for `text/event-stream` bodies. Handles:
//! - Line buffering across arbitrary chunk boundaries
//! - `\n` and `\r\n` line endings
//! - Multi-line `data:` fields joined with `\n`
//! - Comment lines (`:`) and fields other than `data`, which are ignored

use bytes::BytesMut;

/// Longest line accepted before the decoder drops it
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

/// Buffers raw body bytes and yields the data of each completed event
#[derive(Debug)]
pub struct SseDecoder {
    buffer: BytesMut,
    data: Vec<String>,
    /// Bytes of `buffer` already known to hold no newline
    scanned: usize,
    max_line: usize,
    /// Set while the rest of an oversized line is being thrown away
    discarding: bool,
}

impl Default for SseDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::with_max_line(MAX_LINE_BYTES)
    }

    pub fn with_max_line(max_line: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(8192),
            data: Vec::new(),
            scanned: 0,
            max_line: max_line.max(1),
            discarding: false,
        }
    }

    /// Append a chunk and return the payloads of all events it completed
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();

        loop {
            let Some(offset) = self.buffer[self.scanned..].iter().position(|&b| b == b'\n') else {
                self.scanned = self.buffer.len();
                break;
            };

            let mut line_bytes = self.buffer.split_to(self.scanned + offset + 1);
            self.scanned = 0;

            if self.discarding {
                self.discarding = false;
                continue;
            }

            line_bytes.truncate(line_bytes.len() - 1);
            if line_bytes.last() == Some(&b'\r') {
                line_bytes.truncate(line_bytes.len() - 1);
            }

            let Ok(line) = std::str::from_utf8(&line_bytes) else {
                tracing::warn!("Skipping non UTF-8 event-stream line");
                continue;
            };

            if line.is_empty() {
                if !self.data.is_empty() {
                    events.push(self.data.join("\n"));
                    self.data.clear();
                }
                continue;
            }

            if line.starts_with(':') {
                continue;
            }

            if let Some(value) = line.strip_prefix("data:") {
                let value = value.strip_prefix(' ').unwrap_or(value);
                self.data.push(value.to_string());
            }
        }

        if self.buffer.len() > self.max_line {
            tracing::warn!(
                buffered = self.buffer.len(),
                max_line = self.max_line,
                "Event-stream line too long, dropping event"
            );
            self.buffer.clear();
            self.scanned = 0;
            self.data.clear();
            self.discarding = true;
        }

        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_event() {
        let mut decoder = SseDecoder::new();
        let events = decoder.feed(b"data: {\"type\":\"heartbeat\"}\n\n");
        assert_eq!(events, vec![r#"{"type":"heartbeat"}"#]);
    }

    #[test]
    fn test_event_split_across_chunks() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.feed(b"data: {\"ty").is_empty());
        assert!(decoder.feed(b"pe\":\"a\"}\r\n").is_empty());
        let events = decoder.feed(b"\r\ndata: {\"type\":\"b\"}\n\n");
        assert_eq!(events, vec![r#"{"type":"a"}"#, r#"{"type":"b"}"#]);
    }

    #[test]
    fn test_multiline_data_and_comments() {
        let mut decoder = SseDecoder::new();
        let events = decoder.feed(b": keep-alive\nevent: update\ndata:line1\ndata: line2\nid: 7\n\n");
        assert_eq!(events, vec!["line1\nline2"]);
    }

    #[test]
    fn test_blank_lines_without_data_dispatch_nothing() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.feed(b"\n\n: ping\n\n").is_empty());
    }

    #[test]
    fn test_oversized_line_is_dropped_and_decoding_resumes() {
        let mut decoder = SseDecoder::with_max_line(16);
        assert!(decoder.feed(b"data: aaaaaaaaaaaaaaaa").is_empty());
        assert!(decoder.feed(b"aaaaaaaaaaaaaaaaaaaa").is_empty());
        assert!(decoder.buffer.is_empty());

        let events = decoder.feed(b"aaa\n\ndata: ok\n\n");
        assert_eq!(events, vec!["ok"]);
    }

    #[test]
    fn test_many_small_chunks_without_newline() {
        let mut decoder = SseDecoder::new();
        for _ in 0..1000 {
            assert!(decoder.feed(b"x").is_empty());
        }
        assert_eq!(decoder.scanned, 1000);
        assert!(decoder.feed(b"\n").is_empty());
        assert_eq!(decoder.scanned, 0);
        assert_eq!(decoder.feed(b"data: y\n\n"), vec!["y"]);
    }
}
