//! Incremental Server-Sent-Events parsing for provider implementations.
//!
//! Network chunks do not respect event boundaries: a read may end in the
//! middle of a line or between the lines of one event. The parser owns a
//! buffer, so callers just feed chunks as they arrive and collect the
//! events that completed.

use serde_json::Value;

/// A parsed Server-Sent Event.
#[derive(Debug, Clone, PartialEq)]
pub struct SseEvent {
    pub event_type: Option<String>,
    /// Decoded `data:` payload. `None` for the `[DONE]` sentinel or
    /// non-JSON payloads.
    pub data: Option<Value>,
}

/// Stateful SSE decoder. Feed it raw text chunks; it emits an event for
/// every blank-line-terminated block seen so far and keeps the rest
/// buffered for the next chunk.
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: String,
    event_type: Option<String>,
    data: String,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume a chunk and return the events it completed.
    pub fn feed(&mut self, chunk: &str) -> Vec<SseEvent> {
        self.buffer.push_str(chunk);
        let mut events = Vec::new();

        // Only consume fully terminated lines; a trailing fragment stays
        // buffered until its newline arrives.
        while let Some(newline) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=newline).collect();
            let line = line.trim_end_matches(['\n', '\r']);

            if line.is_empty() {
                if let Some(event) = self.take_event() {
                    events.push(event);
                }
            } else if let Some(event_type) = line.strip_prefix("event:") {
                self.event_type = Some(event_type.trim().to_string());
            } else if let Some(data) = line.strip_prefix("data:") {
                if !self.data.is_empty() {
                    self.data.push('\n');
                }
                self.data.push_str(data.trim_start());
            }
            // Comment lines (":keepalive") and unknown fields are ignored.
        }

        events
    }

    /// Flush a final unterminated event, if any. Call once at stream end.
    pub fn finish(&mut self) -> Option<SseEvent> {
        // A dangling partial line still counts as data at stream end.
        if !self.buffer.is_empty() {
            let line = std::mem::take(&mut self.buffer);
            let line = line.trim_end_matches(['\n', '\r']);
            if let Some(data) = line.strip_prefix("data:") {
                if !self.data.is_empty() {
                    self.data.push('\n');
                }
                self.data.push_str(data.trim_start());
            } else if let Some(event_type) = line.strip_prefix("event:") {
                self.event_type = Some(event_type.trim().to_string());
            }
        }
        self.take_event()
    }

    fn take_event(&mut self) -> Option<SseEvent> {
        if self.data.is_empty() && self.event_type.is_none() {
            return None;
        }
        let data = std::mem::take(&mut self.data);
        let event_type = self.event_type.take();

        let parsed = if data.is_empty() || data == "[DONE]" {
            None
        } else {
            serde_json::from_str::<Value>(&data).ok()
        };
        Some(SseEvent {
            event_type,
            data: parsed,
        })
    }
}

/// Parse a complete chunk of SSE text in one shot.
pub fn parse_sse_chunk(chunk: &str) -> Vec<SseEvent> {
    let mut parser = SseParser::new();
    let mut events = parser.feed(chunk);
    if let Some(last) = parser.finish() {
        events.push(last);
    }
    events
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_single_event() {
        let chunk = "event: message_start\ndata: {\"type\":\"message_start\"}\n\n";
        let events = parse_sse_chunk(chunk);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type.as_deref(), Some("message_start"));
        assert!(events[0].data.is_some());
    }

    #[test]
    fn parse_multiple_events() {
        let chunk = "event: content_block_delta\ndata: {\"type\":\"delta\"}\n\nevent: message_stop\ndata: {\"type\":\"stop\"}\n\n";
        let events = parse_sse_chunk(chunk);
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].event_type.as_deref(), Some("message_stop"));
    }

    #[test]
    fn parse_done_sentinel() {
        let events = parse_sse_chunk("data: [DONE]\n\n");
        assert_eq!(events.len(), 1);
        assert!(events[0].data.is_none());
    }

    #[test]
    fn parse_empty_chunk() {
        assert!(parse_sse_chunk("").is_empty());
    }

    #[test]
    fn multiline_data_is_joined() {
        let events = parse_sse_chunk("data: {\"a\":\ndata: 1}\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, Some(serde_json::json!({"a": 1})));
    }

    #[test]
    fn comment_lines_are_ignored() {
        let events = parse_sse_chunk(": keepalive\n\ndata: {\"x\":1}\n\n");
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn event_split_across_chunks() {
        let mut parser = SseParser::new();
        assert!(parser.feed("event: content_bl").is_empty());
        assert!(parser.feed("ock_delta\ndata: {\"te").is_empty());
        let events = parser.feed("xt\":\"hi\"}\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type.as_deref(), Some("content_block_delta"));
        assert_eq!(events[0].data, Some(serde_json::json!({"text": "hi"})));
    }

    #[test]
    fn crlf_lines_are_handled() {
        let events = parse_sse_chunk("data: {\"x\":1}\r\n\r\n");
        assert_eq!(events.len(), 1);
        assert!(events[0].data.is_some());
    }

    #[test]
    fn finish_flushes_unterminated_event() {
        let mut parser = SseParser::new();
        assert!(parser.feed("data: {\"x\":1}").is_empty());
        let last = parser.finish().unwrap();
        assert_eq!(last.data, Some(serde_json::json!({"x": 1})));
    }

    #[test]
    fn finish_on_clean_stream_is_none() {
        let mut parser = SseParser::new();
        parser.feed("data: {\"x\":1}\n\n");
        assert!(parser.finish().is_none());
    }
}
