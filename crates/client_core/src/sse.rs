//! Incremental decoder for `text/event-stream` bodies.

use std::time::Duration;

use shared::protocol::{DeviceEvent, DEFAULT_CHANNEL};

/// Longest line kept while waiting for its terminator.
pub const MAX_LINE_LEN: usize = 64 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    pub event: String,
    pub data: String,
    pub id: Option<String>,
}

impl From<SseEvent> for DeviceEvent {
    fn from(value: SseEvent) -> Self {
        DeviceEvent::new(value.event, value.data)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseItem {
    Event(SseEvent),
    /// A line that could not be decoded. The stream itself stays usable.
    Invalid(String),
}

/// Splits a byte stream into events.
///
/// Pending partial lines and half-built events belong to one connection and
/// are dropped by [`SseDecoder::reset`]; the last event id and the server's
/// reconnection hint survive so they can be used on the next connection.
#[derive(Debug, Default)]
pub struct SseDecoder {
    line_buffer: Vec<u8>,
    event_type: String,
    data: String,
    has_data: bool,
    last_event_id: Option<String>,
    retry: Option<Duration>,
    at_stream_start: bool,
    // Bytes of `line_buffer` already known to hold no '\n'.
    scanned: usize,
    // Set while skipping the rest of an over-long line.
    discarding: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self {
            at_stream_start: true,
            ..Self::default()
        }
    }

    pub fn last_event_id(&self) -> Option<&str> {
        self.last_event_id.as_deref()
    }

    pub fn retry(&self) -> Option<Duration> {
        self.retry
    }

    pub fn reset(&mut self) {
        self.line_buffer.clear();
        self.event_type.clear();
        self.data.clear();
        self.has_data = false;
        self.at_stream_start = true;
        self.scanned = 0;
        self.discarding = false;
    }

    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseItem> {
        let mut items = Vec::new();
        self.line_buffer.extend_from_slice(chunk);
        while let Some(offset) = self.line_buffer[self.scanned..]
            .iter()
            .position(|byte| *byte == b'\n')
        {
            let newline_index = self.scanned + offset;
            let mut line = self.line_buffer.drain(..=newline_index).collect::<Vec<_>>();
            self.scanned = 0;
            if std::mem::take(&mut self.discarding) {
                continue;
            }
            line.pop();
            if matches!(line.last(), Some(b'\r')) {
                line.pop();
            }
            if self.at_stream_start {
                self.at_stream_start = false;
                if line.starts_with(&[0xEF, 0xBB, 0xBF]) {
                    line.drain(..3);
                }
            }
            match String::from_utf8(line) {
                Ok(line) => {
                    if let Some(event) = self.process_line(&line) {
                        items.push(SseItem::Event(event));
                    }
                }
                Err(err) => items.push(SseItem::Invalid(format!("line is not UTF-8: {err}"))),
            }
        }
        self.scanned = self.line_buffer.len();
        if self.scanned > MAX_LINE_LEN {
            self.line_buffer.clear();
            self.scanned = 0;
            if !self.discarding {
                self.discarding = true;
                items.push(SseItem::Invalid(format!(
                    "line exceeds {MAX_LINE_LEN} bytes, skipped"
                )));
            }
        }
        items
    }

    fn process_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => self.event_type = value.to_string(),
            "data" => {
                if self.has_data {
                    self.data.push('\n');
                }
                self.data.push_str(value);
                self.has_data = true;
            }
            "id" if !value.contains('\0') => self.last_event_id = Some(value.to_string()),
            "retry" if !value.is_empty() && value.bytes().all(|byte| byte.is_ascii_digit()) => {
                if let Ok(millis) = value.parse::<u64>() {
                    self.retry = Some(Duration::from_millis(millis));
                }
            }
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        let event_type = std::mem::take(&mut self.event_type);
        if !self.has_data {
            return None;
        }
        self.has_data = false;
        let event = if event_type.is_empty() {
            DEFAULT_CHANNEL.to_string()
        } else {
            event_type
        };
        Some(SseEvent {
            event,
            data: std::mem::take(&mut self.data),
            id: self.last_event_id.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn events(items: Vec<SseItem>) -> Vec<SseEvent> {
        items
            .into_iter()
            .filter_map(|item| match item {
                SseItem::Event(event) => Some(event),
                SseItem::Invalid(_) => None,
            })
            .collect()
    }

    #[test]
    fn decodes_device_greeting() {
        let mut decoder = SseDecoder::new();
        let items = decoder.feed(b"retry: 1000\nid: 5123\ndata: hello!\n\n");
        assert_eq!(
            events(items),
            vec![SseEvent {
                event: "message".into(),
                data: "hello!".into(),
                id: Some("5123".into()),
            }]
        );
        assert_eq!(decoder.retry(), Some(Duration::from_millis(1000)));
        assert_eq!(decoder.last_event_id(), Some("5123"));
    }

    #[test]
    fn named_events_keep_their_channel() {
        let mut decoder = SseDecoder::new();
        let items = decoder.feed(b"event: cmd\r\ndata: OK\r\n\r\ndata: next\n\n");
        let items = events(items);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].event, "cmd");
        assert_eq!(items[0].data, "OK");
        assert_eq!(items[1].event, "message");
    }

    #[test]
    fn events_split_across_chunks() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.feed(b"event: c").is_empty());
        assert!(decoder.feed(b"md\ndata: O").is_empty());
        let items = events(decoder.feed(b"K\n\n"));
        assert_eq!(items[0].event, "cmd");
        assert_eq!(items[0].data, "OK");
    }

    #[test]
    fn multi_line_data_is_joined_with_newlines() {
        let mut decoder = SseDecoder::new();
        let items = events(decoder.feed(b"data: one\ndata\ndata:three\n\n"));
        assert_eq!(items[0].data, "one\n\nthree");
    }

    #[test]
    fn comments_and_empty_blocks_do_not_dispatch() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.feed(b": keep-alive\n\nevent: cmd\n\n").is_empty());
        // The event type of a data-less block does not leak into the next one.
        let items = events(decoder.feed(b"data: x\n\n"));
        assert_eq!(items[0].event, "message");
    }

    #[test]
    fn bad_retry_values_are_ignored() {
        let mut decoder = SseDecoder::new();
        decoder.feed(b"retry: soon\nretry: -5\n\n");
        assert_eq!(decoder.retry(), None);
    }

    #[test]
    fn invalid_utf8_line_is_reported_and_skipped() {
        let mut decoder = SseDecoder::new();
        let items = decoder.feed(b"data: \xff\xfe\ndata: ok\n\n");
        assert!(matches!(items[0], SseItem::Invalid(_)));
        assert_eq!(
            items[1],
            SseItem::Event(SseEvent {
                event: "message".into(),
                data: "ok".into(),
                id: None,
            })
        );
    }

    #[test]
    fn reset_drops_partial_event_but_keeps_last_id() {
        let mut decoder = SseDecoder::new();
        decoder.feed(b"id: 7\ndata: complete\n\ndata: partial\nevent: cm");
        decoder.reset();
        assert_eq!(decoder.last_event_id(), Some("7"));
        let items = events(decoder.feed(b"data: fresh\n\n"));
        assert_eq!(items[0].data, "fresh");
        assert_eq!(items[0].event, "message");
    }

    #[test]
    fn leading_byte_order_mark_is_stripped() {
        let mut decoder = SseDecoder::new();
        let items = events(decoder.feed(b"\xEF\xBB\xBFdata: x\n\n"));
        assert_eq!(items[0].data, "x");
    }

    #[test]
    fn over_long_line_is_reported_once_and_skipped() {
        let mut decoder = SseDecoder::new();
        let items = decoder.feed(&vec![b'a'; MAX_LINE_LEN + 1]);
        assert!(matches!(items.as_slice(), [SseItem::Invalid(_)]));
        assert!(decoder.line_buffer.is_empty());

        assert!(decoder.feed(&vec![b'a'; MAX_LINE_LEN + 1]).is_empty());
        let items = events(decoder.feed(b"aaa\ndata: ok\n\n"));
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].data, "ok");
    }

    #[test]
    fn byte_at_a_time_feeding_decodes_the_same_event() {
        let mut decoder = SseDecoder::new();
        let mut items = Vec::new();
        for byte in b"event: cmd\r\ndata: OK\r\n\r\n" {
            items.extend(decoder.feed(&[*byte]));
        }
        let items = events(items);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].event, "cmd");
        assert_eq!(items[0].data, "OK");
    }
}
