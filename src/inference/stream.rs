//! Decoder for the `data: {json}` lines of the generation stream.
//!
//! Network reads do not respect line boundaries, so bytes are buffered until a
//! newline arrives. Only the trailing partial line is ever kept; complete lines
//! are parsed and released immediately. Buffering bytes rather than text keeps
//! multi-byte characters split across reads intact.

use super::types::StreamEvent;
use tracing::warn;

/// Longest partial line kept while waiting for its newline
pub const MAX_PENDING_LINE: usize = 1024 * 1024;
pub const LINE_TOO_LONG_ERROR: &str = "Ligne de flux de génération trop longue";

#[derive(Debug, Default)]
pub struct SseLineDecoder {
    pending: Vec<u8>,
}

impl SseLineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one network read and return the events completed by it
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<StreamEvent> {
        self.pending.extend_from_slice(bytes);

        let mut events = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            if let Some(event) = Self::parse_line(&line) {
                events.push(event);
            }
        }

        if self.pending.len() > MAX_PENDING_LINE {
            warn!(buffered = self.pending.len(), "Streaming line exceeds limit, discarding");
            self.pending.clear();
            events.push(StreamEvent::Error { error: LINE_TOO_LONG_ERROR.to_string() });
        }
        events
    }

    /// Flush a final line that was not newline-terminated
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        let line = std::mem::take(&mut self.pending);
        Self::parse_line(&line).into_iter().collect()
    }

    /// Bytes held back waiting for a newline
    pub fn buffered(&self) -> usize {
        self.pending.len()
    }

    fn parse_line(raw: &[u8]) -> Option<StreamEvent> {
        let line = String::from_utf8_lossy(raw);
        let line = line.trim_end_matches(['\n', '\r']);
        let payload = line.strip_prefix("data: ")?;

        match serde_json::from_str::<StreamEvent>(payload) {
            Ok(event) => Some(event),
            Err(e) => {
                warn!(error = %e, line = %line, "Failed to parse streaming data");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_complete_frames() {
        let mut decoder = SseLineDecoder::new();
        let events = decoder.feed(
            b"data: {\"type\":\"start\",\"time\":0.1,\"nb_token_input\":42}\n\n\
              data: {\"type\":\"chunk\",\"content\":\"Le contrat\"}\n\n",
        );
        assert_eq!(events.len(), 2);
        assert_eq!(events[1], StreamEvent::Chunk { content: "Le contrat".to_string() });
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn test_frame_split_across_reads() {
        let mut decoder = SseLineDecoder::new();
        assert!(decoder.feed(b"data: {\"type\":\"chu").is_empty());
        assert!(decoder.feed(b"nk\",\"content\":\"pr").is_empty());
        let events = decoder.feed(b"\xc3\xa9avis\"}\n");
        assert_eq!(events, vec![StreamEvent::Chunk { content: "préavis".to_string() }]);
    }

    #[test]
    fn test_multibyte_character_split_across_reads() {
        let mut decoder = SseLineDecoder::new();
        let frame = "data: {\"type\":\"chunk\",\"content\":\"é\"}\n".as_bytes();
        let split = frame.iter().position(|b| *b == 0xc3).unwrap() + 1;
        assert!(decoder.feed(&frame[..split]).is_empty());
        let events = decoder.feed(&frame[split..]);
        assert_eq!(events, vec![StreamEvent::Chunk { content: "é".to_string() }]);
    }

    #[test]
    fn test_garbage_and_comment_lines_are_skipped() {
        let mut decoder = SseLineDecoder::new();
        let events = decoder.feed(
            b": keep-alive\n\
              data: {not json}\n\
              event: message\n\
              data: {\"type\":\"error\",\"error\":\"quota\"}\r\n",
        );
        assert_eq!(events, vec![StreamEvent::Error { error: "quota".to_string() }]);
    }

    #[test]
    fn test_unterminated_line_is_capped() {
        let mut decoder = SseLineDecoder::new();
        let filler = vec![b'x'; MAX_PENDING_LINE / 2];
        assert!(decoder.feed(b"data: ").is_empty());
        assert!(decoder.feed(&filler).is_empty());

        let events = decoder.feed(&filler);
        assert_eq!(events, vec![StreamEvent::Error { error: LINE_TOO_LONG_ERROR.to_string() }]);
        assert_eq!(decoder.buffered(), 0);

        let events = decoder.feed(b"data: {\"type\":\"chunk\",\"content\":\"ok\"}\n");
        assert_eq!(events, vec![StreamEvent::Chunk { content: "ok".to_string() }]);
    }

    #[test]
    fn test_finish_flushes_unterminated_line() {
        let mut decoder = SseLineDecoder::new();
        let events = decoder.feed(
            b"data: {\"type\":\"end\",\"time\":2.0,\"text\":\"ok\",\"nb_token_input\":1,\"nb_token_output\":1}",
        );
        assert!(events.is_empty());
        let events = decoder.finish();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], StreamEvent::End { .. }));
        assert!(decoder.finish().is_empty());
    }
}
