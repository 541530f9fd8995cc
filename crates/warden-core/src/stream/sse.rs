//! Single-purpose SSE channel: one tagged part per event plus a done marker.
//!
//! ```text
//! data: {"type":"data-stage","data":{"stage":"generate"}}
//!
//! data: [DONE]
//!
//! ```

use super::protocol::{to_json, DataPart, LineKind, StreamDecodeError};

const DATA_FIELD: &str = "data:";
const DONE_MARKER: &str = "[DONE]";

/// A decoded SSE entry.
#[derive(Debug, Clone, PartialEq)]
pub enum SseEvent {
    Part(DataPart),
    Done,
}

/// Encode one part as an SSE event.
pub fn encode_sse_part(part: &DataPart) -> String {
    format!("{} {}\n\n", DATA_FIELD, to_json(part))
}

/// The explicit end-of-stream marker.
pub fn encode_sse_done_line() -> String {
    format!("{} {}\n\n", DATA_FIELD, DONE_MARKER)
}

/// Incremental SSE decoder, buffering partial lines like
/// [`super::StreamDecoder`] and sharing its error behavior: a malformed
/// event is consumed and reported, its neighbours are still delivered.
#[derive(Debug, Default)]
pub struct SseDecoder {
    pending: Vec<u8>,

    /// Offset into `pending` already scanned for a terminator
    scan_from: usize,

    lines_seen: usize,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the next chunk, appending every completed event to `out`.
    pub fn push(&mut self, chunk: &[u8], out: &mut Vec<SseEvent>) -> Result<(), StreamDecodeError> {
        self.pending.extend_from_slice(chunk);

        let mut first_error = None;
        let mut start = 0;
        let mut cursor = self.scan_from;
        while let Some(offset) = self.pending[cursor..].iter().position(|&b| b == b'\n') {
            let end = cursor + offset;
            self.lines_seen += 1;
            match decode_sse_line(&self.pending[start..end], self.lines_seen) {
                Ok(Some(event)) => out.push(event),
                Ok(None) => {}
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
            start = end + 1;
            cursor = start;
        }
        self.pending.drain(..start);
        self.scan_from = self.pending.len();
        first_error.map_or(Ok(()), Err)
    }

    pub fn finish(mut self) -> Result<Option<SseEvent>, StreamDecodeError> {
        if self.pending.is_empty() {
            return Ok(None);
        }
        self.lines_seen += 1;
        decode_sse_line(&self.pending, self.lines_seen)
    }
}

fn decode_sse_line(raw: &[u8], line_no: usize) -> Result<Option<SseEvent>, StreamDecodeError> {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    let line =
        std::str::from_utf8(raw).map_err(|_| StreamDecodeError::InvalidUtf8 { line: line_no })?;

    // Blank lines separate events; other SSE fields and comments are ignored.
    let Some(value) = line.strip_prefix(DATA_FIELD) else {
        return Ok(None);
    };
    let value = value.strip_prefix(' ').unwrap_or(value);
    if value == DONE_MARKER {
        return Ok(Some(SseEvent::Done));
    }
    serde_json::from_str(value)
        .map(|part| Some(SseEvent::Part(part)))
        .map_err(|e| StreamDecodeError::MalformedPayload {
            line: line_no,
            kind: LineKind::Data,
            reason: e.to_string(),
        })
}

/// Decode a fully materialized SSE payload.
pub fn decode_sse_events(bytes: &[u8]) -> Result<Vec<SseEvent>, StreamDecodeError> {
    let mut decoder = SseDecoder::new();
    let mut events = Vec::new();
    decoder.push(bytes, &mut events)?;
    events.extend(decoder.finish()?);
    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;

    #[test]
    fn test_encode_part_and_done() {
        let part = DataPart::cache_metadata(true);
        assert_eq!(
            encode_sse_part(&part),
            "data: {\"type\":\"data-cache-metadata\",\"data\":{\"cached\":true}}\n\n"
        );
        assert_eq!(encode_sse_done_line(), "data: [DONE]\n\n");
    }

    #[test]
    fn test_decode_mix_of_parts_and_done() {
        let mut payload = String::new();
        payload.push_str(&encode_sse_part(&DataPart::stage("generate", None)));
        payload.push_str(": keep-alive comment\n\n");
        payload.push_str(&encode_sse_part(&DataPart::AppError(AppError::cancelled("r"))));
        payload.push_str(&encode_sse_done_line());

        let events = decode_sse_events(payload.as_bytes()).unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0], SseEvent::Part(DataPart::stage("generate", None)));
        assert!(matches!(events[1], SseEvent::Part(DataPart::AppError(_))));
        assert_eq!(events[2], SseEvent::Done);
    }

    #[test]
    fn test_decode_split_across_chunks() {
        let payload = encode_sse_part(&DataPart::cache_metadata(false)) + &encode_sse_done_line();
        let bytes = payload.as_bytes();

        let mut decoder = SseDecoder::new();
        let mut events = Vec::new();
        for chunk in bytes.chunks(3) {
            decoder.push(chunk, &mut events).unwrap();
        }
        events.extend(decoder.finish().unwrap());
        assert_eq!(
            events,
            vec![SseEvent::Part(DataPart::cache_metadata(false)), SseEvent::Done]
        );
    }

    #[test]
    fn test_empty_payload() {
        assert!(decode_sse_events(b"").unwrap().is_empty());
    }

    #[test]
    fn test_malformed_part_is_an_error() {
        assert!(decode_sse_events(b"data: {broken\n\n").is_err());
    }

    #[test]
    fn test_malformed_part_keeps_neighbours_and_decoder_recovers() {
        let mut payload = encode_sse_part(&DataPart::cache_metadata(true));
        payload.push_str("data: {broken\n\n");
        payload.push_str(&encode_sse_part(&DataPart::stage("answer", None)));

        let mut decoder = SseDecoder::new();
        let mut events = Vec::new();
        let err = decoder.push(payload.as_bytes(), &mut events).unwrap_err();
        assert_eq!(err.line(), 3);
        assert_eq!(
            events,
            vec![
                SseEvent::Part(DataPart::cache_metadata(true)),
                SseEvent::Part(DataPart::stage("answer", None)),
            ]
        );

        events.clear();
        decoder.push(encode_sse_done_line().as_bytes(), &mut events).unwrap();
        assert_eq!(events, vec![SseEvent::Done]);
        assert!(decoder.finish().unwrap().is_none());
    }

    #[test]
    fn test_long_event_in_small_chunks() {
        let stage = "s".repeat(20_000);
        let payload = encode_sse_part(&DataPart::stage(stage.clone(), None));

        let mut decoder = SseDecoder::new();
        let mut events = Vec::new();
        for chunk in payload.as_bytes().chunks(7) {
            decoder.push(chunk, &mut events).unwrap();
        }
        assert_eq!(events, vec![SseEvent::Part(DataPart::stage(stage, None))]);
    }
}
