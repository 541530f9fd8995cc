//! Incremental decoding of the data stream.
//!
//! Bytes arrive in arbitrarily sized chunks. [`StreamDecoder`] keeps the
//! trailing partial line in `pending` and only parses lines once their
//! `\n` terminator has been seen, so a line may span any number of chunks
//! and a chunk may hold any number of lines. Splitting happens on raw bytes,
//! which keeps multi-byte UTF-8 sequences that straddle a chunk boundary
//! intact.

use super::protocol::{StreamDecodeError, StreamLine};

/// Buffering decoder for the line protocol.
#[derive(Debug, Default)]
pub struct StreamDecoder {
    /// Bytes of the current, not yet terminated line
    pending: Vec<u8>,

    /// Offset into `pending` already scanned for a terminator
    scan_from: usize,

    /// Complete lines consumed so far, blank lines included
    lines_seen: usize,
}

impl StreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the next chunk, appending every line it completed to `out`.
    ///
    /// A malformed line does not stop the chunk: it is consumed, the lines
    /// around it still land in `out`, and the first failure is returned
    /// once the chunk is exhausted. The decoder stays usable afterwards.
    pub fn push(
        &mut self,
        chunk: &[u8],
        out: &mut Vec<StreamLine>,
    ) -> Result<(), StreamDecodeError> {
        self.pending.extend_from_slice(chunk);

        let mut first_error = None;
        let mut start = 0;
        let mut cursor = self.scan_from;
        while let Some(offset) = self.pending[cursor..].iter().position(|&b| b == b'\n') {
            let end = cursor + offset;
            self.lines_seen += 1;
            match decode_raw(&self.pending[start..end], self.lines_seen) {
                Ok(Some(line)) => out.push(line),
                Ok(None) => {}
                Err(e) => {
                    tracing::debug!(line = e.line(), error = %e, "Skipping malformed stream line");
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

    /// End of input: parse whatever unterminated line is buffered.
    pub fn finish(mut self) -> Result<Option<StreamLine>, StreamDecodeError> {
        if self.pending.is_empty() {
            return Ok(None);
        }
        self.lines_seen += 1;
        let pending = std::mem::take(&mut self.pending);
        decode_raw(&pending, self.lines_seen)
    }

    /// Stop without parsing the buffered partial line. Returns how many
    /// bytes were discarded.
    pub fn abandon(self) -> usize {
        self.pending.len()
    }

    /// Bytes currently buffered for an unterminated line.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn lines_seen(&self) -> usize {
        self.lines_seen
    }
}

fn decode_raw(raw: &[u8], line_no: usize) -> Result<Option<StreamLine>, StreamDecodeError> {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    let line =
        std::str::from_utf8(raw).map_err(|_| StreamDecodeError::InvalidUtf8 { line: line_no })?;
    if line.trim().is_empty() {
        return Ok(None);
    }
    StreamLine::decode(line, line_no).map(Some)
}

/// Decode a fully materialized stream.
pub fn decode_data_stream(bytes: &[u8]) -> Result<Vec<StreamLine>, StreamDecodeError> {
    let mut decoder = StreamDecoder::new();
    let mut lines = Vec::new();
    decoder.push(bytes, &mut lines)?;
    lines.extend(decoder.finish()?);
    Ok(lines)
}

/// Encode lines into one wire payload.
pub fn encode_data_stream(lines: &[StreamLine]) -> String {
    lines.iter().map(StreamLine::encode).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::protocol::{DataPart, FinishReason, Usage};
    use proptest::prelude::*;

    fn sample_lines() -> Vec<StreamLine> {
        vec![
            StreamLine::start_step("msg-1"),
            StreamLine::data(vec![DataPart::stage("generate", Some("step-0".to_string()))]),
            StreamLine::text("Grüße, "),
            StreamLine::text("wörld 🌍"),
            StreamLine::data(vec![DataPart::cache_metadata(false)]),
            StreamLine::finish_step(FinishReason::Stop, Usage::new(10, 2), false),
            StreamLine::finish_message(FinishReason::Stop, Usage::new(10, 2)),
        ]
    }

    #[test]
    fn test_empty_input_yields_no_lines() {
        assert!(decode_data_stream(b"").unwrap().is_empty());

        let mut decoder = StreamDecoder::new();
        let mut lines = Vec::new();
        decoder.push(b"", &mut lines).unwrap();
        assert!(lines.is_empty());
        assert!(decoder.finish().unwrap().is_none());
    }

    #[test]
    fn test_long_text_line_round_trips() {
        let text: String = "abcdefghij".repeat(5_000);
        assert_eq!(text.chars().count(), 50_000);

        let encoded = encode_data_stream(&[StreamLine::text(text.clone())]);
        let lines = decode_data_stream(encoded.as_bytes()).unwrap();
        assert_eq!(lines.len(), 1);
        match &lines[0] {
            StreamLine::Text(decoded) => {
                assert_eq!(decoded.chars().count(), 50_000);
                assert_eq!(decoded, &text);
            }
            other => panic!("expected text, got {:?}", other),
        }
    }

    #[test]
    fn test_line_spanning_chunks() {
        let encoded = StreamLine::text("split me").encode();
        let (a, b) = encoded.as_bytes().split_at(5);

        let mut decoder = StreamDecoder::new();
        let mut lines = Vec::new();
        decoder.push(a, &mut lines).unwrap();
        assert!(lines.is_empty());
        assert_eq!(decoder.pending_len(), 5);
        decoder.push(b, &mut lines).unwrap();
        assert_eq!(lines, vec![StreamLine::text("split me")]);
        assert_eq!(decoder.pending_len(), 0);
    }

    #[test]
    fn test_multiple_lines_in_one_chunk() {
        let encoded = encode_data_stream(&sample_lines());
        let mut decoder = StreamDecoder::new();
        let mut lines = Vec::new();
        decoder.push(encoded.as_bytes(), &mut lines).unwrap();
        assert_eq!(lines, sample_lines());
    }

    #[test]
    fn test_crlf_and_blank_lines_tolerated() {
        let input = b"0:\"a\"\r\n\r\n\n0:\"b\"\n";
        let lines = decode_data_stream(input).unwrap();
        assert_eq!(lines, vec![StreamLine::text("a"), StreamLine::text("b")]);
    }

    #[test]
    fn test_trailing_line_without_newline() {
        let lines = decode_data_stream(b"0:\"a\"\n0:\"tail\"").unwrap();
        assert_eq!(lines, vec![StreamLine::text("a"), StreamLine::text("tail")]);
    }

    #[test]
    fn test_abandon_discards_partial_line() {
        let mut decoder = StreamDecoder::new();
        let mut lines = Vec::new();
        decoder.push(b"0:\"done\"\n0:\"half", &mut lines).unwrap();
        assert_eq!(lines, vec![StreamLine::text("done")]);
        assert_eq!(decoder.abandon(), "0:\"half".len());
    }

    #[test]
    fn test_error_reports_line_number() {
        let err = decode_data_stream(b"0:\"ok\"\n\n2:[nope]\n").unwrap_err();
        assert_eq!(err.line(), 3);
    }

    #[test]
    fn test_malformed_line_keeps_neighbours_and_decoder_recovers() {
        let mut decoder = StreamDecoder::new();
        let mut lines = Vec::new();

        let err = decoder
            .push(b"0:\"ok\"\n2:[bad]\n0:\"after\"\n", &mut lines)
            .unwrap_err();
        assert!(matches!(err, StreamDecodeError::MalformedPayload { line: 2, .. }));
        assert_eq!(lines, vec![StreamLine::text("ok"), StreamLine::text("after")]);
        assert_eq!(decoder.pending_len(), 0);
        assert_eq!(decoder.lines_seen(), 3);

        lines.clear();
        decoder.push(b"0:\"next\"\n", &mut lines).unwrap();
        decoder.push(b"0:\"again\"\n", &mut lines).unwrap();
        assert_eq!(lines, vec![StreamLine::text("next"), StreamLine::text("again")]);
        assert_eq!(decoder.lines_seen(), 5);
        assert_eq!(decoder.pending_len(), 0);
    }

    #[test]
    fn test_malformed_line_split_across_chunks() {
        let mut decoder = StreamDecoder::new();
        let mut lines = Vec::new();
        decoder.push(b"0:\"ok\"\n2:[b", &mut lines).unwrap();
        let err = decoder.push(b"ad]\n0:\"x\"\n", &mut lines).unwrap_err();
        assert_eq!(err.line(), 2);
        assert_eq!(lines, vec![StreamLine::text("ok"), StreamLine::text("x")]);
    }

    #[test]
    fn test_first_of_several_errors_is_reported() {
        let mut decoder = StreamDecoder::new();
        let mut lines = Vec::new();
        let err = decoder.push(b"2:[bad]\n0:\"ok\"\nzz\n", &mut lines).unwrap_err();
        assert_eq!(err.line(), 1);
        assert_eq!(lines, vec![StreamLine::text("ok")]);
    }

    proptest! {
        #[test]
        fn chunking_does_not_change_decoding(cuts in prop::collection::vec(0usize..400, 0..12)) {
            let encoded = encode_data_stream(&sample_lines());
            let bytes = encoded.as_bytes();

            let mut points: Vec<usize> = cuts.into_iter().map(|c| c % (bytes.len() + 1)).collect();
            points.sort_unstable();

            let mut decoder = StreamDecoder::new();
            let mut decoded = Vec::new();
            let mut last = 0;
            for point in points {
                decoder.push(&bytes[last..point], &mut decoded).unwrap();
                last = point;
            }
            decoder.push(&bytes[last..], &mut decoded).unwrap();
            decoded.extend(decoder.finish().unwrap());

            prop_assert_eq!(decoded, sample_lines());
        }

        #[test]
        fn arbitrary_text_round_trips(text in any::<String>()) {
            let encoded = StreamLine::text(text.clone()).encode();
            let decoded = decode_data_stream(encoded.as_bytes()).unwrap();
            prop_assert_eq!(decoded, vec![StreamLine::text(text)]);
        }
    }
}
