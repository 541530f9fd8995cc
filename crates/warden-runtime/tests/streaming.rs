mod common;

use serde_json::json;
use tokio_util::sync::CancellationToken;

use warden_core::{
    decode_sse_events, encode_sse_done_line, encode_sse_part, Citation, DataPart, ErrorCode,
    LineKind, SseDecoder, SseEvent, StreamDecoder, StreamLine,
};
use warden_runtime::{
    decode_byte_stream, encode_run_stream, render_run_stream, InMemoryEvidence, ProviderResult,
    RunOptions, TransportError,
};

use common::*;

fn chunked(wire: &str, size: usize) -> Vec<Result<Vec<u8>, TransportError>> {
    wire.as_bytes()
        .chunks(size)
        .map(|c| Ok(c.to_vec()))
        .collect()
}

#[tokio::test]
async fn run_stream_survives_any_chunking() {
    let provider = ScriptedProvider::answering(
        "primary",
        ProviderResult::object(json!({
            "answer": "Seven years, per the retention policy. ✓",
            "citations": [citation("c-1", "proj-1")]
        })),
    );
    let evidence: InMemoryEvidence =
        [Citation::verifiable("c-1", "document", "proj-1", "page:4")].into_iter().collect();
    let outcome = orchestrator(provider)
        .run(
            &request("req-s", template("req-s", 1, "required", false, None), "retention?"),
            &RunOptions::new().with_evidence(std::sync::Arc::new(evidence)),
        )
        .await;
    let expected = encode_run_stream(&outcome, "msg-1");
    let wire = render_run_stream(&outcome, "msg-1");

    for size in [1, 2, 3, 7, 64, wire.len()] {
        let decoded = decode_byte_stream(
            "req-s",
            futures::stream::iter(chunked(&wire, size)),
            CancellationToken::new(),
        )
        .await
        .unwrap();
        assert_eq!(decoded.lines, expected, "chunk size {}", size);
    }

    let citations = expected.iter().find_map(|line| match line {
        StreamLine::Data(parts) => parts.iter().find_map(|p| match p {
            DataPart::Citations(c) => Some(c.clone()),
            _ => None,
        }),
        _ => None,
    });
    assert_eq!(citations.unwrap()[0].citation_id, "c-1");
}

#[tokio::test]
async fn failed_run_streams_error_part_then_error_line() {
    let provider = ScriptedProvider::answering("primary", ProviderResult::text("no citations"));
    let outcome = orchestrator(provider)
        .run(
            &request("req-f", template("req-f", 1, "required", false, None), "q"),
            &RunOptions::new(),
        )
        .await;
    let wire = render_run_stream(&outcome, "msg-1");

    let decoded = decode_byte_stream(
        "req-f",
        futures::stream::iter(chunked(&wire, 5)),
        CancellationToken::new(),
    )
    .await
    .unwrap();
    let kinds: Vec<LineKind> = decoded.lines.iter().map(StreamLine::kind).collect();
    assert_eq!(kinds, vec![LineKind::Data, LineKind::Error]);

    let StreamLine::Data(parts) = &decoded.lines[0] else {
        panic!("expected data line");
    };
    let DataPart::AppError(err) = &parts[0] else {
        panic!("expected app error part");
    };
    assert_eq!(err.code, ErrorCode::ContractViolation);
    assert!(err.message.contains("requestId=req-f"));
}

#[tokio::test]
async fn long_text_line_round_trips() {
    let text: String = "abcdefghij".repeat(5_000);
    let wire = StreamLine::text(text.clone()).encode();
    let decoded = decode_byte_stream(
        "req-long",
        futures::stream::iter(chunked(&wire, 4096)),
        CancellationToken::new(),
    )
    .await
    .unwrap();
    assert_eq!(decoded.lines, vec![StreamLine::text(text)]);
}

#[test]
fn sse_channel_mixes_parts_and_done() {
    let mut wire = String::new();
    wire.push_str(&encode_sse_part(&DataPart::stage("answer", Some("step-1".into()))));
    wire.push_str(&encode_sse_part(&DataPart::cache_metadata(false)));
    wire.push_str(&encode_sse_done_line());

    let events = decode_sse_events(wire.as_bytes()).unwrap();
    assert_eq!(events.len(), 3);
    assert!(matches!(events[0], SseEvent::Part(DataPart::Stage(_))));
    assert_eq!(events[2], SseEvent::Done);
}

#[test]
fn decoders_continue_after_a_malformed_entry() {
    let mut wire = StreamLine::text("before").encode();
    wire.push_str("2:[{oops\n");
    wire.push_str(&StreamLine::text("after").encode());

    let mut decoder = StreamDecoder::new();
    let mut lines = Vec::new();
    let mut errors = Vec::new();
    for chunk in wire.as_bytes().chunks(4) {
        if let Err(e) = decoder.push(chunk, &mut lines) {
            errors.push(e.line());
        }
    }
    decoder.push(StreamLine::text("later").encode().as_bytes(), &mut lines).unwrap();
    assert_eq!(errors, vec![2]);
    assert_eq!(
        lines,
        vec![StreamLine::text("before"), StreamLine::text("after"), StreamLine::text("later")]
    );

    let mut sse = encode_sse_part(&DataPart::cache_metadata(false));
    sse.push_str("data: not-json\n\n");
    sse.push_str(&encode_sse_done_line());
    let mut decoder = SseDecoder::new();
    let mut events = Vec::new();
    let err = decoder.push(sse.as_bytes(), &mut events).unwrap_err();
    assert_eq!(err.line(), 3);
    assert_eq!(events.len(), 2);
    assert_eq!(events[1], SseEvent::Done);
}
