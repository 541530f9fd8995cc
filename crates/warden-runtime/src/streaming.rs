//! Async side of the data stream.
//!
//! [`decode_byte_stream`] drives a [`StreamDecoder`] from a live byte source,
//! one chunk at a time, until the source ends or the caller cancels.
//! [`encode_run_stream`] renders a finished run as wire lines.

use futures::{Stream, StreamExt};
use serde_json::json;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use warden_core::{
    encode_data_stream, AppError, DataPart, StreamDecodeError, StreamDecoder, StreamLine,
    ValidationIssue,
};

use crate::orchestrator::RunResult;

/// Failure reported by the byte source.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    /// The connection was aborted by the client
    #[error("transport aborted")]
    Aborted,

    #[error("transport failed: {0}")]
    Failed(String),
}

/// Lines decoded from a byte source.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DecodedStream {
    pub lines: Vec<StreamLine>,

    /// Stopped by the cancellation token rather than end of input
    pub cancelled: bool,

    /// Bytes of an unterminated line dropped on cancellation
    pub dropped_bytes: usize,
}

/// Decode a byte source incrementally, handing each line to `on_line` as
/// soon as its terminator arrives.
///
/// Cancelling `cancel` stops reading: lines already completed have been
/// delivered, the partial trailing line is dropped, and the call returns
/// normally. A transport abort is `CANCELLED`; a malformed line is
/// `VALIDATION_ERROR`, raised after every valid line of its chunk has been
/// delivered.
pub async fn forward_byte_stream<S, F>(
    request_id: &str,
    mut source: S,
    cancel: CancellationToken,
    mut on_line: F,
) -> Result<DecodedSummary, AppError>
where
    S: Stream<Item = Result<Vec<u8>, TransportError>> + Unpin,
    F: FnMut(StreamLine),
{
    let mut decoder = StreamDecoder::new();
    let mut completed = Vec::new();
    let mut delivered = 0usize;

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                let dropped_bytes = decoder.abandon();
                tracing::debug!(request_id, delivered, dropped_bytes, "Stream decode cancelled");
                return Ok(DecodedSummary { delivered, cancelled: true, dropped_bytes });
            }
            next = source.next() => next,
        };

        match next {
            Some(Ok(chunk)) => {
                let pushed = decoder.push(&chunk, &mut completed);
                for line in completed.drain(..) {
                    delivered += 1;
                    on_line(line);
                }
                pushed.map_err(|e| decode_error(request_id, e))?;
            }
            Some(Err(TransportError::Aborted)) => {
                tracing::debug!(request_id, delivered, "Stream transport aborted");
                return Err(AppError::cancelled(request_id));
            }
            Some(Err(TransportError::Failed(message))) => {
                tracing::warn!(request_id, error = %message, "Stream transport failed");
                return Err(AppError::upstream_unavailable(
                    request_id,
                    json!([{ "kind": "transport", "message": message }]),
                ));
            }
            None => {
                if let Some(line) = decoder.finish().map_err(|e| decode_error(request_id, e))? {
                    delivered += 1;
                    on_line(line);
                }
                return Ok(DecodedSummary {
                    delivered,
                    cancelled: false,
                    dropped_bytes: 0,
                });
            }
        }
    }
}

/// Counters from [`forward_byte_stream`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DecodedSummary {
    pub delivered: usize,
    pub cancelled: bool,
    pub dropped_bytes: usize,
}

/// Decode a byte source and collect every line.
pub async fn decode_byte_stream<S>(
    request_id: &str,
    source: S,
    cancel: CancellationToken,
) -> Result<DecodedStream, AppError>
where
    S: Stream<Item = Result<Vec<u8>, TransportError>> + Unpin,
{
    let mut lines = Vec::new();
    let summary = forward_byte_stream(request_id, source, cancel, |line| lines.push(line)).await?;
    Ok(DecodedStream {
        lines,
        cancelled: summary.cancelled,
        dropped_bytes: summary.dropped_bytes,
    })
}

fn decode_error(request_id: &str, err: StreamDecodeError) -> AppError {
    AppError::validation(
        request_id,
        vec![ValidationIssue::new(format!("/lines/{}", err.line()), err.to_string())],
    )
}

/// Render a finished run as wire lines.
///
/// Success: `start-step`, the stage, step events, the text, citations,
/// cache metadata, `finish-step`, `finish-message`. Failure: the structured
/// error part followed by the terminal `error` line.
pub fn encode_run_stream(outcome: &Result<RunResult, AppError>, message_id: &str) -> Vec<StreamLine> {
    match outcome {
        Ok(result) => {
            let mut lines = vec![
                StreamLine::start_step(message_id),
                StreamLine::data(vec![DataPart::stage("answer", None)]),
            ];
            if !result.step_events.is_empty() {
                lines.push(StreamLine::data(
                    result
                        .step_events
                        .iter()
                        .cloned()
                        .map(DataPart::StepEvent)
                        .collect(),
                ));
            }
            lines.push(StreamLine::text(result.text()));
            if !result.citations.is_empty() {
                lines.push(StreamLine::data(vec![DataPart::Citations(
                    result.citations.clone(),
                )]));
            }
            lines.push(StreamLine::data(vec![DataPart::cache_metadata(result.cached)]));
            lines.push(StreamLine::finish_step(result.finish_reason, result.usage, false));
            lines.push(StreamLine::finish_message(result.finish_reason, result.usage));
            lines
        }
        Err(error) => vec![
            StreamLine::data(vec![DataPart::AppError(error.clone())]),
            StreamLine::error(error.message.clone()),
        ],
    }
}

/// [`encode_run_stream`] as one wire payload.
pub fn render_run_stream(outcome: &Result<RunResult, AppError>, message_id: &str) -> String {
    encode_data_stream(&encode_run_stream(outcome, message_id))
}
