//! Line-oriented data stream protocol.
//!
//! Each line is `<prefix>:<json>\n`. The prefix selects the line kind and
//! the JSON value is its payload:
//!
//! | Prefix | Kind             | Payload                                   |
//! |--------|------------------|-------------------------------------------|
//! | `0`    | `text`           | JSON string                               |
//! | `2`    | `data`           | JSON array of tagged [`DataPart`]s        |
//! | `3`    | `error`          | JSON string                               |
//! | `d`    | `finish-message` | `{finishReason, usage}`                   |
//! | `e`    | `finish-step`    | `{finishReason, usage, isContinued}`      |
//! | `f`    | `start-step`     | `{messageId}`                             |
//!
//! This module is pure framing. Buffering of partial lines lives in
//! [`super::decoder`].

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::AppError;
use crate::types::{Citation, StepEvent};

/// Kinds of line in the data stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LineKind {
    Text,
    Data,
    Error,
    FinishMessage,
    FinishStep,
    StartStep,
}

impl LineKind {
    /// Wire prefix preceding the `:` separator.
    pub fn prefix(self) -> &'static str {
        match self {
            LineKind::Text => "0",
            LineKind::Data => "2",
            LineKind::Error => "3",
            LineKind::FinishMessage => "d",
            LineKind::FinishStep => "e",
            LineKind::StartStep => "f",
        }
    }

    pub fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix {
            "0" => Some(LineKind::Text),
            "2" => Some(LineKind::Data),
            "3" => Some(LineKind::Error),
            "d" => Some(LineKind::FinishMessage),
            "e" => Some(LineKind::FinishStep),
            "f" => Some(LineKind::StartStep),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LineKind::Text => "text",
            LineKind::Data => "data",
            LineKind::Error => "error",
            LineKind::FinishMessage => "finish-message",
            LineKind::FinishStep => "finish-step",
            LineKind::StartStep => "start-step",
        }
    }
}

impl fmt::Display for LineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Token accounting for a step or message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

impl Usage {
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
        }
    }

    pub fn total(&self) -> u64 {
        self.prompt_tokens.saturating_add(self.completion_tokens)
    }
}

impl std::ops::Add for Usage {
    type Output = Usage;

    fn add(self, rhs: Usage) -> Usage {
        Usage {
            prompt_tokens: self.prompt_tokens.saturating_add(rhs.prompt_tokens),
            completion_tokens: self.completion_tokens.saturating_add(rhs.completion_tokens),
        }
    }
}

/// Why generation stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FinishReason {
    Stop,
    Length,
    ToolCalls,
    ContentFilter,
    Error,
    Other,
    Unknown,
}

/// Payload of a `data-stage` part.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StagePart {
    pub stage: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_id: Option<String>,
}

/// Payload of a `data-cache-metadata` part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheMetadata {
    pub cached: bool,
}

/// One tagged entry of a `data` line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum DataPart {
    #[serde(rename = "data-stage")]
    Stage(StagePart),

    #[serde(rename = "data-step-event")]
    StepEvent(StepEvent),

    #[serde(rename = "data-citations")]
    Citations(Vec<Citation>),

    #[serde(rename = "data-cache-metadata")]
    CacheMetadata(CacheMetadata),

    #[serde(rename = "data-app-error")]
    AppError(AppError),
}

impl DataPart {
    pub fn stage(stage: impl Into<String>, step_id: Option<String>) -> Self {
        DataPart::Stage(StagePart {
            stage: stage.into(),
            step_id,
        })
    }

    pub fn cache_metadata(cached: bool) -> Self {
        DataPart::CacheMetadata(CacheMetadata { cached })
    }

    /// Wire value of the `type` tag.
    pub fn part_type(&self) -> &'static str {
        match self {
            DataPart::Stage(_) => "data-stage",
            DataPart::StepEvent(_) => "data-step-event",
            DataPart::Citations(_) => "data-citations",
            DataPart::CacheMetadata(_) => "data-cache-metadata",
            DataPart::AppError(_) => "data-app-error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartStep {
    pub message_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinishStep {
    pub finish_reason: FinishReason,
    pub usage: Usage,
    pub is_continued: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinishMessage {
    pub finish_reason: FinishReason,
    pub usage: Usage,
}

/// A decoded line of the data stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "kebab-case")]
pub enum StreamLine {
    /// Raw chunk of generated prose
    Text(String),

    Data(Vec<DataPart>),

    /// Terminal error signal, independent of any `data-app-error` part
    Error(String),

    FinishMessage(FinishMessage),

    FinishStep(FinishStep),

    StartStep(StartStep),
}

/// Errors from decoding the data stream.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StreamDecodeError {
    #[error("line {line}: missing ':' separator")]
    MissingSeparator { line: usize },

    #[error("line {line}: unknown line prefix '{prefix}'")]
    UnknownPrefix { line: usize, prefix: String },

    #[error("line {line}: malformed {kind} payload: {reason}")]
    MalformedPayload {
        line: usize,
        kind: LineKind,
        reason: String,
    },

    #[error("line {line}: invalid UTF-8")]
    InvalidUtf8 { line: usize },
}

impl StreamDecodeError {
    /// 1-based line number the error refers to.
    pub fn line(&self) -> usize {
        match self {
            StreamDecodeError::MissingSeparator { line }
            | StreamDecodeError::UnknownPrefix { line, .. }
            | StreamDecodeError::MalformedPayload { line, .. }
            | StreamDecodeError::InvalidUtf8 { line } => *line,
        }
    }
}

impl StreamLine {
    pub fn text(chunk: impl Into<String>) -> Self {
        StreamLine::Text(chunk.into())
    }

    pub fn data(parts: Vec<DataPart>) -> Self {
        StreamLine::Data(parts)
    }

    pub fn error(message: impl Into<String>) -> Self {
        StreamLine::Error(message.into())
    }

    pub fn start_step(message_id: impl Into<String>) -> Self {
        StreamLine::StartStep(StartStep {
            message_id: message_id.into(),
        })
    }

    pub fn finish_step(finish_reason: FinishReason, usage: Usage, is_continued: bool) -> Self {
        StreamLine::FinishStep(FinishStep {
            finish_reason,
            usage,
            is_continued,
        })
    }

    pub fn finish_message(finish_reason: FinishReason, usage: Usage) -> Self {
        StreamLine::FinishMessage(FinishMessage {
            finish_reason,
            usage,
        })
    }

    pub fn kind(&self) -> LineKind {
        match self {
            StreamLine::Text(_) => LineKind::Text,
            StreamLine::Data(_) => LineKind::Data,
            StreamLine::Error(_) => LineKind::Error,
            StreamLine::FinishMessage(_) => LineKind::FinishMessage,
            StreamLine::FinishStep(_) => LineKind::FinishStep,
            StreamLine::StartStep(_) => LineKind::StartStep,
        }
    }

    /// Encode as one newline-terminated wire line.
    pub fn encode(&self) -> String {
        let payload = match self {
            StreamLine::Text(s) | StreamLine::Error(s) => to_json(s),
            StreamLine::Data(parts) => to_json(parts),
            StreamLine::FinishMessage(p) => to_json(p),
            StreamLine::FinishStep(p) => to_json(p),
            StreamLine::StartStep(p) => to_json(p),
        };
        format!("{}:{}\n", self.kind().prefix(), payload)
    }

    /// Decode one complete line (without its terminator).
    ///
    /// `line_no` is only used for error reporting.
    pub fn decode(line: &str, line_no: usize) -> Result<Self, StreamDecodeError> {
        let (prefix, payload) = line
            .split_once(':')
            .ok_or(StreamDecodeError::MissingSeparator { line: line_no })?;
        let kind = LineKind::from_prefix(prefix).ok_or_else(|| StreamDecodeError::UnknownPrefix {
            line: line_no,
            prefix: prefix.to_string(),
        })?;

        let decoded = match kind {
            LineKind::Text => StreamLine::Text(parse(payload, kind, line_no)?),
            LineKind::Error => StreamLine::Error(parse(payload, kind, line_no)?),
            LineKind::Data => {
                let parts: Vec<DataPart> = parse(payload, kind, line_no)?;
                for part in &parts {
                    if let DataPart::StepEvent(event) = part {
                        event.validate().map_err(|issues| {
                            let reason = issues
                                .iter()
                                .map(|i| format!("{}: {}", i.path, i.message))
                                .collect::<Vec<_>>()
                                .join("; ");
                            StreamDecodeError::MalformedPayload {
                                line: line_no,
                                kind,
                                reason,
                            }
                        })?;
                    }
                }
                StreamLine::Data(parts)
            }
            LineKind::FinishMessage => StreamLine::FinishMessage(parse(payload, kind, line_no)?),
            LineKind::FinishStep => StreamLine::FinishStep(parse(payload, kind, line_no)?),
            LineKind::StartStep => StreamLine::StartStep(parse(payload, kind, line_no)?),
        };
        Ok(decoded)
    }
}

fn parse<T: DeserializeOwned>(
    payload: &str,
    kind: LineKind,
    line_no: usize,
) -> Result<T, StreamDecodeError> {
    serde_json::from_str(payload).map_err(|e| StreamDecodeError::MalformedPayload {
        line: line_no,
        kind,
        reason: e.to_string(),
    })
}

pub(crate) fn to_json<T: Serialize + ?Sized>(value: &T) -> String {
    // Protocol payloads are string-keyed plain data.
    serde_json::to_string(value).expect("stream payloads serialize to JSON")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{RequestContext, Step, StepMeta, ToolCalledPayload};

    #[test]
    fn test_usage_sum_saturates() {
        let sum = Usage::new(u64::MAX - 1, 5) + Usage::new(10, 7);
        assert_eq!(sum, Usage::new(u64::MAX, 12));
        assert_eq!(Usage::new(u64::MAX, 1).total(), u64::MAX);
    }

    #[test]
    fn test_text_line_wire_shape() {
        let line = StreamLine::text("hello \"world\"\n");
        assert_eq!(line.encode(), "0:\"hello \\\"world\\\"\\n\"\n");
    }

    #[test]
    fn test_data_part_wire_shape() {
        let line = StreamLine::data(vec![DataPart::cache_metadata(true)]);
        assert_eq!(
            line.encode(),
            "2:[{\"type\":\"data-cache-metadata\",\"data\":{\"cached\":true}}]\n"
        );
    }

    #[test]
    fn test_finish_step_wire_shape() {
        let line = StreamLine::finish_step(FinishReason::ToolCalls, Usage::new(3, 4), true);
        let encoded = line.encode();
        assert!(encoded.starts_with("e:"));
        assert!(encoded.contains("\"finishReason\":\"tool-calls\""));
        assert!(encoded.contains("\"isContinued\":true"));
        assert_eq!(StreamLine::decode(encoded.trim_end(), 1).unwrap(), line);
    }

    #[test]
    fn test_unknown_prefix() {
        let err = StreamLine::decode("9:\"x\"", 4).unwrap_err();
        assert_eq!(
            err,
            StreamDecodeError::UnknownPrefix {
                line: 4,
                prefix: "9".to_string()
            }
        );
        assert_eq!(err.line(), 4);
    }

    #[test]
    fn test_missing_separator() {
        assert!(matches!(
            StreamLine::decode("garbage", 1),
            Err(StreamDecodeError::MissingSeparator { line: 1 })
        ));
    }

    #[test]
    fn test_malformed_data_json_is_an_error() {
        let err = StreamLine::decode("2:[{\"type\":\"data-stage\",", 2).unwrap_err();
        assert!(matches!(
            err,
            StreamDecodeError::MalformedPayload {
                kind: LineKind::Data,
                ..
            }
        ));
    }

    #[test]
    fn test_step_event_with_empty_args_summary_rejected() {
        let ctx = RequestContext::new("req-1", "t");
        let event = StepEvent::ToolCalled(Step {
            meta: StepMeta::for_step(&ctx, "s-1", "generate"),
            payload: ToolCalledPayload {
                tool_call_id: "c".to_string(),
                tool_name: "search".to_string(),
                args_summary: String::new(),
            },
        });
        let encoded = StreamLine::data(vec![DataPart::StepEvent(event)]).encode();
        assert!(StreamLine::decode(encoded.trim_end(), 1).is_err());
    }

    #[test]
    fn test_app_error_part_round_trip() {
        let err = AppError::cancelled("req-3");
        let line = StreamLine::data(vec![DataPart::AppError(err.clone())]);
        let decoded = StreamLine::decode(line.encode().trim_end(), 1).unwrap();
        match decoded {
            StreamLine::Data(parts) => assert_eq!(parts, vec![DataPart::AppError(err)]),
            other => panic!("unexpected line {:?}", other),
        }
    }
}
