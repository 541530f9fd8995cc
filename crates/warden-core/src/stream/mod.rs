//! Wire codecs for streaming a run to downstream clients.
//!
//! Two channels share the [`DataPart`] vocabulary:
//! - the line-oriented data stream ([`StreamLine`], [`StreamDecoder`])
//! - a lighter SSE channel for forwarding single parts ([`SseEvent`])

mod decoder;
mod protocol;
mod sse;

pub use decoder::{decode_data_stream, encode_data_stream, StreamDecoder};
pub use protocol::{
    CacheMetadata, DataPart, FinishMessage, FinishReason, FinishStep, LineKind, StagePart,
    StartStep, StreamDecodeError, StreamLine, Usage,
};
pub use sse::{decode_sse_events, encode_sse_done_line, encode_sse_part, SseDecoder, SseEvent};
