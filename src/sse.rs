//! Server-Sent Events reader for the streaming chat chain.
//!
//! Bytes arrive in arbitrary chunks. `SseDecoder` reassembles them into
//! complete event blocks, `parse_block` pulls the JSON out of the `data:`
//! lines, and `read_stream` dispatches each op to a `StreamSink` in arrival
//! order until the body ends, fails or the turn is cancelled.

use futures_util::{Stream, StreamExt};
use std::fmt::Display;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::models::{StreamOp, StreamPayload};

const STREAMED_OUTPUT_SUFFIX: &str = "streamed_output_str/-";
const FINAL_OUTPUT_PATH: &str = "/final_output";

// ============================================================================
// Decoding
// ============================================================================

/// Incremental UTF-8 decoder and event splitter.
#[derive(Debug, Default)]
pub struct SseDecoder {
    /// Trailing bytes of a character that straddles a chunk boundary.
    partial: Vec<u8>,
    /// Decoded text not yet terminated by a blank line.
    buffer: String,
    /// The last chunk ended in `\r`; it may pair with a leading `\n`.
    pending_cr: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one chunk and returns every event block it completed.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.partial.extend_from_slice(chunk);
        let bytes = std::mem::take(&mut self.partial);
        self.decode_into_buffer(&bytes);
        self.drain_blocks()
    }

    /// Flushes whatever is left once the stream has ended.
    pub fn finish(&mut self) -> Option<String> {
        if std::mem::take(&mut self.pending_cr) {
            self.buffer.push('\r');
        }
        if !self.partial.is_empty() {
            let rest = std::mem::take(&mut self.partial);
            self.buffer.push_str(&String::from_utf8_lossy(&rest));
        }
        let rest = std::mem::take(&mut self.buffer);
        if rest.trim().is_empty() {
            None
        } else {
            Some(rest)
        }
    }

    fn decode_into_buffer(&mut self, mut bytes: &[u8]) {
        loop {
            match std::str::from_utf8(bytes) {
                Ok(text) => {
                    self.push_text(text);
                    return;
                }
                Err(e) => {
                    let (valid, rest) = bytes.split_at(e.valid_up_to());
                    // valid_up_to guarantees this prefix is UTF-8
                    self.push_text(std::str::from_utf8(valid).unwrap_or_default());
                    match e.error_len() {
                        Some(bad) => {
                            self.push_text("\u{FFFD}");
                            bytes = &rest[bad..];
                        }
                        None => {
                            self.partial = rest.to_vec();
                            return;
                        }
                    }
                }
            }
        }
    }

    fn push_text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        let carried_cr = std::mem::take(&mut self.pending_cr);
        let text = match text.strip_suffix('\r') {
            Some(head) => {
                self.pending_cr = true;
                head
            }
            None => text,
        };
        // a carried `\r` followed by `\n` is one CRLF; the `\r` is dropped
        if carried_cr && !text.starts_with('\n') {
            self.buffer.push('\r');
        }
        if text.contains('\r') {
            self.buffer.push_str(&text.replace("\r\n", "\n"));
        } else {
            self.buffer.push_str(text);
        }
    }

    fn drain_blocks(&mut self) -> Vec<String> {
        let mut blocks = Vec::new();
        while let Some(pos) = self.buffer.find("\n\n") {
            let block: String = self.buffer.drain(..pos + 2).collect();
            let block = block.trim_end_matches('\n');
            if !block.trim().is_empty() {
                blocks.push(block.to_string());
            }
        }
        blocks
    }
}

/// Extracts the JSON payload of one event block.
///
/// Returns `None` for blocks without a `data:` line (comments, `event: end`).
pub fn parse_block(block: &str) -> Option<Result<StreamPayload, serde_json::Error>> {
    let data: Vec<&str> = block
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|rest| rest.strip_prefix(' ').unwrap_or(rest))
        .collect();
    if data.is_empty() {
        return None;
    }
    let joined = data.join("\n");
    if joined.trim().is_empty() {
        return None;
    }
    Some(serde_json::from_str(&joined))
}

// ============================================================================
// Dispatch
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum StreamUpdate {
    /// Markdown appended to the live message.
    Append(String),
    /// Final markdown that replaces everything streamed so far.
    Replace(String),
}

pub fn classify(op: &StreamOp) -> Option<StreamUpdate> {
    if op.path.ends_with(STREAMED_OUTPUT_SUFFIX) {
        return op.value.as_str().map(|s| StreamUpdate::Append(s.to_string()));
    }
    if op.path == FINAL_OUTPUT_PATH {
        return op
            .value
            .get("content")
            .and_then(|c| c.as_str())
            .filter(|c| !c.is_empty())
            .map(|c| StreamUpdate::Replace(c.to_string()));
    }
    None
}

/// Receiver of streamed updates for one assistant message.
pub trait StreamSink {
    fn append(&mut self, markdown: &str);
    fn replace(&mut self, markdown: &str);
    /// Inline error fragment; the message keeps whatever it already has.
    fn error(&mut self, message: &str);
    /// Called once after the body ended normally.
    fn finish(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOutcome {
    Completed,
    Failed,
    Cancelled,
}

fn dispatch_block<K: StreamSink + ?Sized>(block: &str, sink: &mut K) {
    match parse_block(block) {
        None => {}
        Some(Ok(payload)) => {
            debug!(ops = payload.ops.len(), "sse block");
            for op in &payload.ops {
                match classify(op) {
                    Some(StreamUpdate::Append(md)) => sink.append(&md),
                    Some(StreamUpdate::Replace(md)) => sink.replace(&md),
                    None => {}
                }
            }
        }
        Some(Err(e)) => {
            debug!(error = %e, "unparseable sse block");
            sink.error(&format!("解析错误: {}", e));
        }
    }
}

/// Drives `stream` to completion, feeding every decoded op into `sink`.
///
/// Only one read is outstanding at a time. Cancellation is checked before
/// each read and while waiting on it; once cancelled nothing more is written
/// to the sink.
pub async fn read_stream<S, B, E, K>(
    stream: S,
    sink: &mut K,
    cancel: &CancellationToken,
) -> StreamOutcome
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: Display,
    K: StreamSink + ?Sized,
{
    let mut stream = std::pin::pin!(stream);
    let mut decoder = SseDecoder::new();

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return StreamOutcome::Cancelled,
            next = stream.next() => next,
        };

        match next {
            Some(Ok(chunk)) => {
                for block in decoder.feed(chunk.as_ref()) {
                    if cancel.is_cancelled() {
                        return StreamOutcome::Cancelled;
                    }
                    dispatch_block(&block, sink);
                }
            }
            Some(Err(e)) => {
                error!(error = %e, "stream read failed");
                sink.error(&format!("流错误: {}", e));
                return StreamOutcome::Failed;
            }
            None => {
                if let Some(block) = decoder.finish() {
                    dispatch_block(&block, sink);
                }
                sink.finish();
                return StreamOutcome::Completed;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;

    #[derive(Default)]
    struct Recorder {
        text: String,
        errors: Vec<String>,
        finished: bool,
    }

    impl StreamSink for Recorder {
        fn append(&mut self, markdown: &str) {
            self.text.push_str(markdown);
        }
        fn replace(&mut self, markdown: &str) {
            self.text = markdown.to_string();
        }
        fn error(&mut self, message: &str) {
            self.errors.push(message.to_string());
        }
        fn finish(&mut self) {
            self.finished = true;
        }
    }

    fn frame(ops: serde_json::Value) -> String {
        format!("event: data\ndata: {}\n\n", serde_json::json!({ "ops": ops }))
    }

    fn append_op(value: &str) -> serde_json::Value {
        serde_json::json!({"op": "add", "path": "/logs/qwen-turbo/streamed_output_str/-", "value": value})
    }

    async fn run(chunks: Vec<Vec<u8>>) -> (Recorder, StreamOutcome) {
        let items: Vec<Result<Vec<u8>, String>> = chunks.into_iter().map(Ok).collect();
        let mut sink = Recorder::default();
        let outcome = read_stream(stream::iter(items), &mut sink, &CancellationToken::new()).await;
        (sink, outcome)
    }

    #[tokio::test]
    async fn appends_concatenate_without_final_output() {
        let body = frame(serde_json::json!([append_op("Hel")])) + &frame(serde_json::json!([append_op("lo")]));
        let (sink, outcome) = run(vec![body.into_bytes()]).await;
        assert_eq!(sink.text, "Hello");
        assert_eq!(outcome, StreamOutcome::Completed);
        assert!(sink.finished);
    }

    #[tokio::test]
    async fn final_output_supersedes_streamed_text() {
        let body = frame(serde_json::json!([append_op("A")]))
            + &frame(serde_json::json!([append_op("B")]))
            + &frame(serde_json::json!([{"op": "replace", "path": "/final_output", "value": {"content": "C"}}]));
        let (sink, _) = run(vec![body.into_bytes()]).await;
        assert_eq!(sink.text, "C");
    }

    #[tokio::test]
    async fn empty_final_output_is_ignored() {
        let body = frame(serde_json::json!([append_op("kept")]))
            + &frame(serde_json::json!([{"path": "/final_output", "value": {"content": ""}}]))
            + &frame(serde_json::json!([{"path": "/final_output", "value": null}]));
        let (sink, _) = run(vec![body.into_bytes()]).await;
        assert_eq!(sink.text, "kept");
    }

    #[tokio::test]
    async fn event_split_across_chunks_is_dispatched_once() {
        let body = frame(serde_json::json!([append_op("split")]));
        let (a, b) = body.as_bytes().split_at(body.len() / 2);
        let (sink, _) = run(vec![a.to_vec(), b.to_vec()]).await;
        assert_eq!(sink.text, "split");
        assert!(sink.errors.is_empty());
    }

    #[tokio::test]
    async fn multibyte_character_split_across_chunks() {
        let body = frame(serde_json::json!([append_op("你好")]));
        let bytes = body.into_bytes();
        // split inside the three-byte encoding of 你
        let cut = bytes.windows(3).position(|w| w == "你".as_bytes()).unwrap() + 1;
        let (sink, _) = run(vec![bytes[..cut].to_vec(), bytes[cut..].to_vec()]).await;
        assert_eq!(sink.text, "你好");
    }

    #[tokio::test]
    async fn bad_json_reports_inline_and_continues() {
        let body = String::from("data: {not json}\n\n") + &frame(serde_json::json!([append_op("after")]));
        let (sink, outcome) = run(vec![body.into_bytes()]).await;
        assert_eq!(sink.errors.len(), 1);
        assert!(sink.errors[0].starts_with("解析错误"));
        assert_eq!(sink.text, "after");
        assert_eq!(outcome, StreamOutcome::Completed);
    }

    #[tokio::test]
    async fn unknown_ops_and_end_events_are_ignored() {
        let body = frame(serde_json::json!([{"op": "add", "path": "/logs/other", "value": {"x": 1}}]))
            + "event: end\n\n";
        let (sink, _) = run(vec![body.into_bytes()]).await;
        assert_eq!(sink.text, "");
        assert!(sink.errors.is_empty());
    }

    #[tokio::test]
    async fn crlf_framing_is_accepted() {
        let body = frame(serde_json::json!([append_op("crlf")])).replace('\n', "\r\n");
        let (sink, _) = run(vec![body.into_bytes()]).await;
        assert_eq!(sink.text, "crlf");
    }

    #[tokio::test]
    async fn crlf_split_between_cr_and_lf() {
        let first = frame(serde_json::json!([append_op("Hel")])).replace('\n', "\r\n");
        let second = frame(serde_json::json!([append_op("lo")])).replace('\n', "\r\n");
        let body = first + &second;
        // cut after the `\r` of the first event's closing blank line
        let cut = body.find("\r\n\r\n").unwrap() + 3;
        let (a, b) = body.as_bytes().split_at(cut);
        assert!(a.ends_with(b"\r") && b.starts_with(b"\n"));

        let (sink, _) = run(vec![a.to_vec(), b.to_vec()]).await;
        assert_eq!(sink.text, "Hello");
        assert!(sink.errors.is_empty());
    }

    #[test]
    fn crlf_split_byte_by_byte() {
        let body = "data: {\"ops\":[]}\r\n\r\ndata: {\"ops\":[]}\r\n\r\n";
        let mut decoder = SseDecoder::new();
        let mut blocks = Vec::new();
        for byte in body.as_bytes() {
            blocks.extend(decoder.feed(std::slice::from_ref(byte)));
        }
        assert_eq!(blocks, vec!["data: {\"ops\":[]}".to_string(); 2]);
        assert!(decoder.finish().is_none());
    }

    #[tokio::test]
    async fn trailing_block_without_delimiter_is_flushed() {
        let body = format!("data: {}", serde_json::json!({"ops": [append_op("tail")]}));
        let (sink, _) = run(vec![body.into_bytes()]).await;
        assert_eq!(sink.text, "tail");
    }

    #[tokio::test]
    async fn read_error_fails_the_turn() {
        let items: Vec<Result<Vec<u8>, String>> = vec![
            Ok(frame(serde_json::json!([append_op("partial")])).into_bytes()),
            Err("connection reset".to_string()),
        ];
        let mut sink = Recorder::default();
        let outcome = read_stream(stream::iter(items), &mut sink, &CancellationToken::new()).await;
        assert_eq!(outcome, StreamOutcome::Failed);
        assert_eq!(sink.text, "partial");
        assert_eq!(sink.errors, vec!["流错误: connection reset".to_string()]);
        assert!(!sink.finished);
    }

    #[tokio::test]
    async fn cancelled_turn_stops_dispatching() {
        let items: Vec<Result<Vec<u8>, String>> =
            vec![Ok(frame(serde_json::json!([append_op("never")])).into_bytes())];
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut sink = Recorder::default();
        let outcome = read_stream(stream::iter(items), &mut sink, &cancel).await;
        assert_eq!(outcome, StreamOutcome::Cancelled);
        assert_eq!(sink.text, "");
        assert!(!sink.finished);
    }

    #[test]
    fn parse_block_joins_multiline_data() {
        let payload = parse_block("data: {\"ops\":\ndata: []}").unwrap().unwrap();
        assert!(payload.ops.is_empty());
        assert!(parse_block(": keep-alive").is_none());
    }
}
