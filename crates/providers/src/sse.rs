//! Server-sent event framing for streaming completions.
//!
//! Bytes are buffered until a blank line ends an event, so a multibyte
//! character split across network chunks is decoded intact. Only `data:`
//! fields matter to completion streams; `event:`, `id:` and `retry:` are
//! skipped.

use crate::util::from_reqwest;
use cs_domain::error::Result;
use cs_domain::stream::{BoxStream, StreamEvent};

/// Incremental SSE decoder yielding the `data:` payload of each event.
#[derive(Debug, Default)]
pub(crate) struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    /// Feed raw body bytes; returns the payloads of the events completed by
    /// them.
    pub(crate) fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let mut payloads = Vec::new();
        while let Some((end, delimiter)) = find_event_end(&self.buffer) {
            let block: Vec<u8> = self.buffer.drain(..end + delimiter).collect();
            payloads.extend(data_of(&block[..end]));
        }
        payloads
    }

    /// The body closed; treat whatever is left as a final event.
    pub(crate) fn finish(&mut self) -> Vec<String> {
        let rest = std::mem::take(&mut self.buffer);
        data_of(&rest).into_iter().collect()
    }
}

/// Position and length of the first blank-line delimiter (`\n\n` or
/// `\r\n\r\n`).
fn find_event_end(buffer: &[u8]) -> Option<(usize, usize)> {
    let lf = buffer.windows(2).position(|w| w == b"\n\n").map(|p| (p, 2));
    let crlf = buffer
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .map(|p| (p, 4));
    match (lf, crlf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    }
}

/// Joined `data:` lines of one event block, if any are non-empty.
fn data_of(block: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(block);
    let data: Vec<&str> = text
        .lines()
        .filter_map(|line| line.trim().strip_prefix("data:"))
        .map(str::trim)
        .filter(|data| !data.is_empty())
        .collect();
    if data.is_empty() {
        None
    } else {
        Some(data.join("\n"))
    }
}

/// Stream events from an SSE response, parsing each payload with
/// `parse_data`. A `Done` is appended when the parser never produced one.
pub(crate) fn sse_response_stream<F>(
    response: reqwest::Response,
    mut parse_data: F,
) -> BoxStream<'static, Result<StreamEvent>>
where
    F: FnMut(&str) -> Vec<Result<StreamEvent>> + Send + 'static,
{
    let stream = async_stream::stream! {
        let mut response = response;
        let mut decoder = SseDecoder::default();
        let mut done_emitted = false;

        loop {
            let (payloads, closed) = match response.chunk().await {
                Ok(Some(bytes)) => (decoder.push(&bytes), false),
                Ok(None) => (decoder.finish(), true),
                Err(e) => {
                    yield Err(from_reqwest(e));
                    return;
                }
            };

            for data in payloads {
                for event in parse_data(&data) {
                    done_emitted |= matches!(&event, Ok(StreamEvent::Done { .. }));
                    yield event;
                }
            }
            if closed {
                break;
            }
        }

        if !done_emitted {
            tracing::trace!("sse body closed without a terminal event");
            yield Ok(StreamEvent::Done {
                usage: None,
                finish_reason: None,
            });
        }
    };

    Box::pin(stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(chunks: &[&[u8]]) -> Vec<String> {
        let mut decoder = SseDecoder::default();
        let mut out: Vec<String> = chunks.iter().flat_map(|c| decoder.push(c)).collect();
        out.extend(decoder.finish());
        out
    }

    #[test]
    fn events_split_on_blank_lines() {
        assert_eq!(
            decode(&[b"data: first\n\ndata: second\n\n"]),
            ["first", "second"]
        );
    }

    #[test]
    fn other_fields_are_ignored() {
        assert_eq!(
            decode(&[b"event: ping\nid: 42\nretry: 5000\ndata: payload\n\n"]),
            ["payload"]
        );
        assert!(decode(&[b": keep-alive\n\n", b"data: \n\n"]).is_empty());
    }

    #[test]
    fn incomplete_event_waits_for_more_bytes() {
        let mut decoder = SseDecoder::default();
        assert!(decoder.push(b"data: {\"a\":").is_empty());
        assert_eq!(decoder.push(b"1}\n\ndata: [DONE]"), ["{\"a\":1}"]);
        assert_eq!(decoder.finish(), ["[DONE]"]);
        assert!(decoder.finish().is_empty());
    }

    #[test]
    fn crlf_framing() {
        assert_eq!(decode(&[b"data: a\r\n\r\ndata: b\r\n\r\n"]), ["a", "b"]);
    }

    #[test]
    fn multibyte_character_across_chunks() {
        let text = "data: {\"content\":\"caf\u{e9}\"}\n\n".as_bytes();
        let split = text.iter().position(|&b| b == 0xc3).unwrap() + 1;
        assert_eq!(
            decode(&[&text[..split], &text[split..]]),
            ["{\"content\":\"caf\u{e9}\"}"]
        );
    }

    #[test]
    fn multiline_data_is_joined() {
        assert_eq!(decode(&[b"data: one\ndata: two\n\n"]), ["one\ntwo"]);
    }
}
