//! Framed multipart decoding for bulk log/metrics responses.
//!
//! The streaming service frames batched payloads as multipart bodies whose
//! boundary token is advertised in the response's `Content-Type` header. The
//! decoder splits the byte stream on that delimiter and emits one payload per
//! part, without interpreting part contents.

use std::collections::VecDeque;

use bytes::{Bytes, BytesMut};
use futures::stream::Stream;
use futures::StreamExt;

use crate::errors::{ClientError, Result};

/// Extracts the boundary parameter from a `multipart/*` content type.
pub(crate) fn boundary_from_content_type(content_type: &str) -> Option<String> {
    let mut segments = content_type.split(';');
    if !segments.next()?.trim().starts_with("multipart/") {
        return None;
    }

    for parameter in segments {
        if let Some(value) = parameter.trim().strip_prefix("boundary=") {
            let value = value.trim().trim_matches('"');
            if !value.is_empty() {
                return Some(value.to_string());
            }
        }
    }

    None
}

enum State {
    /// Skipping bytes up to the first delimiter.
    Preamble,
    /// Just consumed a delimiter; deciding between another part and the
    /// closing double dash.
    AfterDelimiter,
    /// Accumulating part content up to the next delimiter.
    Part,
    /// Saw the close delimiter; everything further is an epilogue.
    Done,
}

/// Incremental splitter of a multipart byte stream.
pub(crate) struct MultipartDecoder {
    delimiter: Vec<u8>,
    buffer: BytesMut,
    state: State,
}

impl MultipartDecoder {
    pub(crate) fn new(boundary: &str) -> Self {
        Self {
            delimiter: format!("--{}", boundary).into_bytes(),
            buffer: BytesMut::new(),
            state: State::Preamble,
        }
    }

    /// Feeds one chunk, returning the parts completed by it.
    pub(crate) fn feed(&mut self, chunk: &[u8]) -> Vec<Bytes> {
        self.buffer.extend_from_slice(chunk);
        let mut parts = Vec::new();

        loop {
            match self.state {
                State::Preamble => {
                    match find(&self.buffer, &self.delimiter) {
                        Some(index) => {
                            let _ = self.buffer.split_to(index + self.delimiter.len());
                            self.state = State::AfterDelimiter;
                        }
                        None => {
                            // Keep only a possible partial delimiter tail.
                            let keep = (self.delimiter.len() - 1).min(self.buffer.len());
                            let _ = self.buffer.split_to(self.buffer.len() - keep);
                            break;
                        }
                    }
                }
                State::AfterDelimiter => {
                    if self.buffer.len() < 2 {
                        break;
                    }
                    if &self.buffer[..2] == b"--" {
                        self.state = State::Done;
                    } else {
                        self.state = State::Part;
                    }
                }
                State::Part => match find(&self.buffer, &self.delimiter) {
                    Some(index) => {
                        let raw = self.buffer.split_to(index).freeze();
                        let _ = self.buffer.split_to(self.delimiter.len());
                        if let Some(part) = trim_framing(raw) {
                            parts.push(part);
                        }
                        self.state = State::AfterDelimiter;
                    }
                    None => break,
                },
                State::Done => {
                    self.buffer.clear();
                    break;
                }
            }
        }

        parts
    }

    /// Flushes any trailing part once the inbound stream ends.
    pub(crate) fn finish(&mut self) -> Vec<Bytes> {
        match self.state {
            State::Part => {
                let raw = self.buffer.split().freeze();
                trim_framing(raw).into_iter().collect()
            }
            _ => Vec::new(),
        }
    }
}

/// Strips the CRLF framing around a part body; `None` for framing-only slices.
fn trim_framing(raw: Bytes) -> Option<Bytes> {
    let mut start = 0;
    let mut end = raw.len();

    if raw.len() >= 2 && &raw[..2] == b"\r\n" {
        start = 2;
    }
    if end >= start + 2 && &raw[end - 2..end] == b"\r\n" {
        end -= 2;
    }

    (start < end).then(|| raw.slice(start..end))
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Adapts an inbound byte stream into a stream of decoded parts.
///
/// A transport failure mid-stream terminates the part stream with that
/// failure; parts already emitted remain valid.
pub(crate) fn part_stream<S>(boundary: &str, inbound: S) -> impl Stream<Item = Result<Bytes>>
where
    S: Stream<Item = std::result::Result<Bytes, reqwest::Error>>,
{
    struct PartStream<S> {
        inbound: std::pin::Pin<Box<S>>,
        decoder: MultipartDecoder,
        pending: VecDeque<Bytes>,
        done: bool,
    }

    let state = PartStream {
        inbound: Box::pin(inbound),
        decoder: MultipartDecoder::new(boundary),
        pending: VecDeque::new(),
        done: false,
    };

    futures::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(part) = state.pending.pop_front() {
                return Some((Ok(part), state));
            }
            if state.done {
                return None;
            }

            match state.inbound.next().await {
                Some(Ok(chunk)) => {
                    let parts = state.decoder.feed(&chunk);
                    state.pending.extend(parts);
                }
                Some(Err(error)) => {
                    state.done = true;
                    return Some((Err(ClientError::transport(&error)), state));
                }
                None => {
                    state.done = true;
                    let parts = state.decoder.finish();
                    state.pending.extend(parts);
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    #[test_case("multipart/x-protobuf; boundary=abc123", Some("abc123"); "plain boundary")]
    #[test_case("multipart/mixed; charset=utf-8; boundary=\"quoted\"", Some("quoted"); "quoted boundary")]
    #[test_case("multipart/mixed", None; "no boundary parameter")]
    #[test_case("application/json", None; "not multipart")]
    #[test_case("multipart/mixed; boundary=", None; "empty boundary")]
    fn extracts_boundary(content_type: &str, expected: Option<&str>) {
        assert_eq!(
            boundary_from_content_type(content_type).as_deref(),
            expected
        );
    }

    fn decode_all(boundary: &str, chunks: &[&[u8]]) -> Vec<Bytes> {
        let mut decoder = MultipartDecoder::new(boundary);
        let mut parts = Vec::new();
        for chunk in chunks {
            parts.extend(decoder.feed(chunk));
        }
        parts.extend(decoder.finish());
        parts
    }

    #[test]
    fn decodes_parts_between_delimiters() {
        let body = b"--b\r\nfirst\r\n--b\r\nsecond\r\n--b--\r\n";
        let parts = decode_all("b", &[body]);

        assert_eq!(parts, vec![Bytes::from("first"), Bytes::from("second")]);
    }

    #[test]
    fn handles_delimiters_split_across_chunks() {
        let parts = decode_all(
            "boundary",
            &[
                b"--boun",
                b"dary\r\npart one\r\n--bou",
                b"ndary\r\npart two\r\n--boundary--",
            ],
        );

        assert_eq!(
            parts,
            vec![Bytes::from("part one"), Bytes::from("part two")]
        );
    }

    #[test]
    fn emits_trailing_body_when_stream_ends_without_close_delimiter() {
        let parts = decode_all("b", &[b"--b\r\nonly part"]);
        assert_eq!(parts, vec![Bytes::from("only part")]);
    }

    #[test]
    fn ignores_epilogue_after_close_delimiter() {
        let parts = decode_all("b", &[b"--b\r\ndata\r\n--b--\r\nepilogue"]);
        assert_eq!(parts, vec![Bytes::from("data")]);
    }

    #[test]
    fn body_without_any_delimiter_yields_no_parts() {
        let parts = decode_all("b", &[b"no framing here at all"]);
        assert!(parts.is_empty());
    }

    #[tokio::test]
    async fn part_stream_surfaces_parts_and_preserves_binary_content() {
        let chunks: Vec<std::result::Result<Bytes, reqwest::Error>> = vec![
            Ok(Bytes::from_static(b"--b\r\n\x00\x01\x02\r\n--b\r\n")),
            Ok(Bytes::from_static(b"tail\r\n--b--")),
        ];
        let inbound = futures::stream::iter(chunks);

        let parts: Vec<_> = part_stream("b", inbound)
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .map(|part| part.unwrap())
            .collect();

        assert_eq!(
            parts,
            vec![Bytes::from_static(b"\x00\x01\x02"), Bytes::from("tail")]
        );
    }
}
