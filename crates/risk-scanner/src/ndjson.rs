//! Incremental newline-delimited JSON decoding of scan verdicts.

use std::collections::VecDeque;

use anyhow::Result;
use futures_util::stream::{self, BoxStream, Stream, StreamExt};

use sockwarden_core::error::SockwardenError;

use crate::verdict::PackageVerdict;

pub type VerdictStream = BoxStream<'static, Result<PackageVerdict>>;

struct DecodeState<S> {
    chunks: S,
    buffer: Vec<u8>,
    ready: VecDeque<Result<PackageVerdict>>,
    yielded: usize,
    expected: Option<usize>,
    exhausted: bool,
    finished: bool,
}

impl<S> DecodeState<S> {
    fn take_lines(&mut self) {
        while let Some(pos) = self.buffer.iter().position(|byte| *byte == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if !self.push_line(&line[..pos]) {
                return;
            }
        }
    }

    /// Queues the parsed line. Returns false once a malformed line poisons the stream.
    fn push_line(&mut self, raw: &[u8]) -> bool {
        let text = String::from_utf8_lossy(raw);
        let line = text.trim();
        if line.is_empty() {
            return true;
        }
        match serde_json::from_str::<PackageVerdict>(line) {
            Ok(verdict) => {
                self.ready.push_back(Ok(verdict));
                true
            }
            Err(err) => {
                self.ready.push_back(Err(SockwardenError::Data(format!(
                    "unparseable verdict line ({err}): {}",
                    truncate(line, 120)
                ))
                .into()));
                self.exhausted = true;
                self.buffer.clear();
                false
            }
        }
    }
}

/// Yields verdicts as complete lines arrive. A malformed line, a transport
/// error, or a body that ends before `expected` verdicts fails the stream.
pub fn decode_verdicts<S, B>(chunks: S, expected: Option<usize>) -> VerdictStream
where
    S: Stream<Item = Result<B>> + Send + Unpin + 'static,
    B: AsRef<[u8]> + Send + 'static,
{
    let state = DecodeState {
        chunks,
        buffer: Vec::new(),
        ready: VecDeque::new(),
        yielded: 0,
        expected,
        exhausted: false,
        finished: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if state.finished {
                return None;
            }
            if let Some(item) = state.ready.pop_front() {
                match item {
                    Ok(verdict) => {
                        state.yielded += 1;
                        return Some((Ok(verdict), state));
                    }
                    Err(err) => {
                        state.finished = true;
                        return Some((Err(err), state));
                    }
                }
            }
            if state.exhausted {
                state.finished = true;
                return match state.expected {
                    Some(expected) if state.yielded < expected => {
                        let err = SockwardenError::Data(format!(
                            "scan response ended after {} of {} verdicts",
                            state.yielded, expected
                        ));
                        Some((Err(err.into()), state))
                    }
                    _ => None,
                };
            }
            match state.chunks.next().await {
                Some(Ok(chunk)) => {
                    state.buffer.extend_from_slice(chunk.as_ref());
                    state.take_lines();
                }
                Some(Err(err)) => {
                    state.finished = true;
                    return Some((Err(err), state));
                }
                None => {
                    state.exhausted = true;
                    let rest = std::mem::take(&mut state.buffer);
                    state.push_line(&rest);
                }
            }
        }
    })
    .boxed()
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((index, _)) => &text[..index],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;

    fn chunked(parts: &[&str]) -> impl Stream<Item = Result<Vec<u8>>> + Send + Unpin + 'static {
        let owned: Vec<Result<Vec<u8>>> =
            parts.iter().map(|part| Ok(part.as_bytes().to_vec())).collect();
        stream::iter(owned)
    }

    const A: &str =
        r#"{"type":"success","eco":"npm","pkg":"a","ver":"1.0.0","value":{"issues":[]}}"#;
    const B: &str = r#"{"type":"missing","eco":"npm","pkg":"@s/b","ver":"2.0.0"}"#;

    #[tokio::test]
    async fn yields_in_arrival_order_across_chunk_boundaries() {
        let first = format!("{}\n{}", A, &B[..10]);
        let second = format!("{}\n", &B[10..]);
        let mut verdicts = decode_verdicts(chunked(&[&first, &second]), Some(2));
        let one = verdicts.next().await.unwrap().unwrap();
        assert_eq!(one.package().name, "a");
        let two = verdicts.next().await.unwrap().unwrap();
        assert!(two.is_missing());
        assert_eq!(two.package().name, "@s/b");
        assert!(verdicts.next().await.is_none());
    }

    #[tokio::test]
    async fn accepts_final_line_without_newline() {
        let body = format!("{A}\n\n{B}");
        let collected: Vec<_> = decode_verdicts(chunked(&[&body]), Some(2)).collect().await;
        assert_eq!(collected.len(), 2);
        assert!(collected.iter().all(|item| item.is_ok()));
    }

    #[tokio::test]
    async fn malformed_line_fails_the_batch() {
        let body = format!("{A}\n{{not json\n{B}\n");
        let collected: Vec<_> = decode_verdicts(chunked(&[&body]), Some(3)).collect().await;
        assert_eq!(collected.len(), 2);
        assert!(collected[0].is_ok());
        let err = collected[1].as_ref().unwrap_err();
        assert!(matches!(err.downcast_ref::<SockwardenError>(), Some(SockwardenError::Data(_))));
    }

    #[tokio::test]
    async fn short_body_is_an_error() {
        let body = format!("{A}\n");
        let collected: Vec<_> = decode_verdicts(chunked(&[&body]), Some(2)).collect().await;
        assert_eq!(collected.len(), 2);
        assert!(collected[1].is_err());
    }

    #[tokio::test]
    async fn transport_errors_propagate() {
        let parts: Vec<Result<Vec<u8>>> = vec![
            Ok(format!("{A}\n").into_bytes()),
            Err(anyhow::anyhow!("connection reset")),
        ];
        let collected: Vec<_> = decode_verdicts(stream::iter(parts), None).collect().await;
        assert!(collected[0].is_ok());
        assert!(collected[1].is_err());
        assert_eq!(collected.len(), 2);
    }
}
