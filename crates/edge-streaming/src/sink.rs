//! Chunk sink handed to the render engine once the shell is ready.

use std::fmt;
use std::sync::Arc;

use edge_core::{RenderError, Utf8Policy};

use crate::bridge::Controller;
use crate::transport::{Chunk, ChunkEncoding};

/// Error returned by [`ChunkSink::accept`].
#[derive(Debug, Clone, thiserror::Error)]
pub enum SinkError {
    /// The sink already reported completion or failure.
    #[error("chunk sink is closed")]
    Closed,

    /// Forwarding this chunk failed; the sink is now closed.
    #[error("chunk sink failed: {0}")]
    Failed(RenderError),
}

/// State of the chunk sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SinkState {
    /// Accepting chunks.
    Open,
    /// Completion was signalled.
    Finished,
    /// Failure was signalled.
    Failed,
}

/// Forwards chunks to the host transport in emission order and reports
/// exactly one terminal signal to the controller.
///
/// Dropping an open sink counts as a failure.
pub struct ChunkSink {
    controller: Arc<Controller>,
    state: SinkState,
    decoder: Option<TextDecoder>,
    forwarded: usize,
}

impl ChunkSink {
    pub(crate) fn new(controller: Arc<Controller>, encoding: ChunkEncoding, utf8: Utf8Policy) -> Self {
        let decoder = match encoding {
            ChunkEncoding::Text => Some(TextDecoder::new(utf8)),
            ChunkEncoding::Binary => None,
        };

        Self {
            controller,
            state: SinkState::Open,
            decoder,
            forwarded: 0,
        }
    }

    /// Forward one chunk to the host.
    ///
    /// On a host failure the sink fails the invocation and rejects every
    /// later chunk with [`SinkError::Closed`].
    pub fn accept(&mut self, chunk: impl Into<Chunk>) -> Result<(), SinkError> {
        if self.state != SinkState::Open {
            return Err(SinkError::Closed);
        }

        let chunk = match self.normalize(chunk.into()) {
            Ok(Some(chunk)) => chunk,
            Ok(None) => return Ok(()),
            Err(err) => return Err(self.fail_with(err)),
        };

        match self.controller.forward(chunk) {
            Ok(()) => {
                self.forwarded += 1;
                Ok(())
            }
            Err(err) => {
                // Already reported by the controller.
                self.state = SinkState::Failed;
                Err(err)
            }
        }
    }

    /// Signal that the render operation's output is exhausted.
    pub fn finish(&mut self) {
        if self.state != SinkState::Open {
            return;
        }

        let tail = match self.decoder.as_mut().map(TextDecoder::finish) {
            Some(Ok(tail)) => tail,
            Some(Err(err)) => {
                self.fail_with(err);
                return;
            }
            None => None,
        };
        if let Some(tail) = tail {
            if self.controller.forward(Chunk::Text(tail)).is_err() {
                self.state = SinkState::Failed;
                return;
            }
        }

        self.state = SinkState::Finished;
        self.controller.sink_finished();
    }

    /// Signal that the render operation failed while piping.
    pub fn fail(&mut self, error: impl Into<RenderError>) {
        if self.state == SinkState::Open {
            self.fail_with(error.into());
        }
    }

    /// Whether the sink still accepts chunks.
    pub fn is_open(&self) -> bool {
        self.state == SinkState::Open
    }

    /// Number of chunks handed to the host so far.
    pub fn forwarded(&self) -> usize {
        self.forwarded
    }

    fn fail_with(&mut self, error: RenderError) -> SinkError {
        self.state = SinkState::Failed;
        self.controller.sink_failed(error.clone());
        SinkError::Failed(error)
    }

    fn normalize(&mut self, chunk: Chunk) -> Result<Option<Chunk>, RenderError> {
        let Some(decoder) = self.decoder.as_mut() else {
            return Ok(Some(chunk));
        };

        match chunk {
            Chunk::Text(text) => match decoder.finish()? {
                Some(mut pending) => {
                    pending.push_str(&text);
                    Ok(Some(Chunk::Text(pending)))
                }
                None => Ok(Some(Chunk::Text(text))),
            },
            Chunk::Binary(bytes) => {
                let text = decoder.decode(&bytes)?;
                if text.is_empty() && !bytes.is_empty() {
                    // Only a partial sequence so far.
                    Ok(None)
                } else {
                    Ok(Some(Chunk::Text(text)))
                }
            }
        }
    }
}

impl Drop for ChunkSink {
    fn drop(&mut self) {
        if self.state == SinkState::Open {
            self.fail_with(RenderError::msg("chunk sink dropped before finishing"));
        }
    }
}

impl fmt::Debug for ChunkSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChunkSink")
            .field("state", &self.state)
            .field("forwarded", &self.forwarded)
            .finish()
    }
}

/// Incremental UTF-8 decoder that carries split multi-byte sequences
/// across chunk boundaries.
#[derive(Debug)]
struct TextDecoder {
    pending: Vec<u8>,
    policy: Utf8Policy,
}

impl TextDecoder {
    fn new(policy: Utf8Policy) -> Self {
        Self {
            pending: Vec::new(),
            policy,
        }
    }

    fn decode(&mut self, bytes: &[u8]) -> Result<String, RenderError> {
        let mut buf = std::mem::take(&mut self.pending);
        buf.extend_from_slice(bytes);

        let mut out = String::with_capacity(buf.len());
        let mut rest = &buf[..];
        loop {
            match std::str::from_utf8(rest) {
                Ok(text) => {
                    out.push_str(text);
                    break;
                }
                Err(err) => {
                    let valid = err.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&rest[..valid]));
                    match err.error_len() {
                        None => {
                            self.pending = rest[valid..].to_vec();
                            break;
                        }
                        Some(_) if self.policy == Utf8Policy::Strict => {
                            return Err(RenderError::new(err));
                        }
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            rest = &rest[valid + len..];
                        }
                    }
                }
            }
        }

        Ok(out)
    }

    /// Drain bytes left over from an incomplete sequence.
    fn finish(&mut self) -> Result<Option<String>, RenderError> {
        if self.pending.is_empty() {
            return Ok(None);
        }

        let pending = std::mem::take(&mut self.pending);
        match self.policy {
            Utf8Policy::Strict => Err(RenderError::msg(format!(
                "binary output ended inside a utf-8 sequence ({} dangling bytes)",
                pending.len()
            ))),
            Utf8Policy::Lossy => Ok(Some(String::from_utf8_lossy(&pending).into_owned())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{Call, Recorder, Scripted};
    use crate::StreamBridge;
    use edge_core::BridgeConfig;
    use futures::executor::block_on;

    #[test]
    fn test_decoder_carries_split_sequence() {
        let mut decoder = TextDecoder::new(Utf8Policy::Strict);
        let bytes = "é".as_bytes();

        assert_eq!(decoder.decode(&bytes[..1]).unwrap(), "");
        assert_eq!(decoder.decode(&bytes[1..]).unwrap(), "é");
        assert!(decoder.finish().unwrap().is_none());
    }

    #[test]
    fn test_decoder_lossy_replaces_invalid_bytes() {
        let mut decoder = TextDecoder::new(Utf8Policy::Lossy);
        assert_eq!(decoder.decode(b"a\xffb").unwrap(), "a\u{FFFD}b");
    }

    #[test]
    fn test_decoder_strict_rejects_invalid_bytes() {
        let mut decoder = TextDecoder::new(Utf8Policy::Strict);
        assert!(decoder.decode(b"a\xffb").is_err());
    }

    #[test]
    fn test_decoder_dangling_bytes_at_finish() {
        let mut lossy = TextDecoder::new(Utf8Policy::Lossy);
        lossy.decode(&"€".as_bytes()[..2]).unwrap();
        assert_eq!(lossy.finish().unwrap().as_deref(), Some("\u{FFFD}"));

        let mut strict = TextDecoder::new(Utf8Policy::Strict);
        strict.decode(&"€".as_bytes()[..2]).unwrap();
        assert!(strict.finish().is_err());
    }

    #[test]
    fn test_text_host_receives_decoded_binary_chunks() {
        let recorder = Recorder::new();
        let bytes = "<p>héllo</p>".as_bytes().to_vec();
        let (head, tail) = bytes.split_at(4);
        let engine = Scripted::ready_then(vec![head.to_vec().into(), tail.to_vec().into()]);

        let token = StreamBridge::default().run(engine, recorder.transport());

        assert!(block_on(token).is_ok());
        assert_eq!(recorder.written(), vec!["<p>h", "éllo</p>"]);
    }

    #[test]
    fn test_binary_host_receives_bytes_untouched() {
        let recorder = Recorder::binary();
        let engine = Scripted::ready_then(vec![Chunk::Binary(vec![0xff, 0x00])]);

        let token = StreamBridge::default().run(engine, recorder.transport());

        assert!(block_on(token).is_ok());
        assert!(recorder
            .calls()
            .contains(&Call::Write(Chunk::Binary(vec![0xff, 0x00]))));
    }

    #[test]
    fn test_strict_policy_turns_invalid_bytes_into_sink_error() {
        let recorder = Recorder::new();
        let engine = Scripted::ready_then(vec![Chunk::Binary(b"ok\xff".to_vec())]);
        let bridge = StreamBridge::new(BridgeConfig::default().with_utf8(Utf8Policy::Strict));

        let outcome = block_on(bridge.run(engine, recorder.transport()));

        assert!(matches!(outcome, Err(edge_core::BridgeError::Sink(_))));
        assert!(recorder.written().is_empty());
        assert!(!recorder.calls().contains(&Call::Close));
    }

    #[test]
    fn test_accept_after_finish_is_rejected_without_writing() {
        let recorder = Recorder::new();
        let engine = Scripted::custom(|sink| {
            sink.accept("<a>").unwrap();
            sink.finish();
            assert!(matches!(sink.accept("<late>"), Err(SinkError::Closed)));
            sink.fail("ignored");
        });

        let outcome = block_on(StreamBridge::default().run(engine, recorder.transport()));

        assert!(outcome.is_ok());
        assert_eq!(recorder.written(), vec!["<a>"]);
        assert_eq!(recorder.count(|c| matches!(c, Call::Close)), 1);
        assert_eq!(recorder.count(|c| matches!(c, Call::OnError(_))), 0);
    }

    #[test]
    fn test_dropped_sink_fails_the_invocation() {
        let recorder = Recorder::new();
        let engine = Scripted::custom(|sink| {
            sink.accept("<a>").unwrap();
        });

        let outcome = block_on(StreamBridge::default().run(engine, recorder.transport()));

        let err = outcome.unwrap_err();
        assert!(err.to_string().contains("dropped before finishing"));
        assert!(!recorder.calls().contains(&Call::Close));
    }
}
