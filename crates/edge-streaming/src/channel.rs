//! Channel-backed host transport for HTTP-style servers.
//!
//! The bridge writes into a [`ChannelTransport`]; the server holds the
//! matching [`StreamingResponse`], waits for the head to be released and
//! then forwards the body stream to the client.

use std::sync::Arc;

use anyhow::anyhow;
use edge_core::BridgeError;
use futures::channel::{mpsc, oneshot};
use futures::StreamExt;
use parking_lot::Mutex;
use tracing::debug;

use crate::transport::{AbortHandle, Chunk, ChunkEncoding, HostTransport};

/// Body chunks in the order the bridge wrote them.
pub type ResponseBody = mpsc::UnboundedReceiver<Vec<u8>>;

type AbortSlot = Arc<Mutex<Option<AbortHandle>>>;

/// Create a connected transport/response pair.
pub fn channel() -> (ChannelTransport, StreamingResponse) {
    let (head_tx, head_rx) = oneshot::channel();
    let (body_tx, body_rx) = mpsc::unbounded();
    let abort = AbortSlot::default();

    let transport = ChannelTransport {
        head: Some(head_tx),
        body: Some(body_tx),
        abort: Arc::clone(&abort),
    };
    let response = StreamingResponse {
        head: Some(head_rx),
        released: false,
        body: body_rx,
        abort,
    };
    (transport, response)
}

/// Host transport that pushes bytes into an in-process channel.
#[derive(Debug)]
pub struct ChannelTransport {
    head: Option<oneshot::Sender<()>>,
    body: Option<mpsc::UnboundedSender<Vec<u8>>>,
    abort: AbortSlot,
}

impl HostTransport for ChannelTransport {
    fn write(&mut self, chunk: Chunk) -> anyhow::Result<()> {
        let body = self
            .body
            .as_ref()
            .ok_or_else(|| anyhow!("response body already closed"))?;
        body.unbounded_send(chunk.into_bytes())
            .map_err(|_| anyhow!("response body receiver dropped"))
    }

    fn encoding(&self) -> ChunkEncoding {
        ChunkEncoding::Binary
    }

    fn close(&mut self) {
        self.body.take();
    }

    fn flush(&mut self) {
        if let Some(head) = self.head.take() {
            let _ = head.send(());
        }
    }

    fn on_error(&mut self, error: &BridgeError) {
        debug!(kind = error.kind(), error = %error, "channel transport notified");
        if error.is_fatal() {
            self.head.take();
            self.body.take();
        }
    }

    fn register_abort(&mut self, abort: AbortHandle) {
        *self.abort.lock() = Some(abort);
    }
}

/// Server-side half of a [`channel`].
#[derive(Debug)]
pub struct StreamingResponse {
    head: Option<oneshot::Receiver<()>>,
    released: bool,
    body: ResponseBody,
    abort: AbortSlot,
}

impl StreamingResponse {
    /// Wait until the head may be sent.
    ///
    /// Returns `false` if the render failed before the shell was ready; no
    /// body byte has been produced in that case, so the server can still
    /// answer with a different response.
    pub async fn ready(&mut self) -> bool {
        if let Some(head) = self.head.take() {
            self.released = head.await.is_ok();
        }
        self.released
    }

    /// Cancel the render through the registered abort handle.
    ///
    /// Returns `false` if no handle has been registered yet.
    pub fn abort(&self) -> bool {
        let handle = self.abort.lock().clone();
        match handle {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    pub fn abort_handle(&self) -> Option<AbortHandle> {
        self.abort.lock().clone()
    }

    pub fn into_body(self) -> ResponseBody {
        self.body
    }

    /// Collect the whole body, decoding it lossily as UTF-8.
    pub async fn text(self) -> String {
        let bytes: Vec<u8> = self.body.concat().await;
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use futures::executor::block_on;

    use super::*;
    use crate::bridge::run;
    use crate::test_support::Scripted;

    #[test]
    fn test_head_then_body() {
        let (transport, mut response) = channel();
        let engine = Scripted::ready_then(vec!["<a>".into(), "<b>".into()]);

        let token = run(engine, transport);

        assert!(block_on(response.ready()));
        assert_eq!(block_on(response.text()), "<a><b>");
        assert!(block_on(token).is_ok());
    }

    #[test]
    fn test_shell_error_never_releases_head() {
        let (transport, mut response) = channel();

        let token = run(Scripted::shell_error("boom"), transport);

        assert!(!block_on(response.ready()));
        assert!(block_on(token).is_err());
        assert_eq!(block_on(response.text()), "");
    }

    #[test]
    fn test_dropped_body_fails_the_write() {
        let (transport, response) = channel();
        drop(response.into_body());

        let outcome = block_on(run(Scripted::ready_then(vec!["<a>".into()]), transport));

        let err = outcome.unwrap_err();
        assert!(matches!(err, BridgeError::Sink(_)));
        assert!(err.to_string().contains("receiver dropped"));
    }

    #[test]
    fn test_abort_uses_registered_handle() {
        let (transport, response) = channel();
        assert!(!response.abort());

        let engine = Scripted::deferred(|_, _| {});
        let control = engine.control();
        let _token = run(engine, transport);

        assert!(response.abort());
        assert_eq!(control.aborts(), 1);
    }

    #[test]
    fn test_binary_chunks_pass_through() {
        let (transport, response) = channel();
        let engine = Scripted::ready_then(vec![Chunk::Binary(vec![0xe2, 0x82]), Chunk::Binary(vec![0xac])]);

        block_on(run(engine, transport)).unwrap();

        let chunks: Vec<Vec<u8>> = block_on(response.into_body().collect());
        assert_eq!(chunks, vec![vec![0xe2, 0x82], vec![0xac]]);
    }
}
