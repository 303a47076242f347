//! One-shot completion token.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use edge_core::{BridgeError, RunId};
use futures::channel::oneshot;

/// Outcome of one bridge invocation.
pub type Outcome = Result<(), BridgeError>;

/// Create a connected settler/token pair.
pub(crate) fn completion(run_id: RunId) -> (Settler, CompletionToken) {
    let (tx, rx) = oneshot::channel();
    (
        Settler { tx: Some(tx) },
        CompletionToken {
            run_id,
            rx,
            outcome: None,
        },
    )
}

/// Write side of the completion token. Accepts exactly one outcome.
#[derive(Debug)]
pub(crate) struct Settler {
    tx: Option<oneshot::Sender<Outcome>>,
}

impl Settler {
    /// Settle the token. Returns `false` if it was already settled.
    pub(crate) fn settle(&mut self, outcome: Outcome) -> bool {
        match self.tx.take() {
            Some(tx) => {
                // The caller may have stopped listening; settlement still counts.
                let _ = tx.send(outcome);
                true
            }
            None => false,
        }
    }

    pub(crate) fn is_settled(&self) -> bool {
        self.tx.is_none()
    }
}

/// Future resolving to the single outcome of one bridge invocation.
///
/// Resolves to [`BridgeError::Abandoned`] if the invocation is dropped
/// without ever settling. Once observed, the outcome is kept and every later
/// check reports the same value.
#[derive(Debug)]
#[must_use = "the completion token reports whether the render succeeded"]
pub struct CompletionToken {
    run_id: RunId,
    rx: oneshot::Receiver<Outcome>,
    outcome: Option<Outcome>,
}

impl CompletionToken {
    /// Identifier of the invocation this token belongs to.
    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    /// Non-blocking check; `None` while the invocation is still running.
    pub fn try_outcome(&mut self) -> Option<Outcome> {
        if self.outcome.is_none() {
            self.outcome = match self.rx.try_recv() {
                Ok(outcome) => outcome,
                Err(oneshot::Canceled) => Some(Err(BridgeError::Abandoned)),
            };
        }
        self.outcome.clone()
    }
}

impl Future for CompletionToken {
    type Output = Outcome;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if let Some(outcome) = &self.outcome {
            return Poll::Ready(outcome.clone());
        }

        let outcome = match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(outcome)) => outcome,
            Poll::Ready(Err(oneshot::Canceled)) => Err(BridgeError::Abandoned),
            Poll::Pending => return Poll::Pending,
        };
        self.outcome = Some(outcome.clone());
        Poll::Ready(outcome)
    }
}
