//! Lifecycle controller bridging a render engine to a host transport.
//!
//! One call to [`StreamBridge::run`] drives one render:
//!
//! 1. the render operation is started with a [`RenderCallbacks`] set;
//! 2. the returned handle's abort function is registered with the host;
//! 3. on shell-ready the host is flushed and the handle pipes into a
//!    [`ChunkSink`];
//! 4. the sink's terminal signal (or a shell error) settles the
//!    [`CompletionToken`] exactly once.
//!
//! Host hooks never run under the invocation lock. Every host call is queued
//! in order and delivered by whichever caller currently holds the transport,
//! so a hook may re-enter the invocation (for example by aborting the render)
//! and the calls it triggers are delivered once it returns.

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Weak};

use anyhow::anyhow;
use edge_core::{
    marks, BridgeConfig, BridgeError, IllegalTransition, LifecycleObserver, LifecyclePhase,
    RenderError, RunId, TimingContext,
};
use parking_lot::Mutex;
use tracing::{debug, error, info, trace, warn};

use crate::completion::{completion, CompletionToken, Outcome, Settler};
use crate::sink::{ChunkSink, SinkError};
use crate::transport::{AbortHandle, Chunk, ChunkEncoding, HostTransport};

/// A render engine invocation that has not started yet.
pub trait RenderOperation {
    type Handle: RenderHandle + 'static;

    /// Start rendering. The engine reports progress through `callbacks`.
    ///
    /// `callbacks` may be invoked before `start` returns.
    fn start(self, callbacks: RenderCallbacks) -> Self::Handle;
}

/// Handle to a running render.
///
/// The invocation owns its handle until it settles. A handle that needs the
/// callbacks keeps them as [`WeakRenderCallbacks`]; a strong clone would keep
/// a silent render from ever being reported as abandoned.
pub trait RenderHandle: Send {
    /// Start streaming output into `sink`. Called at most once, after shell-ready.
    fn pipe(&mut self, sink: ChunkSink);

    /// Cancellation function for this render.
    fn abort_handle(&self) -> AbortHandle;

    /// Ask the render to stop producing chunks.
    fn abort(&self) {
        self.abort_handle().abort()
    }
}

/// Lifecycle hooks handed to the render engine.
#[derive(Clone)]
pub struct RenderCallbacks {
    controller: Arc<Controller>,
}

impl RenderCallbacks {
    /// The shell is ready; output may start flowing.
    pub fn shell_ready(&self) {
        self.controller.shell_ready();
    }

    /// The shell could not be produced. Fatal.
    pub fn shell_error(&self, error: impl Into<RenderError>) {
        self.controller.shell_error(error.into());
    }

    /// An error surfaced while streaming. Reported to the host only.
    pub fn stream_error(&self, error: impl Into<RenderError>) {
        self.controller.stream_error(error.into());
    }

    /// Identifier of the invocation these callbacks belong to.
    pub fn run_id(&self) -> &RunId {
        &self.controller.run_id
    }

    /// Non-owning reference for use inside a [`RenderHandle`].
    pub fn downgrade(&self) -> WeakRenderCallbacks {
        WeakRenderCallbacks {
            controller: Arc::downgrade(&self.controller),
        }
    }
}

/// Non-owning [`RenderCallbacks`].
#[derive(Clone)]
pub struct WeakRenderCallbacks {
    controller: Weak<Controller>,
}

impl WeakRenderCallbacks {
    /// `None` once the invocation is gone.
    pub fn upgrade(&self) -> Option<RenderCallbacks> {
        self.controller
            .upgrade()
            .map(|controller| RenderCallbacks { controller })
    }
}

/// Runs render operations against host transports.
#[derive(Clone, Default)]
pub struct StreamBridge {
    config: Arc<BridgeConfig>,
    observers: Vec<Arc<dyn LifecycleObserver>>,
}

impl StreamBridge {
    pub fn new(config: BridgeConfig) -> Self {
        Self {
            config: Arc::new(config),
            observers: Vec::new(),
        }
    }

    /// Add an observer notified on every lifecycle transition.
    pub fn with_observer(mut self, observer: Arc<dyn LifecycleObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Run one render into `transport`.
    pub fn run<R>(&self, operation: R, transport: impl HostTransport + 'static) -> CompletionToken
    where
        R: RenderOperation,
    {
        self.run_with_id(RunId::generate(), operation, transport)
    }

    /// Like [`StreamBridge::run`], correlating logs with a caller-supplied ID.
    pub fn run_with_id<R>(
        &self,
        run_id: RunId,
        operation: R,
        transport: impl HostTransport + 'static,
    ) -> CompletionToken
    where
        R: RenderOperation,
    {
        let (settler, token) = completion(run_id.clone());
        let controller = Arc::new(Controller {
            run_id,
            config: Arc::clone(&self.config),
            observers: self.observers.clone(),
            encoding: transport.encoding(),
            inner: Mutex::new(Inner {
                phase: LifecyclePhase::Started,
                host: Some(Box::new(transport)),
                outbox: VecDeque::new(),
                next_seq: 0,
                settler,
                handle: None,
                handle_installed: false,
                pipe_pending: false,
                timing: TimingContext::new(),
                chunks: 0,
                bytes: 0,
            }),
        });

        controller.begin();
        let handle = operation.start(RenderCallbacks {
            controller: Arc::clone(&controller),
        });
        controller.install(Box::new(handle));

        token
    }
}

/// Run one render with the default configuration.
pub fn run<R>(operation: R, transport: impl HostTransport + 'static) -> CompletionToken
where
    R: RenderOperation,
{
    StreamBridge::default().run(operation, transport)
}

/// Work queued for the host, delivered strictly in order.
enum Effect {
    RegisterAbort(AbortHandle),
    Flush,
    Write(Chunk),
    Close,
    Notify(BridgeError),
    /// Settles the token once every earlier effect has been delivered.
    Settle(Outcome),
}

impl Effect {
    fn name(&self) -> &'static str {
        match self {
            Self::RegisterAbort(_) => "register_abort",
            Self::Flush => "flush",
            Self::Write(_) => "write",
            Self::Close => "close",
            Self::Notify(_) => "on_error",
            Self::Settle(_) => "settle",
        }
    }
}

/// Per-invocation state shared by the callbacks and the sink.
pub(crate) struct Controller {
    run_id: RunId,
    config: Arc<BridgeConfig>,
    observers: Vec<Arc<dyn LifecycleObserver>>,
    encoding: ChunkEncoding,
    inner: Mutex<Inner>,
}

struct Inner {
    phase: LifecyclePhase,
    /// `None` while a caller is delivering effects to the host.
    host: Option<Box<dyn HostTransport>>,
    outbox: VecDeque<(u64, Effect)>,
    next_seq: u64,
    settler: Settler,
    handle: Option<Box<dyn RenderHandle>>,
    handle_installed: bool,
    /// Shell became ready before `start` returned.
    pipe_pending: bool,
    timing: TimingContext,
    chunks: usize,
    bytes: usize,
}

// Lock discipline: `inner` is never held while host hooks, the render
// handle, sinks or their drops run.
impl Controller {
    fn enter(&self, inner: &mut Inner, next: LifecyclePhase) -> Result<(), IllegalTransition> {
        inner.phase.transition(next)?;
        debug!(
            run_id = %self.run_id,
            runtime = %self.config.name,
            phase = %next,
            "lifecycle transition"
        );

        let elapsed = inner.timing.elapsed();
        for observer in &self.observers {
            observer.on_phase(&self.run_id, next, elapsed);
        }
        Ok(())
    }

    fn begin(&self) {
        let mut inner = self.inner.lock();
        if let Err(err) = self.enter(&mut inner, LifecyclePhase::ShellPending) {
            error!(run_id = %self.run_id, error = %err, "bridge invocation reused");
        }
    }

    fn install(self: &Arc<Self>, handle: Box<dyn RenderHandle>) {
        let abort = handle.abort_handle();
        let mut inner = self.inner.lock();
        push(&mut inner, Effect::RegisterAbort(abort));

        if inner.phase.is_terminal() {
            drop(inner);
            drop(handle);
            self.drain(None);
            return;
        }

        inner.handle = Some(handle);
        inner.handle_installed = true;
        let pipe_now = std::mem::take(&mut inner.pipe_pending);
        drop(inner);
        self.drain(None);

        if pipe_now {
            self.start_streaming();
        }
    }

    fn shell_ready(self: &Arc<Self>) {
        let mut inner = self.inner.lock();
        if let Err(err) = self.enter(&mut inner, LifecyclePhase::ShellReady) {
            warn!(run_id = %self.run_id, error = %err, "ignoring shell-ready signal");
            return;
        }
        inner.timing.mark(marks::SHELL_READY);

        if !inner.handle_installed {
            inner.pipe_pending = true;
            return;
        }
        drop(inner);

        self.start_streaming();
    }

    fn start_streaming(self: &Arc<Self>) {
        let mut handle = {
            let mut inner = self.inner.lock();
            let Some(handle) = inner.handle.take() else {
                error!(run_id = %self.run_id, "render handle missing at shell-ready");
                return;
            };

            if let Err(err) = self.enter(&mut inner, LifecyclePhase::Streaming) {
                warn!(run_id = %self.run_id, error = %err, "cannot start streaming");
                inner.handle = Some(handle);
                return;
            }
            push(&mut inner, Effect::Flush);
            handle
        };
        self.drain(None);

        let sink = ChunkSink::new(Arc::clone(self), self.encoding, self.config.utf8);
        handle.pipe(sink);

        let mut inner = self.inner.lock();
        if inner.phase.is_terminal() {
            drop(inner);
            drop(handle);
        } else {
            inner.handle = Some(handle);
        }
    }

    fn shell_error(&self, error: RenderError) {
        let error = BridgeError::Shell(error);
        let mut inner = self.inner.lock();

        match self.enter(&mut inner, LifecyclePhase::ShellFailed) {
            Ok(()) => {
                warn!(run_id = %self.run_id, error = %error, "shell failed");
                push(&mut inner, Effect::Notify(error.clone()));
                push(&mut inner, Effect::Settle(Err(error)));
            }
            Err(err) => {
                warn!(run_id = %self.run_id, error = %error, rejected = %err, "late shell error");
                push(&mut inner, Effect::Notify(error));
            }
        }
        drop(inner);
        self.drain(None);
    }

    fn stream_error(&self, error: RenderError) {
        let error = BridgeError::Stream(error);
        let mut inner = self.inner.lock();

        if inner.phase.is_terminal() {
            debug!(run_id = %self.run_id, error = %error, phase = %inner.phase, "stream error after settlement");
        } else {
            warn!(run_id = %self.run_id, error = %error, phase = %inner.phase, "stream error");
        }
        push(&mut inner, Effect::Notify(error));
        drop(inner);
        self.drain(None);
    }

    /// Queue one chunk for the host.
    ///
    /// A write delivered by this call reports its own failure, which the
    /// controller has already turned into a sink error. A write queued behind
    /// another delivery reports `Ok`; its failure, if any, settles the token
    /// and closes the sink on the next offer.
    pub(crate) fn forward(&self, chunk: Chunk) -> Result<(), SinkError> {
        let mut inner = self.inner.lock();
        if inner.phase != LifecyclePhase::Streaming {
            return Err(SinkError::Closed);
        }

        if self.config.trace_chunks {
            trace!(run_id = %self.run_id, seq = inner.chunks, bytes = chunk.len(), "forwarding chunk");
        }
        let seq = push(&mut inner, Effect::Write(chunk));
        drop(inner);

        match self.drain(Some(seq)) {
            Some(Err(err)) => Err(SinkError::Failed(err)),
            _ => Ok(()),
        }
    }

    pub(crate) fn sink_finished(&self) {
        let mut inner = self.inner.lock();
        if inner.phase != LifecyclePhase::Streaming {
            warn!(run_id = %self.run_id, phase = %inner.phase, "ignoring sink completion");
            return;
        }
        push(&mut inner, Effect::Close);
        drop(inner);
        self.drain(None);
    }

    pub(crate) fn sink_failed(&self, error: RenderError) {
        let mut inner = self.inner.lock();
        self.fail_stream(&mut inner, error);
        drop(inner);
        self.drain(None);
    }

    fn fail_stream(&self, inner: &mut Inner, error: RenderError) {
        let error = BridgeError::Sink(error);

        match self.enter(inner, LifecyclePhase::StreamFailed) {
            Ok(()) => {
                warn!(
                    run_id = %self.run_id,
                    error = %error,
                    chunks = inner.chunks,
                    "stream failed"
                );
                inner
                    .outbox
                    .retain(|(_, effect)| !matches!(effect, Effect::Write(_) | Effect::Close));
                push(inner, Effect::Notify(error.clone()));
                push(inner, Effect::Settle(Err(error)));
            }
            Err(err) => {
                warn!(run_id = %self.run_id, error = %error, rejected = %err, "late sink failure");
                push(inner, Effect::Notify(error));
            }
        }
    }

    fn complete(&self, inner: &mut Inner) -> Option<Box<dyn RenderHandle>> {
        if let Err(err) = self.enter(inner, LifecyclePhase::Completed) {
            warn!(run_id = %self.run_id, error = %err, "ignoring host close");
            return None;
        }

        inner.timing.mark(marks::COMPLETE);
        info!(
            run_id = %self.run_id,
            runtime = %self.config.name,
            chunks = inner.chunks,
            bytes = inner.bytes,
            time_to_shell_ms = inner.timing.time_to_shell().map(|d| d.as_secs_f64() * 1000.0),
            elapsed_ms = inner.timing.elapsed().as_secs_f64() * 1000.0,
            "stream completed"
        );

        self.settle(inner, Ok(()));
        inner.handle.take()
    }

    fn settle(&self, inner: &mut Inner, outcome: Outcome) {
        if !inner.settler.settle(outcome) {
            error!(run_id = %self.run_id, "completion token settled twice");
        }
    }

    /// Deliver queued effects until the queue is empty or another caller
    /// holds the host. Returns the result of write `own` if this call
    /// delivered it.
    fn drain(&self, own: Option<u64>) -> Option<Result<(), RenderError>> {
        let mut own_result = None;

        loop {
            let mut inner = self.inner.lock();
            if inner.host.is_none() {
                return own_result;
            }
            let Some((seq, effect)) = inner.outbox.pop_front() else {
                return own_result;
            };

            let effect = match effect {
                Effect::Settle(outcome) => {
                    self.settle(&mut inner, outcome);
                    let stale = inner.handle.take();
                    drop(inner);
                    drop(stale);
                    continue;
                }
                Effect::Write(_) | Effect::Close if inner.phase != LifecyclePhase::Streaming => {
                    continue;
                }
                effect => effect,
            };

            let written = match &effect {
                Effect::Write(chunk) => Some(chunk.len()),
                _ => None,
            };
            let closing = matches!(effect, Effect::Close);
            let Some(mut host) = inner.host.take() else {
                return own_result;
            };
            drop(inner);

            let delivered = self.deliver(host.as_mut(), effect);

            let mut inner = self.inner.lock();
            inner.host = Some(host);
            let mut stale = None;

            if let Some(len) = written {
                let delivered = delivered.map_err(RenderError::from);
                match &delivered {
                    Ok(()) => {
                        inner.timing.mark(marks::FIRST_CHUNK);
                        inner.chunks += 1;
                        inner.bytes += len;
                    }
                    Err(err) => self.fail_stream(&mut inner, err.clone()),
                }
                if own == Some(seq) {
                    own_result = Some(delivered);
                }
            } else if closing {
                stale = self.complete(&mut inner);
            }

            drop(inner);
            drop(stale);
        }
    }

    fn deliver(&self, host: &mut dyn HostTransport, effect: Effect) -> anyhow::Result<()> {
        let hook = effect.name();
        let delivered = panic::catch_unwind(AssertUnwindSafe(|| match effect {
            Effect::RegisterAbort(abort) => {
                host.register_abort(abort);
                Ok(())
            }
            Effect::Flush => {
                host.flush();
                Ok(())
            }
            Effect::Write(chunk) => host.write(chunk),
            Effect::Close => {
                host.close();
                Ok(())
            }
            Effect::Notify(error) => {
                host.on_error(&error);
                Ok(())
            }
            Effect::Settle(_) => Ok(()),
        }));

        delivered.unwrap_or_else(|_| {
            error!(run_id = %self.run_id, hook, "host transport hook panicked");
            Err(anyhow!("host transport panicked in {hook}"))
        })
    }
}

fn push(inner: &mut Inner, effect: Effect) -> u64 {
    let seq = inner.next_seq;
    inner.next_seq += 1;
    inner.outbox.push_back((seq, effect));
    seq
}
