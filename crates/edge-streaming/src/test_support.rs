//! In-memory doubles shared by the unit tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use edge_core::{BridgeError, LifecycleObserver, LifecyclePhase, RunId};
use parking_lot::Mutex;

use crate::bridge::{RenderCallbacks, RenderHandle, RenderOperation, WeakRenderCallbacks};
use crate::sink::ChunkSink;
use crate::transport::{AbortHandle, Chunk, ChunkEncoding, HostTransport};

/// One observed call on the host transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    RegisterAbort,
    Flush,
    Write(Chunk),
    Close,
    OnError(String),
}

/// Shared log of transport calls.
#[derive(Clone, Default)]
pub(crate) struct Recorder {
    calls: Arc<Mutex<Vec<Call>>>,
    abort: Arc<Mutex<Option<AbortHandle>>>,
    fail_write: Option<(usize, &'static str)>,
    encoding: ChunkEncoding,
    cancel: Option<CancelFrom>,
    cancelled: Arc<AtomicBool>,
}

/// Hook from which the host fires the registered abort, once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CancelFrom {
    RegisterAbort,
    OnError,
}

impl Recorder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn binary() -> Self {
        Self {
            encoding: ChunkEncoding::Binary,
            ..Self::default()
        }
    }

    /// The `attempt`-th write (1-based) fails with `message`.
    pub(crate) fn failing_write(attempt: usize, message: &'static str) -> Self {
        Self {
            fail_write: Some((attempt, message)),
            ..Self::default()
        }
    }

    /// Fire the abort handle from inside `register_abort`.
    pub(crate) fn cancelled_on_register(mut self) -> Self {
        self.cancel = Some(CancelFrom::RegisterAbort);
        self
    }

    /// Fire the abort handle from inside the first `on_error`.
    pub(crate) fn cancelling_on_error(mut self) -> Self {
        self.cancel = Some(CancelFrom::OnError);
        self
    }

    fn cancel_from(&self, hook: CancelFrom) {
        if self.cancel != Some(hook) || self.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(abort) = self.abort_handle() {
            abort.abort();
        }
    }

    pub(crate) fn transport(&self) -> RecordingTransport {
        RecordingTransport {
            recorder: self.clone(),
            attempts: 0,
        }
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub(crate) fn count(&self, predicate: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().iter().filter(|call| predicate(call)).count()
    }

    /// Text of every attempted write.
    pub(crate) fn written(&self) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                Call::Write(chunk) => Some(String::from_utf8_lossy(chunk.as_bytes()).into_owned()),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn abort_handle(&self) -> Option<AbortHandle> {
        self.abort.lock().clone()
    }
}

pub(crate) struct RecordingTransport {
    recorder: Recorder,
    attempts: usize,
}

impl HostTransport for RecordingTransport {
    fn write(&mut self, chunk: Chunk) -> anyhow::Result<()> {
        self.attempts += 1;
        self.recorder.calls.lock().push(Call::Write(chunk));
        match self.recorder.fail_write {
            Some((attempt, message)) if attempt == self.attempts => Err(anyhow::anyhow!(message)),
            _ => Ok(()),
        }
    }

    fn encoding(&self) -> ChunkEncoding {
        self.recorder.encoding
    }

    fn close(&mut self) {
        self.recorder.calls.lock().push(Call::Close);
    }

    fn flush(&mut self) {
        self.recorder.calls.lock().push(Call::Flush);
    }

    fn on_error(&mut self, error: &BridgeError) {
        self.recorder.calls.lock().push(Call::OnError(error.to_string()));
        self.recorder.cancel_from(CancelFrom::OnError);
    }

    fn register_abort(&mut self, abort: AbortHandle) {
        self.recorder.calls.lock().push(Call::RegisterAbort);
        *self.recorder.abort.lock() = Some(abort);
        self.recorder.cancel_from(CancelFrom::RegisterAbort);
    }
}

type PipeFn = Box<dyn FnOnce(&mut ChunkSink, &RenderCallbacks) + Send>;

#[derive(Debug, Clone, Copy)]
enum OnStart {
    ShellReady,
    ShellError(&'static str),
    Nothing,
    Abandon,
}

/// Synchronous render engine driven by a script.
pub(crate) struct Scripted {
    on_start: OnStart,
    on_pipe: Option<PipeFn>,
    abort_reports: bool,
    control: Control,
}

/// Test-side view of a scripted engine.
#[derive(Clone, Default)]
pub(crate) struct Control {
    callbacks: Arc<Mutex<Option<RenderCallbacks>>>,
    aborts: Arc<AtomicUsize>,
}

impl Control {
    /// Callbacks captured by a deferred engine.
    pub(crate) fn callbacks(&self) -> RenderCallbacks {
        self.callbacks
            .lock()
            .clone()
            .expect("engine was not started in deferred mode")
    }

    pub(crate) fn aborts(&self) -> usize {
        self.aborts.load(Ordering::SeqCst)
    }
}

impl Scripted {
    fn new(on_start: OnStart, on_pipe: Option<PipeFn>) -> Self {
        Self {
            on_start,
            on_pipe,
            abort_reports: false,
            control: Control::default(),
        }
    }

    /// Shell ready during `start`, then emit `chunks` and finish.
    ///
    /// Keeps offering chunks after a failed write.
    pub(crate) fn ready_then(chunks: Vec<Chunk>) -> Self {
        Self::custom(move |sink| {
            for chunk in chunks {
                let _ = sink.accept(chunk);
            }
            sink.finish();
        })
    }

    /// Shell ready during `start`, then run `pipe` against the sink.
    pub(crate) fn custom(pipe: impl FnOnce(&mut ChunkSink) + Send + 'static) -> Self {
        Self::with_callbacks(move |sink, _| pipe(sink))
    }

    /// Like [`Scripted::custom`], with access to the engine callbacks.
    pub(crate) fn with_callbacks(
        pipe: impl FnOnce(&mut ChunkSink, &RenderCallbacks) + Send + 'static,
    ) -> Self {
        Self::new(OnStart::ShellReady, Some(Box::new(pipe)))
    }

    /// Shell error during `start`.
    pub(crate) fn shell_error(message: &'static str) -> Self {
        Self::new(OnStart::ShellError(message), None)
    }

    /// Nothing happens during `start`; the test fires callbacks via [`Control`].
    pub(crate) fn deferred(
        pipe: impl FnOnce(&mut ChunkSink, &RenderCallbacks) + Send + 'static,
    ) -> Self {
        Self::new(OnStart::Nothing, Some(Box::new(pipe)))
    }

    /// Aborting reports a stream error synchronously, from inside the abort call.
    pub(crate) fn reporting_abort(mut self) -> Self {
        self.abort_reports = true;
        self
    }

    /// Never calls the callbacks. Its handle still holds them weakly.
    pub(crate) fn abandoning() -> Self {
        Self::new(OnStart::Abandon, None)
    }

    pub(crate) fn control(&self) -> Control {
        self.control.clone()
    }
}

impl RenderOperation for Scripted {
    type Handle = ScriptedHandle;

    fn start(self, callbacks: RenderCallbacks) -> ScriptedHandle {
        let weak = callbacks.downgrade();
        match self.on_start {
            OnStart::ShellReady => callbacks.shell_ready(),
            OnStart::ShellError(message) => callbacks.shell_error(message),
            OnStart::Nothing => *self.control.callbacks.lock() = Some(callbacks),
            OnStart::Abandon => {}
        }

        ScriptedHandle {
            on_pipe: self.on_pipe,
            callbacks: weak,
            abort_reports: self.abort_reports,
            aborts: self.control.aborts,
        }
    }
}

pub(crate) struct ScriptedHandle {
    on_pipe: Option<PipeFn>,
    callbacks: WeakRenderCallbacks,
    abort_reports: bool,
    aborts: Arc<AtomicUsize>,
}

impl RenderHandle for ScriptedHandle {
    fn pipe(&mut self, mut sink: ChunkSink) {
        if let (Some(pipe), Some(callbacks)) = (self.on_pipe.take(), self.callbacks.upgrade()) {
            pipe(&mut sink, &callbacks);
        }
    }

    fn abort_handle(&self) -> AbortHandle {
        let aborts = Arc::clone(&self.aborts);
        let callbacks = self.abort_reports.then(|| self.callbacks.clone());
        AbortHandle::new(move || {
            aborts.fetch_add(1, Ordering::SeqCst);
            if let Some(callbacks) = callbacks.as_ref().and_then(WeakRenderCallbacks::upgrade) {
                callbacks.stream_error("aborted");
            }
        })
    }
}

/// Observer that records every phase it sees.
#[derive(Default)]
pub(crate) struct PhaseLog(Mutex<Vec<LifecyclePhase>>);

impl PhaseLog {
    pub(crate) fn phases(&self) -> Vec<LifecyclePhase> {
        self.0.lock().clone()
    }
}

impl LifecycleObserver for PhaseLog {
    fn on_phase(&self, _run: &RunId, phase: LifecyclePhase, _elapsed: Duration) {
        self.0.lock().push(phase);
    }
}
