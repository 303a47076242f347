//! Shell-first reference render engine.
//!
//! Renders a [`Shell`] with its sections as the first chunk: ready
//! sections inline, deferred ones as their fallback. Deferred sections are
//! then streamed as template fills in the order they resolve, followed by
//! the closing markup.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use edge_core::RenderError;
use futures::channel::oneshot;
use futures::future::BoxFuture;
use futures::stream::FuturesUnordered;
use futures::{FutureExt, StreamExt};
use tokio::sync::Notify;
use tracing::debug;

use crate::bridge::{RenderCallbacks, RenderHandle, RenderOperation};
use crate::section::{Section, SectionContent};
use crate::shell::{section_markup, template_markup, Shell};
use crate::sink::ChunkSink;
use crate::transport::AbortHandle;

/// Render engine for a shell plus ordered sections.
///
/// Starting it spawns a Tokio task, so it must run inside a Tokio runtime.
#[derive(Debug)]
pub struct ShellRenderer {
    shell: Shell,
    sections: Vec<Section>,
}

impl ShellRenderer {
    pub fn new(shell: Shell) -> Self {
        Self {
            shell,
            sections: Vec::new(),
        }
    }

    /// Append a section.
    pub fn with_section(mut self, section: Section) -> Self {
        self.sections.push(section);
        self
    }
}

impl RenderOperation for ShellRenderer {
    type Handle = ShellRenderHandle;

    fn start(self, callbacks: RenderCallbacks) -> ShellRenderHandle {
        let (sink_tx, sink_rx) = oneshot::channel();
        let signal = Arc::new(AbortSignal::default());

        tokio::spawn(drive(self, callbacks, sink_rx, Arc::clone(&signal)));

        ShellRenderHandle {
            sink_tx: Some(sink_tx),
            signal,
        }
    }
}

/// Handle to a running [`ShellRenderer`].
#[derive(Debug)]
pub struct ShellRenderHandle {
    sink_tx: Option<oneshot::Sender<ChunkSink>>,
    signal: Arc<AbortSignal>,
}

impl RenderHandle for ShellRenderHandle {
    fn pipe(&mut self, mut sink: ChunkSink) {
        match self.sink_tx.take() {
            Some(tx) => {
                if let Err(mut sink) = tx.send(sink) {
                    sink.fail("render task exited before piping");
                }
            }
            None => sink.fail("render output already piped"),
        }
    }

    fn abort_handle(&self) -> AbortHandle {
        let signal = Arc::clone(&self.signal);
        AbortHandle::new(move || signal.trigger())
    }
}

#[derive(Debug, Default)]
struct AbortSignal {
    aborted: AtomicBool,
    notify: Notify,
}

impl AbortSignal {
    fn trigger(&self) {
        if !self.aborted.swap(true, Ordering::SeqCst) {
            self.notify.notify_one();
        }
    }

    fn is_set(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    async fn wait(&self) {
        if !self.is_set() {
            self.notify.notified().await;
        }
    }
}

enum Resolution {
    Html(String),
    Failed(anyhow::Error),
    TimedOut(Duration),
}

async fn resolve(
    content: BoxFuture<'static, anyhow::Result<String>>,
    timeout: Option<Duration>,
) -> Resolution {
    let result = match timeout {
        Some(limit) => match tokio::time::timeout(limit, content).await {
            Ok(result) => result,
            Err(_) => return Resolution::TimedOut(limit),
        },
        None => content.await,
    };

    match result {
        Ok(html) => Resolution::Html(html),
        Err(err) => Resolution::Failed(err),
    }
}

async fn drive(
    renderer: ShellRenderer,
    callbacks: RenderCallbacks,
    sink_rx: oneshot::Receiver<ChunkSink>,
    signal: Arc<AbortSignal>,
) {
    let ShellRenderer { shell, sections } = renderer;
    let mut html = shell.render_opening();
    let mut unresolved = Vec::new();
    let pending = FuturesUnordered::new();

    for section in sections {
        let Section {
            name,
            fallback,
            timeout,
            content,
        } = section;

        match content {
            SectionContent::Ready(body) => html.push_str(&section_markup(&name, &body)),
            SectionContent::Deferred(content) => {
                html.push_str(&section_markup(&name, fallback.as_deref().unwrap_or_default()));
                unresolved.push(name.clone());
                pending.push(async move { (name, resolve(content, timeout).await) }.boxed());
            }
            SectionContent::Failed(err) => match fallback {
                Some(fallback) => {
                    callbacks.stream_error(err);
                    html.push_str(&section_markup(&name, &fallback));
                }
                None => {
                    callbacks.shell_error(err);
                    return;
                }
            },
        }
    }

    if signal.is_set() {
        callbacks.shell_error(RenderError::msg("render aborted before the shell was ready"));
        return;
    }
    callbacks.shell_ready();

    let Ok(mut sink) = sink_rx.await else {
        debug!(run_id = %callbacks.run_id(), "render handle dropped before piping");
        return;
    };
    if sink.accept(html).is_err() {
        return;
    }

    stream_sections(&callbacks, &mut sink, &signal, pending, &mut unresolved).await;
    if !sink.is_open() {
        return;
    }

    for name in unresolved {
        callbacks.stream_error(RenderError::msg(format!(
            "render aborted before section '{name}' resolved"
        )));
    }

    if sink.accept(shell.render_closing()).is_ok() {
        sink.finish();
    }
}

async fn stream_sections(
    callbacks: &RenderCallbacks,
    sink: &mut ChunkSink,
    signal: &AbortSignal,
    mut pending: FuturesUnordered<BoxFuture<'static, (String, Resolution)>>,
    unresolved: &mut Vec<String>,
) {
    while !pending.is_empty() {
        let resolved = tokio::select! {
            biased;
            _ = signal.wait() => None,
            Some(resolved) = pending.next() => Some(resolved),
        };
        let Some((name, resolution)) = resolved else {
            debug!(run_id = %callbacks.run_id(), pending = unresolved.len(), "render aborted");
            return;
        };
        unresolved.retain(|pending| pending != &name);

        match resolution {
            Resolution::Html(body) => {
                if sink.accept(template_markup(&name, &body)).is_err() {
                    return;
                }
            }
            Resolution::Failed(err) => {
                callbacks.stream_error(err.context(format!("section '{name}' failed")));
            }
            Resolution::TimedOut(limit) => {
                callbacks.stream_error(RenderError::msg(format!(
                    "section '{name}' timed out after {}ms",
                    limit.as_millis()
                )));
            }
        }
    }
}
