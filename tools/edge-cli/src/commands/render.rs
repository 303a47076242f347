//! Render the demo page through the stream bridge.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result};
use edge_core::RunId;
use edge_observability::{PhaseRecorder, TracingObserver};
use edge_streaming::{channel, HeadContent, Outcome, Section, Shell, ShellRenderer, StreamBridge, StreamingResponse};
use futures::StreamExt;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::debug;

use super::RenderArgs;
use crate::context::Context;
use crate::output::{format_bytes, format_micros, outcome_badge};

const QUOTE: &str = "Streaming is working! This line was resolved on the server.";

/// Run the render command.
pub async fn run(args: RenderArgs, ctx: &Context) -> Result<()> {
    let recorder = Arc::new(PhaseRecorder::new());
    let bridge = StreamBridge::new(ctx.config.bridge.clone())
        .with_observer(Arc::new(TracingObserver))
        .with_observer(recorder.clone());

    let (transport, response) = channel();
    let token = bridge.run(demo_page(&args), transport);
    let run_id = token.run_id().clone();
    ctx.output.debug(&format!("run {run_id} started"));

    if let Some(ms) = args.abort_after_ms {
        schedule_abort(&response, Duration::from_millis(ms));
    }

    let mut stdout = tokio::io::stdout();
    let streamed = stream_to(response, &mut stdout).await?;
    let outcome = token.await;

    report(ctx, &recorder, &run_id, streamed, &outcome);
    outcome.map_err(anyhow::Error::from).context("render failed")
}

/// The demo page: a ready header and a quote that resolves after a delay.
pub fn demo_page(args: &RenderArgs) -> ShellRenderer {
    let shell = Shell::new(
        HeadContent::new("Streaming Demo")
            .with_meta("viewport", "width=device-width, initial-scale=1"),
    )
    .with_body_start("<body>\n<div class=\"app\">\n")
    .with_body_end("</div>\n</body>\n</html>\n");

    let header = if args.fail_shell {
        Section::builder("header").failed("header failed to render")
    } else {
        Section::ready(
            "header",
            "<header><h1>Streaming Demo</h1><p>The first bytes reach the client immediately, \
             while the quote waits on a deferred future.</p></header>",
        )
    };

    let mut quote = Section::builder("quote")
        .with_fallback("<p class=\"loading\">Fetching inspirational quote…</p>");
    if let Some(ms) = args.timeout_ms {
        quote = quote.with_timeout(Duration::from_millis(ms));
    }

    let delay = Duration::from_millis(args.delay_ms);
    let fail = args.fail_section;
    let quote = quote.deferred(async move {
        tokio::time::sleep(delay).await;
        if fail {
            anyhow::bail!("quote service unavailable");
        }
        Ok(format!("<p class=\"quote\">{QUOTE}</p>"))
    });

    ShellRenderer::new(shell).with_section(header).with_section(quote)
}

fn schedule_abort(response: &StreamingResponse, after: Duration) {
    let Some(handle) = response.abort_handle() else {
        debug!("no abort handle registered");
        return;
    };
    tokio::spawn(async move {
        tokio::time::sleep(after).await;
        debug!(after_ms = after.as_millis() as u64, "aborting render");
        handle.abort();
    });
}

/// Copy the response body into `out` as it arrives.
///
/// Returns `None` if the shell failed and nothing was written.
async fn stream_to<W>(mut response: StreamingResponse, out: &mut W) -> Result<Option<u64>>
where
    W: AsyncWrite + Unpin,
{
    if !response.ready().await {
        return Ok(None);
    }

    let mut body = response.into_body();
    let mut bytes = 0u64;
    while let Some(chunk) = body.next().await {
        out.write_all(&chunk).await.context("Failed to write output")?;
        out.flush().await.context("Failed to flush output")?;
        bytes += chunk.len() as u64;
    }
    Ok(Some(bytes))
}

fn report(ctx: &Context, recorder: &PhaseRecorder, run_id: &RunId, streamed: Option<u64>, outcome: &Outcome) {
    let summary = recorder.summary(run_id);

    if ctx.output.is_json() {
        ctx.output.report(&serde_json::json!({
            "summary": summary,
            "bytes": streamed,
            "error": outcome.as_ref().err().map(|err| err.to_string()),
        }));
        return;
    }

    let status = match outcome {
        Ok(()) => "completed",
        Err(err) => summary
            .as_ref()
            .and_then(|summary| summary.outcome)
            .map(|phase| phase.as_str())
            .unwrap_or(err.kind()),
    };

    ctx.output.header("Render summary");
    ctx.output.kv("run", run_id.as_str());
    ctx.output.kv("outcome", &outcome_badge(status));
    if let Some(us) = summary.as_ref().and_then(|summary| summary.time_to_shell_us) {
        ctx.output.kv("time to shell", &format_micros(us));
    }
    if let Some(us) = summary.as_ref().and_then(|summary| summary.total_us) {
        ctx.output.kv("total", &format_micros(us));
    }
    if let Some(bytes) = streamed {
        ctx.output.kv("body", &format_bytes(bytes));
    }
}
