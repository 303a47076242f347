//! Output formatting for the CLI.
//!
//! Messages go to stderr; stdout is reserved for rendered documents and
//! machine-readable output.

use console::{style, Term};

/// Output handler for CLI messages.
#[derive(Clone)]
pub struct Output {
    verbose: bool,
    json: bool,
    term: Term,
}

impl Output {
    /// Create a new output handler.
    pub fn new(verbose: bool, json: bool) -> Self {
        Self {
            verbose,
            json,
            term: Term::stderr(),
        }
    }

    /// Print an info message.
    pub fn info(&self, msg: &str) {
        if self.json {
            return;
        }
        self.line(&format!("{} {}", style("ℹ").blue(), msg));
    }

    /// Print a success message.
    pub fn success(&self, msg: &str) {
        if self.json {
            return;
        }
        self.line(&format!("{} {}", style("✓").green(), msg));
    }

    /// Print a warning message.
    pub fn warn(&self, msg: &str) {
        if self.json {
            return;
        }
        self.line(&format!("{} {}", style("⚠").yellow(), msg));
    }

    /// Print an error message.
    pub fn error(&self, msg: &str) {
        if self.json {
            let body = serde_json::json!({ "error": msg });
            self.line(&body.to_string());
            return;
        }
        self.line(&format!("{} {}", style("✗").red(), style(msg).red()));
    }

    /// Print a debug message (only in verbose mode).
    pub fn debug(&self, msg: &str) {
        if !self.verbose || self.json {
            return;
        }
        self.line(&format!("{} {}", style("→").dim(), style(msg).dim()));
    }

    /// Print a header/title.
    pub fn header(&self, msg: &str) {
        if self.json {
            return;
        }
        self.line(&format!("\n{}", style(msg).bold().underlined()));
    }

    /// Print a key-value pair.
    pub fn kv(&self, key: &str, value: &str) {
        if self.json {
            return;
        }
        self.line(&format!("  {}: {}", style(key).dim(), value));
    }

    /// Print JSON to stdout.
    pub fn json<T: serde::Serialize>(&self, value: &T) {
        if let Ok(json) = serde_json::to_string_pretty(value) {
            println!("{}", json);
        }
    }

    /// Print a single JSON line to stderr, next to a document on stdout.
    pub fn report<T: serde::Serialize>(&self, value: &T) {
        if let Ok(json) = serde_json::to_string(value) {
            self.line(&json);
        }
    }

    /// Check if verbose mode is enabled.
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    /// Check if JSON mode is enabled.
    pub fn is_json(&self) -> bool {
        self.json
    }

    fn line(&self, text: &str) {
        let _ = self.term.write_line(text);
    }
}

/// Format bytes as human-readable size.
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;

    if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Format microseconds as milliseconds.
pub fn format_micros(us: u64) -> String {
    format!("{:.1}ms", us as f64 / 1000.0)
}

/// Status badge for a run outcome.
pub fn outcome_badge(outcome: &str) -> String {
    match outcome {
        "completed" => style(outcome).green().to_string(),
        "stream_failed" | "shell_failed" | "abandoned" => style(outcome).red().to_string(),
        _ => style(outcome).yellow().to_string(),
    }
}
