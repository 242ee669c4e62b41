//! Structured logging with a secret-scrubbing writer stage.
//!
//! Every byte headed for a log sink — the rotated JSON file and the stderr
//! console — passes through [`scrub`] first, so token-shaped values never
//! reach disk even if a call site slips. Message bodies are kept out of the
//! logging macros structurally (call sites log ids and counts); the
//! scrubbing stage is the backstop for credentials.
//!
//! Two modes: [`init_production`] for the daemon (daily-rotated JSON file
//! plus console), [`init_cli`] for one-shot subcommands (console only).

use std::io::{self, Write};
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::writer::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Canonical replacement marker for scrubbed content.
pub const REDACTION_MARKER: &str = "[REDACTED]";

/// Token-shaped patterns that must never reach a log sink: OAuth bearer
/// values, Google access tokens, Graph-style JWTs, and key=value token
/// assignments.
static SECRET_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)bearer\s+[a-z0-9._~+/=\-]{8,}",
        r"ya29\.[A-Za-z0-9._\-]{16,}",
        r"eyJ[A-Za-z0-9_\-]{10,}\.[A-Za-z0-9._\-]{10,}",
        r#"(?i)(access|refresh)_token["=:\s]+[^\s",}]{8,}"#,
    ]
    .iter()
    .filter_map(|pattern| Regex::new(pattern).ok())
    .collect()
});

/// Replace token-shaped substrings with [`REDACTION_MARKER`].
pub fn scrub(text: &str) -> String {
    let mut sanitized = text.to_owned();
    for pattern in SECRET_PATTERNS.iter() {
        sanitized = pattern
            .replace_all(&sanitized, REDACTION_MARKER)
            .to_string();
    }
    sanitized
}

// ---------------------------------------------------------------------------
// Scrubbing writer stage
// ---------------------------------------------------------------------------

/// A writer that scrubs each formatted event before passing it through.
struct ScrubbingWriter<W: Write> {
    inner: W,
}

impl<W: Write> Write for ScrubbingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match std::str::from_utf8(buf) {
            Ok(text) => {
                let sanitized = scrub(text);
                self.inner.write_all(sanitized.as_bytes())?;
                // The caller sees its own buffer as fully consumed.
                Ok(buf.len())
            }
            // Non-UTF-8 bytes cannot hold a recognisable token.
            Err(_) => self.inner.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// [`MakeWriter`] adapter wrapping any sink in a [`ScrubbingWriter`].
struct ScrubbingMakeWriter<M> {
    inner: M,
}

impl<M> ScrubbingMakeWriter<M> {
    fn new(inner: M) -> Self {
        Self { inner }
    }
}

impl<'a, M> MakeWriter<'a> for ScrubbingMakeWriter<M>
where
    M: MakeWriter<'a>,
{
    type Writer = ScrubbingWriter<M::Writer>;

    fn make_writer(&'a self) -> Self::Writer {
        ScrubbingWriter {
            inner: self.inner.make_writer(),
        }
    }
}

// ---------------------------------------------------------------------------
// Initialisation
// ---------------------------------------------------------------------------

/// Holds the non-blocking writer guard for file logging.
///
/// Must be kept alive for the duration of the process; dropping it flushes
/// pending entries and closes the file.
pub struct LoggingGuard {
    _guard: WorkerGuard,
}

/// Filter from the config `log_level` vocabulary, overridable via `RUST_LOG`.
fn filter_for(level: &str) -> EnvFilter {
    let directive = match level {
        "debug" => "debug",
        "warning" => "warn",
        "error" => "error",
        _ => "info",
    };
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive))
}

/// Initialise logging for the daemon (production mode).
///
/// Writes scrubbed JSON events to `{logs_dir}/daybook.YYYY-MM-DD.log` with
/// daily rotation, and scrubbed human-readable output to stderr.
///
/// # Errors
///
/// Returns an error if the logs directory or the rolling appender cannot be
/// created.
pub fn init_production(logs_dir: &Path, level: &str) -> anyhow::Result<LoggingGuard> {
    std::fs::create_dir_all(logs_dir).map_err(|e| {
        anyhow::anyhow!(
            "failed to create logs directory {}: {e}",
            logs_dir.display()
        )
    })?;

    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("daybook")
        .filename_suffix("log")
        .build(logs_dir)
        .map_err(|e| anyhow::anyhow!("failed to create rolling log appender: {e}"))?;
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(ScrubbingMakeWriter::new(non_blocking));
    let console_layer =
        tracing_subscriber::fmt::layer().with_writer(ScrubbingMakeWriter::new(io::stderr));

    tracing_subscriber::registry()
        .with(filter_for(level))
        .with(json_layer)
        .with(console_layer)
        .init();

    Ok(LoggingGuard { _guard: guard })
}

/// Initialise minimal logging for one-shot subcommands (CLI mode).
///
/// Scrubbed human-readable output to stderr only; no file rotation.
/// Controlled by `RUST_LOG` (default: `info`).
pub fn init_cli() {
    tracing_subscriber::registry()
        .with(filter_for("info"))
        .with(tracing_subscriber::fmt::layer().with_writer(ScrubbingMakeWriter::new(io::stderr)))
        .init();
}
