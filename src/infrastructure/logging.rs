//! Structured logging setup via `tracing`/`tracing-subscriber`, mirroring
//! the teacher's `infrastructure/logging/logger.rs` shape: JSON-or-pretty
//! stdout output plus optional daily-rotated file output, gated by an
//! `EnvFilter` built from the configured level.

use std::io;

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::infrastructure::config::settings::LoggingConfig;
use crate::infrastructure::secret_scrubbing::SecretScrubber;

/// Holds the non-blocking file writer's guard so it isn't dropped (and the
/// background flush thread killed) while the process is still running.
pub struct LoggerGuard {
    _file_guard: Option<WorkerGuard>,
}

/// Wraps a formatted-log write with [`SecretScrubber`] before it reaches
/// the underlying writer. Each `write` call carries one complete formatted
/// record (tracing-subscriber's fmt layer builds the line in an internal
/// buffer before handing it to the writer), so scrubbing per-call is
/// sufficient to catch a credential embedded anywhere in trigger data or
/// an execution context that made it into a log field.
struct ScrubbingWriter<W> {
    inner: W,
    scrubber: SecretScrubber,
}

impl<W: io::Write> io::Write for ScrubbingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let text = String::from_utf8_lossy(buf);
        let scrubbed = self.scrubber.scrub(&text);
        self.inner.write_all(scrubbed.as_bytes())?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// [`MakeWriter`] adapter that scrubs whatever its inner `MakeWriter`
/// produces, so both the stdout layer and the rotated file layer get the
/// same redaction without duplicating the subscriber setup per output.
#[derive(Clone)]
struct ScrubbingMakeWriter<M> {
    inner: M,
    scrubber: SecretScrubber,
}

impl<'a, M> MakeWriter<'a> for ScrubbingMakeWriter<M>
where
    M: MakeWriter<'a>,
{
    type Writer = ScrubbingWriter<M::Writer>;

    fn make_writer(&'a self) -> Self::Writer {
        ScrubbingWriter { inner: self.inner.make_writer(), scrubber: self.scrubber.clone() }
    }
}

/// Initializes the global `tracing` subscriber from `config`. Call once at
/// process startup; the returned guard must be held for the process
/// lifetime if `config.log_dir` is set.
pub fn init(config: &LoggingConfig) -> Result<LoggerGuard> {
    let env_filter = EnvFilter::builder()
        .with_default_directive(parse_level(&config.level)?.into())
        .from_env_lossy();

    let scrubber = SecretScrubber::new();

    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_span_events(FmtSpan::CLOSE)
        .with_target(true)
        .with_writer(ScrubbingMakeWriter { inner: io::stdout, scrubber: scrubber.clone() });

    let (file_layer, file_guard) = match &config.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "incident-pipeline.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_writer(ScrubbingMakeWriter { inner: non_blocking, scrubber })
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    if config.format == "json" {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stdout_layer.json())
            .with(file_layer)
            .try_init()
            .context("failed to install tracing subscriber")?;
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stdout_layer.pretty())
            .with(file_layer)
            .try_init()
            .context("failed to install tracing subscriber")?;
    }

    Ok(LoggerGuard { _file_guard: file_guard })
}

fn parse_level(level: &str) -> Result<tracing::Level> {
    level
        .parse()
        .with_context(|| format!("invalid log level '{level}'"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_levels() {
        assert_eq!(parse_level("info").unwrap(), tracing::Level::INFO);
        assert_eq!(parse_level("debug").unwrap(), tracing::Level::DEBUG);
    }

    #[test]
    fn rejects_unknown_level() {
        assert!(parse_level("nonsense").is_err());
    }
}
