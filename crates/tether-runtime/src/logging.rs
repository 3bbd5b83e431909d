//! Log output for Tether connections.
//!
//! The configured level applies to the Tether crates. HTTP and WebSocket
//! dependencies (reqwest, hyper, tungstenite) log at `dependency_level`, so
//! turning connection logs up to `debug` does not also dump every socket read.
//! `RUST_LOG`, when set, replaces both.
//!
//! ```rust,ignore
//! use tether_runtime::{config::load_config, logging};
//!
//! let config = load_config()?;
//! logging::init_from_config(&config.logging);
//! ```

use std::ffi::OsStr;
use std::path::Path;

use tracing::warn;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

use crate::config::{LogFormat, LogOutput, LoggingConfig, SpanEventConfig};

/// Targets the configured level applies to.
pub const TETHER_TARGETS: [&str; 4] = ["tether", "tether_core", "tether_transport", "tether_runtime"];

/// Installs the global subscriber described by `config`.
///
/// Does nothing if a global subscriber is already installed.
pub fn init_from_config(config: &LoggingConfig) {
    let _ = try_init_from_config(config);
}

/// Installs the global subscriber described by `config`.
pub fn try_init_from_config(config: &LoggingConfig) -> Result<(), TryInitError> {
    let (layer, json_fallback) = fmt_layer(config);
    tracing_subscriber::registry()
        .with(layer)
        .with(env_filter(config))
        .try_init()?;

    if json_fallback {
        warn!("JSON log format requires the json-log feature, using full format");
    }
    Ok(())
}

/// Filter directives for `config`, lowest precedence first.
pub fn filter_directives(config: &LoggingConfig) -> Vec<String> {
    let mut directives = vec![config.dependency_level.as_str().to_string()];
    directives.extend(
        TETHER_TARGETS
            .iter()
            .map(|target| format!("{target}={}", config.level)),
    );
    directives.extend(
        config
            .filters
            .iter()
            .map(|(module, level)| format!("{module}={level}")),
    );
    directives
}

fn env_filter(config: &LoggingConfig) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }

    let mut directives = filter_directives(config).into_iter();
    let base = directives.next().unwrap_or_default();
    directives.fold(EnvFilter::new(base), |filter, directive| {
        match directive.parse() {
            Ok(directive) => filter.add_directive(directive),
            Err(_) => filter,
        }
    })
}

fn span_events(config: &SpanEventConfig) -> FmtSpan {
    [
        (config.new, FmtSpan::NEW),
        (config.enter, FmtSpan::ENTER),
        (config.exit, FmtSpan::EXIT),
        (config.close, FmtSpan::CLOSE),
    ]
    .into_iter()
    .filter(|(enabled, _)| *enabled)
    .fold(FmtSpan::NONE, |spans, (_, span)| spans | span)
}

fn writer(config: &LoggingConfig) -> BoxMakeWriter {
    match (config.output, config.file_path.as_deref()) {
        (LogOutput::Stdout, _) => BoxMakeWriter::new(std::io::stdout),
        (LogOutput::Stderr, _) => BoxMakeWriter::new(std::io::stderr),
        (LogOutput::File, Some(path)) => BoxMakeWriter::new(tracing_appender::rolling::never(
            path.parent().unwrap_or_else(|| Path::new(".")),
            path.file_name().unwrap_or_else(|| OsStr::new("tether.log")),
        )),
        // Validation rejects this; stderr keeps logs out of application stdout.
        (LogOutput::File, None) => BoxMakeWriter::new(std::io::stderr),
    }
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Builds the formatting layer; the flag reports a JSON request this build cannot serve.
fn fmt_layer(config: &LoggingConfig) -> (BoxedLayer, bool) {
    let base = fmt::layer()
        .with_span_events(span_events(&config.span_events))
        .with_thread_ids(config.thread_ids)
        .with_file(config.file_location)
        .with_line_number(config.file_location)
        .with_writer(writer(config));

    match config.format {
        LogFormat::Compact => (base.compact().boxed(), false),
        LogFormat::Full => (base.boxed(), false),
        LogFormat::Pretty => (base.pretty().boxed(), false),
        #[cfg(feature = "json-log")]
        LogFormat::Json => (base.json().boxed(), false),
        #[cfg(not(feature = "json-log"))]
        LogFormat::Json => (base.boxed(), true),
    }
}
