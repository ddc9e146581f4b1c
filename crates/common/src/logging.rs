//! Tracing setup for the worker process.
//!
//! `RUST_LOG` wins over the configured level. Without it the worker logs at
//! the configured level while the storage client stack stays at `warn`, since
//! it reports every request it makes.

use tracing::Span;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingConfig;

/// Targets that are capped at `warn` unless the level names them.
const CHATTY_TARGETS: &[&str] = &["aws_config", "aws_smithy_runtime", "aws_sdk_s3", "hyper"];

/// Filter directives used when `RUST_LOG` is unset.
pub fn default_directives(level: &str) -> String {
    let mut directives = level.trim().to_string();
    for target in CHATTY_TARGETS {
        if !directives.contains(target) {
            directives.push_str(&format!(",{target}=warn"));
        }
    }
    directives
}

/// Install the global subscriber. Calling it again is a no-op.
pub fn init_logging(config: &LoggingConfig) {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directives(&config.level)))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    if config.json {
        let subscriber = fmt::Subscriber::builder()
            .with_env_filter(env_filter)
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .finish();
        tracing::subscriber::set_global_default(subscriber).ok();
    } else {
        let subscriber = fmt::Subscriber::builder()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_names(true)
            .with_file(false)
            .with_line_number(false)
            .finish();
        tracing::subscriber::set_global_default(subscriber).ok();
    }
}

/// Span every record of one job is emitted under, so interleaved worker
/// logs can be attributed to the object being processed.
pub fn job_span(source_key: &str, sinks: usize) -> Span {
    tracing::info_span!("job", source = %source_key, sinks)
}
