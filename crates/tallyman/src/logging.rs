//! Tracing setup for programs embedding the processor.
//!
//! The library only emits events; installing a subscriber is the
//! program's choice.

use tracing::level_filters::LevelFilter;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

/// Error returned when a global subscriber is already installed.
pub type InitError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Install a stderr fmt subscriber.
///
/// `RUST_LOG` wins when set. Otherwise `verbose` selects debug output with
/// span timings, and the default shows warnings only.
pub fn init(verbose: bool) -> Result<(), InitError> {
    let level = if verbose { LevelFilter::DEBUG } else { LevelFilter::WARN };
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    let span_events = if verbose { FmtSpan::CLOSE } else { FmtSpan::NONE };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_span_events(span_events)
        .with_writer(std::io::stderr)
        .try_init()
}
