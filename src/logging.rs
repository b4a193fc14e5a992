//! Logging setup for programs embedding meta-walker
//!
//! The library only emits `tracing` events. Call [`init`] once from the
//! embedding program to print them; `META_WALKER_LOG` overrides the filter,
//! e.g. `META_WALKER_LOG=meta_walker::mds=trace,warn`.

use tracing_subscriber::{fmt, EnvFilter};

/// Environment variable holding a filter directive
pub const LOG_ENV: &str = "META_WALKER_LOG";

/// Install a global fmt subscriber
///
/// Later calls are ignored, so tests may call it freely.
pub fn init(verbose: bool) {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| default_filter(verbose));

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .with_file(false)
        .with_line_number(false)
        .try_init();
}

fn default_filter(verbose: bool) -> EnvFilter {
    if verbose {
        EnvFilter::new("meta_walker=debug,warn")
    } else {
        EnvFilter::new("meta_walker=info,warn")
    }
}
