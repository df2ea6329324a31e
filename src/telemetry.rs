//! Logging initialization.
//!
//! `RUST_LOG` wins when set; otherwise `--debug` selects `trace`, `--verbose`
//! selects `debug`, and the default is `warn`. Events go to stderr so patch
//! output and progress lines on stdout stay clean.

use crate::config::Options;
use tracing_subscriber::EnvFilter;

pub fn default_directive(options: Options) -> &'static str {
    if options.debug {
        "node_patcher=trace"
    } else if options.verbose {
        "node_patcher=debug"
    } else {
        "warn"
    }
}

/// Install the global subscriber. Calling it twice is harmless.
pub fn init(options: Options) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(options)));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(options.debug)
        .without_time()
        .try_init();
}
