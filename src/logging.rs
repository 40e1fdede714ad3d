use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Environment variable that overrides the verbosity flags.
pub const LOG_ENV: &str = "ANCHOR_PATCHER_LOG";

/// Filter directive for the given verbosity flags.
pub fn filter_directive(verbose: bool, quiet: bool) -> &'static str {
    if verbose {
        "anchor_patcher=debug"
    } else if quiet {
        "anchor_patcher=off"
    } else {
        "anchor_patcher=error"
    }
}

/// Install the stderr subscriber.
///
/// Diagnostics go to stderr so stdout stays clean for summaries, diffs and
/// `--json` output.
pub fn init_logging(verbose: bool, quiet: bool) -> Result<(), TryInitError> {
    let env_filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(filter_directive(verbose, quiet)));

    let fmt_layer = fmt::layer()
        .with_target(false)
        .with_line_number(verbose)
        .with_file(verbose)
        .with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
}
