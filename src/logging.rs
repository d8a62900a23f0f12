use tracing_subscriber::EnvFilter;

/// Install the stderr diagnostic logger.
///
/// Stdout carries the hook's JSON reply, so diagnostics only ever go to
/// stderr. With `verbose` off the filter is `off` and nothing is written.
/// With it on, `RUST_LOG` wins if set, otherwise everything at `debug`.
pub fn init(verbose: bool) {
    let filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::new("off")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(false)
        .without_time()
        .try_init()
        .ok();
}
