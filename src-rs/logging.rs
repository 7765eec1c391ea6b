use std::io::IsTerminal;
use std::sync::OnceLock;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

static INITIALISED: OnceLock<()> = OnceLock::new();

/// Installs the stderr subscriber. `RUST_LOG` wins; otherwise `info`, or
/// `debug` when verbose. Later calls are ignored.
pub fn init_tracing(verbose: bool) {
    if INITIALISED.set(()).is_err() {
        return;
    }

    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_ansi(std::io::stderr().is_terminal());

    // another subscriber may already be installed by an embedding test harness
    let _ = Registry::default().with(filter).with(fmt_layer).try_init();
}
