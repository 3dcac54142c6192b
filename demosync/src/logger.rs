//! Logging facade
//!
//! Every module logs through these helpers so that messages carry the same
//! `ctx` field regardless of where they come from. The output side is a
//! `tracing-subscriber` fmt layer installed once by [`init`].

use tracing_subscriber::{fmt::SubscriberBuilder, EnvFilter};

/// Default filter when `RUST_LOG` is not set
const DEFAULT_FILTER: &str = "demosync=info,demosync_lib=info";
const VERBOSE_FILTER: &str = "demosync=debug,demosync_lib=debug";

/// Install the global subscriber.
///
/// `RUST_LOG` always wins over the `verbose` switch.
pub fn init(verbose: bool) -> anyhow::Result<()> {
    let fallback = if verbose {
        VERBOSE_FILTER
    } else {
        DEFAULT_FILTER
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    SubscriberBuilder::default()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialize logging: {}", e))
}

pub fn log_info(message: &str, ctx: Option<&str>) {
    tracing::info!(ctx = ctx.unwrap_or("-"), "{}", message);
}

pub fn log_warn(message: &str, ctx: Option<&str>) {
    tracing::warn!(ctx = ctx.unwrap_or("-"), "{}", message);
}

pub fn log_error(message: &str, ctx: Option<&str>) {
    tracing::error!(ctx = ctx.unwrap_or("-"), "{}", message);
}

/// Debug message with an optional source location (`file:line`)
pub fn log_debug(message: &str, ctx: Option<&str>, location: Option<&str>) {
    match location {
        Some(loc) => tracing::debug!(ctx = ctx.unwrap_or("-"), at = loc, "{}", message),
        None => tracing::debug!(ctx = ctx.unwrap_or("-"), "{}", message),
    }
}

/// Debug log carrying the call site
#[macro_export]
macro_rules! log_debug {
    ($msg:expr, $ctx:expr) => {
        $crate::logger::log_debug($msg, Some($ctx), Some(concat!(file!(), ":", line!())))
    };
}
