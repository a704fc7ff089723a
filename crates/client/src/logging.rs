//! Logging for the sync client.
//!
//! Library code logs through `log_info!`, `log_warn!`, `log_error!` and
//! `log_debug!`. They expand to the matching `tracing` macro at the call
//! site, so each event's target is the calling module (`claw_client::ws::
//! manager`, `claw_client::session`, ...) and `RUST_LOG` directives can
//! select individual parts of the client.

use tracing_subscriber::EnvFilter;

#[doc(hidden)]
pub use tracing as __tracing;

/// Install the global `tracing` subscriber.
///
/// Reads the filter from `RUST_LOG`, falling back to `default_filter`.
/// Calling this twice is harmless; the second call is ignored.
pub fn init(default_filter: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .try_init();
}

/// Connection lifecycle, views loaded, shutdown.
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        $crate::logging::__tracing::info!($($arg)*)
    };
}

/// Failed requests, transport errors, panicking listeners.
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        $crate::logging::__tracing::error!($($arg)*)
    };
}

/// Frames and patches that were dropped.
#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        $crate::logging::__tracing::warn!($($arg)*)
    };
}

/// Per-frame traffic.
#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        $crate::logging::__tracing::debug!($($arg)*)
    };
}
