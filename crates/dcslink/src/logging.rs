//! Logging bootstrap for binaries built on dcslink.
//!
//! The library itself only emits `tracing` events. Call [`init`] once at
//! startup to print them; the `RUST_LOG` environment variable overrides
//! the default filter.

use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is not set.
pub const DEFAULT_FILTER: &str = "dcslink=info";

/// Installs a formatting subscriber as the global default.
///
/// Does nothing if a global subscriber is already set, so it is safe to
/// call from tests and from code that may run more than once.
pub fn init() {
    init_with(DEFAULT_FILTER);
}

/// Like [`init`], with `default_filter` used when `RUST_LOG` is not set.
pub fn init_with(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
