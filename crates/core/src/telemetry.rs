//! Tracing subscriber bootstrap
//!
//! Binaries and integration harnesses call [`init`] once at startup;
//! libraries only emit through `tracing` macros and never install a
//! subscriber themselves.

use tracing_subscriber::EnvFilter;

/// Installs a fmt subscriber honoring `RUST_LOG`, defaulting to `info`.
///
/// Repeated calls are no-ops so test harnesses can call it unconditionally.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
