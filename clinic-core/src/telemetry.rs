//! Tracing setup for binaries and test harnesses embedding the clinic crates.
//!
//! The libraries only emit `tracing` events; installing a subscriber is left
//! to the process that owns `main`. With feature `tracing-basic` this module
//! offers a ready-made `fmt` subscriber honouring `RUST_LOG`.

/// Default filter used when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "info,clinic_records=debug,clinic_blob=debug";

/// Install a global `fmt` subscriber.
///
/// Returns `false` if a global subscriber was already set.
#[cfg(feature = "tracing-basic")]
pub fn init_tracing(default_filter: Option<&str>) -> bool {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter.unwrap_or(DEFAULT_FILTER)));

    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_ok();

    if installed {
        tracing::debug!("Tracing subscriber installed");
    }
    installed
}
