//! Tracing setup

use std::sync::Once;

static TRACING_INIT: Once = Once::new();

/// Default filter directive when `RUST_LOG` is unset
pub const DEFAULT_DIRECTIVE: &str = "ledger_recon=info";

/// Initializes the global tracing subscriber with sensible defaults.
///
/// Safe to call more than once; only the first call installs a subscriber, and
/// a subscriber installed elsewhere by the host application is left alone.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{fmt, EnvFilter};

        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE));

        if fmt().with_env_filter(filter).try_init().is_ok() {
            tracing::info!("ledger-recon tracing initialized");
        }
    });
}

#[cfg(test)]
mod tests {
    #[test]
    fn init_twice_does_not_panic() {
        super::init_tracing();
        super::init_tracing();
    }
}
