//! Tracing setup.
//!
//! `RUST_LOG` overrides the configured level, e.g.
//! `RUST_LOG=coopstore::trash=debug,info`.

use crate::config::LogConfig;
use std::sync::OnceLock;
use tracing_subscriber::EnvFilter;

static INSTALLED: OnceLock<bool> = OnceLock::new();

/// Install the global subscriber. Only the first call has an effect;
/// returns whether this process's subscriber is ours.
pub fn init_tracing(config: &LogConfig) -> bool {
    *INSTALLED.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&config.level))
            .unwrap_or_else(|_| EnvFilter::new("info"));

        let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);
        let installed = if config.json {
            builder.json().try_init().is_ok()
        } else {
            builder.try_init().is_ok()
        };
        if installed {
            tracing::info!(json = config.json, level = %config.level, "Tracing initialized");
        }
        installed
    })
}
