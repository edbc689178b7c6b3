//! crates/logging/src/tracing_bridge.rs
//! Subscriber installation for binaries and test harnesses.
//!
//! # Usage
//!
//! ```rust,ignore
//! use logging::{Verbosity, init_tracing};
//!
//! init_tracing(Verbosity::Debug)?;
//! tracing::debug!(target: "offload::submit", "queue 0 accepted descriptor");
//! ```

use std::error::Error;
use std::fmt;

use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{EnvFilter, Registry};

use super::config::Verbosity;

/// Returned when a global subscriber is already installed.
#[derive(Debug)]
pub struct InitError(TryInitError);

impl fmt::Display for InitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to install tracing subscriber: {}", self.0)
    }
}

impl Error for InitError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&self.0)
    }
}

/// Installs a formatting subscriber filtered by `verbosity`.
///
/// A `RUST_LOG` environment variable, when present and valid, replaces the
/// verbosity-derived directive.
pub fn init_tracing(verbosity: Verbosity) -> Result<(), InitError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(verbosity.directive()));
    init_tracing_with_filter(filter)
}

/// Installs a formatting subscriber behind a caller-supplied filter layer.
pub fn init_tracing_with_filter<F>(filter: F) -> Result<(), InitError>
where
    F: Layer<Registry> + Send + Sync + 'static,
{
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .try_init()
        .map_err(InitError)
}
