//! Telemetry initialisation for the playground.
//!
//! Structured JSON logs only. Interceptor snapshots and decryption failures
//! arrive as `fieldcrypt` events through the tracing audit sink; they stay
//! visible at `info` whatever the playground's own level is.

use anyhow::Result;
use tracing_subscriber::EnvFilter;

/// Target of the events emitted by the `fieldcrypt` audit sink.
const AUDIT_TARGET: &str = "fieldcrypt";

/// Filter directives used when `RUST_LOG` is unset.
fn default_directives(log_level: &str) -> String {
    format!("{log_level},{AUDIT_TARGET}=info")
}

/// Initialise the tracing subscriber.
///
/// Outputs flattened JSON events to stdout; `RUST_LOG` replaces the default
/// directives entirely.
///
/// # Errors
///
/// Returns an error if `log_level` is not a valid filter directive, or if the
/// subscriber has already been set.
pub fn init(log_level: &str) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_directives(log_level))
            .map_err(|e| anyhow::anyhow!("invalid LOG_LEVEL `{log_level}`: {e}"))?,
    };

    tracing_subscriber::fmt()
        .json()
        .flatten_event(true)
        .with_env_filter(filter)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialise playground tracing subscriber: {e}"))
}
