//! `playground`: demonstration binary for the `fieldcrypt` interceptor.
//!
//! Startup sequence:
//! 1. Handle `--generate-key`: print a fresh key secret and exit.
//! 2. Load and validate [`config::Config`] from environment variables.
//! 3. Initialise structured JSON logging.
//! 4. Run the create / read / update / read scenario against an in-memory store.
//!
//! Keys come from `FIELD_ENCRYPTION_KEY` and `FIELD_DECRYPTION_KEYS`.

mod config;
mod demo;
mod store;
mod telemetry;

use anyhow::Result;
use fieldcrypt::crypto::Algorithm;
use fieldcrypt::Key;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // -----------------------------------------------------------------------
    // 1. Key generation
    // -----------------------------------------------------------------------
    if std::env::args().skip(1).any(|arg| arg == "--generate-key") {
        println!("{}", Key::generate(Algorithm::default()).to_secret());
        return Ok(());
    }

    // -----------------------------------------------------------------------
    // 2. Configuration
    // -----------------------------------------------------------------------
    let cfg = config::Config::from_env().map_err(|e| {
        // Telemetry is not yet up; write to stderr directly.
        eprintln!("ERROR: playground configuration invalid: {e}");
        e
    })?;

    // -----------------------------------------------------------------------
    // 3. Telemetry
    // -----------------------------------------------------------------------
    telemetry::init(&cfg.log_level)?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        fields = %cfg.encrypted_fields,
        "playground starting"
    );

    // -----------------------------------------------------------------------
    // 4. Scenario
    // -----------------------------------------------------------------------
    demo::run(&cfg).await
}
