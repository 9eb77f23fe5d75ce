//! Tracing initialization for embedders.
//!
//! The engine emits structured events through `tracing`; whoever hosts it
//! decides where they go. This helper wires up a sensible fmt subscriber
//! driven by `RUST_LOG`, mirroring what a service binary would do at
//! startup.

use std::env;

use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Install the default fmt subscriber. Fails if a global subscriber is
/// already set.
pub fn try_init() -> anyhow::Result<()> {
    FmtSubscriber::builder()
        .with_max_level(
            env::var("RUST_LOG")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(Level::INFO),
        )
        .with_target(true)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to set tracing subscriber: {e}"))
}

/// Install the default subscriber, ignoring an already-installed one.
/// Convenient in tests where several suites race to initialize.
pub fn init() {
    let _ = try_init();
}
