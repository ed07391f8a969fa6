//! Log output for the `ferroseq` binary.
//!
//! Events go to stderr so that allocated ids on stdout can be piped. The
//! level is taken from `RUST_LOG` and defaults to `info`; library spans
//! around refills show up at `debug`:
//!
//! ```bash
//! RUST_LOG=ferroseq=debug ferroseq next --tenant 1 --key order --count 100
//! ```

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

pub fn init_telemetry() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_thread_ids(true)
                .with_target(false),
        )
        .try_init()?;
    Ok(())
}
