#![doc = include_str!("../README.md")]

mod cli;

use clap::Parser;
use cli::config::{CliArgs, Settings};
use cli::telemetry::init_telemetry;

// mimalloc holds up better than the system allocator when `next --threads`
// fans out across many threads, especially on musl.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let settings = Settings::try_from(args)?;

    init_telemetry()?;

    if cfg!(debug_assertions) {
        tracing::debug!("Running with settings: {:#?}", settings);
    }

    let stdout = std::io::stdout();
    cli::commands::run(settings, &mut stdout.lock())
}
