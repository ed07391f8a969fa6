use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use ferroseq::{AllocatorConfig, DEFAULT_TABLE, SequenceId, TenantId};

/// Command line for the `ferroseq` binary.
///
/// Global options may also be supplied through environment variables (or a
/// `.env` file in the working directory).
#[derive(Parser, Debug, Clone)]
#[command(
    name = "ferroseq",
    version,
    about = "Provision and draw per-tenant id sequences from a SQLite counter table"
)]
pub struct CliArgs {
    /// Path to the SQLite database holding the counter table.
    ///
    /// Environment variable: `FERROSEQ_DB`
    #[arg(long, env = "FERROSEQ_DB", default_value = "ferroseq.db", global = true)]
    pub db: PathBuf,

    /// JSON file with the allocator configuration (keys, capacities, retry
    /// policy and lock scope). Required by `next`.
    ///
    /// Environment variable: `FERROSEQ_CONFIG`
    #[arg(long, env = "FERROSEQ_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Name of the counter table.
    ///
    /// Environment variable: `FERROSEQ_TABLE`
    #[arg(long, env = "FERROSEQ_TABLE", default_value_t = String::from(DEFAULT_TABLE), global = true)]
    pub table: String,

    /// How long a refill waits for the per-sequence lock before the attempt
    /// counts as failed.
    ///
    /// Environment variable: `FERROSEQ_LOCK_TIMEOUT_MS`
    #[arg(long, env = "FERROSEQ_LOCK_TIMEOUT_MS", default_value_t = 5_000, global = true)]
    pub lock_timeout_ms: u64,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Create the counter table if it does not exist.
    Init,
    /// Insert the counter row for one tenant and sequence.
    Provision {
        #[arg(long)]
        tenant: TenantId,
        #[arg(long)]
        sequence: SequenceId,
        /// First id the sequence will hand out.
        #[arg(long, default_value_t = 1)]
        start: i64,
    },
    /// Allocate ids and print them, one per line.
    Next {
        #[arg(long)]
        tenant: TenantId,
        #[arg(long)]
        key: String,
        /// Number of ids to allocate.
        #[arg(long, default_value_t = 1)]
        count: usize,
        /// Number of threads sharing the allocation.
        #[arg(long, default_value_t = 1)]
        threads: usize,
    },
}

/// Validated settings derived from [`CliArgs`].
#[derive(Debug, Clone)]
pub struct Settings {
    pub db: PathBuf,
    pub table: String,
    pub lock_timeout: Duration,
    pub action: Action,
}

#[derive(Debug, Clone)]
pub enum Action {
    Init,
    Provision {
        tenant: TenantId,
        sequence: SequenceId,
        start: i64,
    },
    Next {
        tenant: TenantId,
        key: String,
        count: usize,
        threads: usize,
        allocator: AllocatorConfig,
    },
}

impl TryFrom<CliArgs> for Settings {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.lock_timeout_ms == 0 {
            bail!("FERROSEQ_LOCK_TIMEOUT_MS must be greater than 0");
        }

        let action = match args.command {
            Command::Init => Action::Init,
            Command::Provision {
                tenant,
                sequence,
                start,
            } => Action::Provision {
                tenant,
                sequence,
                start,
            },
            Command::Next {
                tenant,
                key,
                count,
                threads,
            } => {
                if count == 0 {
                    bail!("--count must be greater than 0");
                }
                if threads == 0 {
                    bail!("--threads must be greater than 0");
                }
                if threads > count {
                    bail!("--threads ({threads}) must not exceed --count ({count})");
                }

                let Some(path) = args.config.as_deref() else {
                    bail!("`next` requires an allocator configuration (--config or FERROSEQ_CONFIG)");
                };
                let allocator = load_allocator_config(path)?;
                if allocator.sequence_for(&key).is_none() {
                    bail!("key `{key}` is not defined in {}", path.display());
                }

                Action::Next {
                    tenant,
                    key,
                    count,
                    threads,
                    allocator,
                }
            }
        };

        Ok(Self {
            db: args.db,
            table: args.table,
            lock_timeout: Duration::from_millis(args.lock_timeout_ms),
            action,
        })
    }
}

/// Reads and validates an [`AllocatorConfig`] from a JSON file.
pub fn load_allocator_config(path: &Path) -> anyhow::Result<AllocatorConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read allocator config {}", path.display()))?;
    let config: AllocatorConfig = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse allocator config {}", path.display()))?;
    config
        .validate()
        .with_context(|| format!("invalid allocator config {}", path.display()))?;
    Ok(config)
}
