use crate::commands::Command;
use allotter::{Identity, ServiceConfig};
use anyhow::bail;
use clap::Parser;
use core::time::Duration;
use std::path::PathBuf;

/// Runtime configuration for the `allotter` binary.
///
/// Every global setting can come from a flag or from the environment (a `.env`
/// file in the working directory is loaded first). The data directory holds
/// the pool files, the quota ledger, the status book and both rosters.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "allotter",
    version,
    about = "Quota-enforced allocation of record pools"
)]
pub struct CliArgs {
    /// Directory holding every pool, ledger and roster file.
    ///
    /// Environment variable: `ALLOTTER_DATA_DIR`
    #[arg(long, env = "ALLOTTER_DATA_DIR", default_value = ".")]
    pub data_dir: PathBuf,

    /// Number of worker tasks feeding the engine.
    ///
    /// Mutations are serialized by the engine regardless; extra workers only
    /// help overlap queueing with storage I/O.
    ///
    /// Environment variable: `NUM_WORKERS`
    #[arg(long, env = "NUM_WORKERS", default_value_t = 1)]
    pub num_workers: usize,

    /// Requests each worker queues before callers wait.
    ///
    /// Environment variable: `QUEUE_DEPTH`
    #[arg(long, env = "QUEUE_DEPTH", default_value_t = 16)]
    pub queue_depth: usize,

    /// Seconds shutdown waits for in-flight allocations.
    ///
    /// Environment variable: `SHUTDOWN_TIMEOUT`
    #[arg(long, env = "SHUTDOWN_TIMEOUT", default_value_t = 3)]
    pub shutdown_timeout: u64,

    /// Identity performing manager operations.
    ///
    /// Environment variable: `ALLOTTER_ACTOR`
    #[arg(long, env = "ALLOTTER_ACTOR")]
    pub actor: Option<Identity>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub service: ServiceConfig,
    pub actor: Option<Identity>,
    pub command: Command,
}

impl AppConfig {
    /// The acting manager, required by manager-only commands.
    pub fn actor(&self) -> anyhow::Result<Identity> {
        match self.actor {
            Some(actor) => Ok(actor),
            None => bail!("this command needs --actor (or ALLOTTER_ACTOR)"),
        }
    }
}

impl TryFrom<CliArgs> for AppConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.num_workers == 0 {
            bail!("NUM_WORKERS must be greater than 0");
        }

        if args.queue_depth == 0 {
            bail!("QUEUE_DEPTH must be greater than 0");
        }

        if args.data_dir.exists() && !args.data_dir.is_dir() {
            bail!(
                "ALLOTTER_DATA_DIR ({}) is not a directory",
                args.data_dir.display()
            );
        }

        Ok(Self {
            data_dir: args.data_dir,
            service: ServiceConfig {
                num_workers: args.num_workers,
                queue_depth: args.queue_depth,
                shutdown_timeout: Duration::from_secs(args.shutdown_timeout),
            },
            actor: args.actor,
            command: args.command,
        })
    }
}
