// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

use crate::context::AppContext;
use crate::helpers::parse_identity;
use crate::helpers::telemetry::setup_tracing;
use crate::{create, decrypt, donate, list, probe, stats};
use alloy::primitives::Address;
use anyhow::Result;
use cbx_config::{load_config, AppConfig, CliOverrides};
use cbx_evm::RecordId;
use clap::{command, ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use tracing::{info, instrument, Level};
use url::Url;

#[derive(Parser, Debug)]
#[command(name = "charitybox")]
#[command(about = "Confidential donations with threshold-verified disclosure", long_about = None)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,

    /// Indicate error levels by adding additional `-v` arguments. Eg. `charitybox -vvv` will give you
    /// trace level output
    #[arg(
        short,
        long,
        action = ArgAction::Count,
        global = true
    )]
    pub verbose: u8,

    /// Silence all output. This argument cannot be used alongside `-v`
    #[arg(
        short,
        long,
        action = ArgAction::SetTrue,
        conflicts_with = "verbose",
        global = true
    )]
    quiet: bool,

    /// Name reported to the telemetry collector
    #[arg(long, global = true)]
    node_name: Option<String>,

    /// Override the RPC endpoint of the chain
    #[arg(long, global = true)]
    rpc_url: Option<String>,

    /// Override the registry contract address
    #[arg(long, global = true)]
    contract: Option<String>,

    /// Identity to act as when no PRIVATE_KEY is set (read-only)
    #[arg(long, global = true, value_parser = parse_identity)]
    address: Option<Address>,

    /// Set the Open Telemetry collector grpc endpoint. Eg. http://localhost:4317
    #[arg(long = "otel", global = true)]
    pub otel: Option<Url>,
}

impl Cli {
    pub fn log_level(&self) -> Level {
        if self.quiet {
            Level::ERROR
        } else {
            match self.verbose {
                0 => Level::WARN,  //
                1 => Level::INFO,  // -v
                2 => Level::DEBUG, // -vv
                _ => Level::TRACE, // -vvv
            }
        }
    }

    #[instrument(skip_all)]
    pub async fn execute(self) -> Result<()> {
        let config = self.load_config()?;
        setup_tracing(&config, self.log_level())?;
        info!("Config loaded from: {:?}", config.config_file());

        let ctx = AppContext::build(&config, self.address).await?;

        match self.command {
            Commands::List { mine } => list::execute(&ctx, mine).await?,
            Commands::Stats => stats::execute(&ctx).await?,
            Commands::Create {
                name,
                target,
                description,
            } => create::execute(&ctx, name, target, description).await?,
            Commands::Donate { project, amount } => {
                donate::execute(&ctx, project, amount).await?
            }
            Commands::Decrypt { id } => decrypt::execute(&ctx, id).await?,
            Commands::Probe => probe::execute(&ctx).await?,
        }

        Ok(())
    }

    pub fn load_config(&self) -> Result<AppConfig> {
        load_config(self.config.as_deref(), self.load_overrides())
    }

    fn load_overrides(&self) -> CliOverrides {
        CliOverrides {
            name: self.node_name.clone(),
            rpc_url: self.rpc_url.clone(),
            contract: self.contract.clone(),
            otel: self.otel.as_ref().map(Url::to_string),
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List every project and donation on the registry
    List {
        /// Only records created by the connected identity
        #[arg(long)]
        mine: bool,
    },

    /// Aggregates over disclosed amounts
    Stats,

    /// Create a project with an initial encrypted contribution
    Create {
        #[arg(long)]
        name: String,

        /// Public funding target
        #[arg(long)]
        target: Option<u64>,

        #[arg(long, default_value = "")]
        description: String,
    },

    /// Donate an encrypted amount to a project
    Donate {
        /// Project id, eg. charity-1718000000000
        #[arg(long, value_parser = |s: &str| Ok::<_, String>(RecordId::from(s)))]
        project: RecordId,

        #[arg(long)]
        amount: u64,
    },

    /// Disclose the amount of a record through threshold decryption
    Decrypt {
        #[arg(value_parser = |s: &str| Ok::<_, String>(RecordId::from(s)))]
        id: RecordId,
    },

    /// Check that the registry contract answers calls
    Probe,
}
