use clap::{Parser, Subcommand};

pub mod admin;
pub mod check;
pub mod config;
pub mod context;
pub mod init;
pub mod version;

use context::Context;

#[derive(Parser)]
#[command(name = "originbind")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Operator CLI for per-player IP binding", long_about = None)]
pub struct Cli {
    /// Path to config file (default: <data-dir>/config.toml)
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// Directory holding state files (overrides the config file)
    #[arg(long, global = true)]
    pub data_dir: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a default configuration file
    Init {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },

    /// Run a login attempt through the gate
    Check {
        /// Player UUID
        #[arg(long)]
        identity: String,

        /// IP address the attempt comes from
        #[arg(long)]
        origin: String,

        /// Player display name
        #[arg(long, default_value = "unknown")]
        name: String,

        /// Also resolve and print the origin's country
        #[arg(long)]
        country: bool,
    },

    /// Approve an additional IP for a player
    Add {
        /// Player UUID
        identity: String,
        /// IP address to approve
        ip: String,
    },

    /// Revoke one of a player's IPs (never the last one)
    Remove {
        /// Player UUID
        identity: String,
        /// IP address to revoke
        ip: String,
    },

    /// Remove every IP of a player; the next login registers afresh
    Reset {
        /// Player UUID
        identity: String,
    },

    /// Show a player's registered IPs
    Info {
        /// Player UUID
        identity: String,
    },

    /// List every registered player
    List,

    /// Show recent failed login attempts
    Failed {
        /// Only show attempts for this player UUID
        #[arg(long)]
        identity: Option<String>,

        /// Maximum number of attempts to show
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },

    /// Show (or clear) a player's recent login attempts
    History {
        /// Player UUID
        identity: String,

        /// Clear the history instead of showing it
        #[arg(long)]
        clear: bool,
    },

    /// Display version information
    Version,
}

pub async fn execute(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let Cli {
        config,
        data_dir,
        command,
    } = cli;
    let load = || Context::load(config.clone(), data_dir.clone());

    let output = match command {
        Commands::Version => version::execute(),
        Commands::Init { force } => init::execute(config.clone(), data_dir.clone(), force)?,
        Commands::Check {
            identity,
            origin,
            name,
            country,
        } => check::execute(&load()?, &identity, &origin, &name, country).await?,
        Commands::Add { identity, ip } => admin::add(&load()?, &identity, &ip)?,
        Commands::Remove { identity, ip } => admin::remove(&load()?, &identity, &ip)?,
        Commands::Reset { identity } => admin::reset(&load()?, &identity)?,
        Commands::Info { identity } => admin::info(&load()?, &identity)?,
        Commands::List => admin::list(&load()?),
        Commands::Failed { identity, limit } => {
            admin::failed(&load()?, identity.as_deref(), limit)?
        }
        Commands::History { identity, clear } => admin::history(&load()?, &identity, clear)?,
    };

    println!("{}", output);
    Ok(())
}
