//! Command-line interface for hostnet
//!
//! Uses clap with derive for type-safe CLI parsing

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

/// hostnet - host only network manager for VirtualBox VMs
#[derive(Parser)]
#[command(name = "hostnet")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "hostnet.toml")]
    pub config: PathBuf,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand)]
pub enum Commands {
    /// Attach VMs to their host only networks, creating networks as needed
    Up {
        /// Specific VM to configure
        vm: Option<String>,

        /// Configure all VMs (required if no VM specified)
        #[arg(long, conflicts_with = "vm")]
        all: bool,

        /// Show what would be done without making changes
        #[arg(long)]
        dry_run: bool,
    },

    /// Release host only networks no other VM is using
    Down {
        /// Specific VM being torn down
        vm: Option<String>,

        /// Tear down all VMs (required if no VM specified)
        #[arg(long, conflicts_with = "vm")]
        all: bool,

        /// Show what would be done without making changes
        #[arg(long)]
        dry_run: bool,

        /// Leave adapters attached, for a VM that is deleted right after
        #[arg(long)]
        keep_adapters: bool,
    },

    /// Validate configuration
    Check,

    /// Host only network management
    Network {
        #[command(subcommand)]
        action: NetworkAction,
    },

    /// Generate shell completion scripts
    Completion {
        /// Shell to generate completion for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Actions for the network command
#[derive(Subcommand)]
pub enum NetworkAction {
    /// List host only networks
    List {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Show which network an address would attach to (never creates)
    Resolve {
        /// VM address on the network
        #[arg(short, long)]
        ip: String,

        /// Netmask of the network
        #[arg(short, long, default_value = "255.255.255.0")]
        netmask: String,

        /// Explicit network name
        #[arg(long)]
        name: Option<String>,
    },

    /// Destroy a host only network
    Destroy {
        /// Network name
        name: String,

        /// Force destruction even if VMs are attached
        #[arg(short, long)]
        force: bool,
    },
}

impl Cli {
    /// Parse CLI arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Generate shell completion scripts
    pub fn generate_completion(shell: Shell) {
        let mut cmd = Self::command();
        clap_complete::generate(shell, &mut cmd, "hostnet", &mut std::io::stdout());
    }
}
