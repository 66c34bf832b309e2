//! hostnet - host only network manager for VirtualBox VMs
//!
//! Attaches VMs to shared host only networks, creating a network the first
//! time a subnet is needed and destroying it when its last VM goes away.

mod cli;
mod error;
mod fleet;
mod manifest;
mod network;

use cli::{Cli, Commands, NetworkAction};
use error::Result;
use fleet::Fleet;
use network::{NetworkOptions, VBoxManage};
use tracing_subscriber::EnvFilter;

/// Environment variable overriding the log filter
const LOG_ENV: &str = "HOSTNET_LOG";

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run() -> Result<()> {
    let cli = Cli::parse_args();
    init_logging(cli.verbose);

    match cli.command {
        // Commands that don't require config
        Commands::Completion { shell } => {
            Cli::generate_completion(shell);
        }

        Commands::Network { action } => {
            let config = manifest::load_or_default(&cli.config)?;
            let vbox = VBoxManage::new(&config.config.vboxmanage);
            let fleet = Fleet::new(config, vbox)?;

            match action {
                NetworkAction::List { json } => fleet.list_networks(json)?,
                NetworkAction::Resolve { ip, netmask, name } => {
                    let mut options =
                        NetworkOptions::new(network::types::default_adapter(), ip, netmask);
                    if let Some(name) = name {
                        options = options.with_name(name);
                    }
                    fleet.resolve_network(&options)?;
                }
                NetworkAction::Destroy { name, force } => fleet.destroy_network(&name, force)?,
            }
        }

        // Commands that require config
        command => {
            let config = manifest::load(&cli.config)?;
            let vbox = VBoxManage::new(&config.config.vboxmanage);
            let fleet = Fleet::new(config, vbox)?;

            match command {
                Commands::Up { vm, all, dry_run } => {
                    // Require either VM name or --all
                    if vm.is_none() && !all {
                        eprintln!("Error: specify a VM name or use --all to configure all VMs");
                        std::process::exit(1);
                    }
                    if dry_run {
                        fleet.up_dry_run(vm.as_deref())?;
                    } else {
                        fleet.up(vm.as_deref())?;
                    }
                }
                Commands::Down {
                    vm,
                    all,
                    dry_run,
                    keep_adapters,
                } => {
                    // Require either VM name or --all
                    if vm.is_none() && !all {
                        eprintln!("Error: specify a VM name or use --all to tear down all VMs");
                        std::process::exit(1);
                    }
                    if dry_run {
                        fleet.down_dry_run(vm.as_deref(), !keep_adapters)?;
                    } else {
                        fleet.down(vm.as_deref(), !keep_adapters)?;
                    }
                }
                Commands::Check => {
                    fleet.check()?;
                }
                // Already handled above
                Commands::Completion { .. } | Commands::Network { .. } => unreachable!(),
            }
        }
    }

    Ok(())
}
