//! Fleet of VMs sharing host only networks
//!
//! Handles:
//! - Selecting VMs from configuration
//! - Attaching VMs to their networks on `up`, releasing them on `down`
//! - Dry runs that only enumerate
//! - Ad-hoc network listing, resolution and removal

use crate::error::{Error, Result};
use crate::manifest::{HostnetConfig, VmDef};
use crate::network::{resolver, subnet};
use crate::network::{AdapterStore, Hypervisor, NetworkBackend};
use crate::network::{
    HostOnlyInterface, InterfaceState, NetworkLifecycle, NetworkLocks, NetworkOptions, VmInstance,
};
use serde::Serialize;
use std::collections::HashMap;
use tracing::info;

/// Manages the configured VMs on one hypervisor
pub struct Fleet<H: Hypervisor> {
    /// Loaded configuration
    config: HostnetConfig,

    /// Hypervisor backend
    hypervisor: H,

    /// Network locks, when a lock directory is configured
    locks: Option<NetworkLocks>,
}

/// One row of `network list`
#[derive(Debug, Serialize)]
pub struct NetworkRow {
    pub name: String,
    pub ip_address: String,
    pub network_mask: String,
    pub cidr: Option<String>,
    pub attached_vms: usize,
}

/// One network decision of a planned `down`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseStep {
    pub vm: String,
    pub network: String,
    pub state: InterfaceState,
    pub attached: usize,
}

impl<H: Hypervisor> Fleet<H> {
    /// Create a fleet from configuration
    pub fn new(config: HostnetConfig, hypervisor: H) -> Result<Self> {
        let locks = config
            .config
            .lock_dir
            .as_ref()
            .map(|dir| NetworkLocks::new(dir))
            .transpose()?;

        Ok(Self {
            config,
            hypervisor,
            locks,
        })
    }

    fn lifecycle(&self) -> NetworkLifecycle<'_, H> {
        let lifecycle = NetworkLifecycle::new(&self.hypervisor);
        match &self.locks {
            Some(locks) => lifecycle.with_locks(locks.clone()),
            None => lifecycle,
        }
    }

    /// One named VM, or every configured VM
    pub fn selected(&self, vm: Option<&str>) -> Result<Vec<&VmDef>> {
        match vm {
            Some(name) => self
                .config
                .get_vm(name)
                .map(|def| vec![def])
                .ok_or_else(|| Error::VmNotFound(name.to_string())),
            None => Ok(self.config.vms.iter().collect()),
        }
    }

    /// Attach VMs to their host only networks
    pub fn up(&self, vm: Option<&str>) -> Result<()> {
        let lifecycle = self.lifecycle();

        for def in self.selected(vm)? {
            let adapters = lifecycle.on_boot(&def.vm_config())?;

            if adapters.is_empty() {
                println!("VM '{}': no host only networks configured", def.name);
            }
            for adapter in adapters {
                println!(
                    "VM '{}': adapter {} -> {}",
                    def.name,
                    adapter.index,
                    adapter.host_interface.as_deref().unwrap_or("-")
                );
            }
        }

        Ok(())
    }

    /// Show what `up` would do
    ///
    /// Networks that would be created are remembered so later adapters on the
    /// same subnet report reuse, like the real run would.
    pub fn up_dry_run(&self, vm: Option<&str>) -> Result<()> {
        let mut interfaces = self.hypervisor.list_host_only_interfaces()?;

        for def in self.selected(vm)? {
            for options in def.vm_config().networks() {
                match resolver::find_network(options, &interfaces)? {
                    Some(name) => println!(
                        "[dry-run] VM '{}': adapter {} -> {}",
                        def.name, options.adapter, name
                    ),
                    None => {
                        let address =
                            subnet::derive_network_host_address(&options.ip, &options.netmask)?;
                        println!(
                            "[dry-run] VM '{}': adapter {} -> new network at {} netmask {}",
                            def.name, options.adapter, address, options.netmask
                        );
                        interfaces.push(HostOnlyInterface::host_only(
                            "(new)",
                            address,
                            options.netmask.clone(),
                        ));
                    }
                }
            }
        }

        Ok(())
    }

    /// Release VMs from their host only networks
    ///
    /// A network is destroyed once the last VM using it is taken down. With
    /// `detach` off the adapters stay attached and the caller is expected to
    /// delete the VM.
    pub fn down(&self, vm: Option<&str>, detach: bool) -> Result<()> {
        let lifecycle = self.lifecycle();

        for def in self.selected(vm)? {
            let instance = self.instance(&def.name)?;
            let destroyed = if detach {
                lifecycle.on_release(&instance)?
            } else {
                lifecycle.on_destroy(&instance)?
            };

            for name in instance.host_only_interfaces() {
                if destroyed.iter().any(|d| d == name) {
                    println!("VM '{}': destroyed network {}", def.name, name);
                } else {
                    println!("VM '{}': kept network {}", def.name, name);
                }
            }
        }

        Ok(())
    }

    /// What `down` would decide for each network, without touching anything
    ///
    /// With `detach`, VMs earlier in the run count as already detached, like
    /// the real run.
    pub fn down_plan(&self, vm: Option<&str>, detach: bool) -> Result<Vec<ReleaseStep>> {
        let mut released: HashMap<String, usize> = HashMap::new();
        let mut plan = Vec::new();

        for def in self.selected(vm)? {
            let instance = self.instance(&def.name)?;

            for name in instance.host_only_interfaces() {
                let seen = released.entry(name.to_string()).or_default();
                let attached = self.hypervisor.attached_vm_count(name)?.saturating_sub(*seen);
                if detach {
                    *seen += 1;
                }

                plan.push(ReleaseStep {
                    vm: def.name.clone(),
                    network: name.to_string(),
                    state: InterfaceState::from_attached_count(attached),
                    attached,
                });
            }
        }

        Ok(plan)
    }

    /// Show what `down` would do
    pub fn down_dry_run(&self, vm: Option<&str>, detach: bool) -> Result<()> {
        for step in self.down_plan(vm, detach)? {
            let action = match step.state {
                InterfaceState::LastReference => "destroy",
                InterfaceState::Shared => "keep (shared)",
                InterfaceState::Absent => "skip (already gone)",
            };
            println!(
                "[dry-run] VM '{}': {} {} ({} attached)",
                step.vm, action, step.network, step.attached
            );
        }

        Ok(())
    }

    fn instance(&self, vm: &str) -> Result<VmInstance> {
        Ok(VmInstance {
            name: vm.to_string(),
            adapters: self.hypervisor.adapters(vm)?,
        })
    }

    /// Validate configuration and print a summary
    pub fn check(&self) -> Result<()> {
        self.config.validate()?;

        for def in &self.config.vms {
            let config = def.vm_config();
            let networks: Vec<String> = config
                .networks()
                .map(|n| match &n.name {
                    Some(name) => format!("{}={}", n.adapter, name),
                    None => format!("{}={}/{}", n.adapter, n.ip, n.netmask),
                })
                .collect();
            if networks.is_empty() {
                println!("  {}: -", def.name);
            } else {
                println!("  {}: {}", def.name, networks.join(", "));
            }
        }
        println!("Configuration valid.");

        Ok(())
    }

    /// Host only networks with their attached VM counts
    pub fn networks(&self) -> Result<Vec<NetworkRow>> {
        self.hypervisor
            .list_host_only_interfaces()?
            .into_iter()
            .filter(HostOnlyInterface::is_host_only)
            .map(|iface| -> Result<NetworkRow> {
                let cidr = iface.cidr().ok().flatten().map(|net| net.to_string());
                Ok(NetworkRow {
                    attached_vms: self.hypervisor.attached_vm_count(&iface.name)?,
                    name: iface.name,
                    ip_address: iface.ip_address,
                    network_mask: iface.network_mask,
                    cidr,
                })
            })
            .collect()
    }

    /// Print host only networks
    pub fn list_networks(&self, json: bool) -> Result<()> {
        let rows = self.networks()?;

        if json {
            println!("{}", serde_json::to_string_pretty(&rows)?);
        } else if rows.is_empty() {
            println!("No host only networks found.");
        } else {
            println!("{:<16} {:<20} {:<16} {}", "NAME", "SUBNET", "ADDRESS", "VMS");
            for row in rows {
                println!(
                    "{:<16} {:<20} {:<16} {}",
                    row.name,
                    row.cidr.as_deref().unwrap_or(&row.network_mask),
                    row.ip_address,
                    row.attached_vms
                );
            }
        }

        Ok(())
    }

    /// Report the network `options` would resolve to, without creating it
    pub fn resolve_network(&self, options: &NetworkOptions) -> Result<()> {
        let interfaces = self.hypervisor.list_host_only_interfaces()?;

        match resolver::find_network(options, &interfaces)? {
            Some(name) => println!("{}", name),
            None => {
                let address = subnet::derive_network_host_address(&options.ip, &options.netmask)?;
                println!(
                    "No matching network; a new one would be created at {} netmask {}",
                    address, options.netmask
                );
            }
        }

        Ok(())
    }

    /// Destroy a host only network by name
    ///
    /// Refuses while VMs are attached unless `force` is set.
    pub fn destroy_network(&self, name: &str, force: bool) -> Result<()> {
        let _lock = self
            .locks
            .as_ref()
            .map(|locks| locks.lock_interface(name))
            .transpose()?;

        let exists = self
            .hypervisor
            .list_host_only_interfaces()?
            .iter()
            .any(|iface| iface.is_host_only() && iface.name == name);
        if !exists {
            return Err(Error::NetworkNotFound {
                name: name.to_string(),
            });
        }

        let attached = self.hypervisor.attached_vm_count(name)?;
        if attached > 0 && !force {
            return Err(Error::NetworkInUse {
                name: name.to_string(),
                attached,
            });
        }

        info!(network = name, attached, "Destroying host only network");
        self.hypervisor.destroy_interface(name)?;
        println!("Destroyed network '{}'", name);

        Ok(())
    }
}
