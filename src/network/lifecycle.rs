//! Host only network lifecycle for VMs
//!
//! Handles:
//! - Resolving and assigning a host only network to each configured adapter
//! - Enabling host only networking once the adapters are in place
//! - Destroying networks whose last attached VM is going away
//! - Detaching a VM that stays around from its networks
//!
//! Boot is a sequence of independent per-adapter steps. If adapter k fails,
//! adapters before it stay configured; nothing is rolled back.

use crate::error::Result;
use crate::network::backend::{AdapterStore, HostOnlySupport, Hypervisor, NetworkBackend};
use crate::network::lock::{NetworkLock, NetworkLocks};
use crate::network::resolver;
use crate::network::types::{Adapter, NetworkOptions, VmConfig, VmInstance};
use tracing::{debug, info, instrument, warn};

/// Where an interface stands, judging by how many VMs are attached to it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterfaceState {
    /// Nothing attached; already cleaned up by someone else
    Absent,
    /// Only the VM being destroyed is attached
    LastReference,
    /// Other VMs still depend on it
    Shared,
}

impl InterfaceState {
    pub fn from_attached_count(count: usize) -> Self {
        match count {
            0 => InterfaceState::Absent,
            1 => InterfaceState::LastReference,
            _ => InterfaceState::Shared,
        }
    }
}

/// Drives network resolution and cleanup for VMs on one hypervisor
pub struct NetworkLifecycle<'a, H: Hypervisor + ?Sized> {
    hypervisor: &'a H,
    locks: Option<NetworkLocks>,
}

impl<'a, H: Hypervisor + ?Sized> NetworkLifecycle<'a, H> {
    pub fn new(hypervisor: &'a H) -> Self {
        Self {
            hypervisor,
            locks: None,
        }
    }

    /// Serialize resolve/create and count/destroy sequences across processes
    pub fn with_locks(mut self, locks: NetworkLocks) -> Self {
        self.locks = Some(locks);
        self
    }

    /// Assign networks, then enable them
    pub fn on_boot(&self, vm: &VmConfig) -> Result<Vec<Adapter>> {
        let adapters = self.assign_networks(vm)?;
        self.enable_networks(vm)?;
        Ok(adapters)
    }

    /// Attach every configured adapter to its host only network
    ///
    /// Returns the adapters that were configured. No-op when the VM has no
    /// network options.
    #[instrument(skip_all, fields(vm = %vm.name))]
    pub fn assign_networks(&self, vm: &VmConfig) -> Result<Vec<Adapter>> {
        if !vm.network_enabled() {
            debug!("No host only networks configured");
            return Ok(Vec::new());
        }

        info!("Preparing host only network...");

        let mut configured = Vec::new();
        for options in vm.networks() {
            let network = self.network_name(options)?;

            let adapter = Adapter::host_only(options.adapter, network);
            self.hypervisor.set_adapter(&vm.name, &adapter)?;
            debug!(adapter = adapter.index, network = ?adapter.host_interface, "Adapter attached");

            configured.push(adapter);
        }

        Ok(configured)
    }

    /// Enable host only networking for a VM whose adapters are assigned
    #[instrument(skip_all, fields(vm = %vm.name))]
    pub fn enable_networks(&self, vm: &VmConfig) -> Result<()> {
        if !vm.network_enabled() {
            return Ok(());
        }

        info!("Enabling host only network...");
        self.hypervisor.prepare_host_only_network(&vm.name)?;

        for options in vm.networks() {
            self.hypervisor.enable_host_only_network(&vm.name, options)?;
        }

        Ok(())
    }

    /// Destroy host only networks that only this VM was still using
    ///
    /// Returns the names of the destroyed interfaces. The VM's adapters are
    /// left as they are, for a caller that deletes the VM right after.
    #[instrument(skip_all, fields(vm = %vm.name))]
    pub fn on_destroy(&self, vm: &VmInstance) -> Result<Vec<String>> {
        self.release_networks(vm, false)
    }

    /// Like `on_destroy`, then detach the VM's adapters from each network
    ///
    /// For VMs that keep existing, so the next VM to release a shared network
    /// sees the count drop. The detach happens under the same interface lock
    /// as the count.
    #[instrument(skip_all, fields(vm = %vm.name))]
    pub fn on_release(&self, vm: &VmInstance) -> Result<Vec<String>> {
        self.release_networks(vm, true)
    }

    fn release_networks(&self, vm: &VmInstance, detach: bool) -> Result<Vec<String>> {
        let mut destroyed = Vec::new();

        for name in vm.host_only_interfaces() {
            let _lock = self.lock_interface(name)?;

            let count = self.hypervisor.attached_vm_count(name)?;
            match InterfaceState::from_attached_count(count) {
                InterfaceState::LastReference => {
                    info!(network = name, "Destroying unused network interface...");
                    self.hypervisor.destroy_interface(name)?;
                    destroyed.push(name.to_string());
                }
                InterfaceState::Shared => {
                    debug!(network = name, attached = count, "Network still in use, keeping it");
                }
                InterfaceState::Absent => {
                    warn!(network = name, "Network has no attached VMs, assuming already removed");
                }
            }

            if detach {
                for adapter in vm.adapters.iter().filter(|a| a.host_only_interface() == Some(name)) {
                    self.hypervisor
                        .set_adapter(&vm.name, &Adapter::detached(adapter.index))?;
                    debug!(adapter = adapter.index, network = name, "Adapter detached");
                }
            }
        }

        Ok(destroyed)
    }

    /// Enumerate and resolve under the subnet lock, if locking is on
    fn network_name(&self, options: &NetworkOptions) -> Result<String> {
        // Named networks are never created, so there is nothing to race on
        let _lock = match (&self.locks, &options.name) {
            (Some(locks), None) => Some(locks.lock_subnet(options)?),
            _ => None,
        };

        let interfaces = self.hypervisor.list_host_only_interfaces()?;
        resolver::resolve(options, &interfaces, self.hypervisor)
    }

    fn lock_interface(&self, name: &str) -> Result<Option<NetworkLock>> {
        self.locks
            .as_ref()
            .map(|locks| locks.lock_interface(name))
            .transpose()
    }
}
