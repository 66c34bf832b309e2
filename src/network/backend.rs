//! Hypervisor collaborator traits
//!
//! The resolver and lifecycle only talk to the hypervisor through these
//! traits. Every call is assumed to be individually atomic; sequences of
//! calls are not (see `network::lock`).

use crate::error::Result;
use crate::network::types::{Adapter, HostOnlyInterface, NetworkOptions};

/// Host side network interface management
pub trait NetworkBackend {
    /// Enumerate interfaces in the hypervisor's own order
    ///
    /// Implementations may report non host only interfaces; callers filter
    /// on `interface_type`.
    fn list_host_only_interfaces(&self) -> Result<Vec<HostOnlyInterface>>;

    /// Create a host only interface with a static address
    ///
    /// The interface name is chosen by the hypervisor.
    fn create_host_only_interface(
        &self,
        static_address: &str,
        netmask: &str,
    ) -> Result<HostOnlyInterface>;

    /// Destroy an interface by name
    fn destroy_interface(&self, name: &str) -> Result<()>;

    /// Number of VMs currently attached to an interface
    fn attached_vm_count(&self, name: &str) -> Result<usize>;
}

/// VM adapter persistence
pub trait AdapterStore {
    /// Apply and save one adapter's settings on a VM
    fn set_adapter(&self, vm: &str, adapter: &Adapter) -> Result<()>;

    /// Read back a VM's adapters
    fn adapters(&self, vm: &str) -> Result<Vec<Adapter>>;
}

/// VM level host only networking support
pub trait HostOnlySupport {
    /// Make the VM ready for host only networking (once per boot)
    fn prepare_host_only_network(&self, vm: &str) -> Result<()>;

    /// Enable one configured host only network inside the VM
    fn enable_host_only_network(&self, vm: &str, options: &NetworkOptions) -> Result<()>;
}

/// Everything the lifecycle needs from a hypervisor
pub trait Hypervisor: NetworkBackend + AdapterStore + HostOnlySupport {}

impl<T: NetworkBackend + AdapterStore + HostOnlySupport + ?Sized> Hypervisor for T {}
