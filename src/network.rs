//! Host only network management for VMs
//!
//! Provides:
//! - IPv4 subnet arithmetic (masking, host address derivation)
//! - Resolution of a VM adapter's desired network to a host only interface
//! - Boot time assignment and reference counted teardown of those networks
//! - Optional file locks around the racy read-then-act sequences
//! - A VirtualBox backend speaking `VBoxManage`

pub mod backend;
pub mod lifecycle;
pub mod lock;
pub mod resolver;
pub mod subnet;
pub mod types;
pub mod vbox;

#[cfg(test)]
pub mod memory;

pub use backend::{AdapterStore, Hypervisor, NetworkBackend};
pub use lifecycle::{InterfaceState, NetworkLifecycle};
pub use lock::NetworkLocks;
pub use types::{HostOnlyInterface, NetworkOptions, VmInstance};
pub use vbox::VBoxManage;
