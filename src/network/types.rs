//! Host only network data model

use crate::error::Result;
use crate::network::subnet;
use ipnet::Ipv4Net;
use serde::Deserialize;
use std::fmt;
use std::net::Ipv4Addr;

/// Kind of a hypervisor network interface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterfaceType {
    HostOnly,
    Other,
}

/// A network interface as reported by the hypervisor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostOnlyInterface {
    /// Interface name (e.g., "vboxnet0"), unique per host
    pub name: String,
    /// Host-side IPv4 address
    pub ip_address: String,
    /// IPv4 netmask
    pub network_mask: String,
    /// Interface kind; only host only interfaces are match candidates
    pub interface_type: InterfaceType,
}

impl HostOnlyInterface {
    pub fn host_only(
        name: impl Into<String>,
        ip_address: impl Into<String>,
        network_mask: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            ip_address: ip_address.into(),
            network_mask: network_mask.into(),
            interface_type: InterfaceType::HostOnly,
        }
    }

    pub fn is_host_only(&self) -> bool {
        self.interface_type == InterfaceType::HostOnly
    }

    /// The interface's subnet in CIDR notation
    ///
    /// Returns `None` when the mask is not contiguous and has no prefix form.
    pub fn cidr(&self) -> Result<Option<Ipv4Net>> {
        let address = Ipv4Addr::from(subnet::split_ip(&self.ip_address)?);
        let mask = Ipv4Addr::from(subnet::split_ip(&self.network_mask)?);
        Ok(Ipv4Net::with_netmask(address, mask).ok().map(|net| net.trunc()))
    }
}

/// Desired host only network for one VM adapter
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NetworkOptions {
    /// Zero-based adapter slot on the VM
    #[serde(default = "default_adapter")]
    pub adapter: usize,

    /// Address the VM will use on this network
    pub ip: String,

    /// Netmask of the network
    #[serde(default = "default_netmask")]
    pub netmask: String,

    /// Explicit host only network to attach to, bypassing subnet matching
    pub name: Option<String>,
}

pub fn default_adapter() -> usize {
    1
}

pub fn default_netmask() -> String {
    "255.255.255.0".into()
}

impl NetworkOptions {
    pub fn new(adapter: usize, ip: impl Into<String>, netmask: impl Into<String>) -> Self {
        Self {
            adapter,
            ip: ip.into(),
            netmask: netmask.into(),
            name: None,
        }
    }

    /// Pin this adapter to a named network
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// How a VM adapter is attached
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentType {
    None,
    Nat,
    Bridged,
    Internal,
    HostOnly,
    Other,
}

impl fmt::Display for AttachmentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttachmentType::None => write!(f, "none"),
            AttachmentType::Nat => write!(f, "nat"),
            AttachmentType::Bridged => write!(f, "bridged"),
            AttachmentType::Internal => write!(f, "intnet"),
            AttachmentType::HostOnly => write!(f, "hostonly"),
            AttachmentType::Other => write!(f, "other"),
        }
    }
}

/// A VM network adapter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Adapter {
    /// Zero-based adapter slot
    pub index: usize,
    pub enabled: bool,
    pub attachment_type: AttachmentType,
    /// Host only interface the adapter is attached to
    pub host_interface: Option<String>,
}

impl Adapter {
    /// An enabled adapter attached to the given host only network
    pub fn host_only(index: usize, host_interface: impl Into<String>) -> Self {
        Self {
            index,
            enabled: true,
            attachment_type: AttachmentType::HostOnly,
            host_interface: Some(host_interface.into()),
        }
    }

    /// A disabled adapter with nothing attached
    pub fn detached(index: usize) -> Self {
        Self {
            index,
            enabled: false,
            attachment_type: AttachmentType::None,
            host_interface: None,
        }
    }

    /// The host only interface this adapter holds a reference to, if any
    pub fn host_only_interface(&self) -> Option<&str> {
        if self.attachment_type == AttachmentType::HostOnly {
            self.host_interface.as_deref()
        } else {
            None
        }
    }
}

/// Network configuration of a VM about to boot
#[derive(Debug, Clone, Default)]
pub struct VmConfig {
    /// VM name as known to the hypervisor
    pub name: String,
    /// Desired networks indexed by adapter slot; `None` slots are left alone
    pub network_options: Vec<Option<NetworkOptions>>,
}

impl VmConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            network_options: Vec::new(),
        }
    }

    /// Place options at their adapter slot, growing the list as needed
    pub fn network(mut self, options: NetworkOptions) -> Self {
        let slot = options.adapter;
        if self.network_options.len() <= slot {
            self.network_options.resize(slot + 1, None);
        }
        self.network_options[slot] = Some(options);
        self
    }

    /// Configured options, skipping empty slots
    pub fn networks(&self) -> impl Iterator<Item = &NetworkOptions> {
        self.network_options.iter().flatten()
    }

    /// Whether any host only network is configured
    pub fn network_enabled(&self) -> bool {
        self.networks().next().is_some()
    }
}

/// A VM and its current adapters, as read back from the hypervisor
#[derive(Debug, Clone)]
pub struct VmInstance {
    pub name: String,
    pub adapters: Vec<Adapter>,
}

impl VmInstance {
    /// Distinct host only interfaces referenced by this VM, in adapter order
    pub fn host_only_interfaces(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for name in self.adapters.iter().filter_map(Adapter::host_only_interface) {
            if !names.contains(&name) {
                names.push(name);
            }
        }
        names
    }
}
