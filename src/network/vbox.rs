//! VirtualBox backend driven through `VBoxManage`
//!
//! Provides:
//! - Interface enumeration (host only and bridged), creation and removal
//! - Attached VM counting via `showvminfo --machinereadable`
//! - NIC configuration with `modifyvm`
//! - Guest properties announcing the host only networks to the guest
//!
//! VBoxManage numbers NICs from 1; adapter slots here are zero-based, so
//! slot 1 is `--nic2`.

use crate::error::{Error, Result};
use crate::network::backend::{AdapterStore, HostOnlySupport, NetworkBackend};
use crate::network::types::{Adapter, AttachmentType, HostOnlyInterface, InterfaceType, NetworkOptions};
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Command;
use tracing::debug;

/// Maximum number of NICs per VM
pub const MAX_ADAPTERS: usize = 8;

/// Guest property namespace read by the in-guest network agent
const GUEST_PROPERTY_ROOT: &str = "/hostnet";

/// `VBoxManage` command wrapper
#[derive(Debug, Clone)]
pub struct VBoxManage {
    program: PathBuf,
}

impl VBoxManage {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Run a VBoxManage subcommand and return its stdout
    fn run(&self, args: &[&str]) -> Result<String> {
        let operation = args.iter().take(2).copied().collect::<Vec<_>>().join(" ");
        debug!(command = %self.program.display(), args = ?args, "Running VBoxManage");

        let output = Command::new(&self.program)
            .args(args)
            .output()
            .map_err(|e| {
                Error::backend(
                    operation.clone(),
                    format!("Failed to run {}: {}", self.program.display(), e),
                )
            })?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        } else {
            Err(Error::backend(
                operation,
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ))
        }
    }

    /// Machine readable info for one VM
    fn vm_info(&self, vm: &str) -> Result<HashMap<String, String>> {
        let output = self.run(&["showvminfo", vm, "--machinereadable"])?;
        Ok(parse_machine_readable(&output))
    }

    fn set_guest_property(&self, vm: &str, key: &str, value: &str) -> Result<()> {
        let key = format!("{}/{}", GUEST_PROPERTY_ROOT, key);
        self.run(&["guestproperty", "set", vm, &key, value])?;
        Ok(())
    }
}

impl NetworkBackend for VBoxManage {
    /// Host only interfaces first, then bridged ones as `Other`
    fn list_host_only_interfaces(&self) -> Result<Vec<HostOnlyInterface>> {
        let mut interfaces = parse_interfaces(
            &self.run(&["list", "hostonlyifs"])?,
            InterfaceType::HostOnly,
        );
        interfaces.extend(parse_interfaces(
            &self.run(&["list", "bridgedifs"])?,
            InterfaceType::Other,
        ));
        Ok(interfaces)
    }

    fn create_host_only_interface(
        &self,
        static_address: &str,
        netmask: &str,
    ) -> Result<HostOnlyInterface> {
        let output = self.run(&["hostonlyif", "create"])?;
        let name = parse_created_name(&output).ok_or_else(|| {
            Error::backend(
                "hostonlyif create",
                format!("No interface name in output: {}", output.trim()),
            )
        })?;

        self.run(&[
            "hostonlyif",
            "ipconfig",
            &name,
            "--ip",
            static_address,
            "--netmask",
            netmask,
        ])?;

        Ok(HostOnlyInterface::host_only(name, static_address, netmask))
    }

    fn destroy_interface(&self, name: &str) -> Result<()> {
        self.run(&["hostonlyif", "remove", name])?;
        Ok(())
    }

    fn attached_vm_count(&self, name: &str) -> Result<usize> {
        let output = self.run(&["list", "vms"])?;

        let mut count = 0;
        for (vm, uuid) in parse_vm_list(&output) {
            let adapters = adapters_from_info(&self.vm_info(&uuid)?);
            if adapters.iter().any(|a| a.host_only_interface() == Some(name)) {
                debug!(network = name, vm = %vm, "VM attached to host only network");
                count += 1;
            }
        }

        Ok(count)
    }
}

impl AdapterStore for VBoxManage {
    fn set_adapter(&self, vm: &str, adapter: &Adapter) -> Result<()> {
        let nic = adapter.index + 1;
        if nic > MAX_ADAPTERS {
            return Err(Error::backend(
                "modifyvm",
                format!("Adapter slot {} out of range (0-{})", adapter.index, MAX_ADAPTERS - 1),
            ));
        }

        let kind = if adapter.enabled {
            adapter.attachment_type
        } else {
            AttachmentType::None
        };
        if kind == AttachmentType::Other {
            return Err(Error::backend(
                "modifyvm",
                format!("Unsupported attachment type for adapter {}", adapter.index),
            ));
        }

        let mut args = vec![
            "modifyvm".to_string(),
            vm.to_string(),
            format!("--nic{}", nic),
            kind.to_string(),
        ];

        let interface_flag = match kind {
            AttachmentType::HostOnly => Some("hostonlyadapter"),
            AttachmentType::Bridged => Some("bridgeadapter"),
            AttachmentType::Internal => Some("intnet"),
            _ => None,
        };
        if let (Some(flag), Some(interface)) = (interface_flag, &adapter.host_interface) {
            args.push(format!("--{}{}", flag, nic));
            args.push(interface.clone());
        }
        if kind != AttachmentType::None {
            args.push(format!("--cableconnected{}", nic));
            args.push("on".to_string());
        }

        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        self.run(&args)?;
        Ok(())
    }

    fn adapters(&self, vm: &str) -> Result<Vec<Adapter>> {
        Ok(adapters_from_info(&self.vm_info(vm)?))
    }
}

impl HostOnlySupport for VBoxManage {
    fn prepare_host_only_network(&self, vm: &str) -> Result<()> {
        self.set_guest_property(vm, "enabled", "1")
    }

    fn enable_host_only_network(&self, vm: &str, options: &NetworkOptions) -> Result<()> {
        let slot = options.adapter;
        self.set_guest_property(vm, &format!("adapter/{}/ip", slot), &options.ip)?;
        self.set_guest_property(vm, &format!("adapter/{}/netmask", slot), &options.netmask)
    }
}

/// Parse `VBoxManage list hostonlyifs` or `list bridgedifs`
///
/// Output is a series of `Key: value` blocks, each starting with `Name:`.
pub fn parse_interfaces(output: &str, interface_type: InterfaceType) -> Vec<HostOnlyInterface> {
    let mut interfaces = Vec::new();
    let mut current: Option<HostOnlyInterface> = None;

    for line in output.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();

        match key.trim() {
            "Name" => {
                interfaces.extend(current.take());
                current = Some(HostOnlyInterface {
                    name: value.to_string(),
                    ip_address: String::new(),
                    network_mask: String::new(),
                    interface_type,
                });
            }
            "IPAddress" => {
                if let Some(iface) = current.as_mut() {
                    iface.ip_address = value.to_string();
                }
            }
            "NetworkMask" => {
                if let Some(iface) = current.as_mut() {
                    iface.network_mask = value.to_string();
                }
            }
            _ => {}
        }
    }

    interfaces.extend(current);
    interfaces
}

/// Extract the name from `Interface 'vboxnet1' was successfully created`
pub fn parse_created_name(output: &str) -> Option<String> {
    output.lines().find_map(|line| {
        let rest = line.split_once("Interface '")?.1;
        let (name, _) = rest.split_once('\'')?;
        Some(name.to_string())
    })
}

/// Parse `VBoxManage list vms` into `(name, uuid)` pairs
pub fn parse_vm_list(output: &str) -> Vec<(String, String)> {
    output
        .lines()
        .filter_map(|line| {
            let (name, uuid) = line.trim().rsplit_once(' ')?;
            let name = name.trim().strip_prefix('"')?.strip_suffix('"')?;
            let uuid = uuid.strip_prefix('{')?.strip_suffix('}')?;
            Some((name.to_string(), uuid.to_string()))
        })
        .collect()
}

/// Parse `key="value"` lines from `--machinereadable` output
pub fn parse_machine_readable(output: &str) -> HashMap<String, String> {
    output
        .lines()
        .filter_map(|line| {
            let (key, value) = line.split_once('=')?;
            Some((unquote(key).to_string(), unquote(value).to_string()))
        })
        .collect()
}

fn unquote(s: &str) -> &str {
    let s = s.trim();
    s.strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(s)
}

/// Build the adapter list from machine readable VM info
pub fn adapters_from_info(info: &HashMap<String, String>) -> Vec<Adapter> {
    (1..=MAX_ADAPTERS)
        .filter_map(|nic| {
            let kind = info.get(&format!("nic{}", nic))?;
            let attachment_type = match kind.as_str() {
                "none" => AttachmentType::None,
                "nat" => AttachmentType::Nat,
                "bridged" => AttachmentType::Bridged,
                "intnet" => AttachmentType::Internal,
                "hostonly" => AttachmentType::HostOnly,
                _ => AttachmentType::Other,
            };

            let interface_key = match attachment_type {
                AttachmentType::HostOnly => Some(format!("hostonlyadapter{}", nic)),
                AttachmentType::Bridged => Some(format!("bridgeadapter{}", nic)),
                AttachmentType::Internal => Some(format!("intnet{}", nic)),
                _ => None,
            };

            Some(Adapter {
                index: nic - 1,
                enabled: attachment_type != AttachmentType::None,
                attachment_type,
                host_interface: interface_key.and_then(|k| info.get(&k).cloned()),
            })
        })
        .collect()
}
