//! In-memory hypervisor used by tests
//!
//! Keeps interfaces and VM adapters in memory and records every mutating call
//! so tests can assert on exactly what the core asked for.

use crate::error::{Error, Result};
use crate::network::backend::{AdapterStore, HostOnlySupport, NetworkBackend};
use crate::network::types::{Adapter, HostOnlyInterface, NetworkOptions};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct MemoryBackend {
    interfaces: RefCell<Vec<HostOnlyInterface>>,
    vms: RefCell<HashMap<String, Vec<Adapter>>>,
    count_overrides: RefCell<HashMap<String, usize>>,
    next_index: Cell<usize>,
    fail_create: Cell<bool>,

    pub created: RefCell<Vec<(String, String)>>,
    pub destroyed: RefCell<Vec<String>>,
    pub saved: RefCell<Vec<(String, Adapter)>>,
    pub prepared: RefCell<Vec<String>>,
    pub enabled: RefCell<Vec<(String, usize)>>,
    pub list_calls: Cell<usize>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_interfaces(interfaces: Vec<HostOnlyInterface>) -> Self {
        let backend = Self::new();
        backend.next_index.set(interfaces.len());
        *backend.interfaces.borrow_mut() = interfaces;
        backend
    }

    /// Attach a VM's adapter without recording it as a save
    pub fn attach(&self, vm: &str, adapter: Adapter) {
        let mut vms = self.vms.borrow_mut();
        let adapters = vms.entry(vm.to_string()).or_default();
        adapters.retain(|a| a.index != adapter.index);
        adapters.push(adapter);
    }

    /// Force the attached count reported for an interface
    pub fn override_count(&self, name: &str, count: usize) {
        self.count_overrides.borrow_mut().insert(name.to_string(), count);
    }

    pub fn fail_create(&self, fail: bool) {
        self.fail_create.set(fail);
    }

    pub fn interface_names(&self) -> Vec<String> {
        self.interfaces.borrow().iter().map(|i| i.name.clone()).collect()
    }
}

impl NetworkBackend for MemoryBackend {
    fn list_host_only_interfaces(&self) -> Result<Vec<HostOnlyInterface>> {
        self.list_calls.set(self.list_calls.get() + 1);
        Ok(self.interfaces.borrow().clone())
    }

    fn create_host_only_interface(
        &self,
        static_address: &str,
        netmask: &str,
    ) -> Result<HostOnlyInterface> {
        if self.fail_create.get() {
            return Err(Error::backend("create", "simulated failure"));
        }

        let index = self.next_index.get();
        self.next_index.set(index + 1);

        let iface = HostOnlyInterface::host_only(format!("vboxnet{}", index), static_address, netmask);
        self.interfaces.borrow_mut().push(iface.clone());
        self.created
            .borrow_mut()
            .push((static_address.to_string(), netmask.to_string()));
        Ok(iface)
    }

    fn destroy_interface(&self, name: &str) -> Result<()> {
        let mut interfaces = self.interfaces.borrow_mut();
        let before = interfaces.len();
        interfaces.retain(|i| i.name != name);
        if interfaces.len() == before {
            return Err(Error::backend("destroy", format!("no interface '{}'", name)));
        }
        self.destroyed.borrow_mut().push(name.to_string());
        Ok(())
    }

    fn attached_vm_count(&self, name: &str) -> Result<usize> {
        if let Some(count) = self.count_overrides.borrow().get(name) {
            return Ok(*count);
        }

        Ok(self
            .vms
            .borrow()
            .values()
            .filter(|adapters| {
                adapters
                    .iter()
                    .any(|a| a.host_only_interface() == Some(name))
            })
            .count())
    }
}

impl AdapterStore for MemoryBackend {
    fn set_adapter(&self, vm: &str, adapter: &Adapter) -> Result<()> {
        self.attach(vm, adapter.clone());
        self.saved.borrow_mut().push((vm.to_string(), adapter.clone()));
        Ok(())
    }

    fn adapters(&self, vm: &str) -> Result<Vec<Adapter>> {
        let mut adapters = self
            .vms
            .borrow()
            .get(vm)
            .cloned()
            .ok_or_else(|| Error::VmNotFound(vm.to_string()))?;
        adapters.sort_by_key(|a| a.index);
        Ok(adapters)
    }
}

impl HostOnlySupport for MemoryBackend {
    fn prepare_host_only_network(&self, vm: &str) -> Result<()> {
        self.prepared.borrow_mut().push(vm.to_string());
        Ok(())
    }

    fn enable_host_only_network(&self, vm: &str, options: &NetworkOptions) -> Result<()> {
        self.enabled.borrow_mut().push((vm.to_string(), options.adapter));
        Ok(())
    }
}
