//! Configuration file parsing for hostnet
//!
//! Parses `hostnet.toml` configuration files using serde

use crate::error::{Error, Result};
use crate::network::types::{NetworkOptions, VmConfig};
use crate::network::vbox::MAX_ADAPTERS;
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Load configuration from a file
pub fn load(path: &Path) -> Result<HostnetConfig> {
    let content = fs::read_to_string(path).map_err(|e| Error::ConfigRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    let config: HostnetConfig = toml::from_str(&content)?;
    config.validate()?;

    Ok(config)
}

/// Load configuration, falling back to defaults when the file is absent
///
/// Network commands only need the global settings, so they work without a
/// config file.
pub fn load_or_default(path: &Path) -> Result<HostnetConfig> {
    if path.exists() {
        load(path)
    } else {
        Ok(HostnetConfig::default())
    }
}

/// Root configuration structure
#[derive(Debug, Default, Deserialize)]
pub struct HostnetConfig {
    /// Global configuration settings
    #[serde(default)]
    pub config: GlobalConfig,

    /// VM definitions
    #[serde(default)]
    pub vms: Vec<VmDef>,
}

impl HostnetConfig {
    /// Validate the configuration
    ///
    /// Address syntax is left to resolution time.
    pub fn validate(&self) -> Result<()> {
        let mut names = HashSet::new();
        for vm in &self.vms {
            if vm.name.trim().is_empty() {
                return Err(Error::ConfigValidation("VM name cannot be empty".into()));
            }
            if !names.insert(&vm.name) {
                return Err(Error::ConfigValidation(format!(
                    "Duplicate VM name: {}",
                    vm.name
                )));
            }
            vm.validate()?;
        }

        Ok(())
    }

    /// Get a VM definition by name
    pub fn get_vm(&self, name: &str) -> Option<&VmDef> {
        self.vms.iter().find(|vm| vm.name == name)
    }
}

/// Global configuration settings
#[derive(Debug, Deserialize)]
pub struct GlobalConfig {
    /// VBoxManage executable
    #[serde(default = "default_vboxmanage")]
    pub vboxmanage: PathBuf,

    /// Directory for network lock files; locking is off when unset
    pub lock_dir: Option<PathBuf>,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            vboxmanage: default_vboxmanage(),
            lock_dir: None,
        }
    }
}

fn default_vboxmanage() -> PathBuf {
    PathBuf::from("VBoxManage")
}

/// VM definition from config file
#[derive(Debug, Clone, Deserialize)]
pub struct VmDef {
    /// VM name as registered with VirtualBox
    pub name: String,

    /// Host only networks, one per adapter slot
    #[serde(default)]
    pub networks: Vec<NetworkOptions>,
}

impl VmDef {
    fn validate(&self) -> Result<()> {
        let mut slots = HashSet::new();
        for net in &self.networks {
            if net.adapter >= MAX_ADAPTERS {
                return Err(Error::ConfigValidation(format!(
                    "VM '{}': adapter {} out of range (0-{})",
                    self.name,
                    net.adapter,
                    MAX_ADAPTERS - 1
                )));
            }
            if !slots.insert(net.adapter) {
                return Err(Error::ConfigValidation(format!(
                    "VM '{}': adapter {} configured twice",
                    self.name, net.adapter
                )));
            }
            if net.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
                return Err(Error::ConfigValidation(format!(
                    "VM '{}': network name for adapter {} cannot be empty",
                    self.name, net.adapter
                )));
            }
        }

        Ok(())
    }

    /// Network configuration for the lifecycle, indexed by adapter slot
    pub fn vm_config(&self) -> VmConfig {
        self.networks
            .iter()
            .cloned()
            .fold(VmConfig::new(&self.name), VmConfig::network)
    }
}
