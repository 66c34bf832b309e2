//! Advisory locks around read-then-act network sequences
//!
//! Enumerate-then-create and count-then-destroy are two separate hypervisor
//! calls each. When several VMs boot or get destroyed at the same time they
//! can interleave, creating duplicate networks or destroying a network twice.
//! `NetworkLocks` serializes those sequences with `flock(2)` on one lock file
//! per desired subnet or per interface name.

use crate::error::{Error, Result};
use crate::network::subnet;
use crate::network::types::NetworkOptions;
use nix::fcntl::{Flock, FlockArg};
use std::fs::{self, File, OpenOptions};
use std::path::PathBuf;
use tracing::debug;

/// Lock file directory
#[derive(Debug, Clone)]
pub struct NetworkLocks {
    dir: PathBuf,
}

/// A held lock, released on drop
#[derive(Debug)]
pub struct NetworkLock {
    path: PathBuf,
    _lock: Flock<File>,
}

impl NetworkLock {
    #[cfg(test)]
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

impl Drop for NetworkLock {
    fn drop(&mut self) {
        debug!(lock = %self.path.display(), "Released network lock");
    }
}

impl NetworkLocks {
    /// Use `dir` for lock files, creating it if missing
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| Error::Lock {
            path: dir.clone(),
            message: e.to_string(),
        })?;
        Ok(Self { dir })
    }

    /// Lock the subnet an adapter wants, blocking until available
    ///
    /// Every `(ip, netmask)` pair on the same network maps to the same lock.
    pub fn lock_subnet(&self, options: &NetworkOptions) -> Result<NetworkLock> {
        let masked = subnet::apply_mask(&options.ip, &options.netmask)?;
        let mask = subnet::split_ip(&options.netmask)?;
        let key = format!("subnet-{}-{}", subnet::join_ip(masked), subnet::join_ip(mask));
        self.acquire(&key)
    }

    /// Lock a named interface, blocking until available
    pub fn lock_interface(&self, name: &str) -> Result<NetworkLock> {
        let key = format!("iface-{}", sanitize(name));
        self.acquire(&key)
    }

    fn acquire(&self, key: &str) -> Result<NetworkLock> {
        let path = self.dir.join(format!("{}.lock", key));

        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|e| Error::Lock {
                path: path.clone(),
                message: e.to_string(),
            })?;

        debug!(lock = %path.display(), "Waiting for network lock");
        let lock = Flock::lock(file, FlockArg::LockExclusive).map_err(|(_, errno)| Error::Lock {
            path: path.clone(),
            message: errno.desc().to_string(),
        })?;

        Ok(NetworkLock { path, _lock: lock })
    }
}

/// Keep interface names from escaping the lock directory
fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}
