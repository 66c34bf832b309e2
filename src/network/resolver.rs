//! Host only network resolution
//!
//! Maps the desired network of one VM adapter onto an existing host only
//! interface, or creates one when nothing matches:
//! - an explicit name must match an existing interface exactly
//! - otherwise the first interface on the same subnet wins
//! - otherwise a new interface is created on the derived host address

use crate::error::{Error, Result};
use crate::network::backend::NetworkBackend;
use crate::network::subnet;
use crate::network::types::{HostOnlyInterface, NetworkOptions};
use tracing::{debug, info};

/// Find the network an adapter should attach to, without creating anything
///
/// Returns `Ok(None)` when no interface is on the desired subnet. A named
/// network that does not exist is an error, never a miss.
pub fn find_network(
    options: &NetworkOptions,
    interfaces: &[HostOnlyInterface],
) -> Result<Option<String>> {
    // Other interface kinds may be on the same subnet but can't be attached
    let mut candidates = interfaces.iter().filter(|i| i.is_host_only());

    if let Some(name) = &options.name {
        return match candidates.find(|i| &i.name == name) {
            Some(iface) => Ok(Some(iface.name.clone())),
            None => Err(Error::NetworkNotFound { name: name.clone() }),
        };
    }

    let netmask = subnet::split_ip(&options.netmask)?;
    let wanted = subnet::mask_octets(subnet::split_ip(&options.ip)?, netmask);

    for iface in candidates {
        if matching_network(iface, netmask, wanted)? {
            debug!(network = %iface.name, ip = %options.ip, "Found matching host only network");
            return Ok(Some(iface.name.clone()));
        }
    }

    Ok(None)
}

/// Resolve the network an adapter should attach to, creating it if needed
///
/// `interfaces` must be a fresh enumeration from `backend`.
pub fn resolve<B: NetworkBackend + ?Sized>(
    options: &NetworkOptions,
    interfaces: &[HostOnlyInterface],
    backend: &B,
) -> Result<String> {
    if let Some(name) = find_network(options, interfaces)? {
        return Ok(name);
    }

    let address = subnet::derive_network_host_address(&options.ip, &options.netmask)?;

    info!(address = %address, netmask = %options.netmask, "Creating new host only network for environment...");
    let iface = backend.create_host_only_interface(&address, &options.netmask)?;
    debug!(network = %iface.name, "Created host only network");

    Ok(iface.name)
}

/// Same netmask, and the same network address once that mask is applied
fn matching_network(iface: &HostOnlyInterface, netmask: [u8; 4], wanted: [u8; 4]) -> Result<bool> {
    if subnet::split_ip(&iface.network_mask)? != netmask {
        return Ok(false);
    }

    let address = subnet::split_ip(&iface.ip_address)?;
    Ok(subnet::mask_octets(address, netmask) == wanted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::memory::MemoryBackend;
    use crate::network::types::InterfaceType;

    fn vboxnet0() -> HostOnlyInterface {
        HostOnlyInterface::host_only("vboxnet0", "192.168.56.1", "255.255.255.0")
    }

    fn resolve_fresh(options: &NetworkOptions, backend: &MemoryBackend) -> Result<String> {
        let interfaces = backend.list_host_only_interfaces()?;
        resolve(options, &interfaces, backend)
    }

    #[test]
    fn test_matches_existing_subnet() {
        let backend = MemoryBackend::with_interfaces(vec![vboxnet0()]);
        let options = NetworkOptions::new(1, "192.168.56.10", "255.255.255.0");

        assert_eq!(resolve_fresh(&options, &backend).unwrap(), "vboxnet0");
        assert!(backend.created.borrow().is_empty());
    }

    #[test]
    fn test_creates_when_no_match() {
        let backend = MemoryBackend::with_interfaces(vec![vboxnet0()]);
        let options = NetworkOptions::new(1, "10.0.0.10", "255.255.255.0");

        let name = resolve_fresh(&options, &backend).unwrap();

        assert_eq!(name, "vboxnet1");
        assert_eq!(
            *backend.created.borrow(),
            vec![("10.0.0.1".to_string(), "255.255.255.0".to_string())]
        );
    }

    #[test]
    fn test_named_network_not_found() {
        let backend = MemoryBackend::with_interfaces(vec![vboxnet0()]);
        let options = NetworkOptions::new(1, "192.168.56.10", "255.255.255.0").with_name("customnet");

        match resolve_fresh(&options, &backend) {
            Err(Error::NetworkNotFound { name }) => assert_eq!(name, "customnet"),
            other => panic!("expected NetworkNotFound, got {:?}", other),
        }
        assert!(backend.created.borrow().is_empty());
    }

    #[test]
    fn test_named_network_ignores_subnet() {
        let backend = MemoryBackend::with_interfaces(vec![
            vboxnet0(),
            HostOnlyInterface::host_only("vboxnet1", "10.9.0.1", "255.255.0.0"),
        ]);
        // Subnet would match vboxnet0, but the name wins
        let options = NetworkOptions::new(1, "192.168.56.10", "255.255.255.0").with_name("vboxnet1");

        assert_eq!(resolve_fresh(&options, &backend).unwrap(), "vboxnet1");
        assert!(backend.created.borrow().is_empty());
    }

    #[test]
    fn test_named_network_skips_other_interface_types() {
        let bridged = HostOnlyInterface {
            name: "en0".into(),
            ip_address: "192.168.1.20".into(),
            network_mask: "255.255.255.0".into(),
            interface_type: InterfaceType::Other,
        };
        let options = NetworkOptions::new(1, "192.168.1.30", "255.255.255.0").with_name("en0");

        assert!(matches!(
            find_network(&options, &[bridged]),
            Err(Error::NetworkNotFound { .. })
        ));
    }

    #[test]
    fn test_other_interface_types_never_match_subnet() {
        let bridged = HostOnlyInterface {
            name: "en0".into(),
            ip_address: "192.168.56.2".into(),
            network_mask: "255.255.255.0".into(),
            interface_type: InterfaceType::Other,
        };
        let backend = MemoryBackend::with_interfaces(vec![bridged]);
        let options = NetworkOptions::new(1, "192.168.56.10", "255.255.255.0");

        assert_eq!(resolve_fresh(&options, &backend).unwrap(), "vboxnet1");
        assert_eq!(backend.created.borrow().len(), 1);
    }

    #[test]
    fn test_netmask_must_be_identical() {
        // 192.168.56.0/24 contains 192.168.56.10, but the masks differ
        let interfaces = vec![HostOnlyInterface::host_only("vboxnet0", "192.168.56.1", "255.255.0.0")];
        let options = NetworkOptions::new(1, "192.168.56.10", "255.255.255.0");

        assert_eq!(find_network(&options, &interfaces).unwrap(), None);
    }

    #[test]
    fn test_host_bits_do_not_matter() {
        let interfaces = vec![vboxnet0()];
        for ip in ["192.168.56.0", "192.168.56.1", "192.168.56.254", "192.168.56.255"] {
            let options = NetworkOptions::new(1, ip, "255.255.255.0");
            assert_eq!(
                find_network(&options, &interfaces).unwrap().as_deref(),
                Some("vboxnet0")
            );
        }
    }

    #[test]
    fn test_first_match_wins() {
        let interfaces = vec![
            HostOnlyInterface::host_only("vboxnet3", "172.28.128.1", "255.255.255.0"),
            HostOnlyInterface::host_only("vboxnet1", "172.28.128.2", "255.255.255.0"),
        ];
        let options = NetworkOptions::new(1, "172.28.128.50", "255.255.255.0");

        assert_eq!(
            find_network(&options, &interfaces).unwrap().as_deref(),
            Some("vboxnet3")
        );
    }

    #[test]
    fn test_resolve_is_idempotent() {
        let backend = MemoryBackend::with_interfaces(vec![vboxnet0()]);
        let options = NetworkOptions::new(1, "10.0.0.10", "255.255.255.0");

        let first = resolve_fresh(&options, &backend).unwrap();
        let second = resolve_fresh(&options, &backend).unwrap();

        assert_eq!(first, second);
        assert_eq!(backend.created.borrow().len(), 1);
        assert_eq!(backend.interface_names(), vec!["vboxnet0", "vboxnet1"]);
    }

    #[test]
    fn test_malformed_desired_address() {
        let backend = MemoryBackend::with_interfaces(vec![vboxnet0()]);
        let options = NetworkOptions::new(1, "192.168.56", "255.255.255.0");

        match resolve_fresh(&options, &backend) {
            Err(Error::MalformedAddress { value }) => assert_eq!(value, "192.168.56"),
            other => panic!("expected MalformedAddress, got {:?}", other),
        }
        assert!(backend.created.borrow().is_empty());
    }

    #[test]
    fn test_malformed_interface_address_with_same_mask() {
        let interfaces = vec![HostOnlyInterface::host_only("vboxnet0", "bogus", "255.255.255.0")];
        let options = NetworkOptions::new(1, "192.168.56.10", "255.255.255.0");

        assert!(matches!(
            find_network(&options, &interfaces),
            Err(Error::MalformedAddress { .. })
        ));
    }

    #[test]
    fn test_backend_failure_is_propagated() {
        let backend = MemoryBackend::new();
        backend.fail_create(true);
        let options = NetworkOptions::new(1, "10.0.0.10", "255.255.255.0");

        assert!(matches!(
            resolve_fresh(&options, &backend),
            Err(Error::Backend { .. })
        ));
    }

    #[test]
    fn test_exhausted_address_does_not_create() {
        let backend = MemoryBackend::new();
        let options = NetworkOptions::new(1, "10.0.0.255", "255.255.255.255");

        assert!(matches!(
            resolve_fresh(&options, &backend),
            Err(Error::AddressSpaceExhausted { .. })
        ));
        assert!(backend.created.borrow().is_empty());
    }
}
