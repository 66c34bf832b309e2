//! IPv4 octet arithmetic for host only networks
//!
//! Addresses are handled as dotted strings because that is how both the
//! manifest and the hypervisor report them. A string is only accepted when it
//! parses as a plain dotted-quad `Ipv4Addr`.

use crate::error::{Error, Result};
use std::net::Ipv4Addr;

/// Split a dotted IPv4 string into its four octets
pub fn split_ip(address: &str) -> Result<[u8; 4]> {
    address
        .trim()
        .parse::<Ipv4Addr>()
        .map(|addr| addr.octets())
        .map_err(|_| Error::MalformedAddress {
            value: address.to_string(),
        })
}

/// Apply a netmask to an address, octet by octet
pub fn apply_mask(address: &str, mask: &str) -> Result<[u8; 4]> {
    let address = split_ip(address)?;
    let mask = split_ip(mask)?;
    Ok(mask_octets(address, mask))
}

pub(crate) fn mask_octets(address: [u8; 4], mask: [u8; 4]) -> [u8; 4] {
    [
        address[0] & mask[0],
        address[1] & mask[1],
        address[2] & mask[2],
        address[3] & mask[3],
    ]
}

/// Join four octets back into dotted form
pub fn join_ip(octets: [u8; 4]) -> String {
    format!("{}.{}.{}.{}", octets[0], octets[1], octets[2], octets[3])
}

/// Derive the host-side address for a new network
///
/// The network address of `address`/`mask` with the last octet bumped by one,
/// so `10.0.0.10`/`255.255.255.0` gives `10.0.0.1`. When the masked last octet
/// is already 255 there is no next address and `AddressSpaceExhausted` is
/// returned instead of wrapping.
pub fn derive_network_host_address(address: &str, mask: &str) -> Result<String> {
    let mut parts = apply_mask(address, mask)?;

    parts[3] = parts[3]
        .checked_add(1)
        .ok_or_else(|| Error::AddressSpaceExhausted {
            address: address.to_string(),
            netmask: mask.to_string(),
        })?;

    Ok(join_ip(parts))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_ip() {
        assert_eq!(split_ip("192.168.56.1").unwrap(), [192, 168, 56, 1]);
        assert_eq!(split_ip(" 10.0.0.255 ").unwrap(), [10, 0, 0, 255]);
        assert_eq!(split_ip("0.0.0.0").unwrap(), [0, 0, 0, 0]);
    }

    #[test]
    fn test_split_ip_rejects_malformed() {
        for bad in ["", "10.0.0", "10.0.0.1.5", "10.0.0.256", "10.0.-1.1", "a.b.c.d", "10..0.1", "10.0.0.+1", "010.0.0.1", "10.0.0.1/24"] {
            match split_ip(bad) {
                Err(Error::MalformedAddress { value }) => assert_eq!(value, bad),
                other => panic!("expected MalformedAddress for {:?}, got {:?}", bad, other),
            }
        }
    }

    #[test]
    fn test_apply_mask() {
        assert_eq!(
            apply_mask("192.168.56.10", "255.255.255.0").unwrap(),
            [192, 168, 56, 0]
        );
        assert_eq!(
            apply_mask("172.16.33.200", "255.255.240.0").unwrap(),
            [172, 16, 32, 0]
        );
        assert_eq!(
            apply_mask("10.1.2.3", "0.0.0.0").unwrap(),
            [0, 0, 0, 0]
        );
    }

    #[test]
    fn test_apply_mask_is_octetwise_and() {
        let address = [203u8, 0, 113, 77];
        let mask = [255u8, 254, 15, 129];
        let result = apply_mask(&join_ip(address), &join_ip(mask)).unwrap();
        for i in 0..4 {
            assert_eq!(result[i], address[i] & mask[i]);
        }
    }

    #[test]
    fn test_apply_mask_malformed_mask() {
        assert!(matches!(
            apply_mask("10.0.0.1", "255.255.255"),
            Err(Error::MalformedAddress { .. })
        ));
    }

    #[test]
    fn test_derive_network_host_address() {
        assert_eq!(
            derive_network_host_address("10.0.0.10", "255.255.255.0").unwrap(),
            "10.0.0.1"
        );
        assert_eq!(
            derive_network_host_address("192.168.57.200", "255.255.255.128").unwrap(),
            "192.168.57.129"
        );
        assert_eq!(
            derive_network_host_address("172.20.9.9", "255.255.0.0").unwrap(),
            "172.20.0.1"
        );
    }

    #[test]
    fn test_derive_keeps_masked_prefix() {
        let masked = apply_mask("10.42.7.99", "255.255.255.224").unwrap();
        let derived = split_ip(&derive_network_host_address("10.42.7.99", "255.255.255.224").unwrap()).unwrap();
        assert_eq!(derived[..3], masked[..3]);
        assert_eq!(derived[3], masked[3] + 1);
    }

    #[test]
    fn test_derive_last_octet_overflow() {
        match derive_network_host_address("10.0.0.255", "255.255.255.255") {
            Err(Error::AddressSpaceExhausted { address, netmask }) => {
                assert_eq!(address, "10.0.0.255");
                assert_eq!(netmask, "255.255.255.255");
            }
            other => panic!("expected AddressSpaceExhausted, got {:?}", other),
        }
    }
}
