use std::net::{IpAddr, Ipv4Addr, UdpSocket};

use get_if_addrs::get_if_addrs;
use tracing::debug;

use crate::collaborators::AddressProvider;

/// Finds the LAN address other machines can reach the stream on.
///
/// Prefers the first non-loopback IPv4 interface address; falls back to the
/// address the OS would route Internet traffic from.
#[derive(Debug, Default, Clone, Copy)]
pub struct LanAddressProvider;

impl AddressProvider for LanAddressProvider {
    fn current_lan_address(&self) -> Option<IpAddr> {
        interface_address().or_else(routed_address)
    }
}

fn interface_address() -> Option<IpAddr> {
    let interfaces = match get_if_addrs() {
        Ok(interfaces) => interfaces,
        Err(e) => {
            debug!(error = %e, "Cannot list network interfaces");
            return None;
        }
    };

    interfaces
        .into_iter()
        .map(|iface| iface.ip())
        .find(|ip| matches!(ip, IpAddr::V4(v4) if !v4.is_loopback() && !v4.is_link_local()))
}

/// UDP "connect" trick: no packet is sent, the OS just picks a route.
fn routed_address() -> Option<IpAddr> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).ok()?;
    socket.connect("8.8.8.8:80").ok()?;
    let ip = socket.local_addr().ok()?.ip();
    (!ip.is_unspecified() && !ip.is_loopback()).then_some(ip)
}

/// Provider returning a fixed address.
#[derive(Debug, Clone, Copy)]
pub struct FixedAddress(pub Option<IpAddr>);

impl AddressProvider for FixedAddress {
    fn current_lan_address(&self) -> Option<IpAddr> {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lan_address_is_never_loopback() {
        if let Some(ip) = LanAddressProvider.current_lan_address() {
            assert!(!ip.is_loopback());
        }
    }

    #[test]
    fn test_fixed_address() {
        let ip = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 7));
        assert_eq!(FixedAddress(Some(ip)).current_lan_address(), Some(ip));
        assert_eq!(FixedAddress(None).current_lan_address(), None);
    }
}
