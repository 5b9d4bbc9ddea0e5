//
// Copyright (c) The VPlane Project Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use ipnetwork::{IpNetwork, Ipv4Network, Ipv6Network};
use serde::{Deserialize, Serialize};

/// IP address family, as carried on interface addresses, FIB tables and
/// the next-hop pool's interned group key (§3).
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub enum AddressFamily {
    Ipv4,
    Ipv6,
}

impl AddressFamily {
    pub fn of(addr: &IpAddr) -> Self {
        match addr {
            IpAddr::V4(_) => AddressFamily::Ipv4,
            IpAddr::V6(_) => AddressFamily::Ipv6,
        }
    }
}

impl std::fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AddressFamily::Ipv4 => write!(f, "ipv4"),
            AddressFamily::Ipv6 => write!(f, "ipv6"),
        }
    }
}

/// Convenience extensions over [`ipnetwork::IpNetwork`] used throughout
/// the FIB and interface tables.
pub trait IpNetworkExt {
    /// Masks the host bits off, returning the canonical prefix.
    fn apply_mask(&self) -> IpNetwork;

    /// The prefix's address family.
    fn family(&self) -> AddressFamily;
}

impl IpNetworkExt for IpNetwork {
    fn apply_mask(&self) -> IpNetwork {
        match self {
            IpNetwork::V4(net) => IpNetwork::V4(
                Ipv4Network::new(net.network(), net.prefix()).unwrap(),
            ),
            IpNetwork::V6(net) => IpNetwork::V6(
                Ipv6Network::new(net.network(), net.prefix()).unwrap(),
            ),
        }
    }

    fn family(&self) -> AddressFamily {
        match self {
            IpNetwork::V4(_) => AddressFamily::Ipv4,
            IpNetwork::V6(_) => AddressFamily::Ipv6,
        }
    }
}

/// Convenience extensions over [`std::net::IpAddr`].
pub trait IpAddrExt {
    /// Builds the host (/32 or /128) prefix that covers exactly this
    /// address, used for exact-match neighbour/next-hop lookups.
    fn to_host_prefix(&self) -> IpNetwork;

    fn is_unspecified_addr(&self) -> bool;
}

impl IpAddrExt for IpAddr {
    fn to_host_prefix(&self) -> IpNetwork {
        match self {
            IpAddr::V4(addr) => {
                IpNetwork::V4(Ipv4Network::new(*addr, 32).unwrap())
            }
            IpAddr::V6(addr) => {
                IpNetwork::V6(Ipv6Network::new(*addr, 128).unwrap())
            }
        }
    }

    fn is_unspecified_addr(&self) -> bool {
        match self {
            IpAddr::V4(addr) => *addr == Ipv4Addr::UNSPECIFIED,
            IpAddr::V6(addr) => *addr == Ipv6Addr::UNSPECIFIED,
        }
    }
}

/// The three routes every FIB table is pre-populated with on creation
/// (§3, "Reserved routes"). These must never be reported in route dumps
/// and must never be deletable by the controller.
pub fn reserved_ipv4_routes() -> [(Ipv4Network, u8); 3] {
    [
        (Ipv4Network::new(Ipv4Addr::UNSPECIFIED, 0).unwrap(), 0),
        (Ipv4Network::new(Ipv4Addr::new(127, 0, 0, 0), 8).unwrap(), 8),
        (
            Ipv4Network::new(Ipv4Addr::new(255, 255, 255, 255), 32).unwrap(),
            32,
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_routes_count() {
        assert_eq!(reserved_ipv4_routes().len(), 3);
    }

    #[test]
    fn host_prefix() {
        let addr: IpAddr = "10.0.0.7".parse().unwrap();
        let prefix = addr.to_host_prefix();
        assert_eq!(prefix.prefix(), 32);
    }
}
