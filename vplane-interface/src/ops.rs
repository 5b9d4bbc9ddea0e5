//
// Copyright (c) The VPlane Project Contributors
//
// SPDX-License-Identifier: MIT
//

//! Per-interface-type operation hooks (§4.2, "Type operations").
//!
//! Each [`InterfaceKind`] gets an entry in [`TypeOps`]; unimplemented
//! hooks for a given type are no-ops rather than errors, matching the
//! original dataplane's table of optional `if_ops` callbacks, most of
//! which a given interface type simply leaves unset.

use crate::interface::{Interface, InterfaceKind};

/// Result of a type-specific start/stop hook.
pub type OpResult = Result<(), OpError>;

#[derive(Debug, Eq, PartialEq)]
pub enum OpError {
    Unsupported,
}

impl std::fmt::Display for OpError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OpError::Unsupported => write!(f, "operation unsupported for this interface type"),
        }
    }
}

impl std::error::Error for OpError {}

/// Type-specific operation table. A blanket no-op default means adding a
/// new interface type only requires overriding the hooks that type
/// actually needs.
pub trait TypeOps: Send + Sync {
    fn start(&self, _iface: &Interface) -> OpResult {
        Ok(())
    }

    fn stop(&self, _iface: &Interface) -> OpResult {
        Ok(())
    }

    /// Called when the interface's MTU changes, before the change is
    /// published in the table, so an implementation can reject it.
    fn validate_mtu(&self, _iface: &Interface, _mtu: u32) -> OpResult {
        Ok(())
    }

    /// Whether this type participates in L2 switching/bridging decisions
    /// (used by the Ethernet-lookup pipeline node, §4.7).
    fn is_switched(&self) -> bool {
        false
    }
}

pub struct EthernetOps;
impl TypeOps for EthernetOps {
    fn is_switched(&self) -> bool {
        true
    }
}

pub struct LoopbackOps;
impl TypeOps for LoopbackOps {
    fn validate_mtu(&self, _iface: &Interface, mtu: u32) -> OpResult {
        if mtu < 68 {
            Err(OpError::Unsupported)
        } else {
            Ok(())
        }
    }
}

pub struct BridgeOps;
impl TypeOps for BridgeOps {
    fn is_switched(&self) -> bool {
        true
    }
}

pub struct VrfMasterOps;
impl TypeOps for VrfMasterOps {}

pub struct VlanOps;
impl TypeOps for VlanOps {
    fn is_switched(&self) -> bool {
        true
    }
}

pub struct VxlanOps;
impl TypeOps for VxlanOps {
    fn is_switched(&self) -> bool {
        true
    }
}

pub struct MacvlanOps;
impl TypeOps for MacvlanOps {}

pub struct GreOps;
impl TypeOps for GreOps {}

pub struct VtiOps;
impl TypeOps for VtiOps {}

pub struct L2tpEthOps;
impl TypeOps for L2tpEthOps {
    fn is_switched(&self) -> bool {
        true
    }
}

pub struct GenericTunnelOps;
impl TypeOps for GenericTunnelOps {}

/// Returns the operation table for a given interface kind.
pub fn ops_for(kind: &InterfaceKind) -> &'static dyn TypeOps {
    match kind {
        InterfaceKind::Ethernet => &EthernetOps,
        InterfaceKind::Loopback => &LoopbackOps,
        InterfaceKind::Bridge => &BridgeOps,
        InterfaceKind::VrfMaster => &VrfMasterOps,
        InterfaceKind::Vlan { .. } => &VlanOps,
        InterfaceKind::Vxlan { .. } => &VxlanOps,
        InterfaceKind::Macvlan { .. } => &MacvlanOps,
        InterfaceKind::Gre { .. } => &GreOps,
        InterfaceKind::Vti { .. } => &VtiOps,
        InterfaceKind::L2tpEth => &L2tpEthOps,
        InterfaceKind::GenericTunnel => &GenericTunnelOps,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vplane_utils::mac_addr::MacAddr;

    #[test]
    fn ethernet_and_bridge_are_switched() {
        assert!(ops_for(&InterfaceKind::Ethernet).is_switched());
        assert!(ops_for(&InterfaceKind::Bridge).is_switched());
        assert!(!ops_for(&InterfaceKind::VrfMaster).is_switched());
    }

    #[test]
    fn loopback_rejects_small_mtu() {
        let iface = Interface::new(
            "lo".to_owned(),
            InterfaceKind::Loopback,
            65536,
            MacAddr::ZERO,
            1,
        );
        let ops = ops_for(&iface.kind);
        assert!(ops.validate_mtu(&iface, 60).is_err());
        assert!(ops.validate_mtu(&iface, 1500).is_ok());
    }
}
