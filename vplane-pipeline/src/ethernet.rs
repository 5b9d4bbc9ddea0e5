//
// Copyright (c) The VPlane Project Contributors
//
// SPDX-License-Identifier: MIT
//

//! The illustrative Ethernet-lookup node (§4.7, "Ethernet-lookup node").

use vplane_epoch::Section;
use vplane_interface::interface::InterfaceKind;
use vplane_interface::InterfaceTable;

use crate::context::{EtherClass, PacketContext};
use crate::feature::AttachPointRuntime;
use crate::graph::{ProcessingNode, FINISH, LOOKUP};

/// The attach point index this node checks feature masks against
/// (§4.7, "Attach point").
pub const ETH_IN_ATTACH_POINT: usize = 0;

/// Successor id emitted once the packet's egress interface is resolved
/// (§4.7 step 5, "Emit 'accept'").
pub const SUCCESSOR_ACCEPT: u32 = 1;

/// The Ethernet-lookup node (§4.7, "Ethernet-lookup node (illustrative)").
///
/// Holds a reference to the live interface table rather than a reader
/// section, since a reader section's lifetime is scoped to one packet
/// batch and is threaded in per call instead.
pub struct EthernetLookupNode<'a> {
    interfaces: &'a InterfaceTable,
    attach: AttachPointRuntime,
}

impl<'a> EthernetLookupNode<'a> {
    pub fn new(interfaces: &'a InterfaceTable, attach: AttachPointRuntime) -> Self {
        EthernetLookupNode { interfaces, attach }
    }

    /// Runs the node's steps (§4.7 steps 1-5) against a reader section
    /// borrowed for this packet's traversal.
    pub fn run(&self, section: &Section<'_>, ctx: &mut PacketContext) -> u32 {
        // Step 1: attach-point features.
        let masks = self
            .interfaces
            .lookup_by_port(section, ctx.ingress_port)
            .map(|iface| iface.feature_masks.clone());
        if let Some(masks) = &masks
            && self.attach.invoke(masks, ctx) == crate::feature::FeatureOutcome::Finish
        {
            return FINISH;
        }

        let Some(iface) = self.interfaces.lookup_by_port(section, ctx.ingress_port) else {
            ctx.drop("no-interface-for-port");
            return FINISH;
        };
        ctx.ingress_ifindex = iface.ifindex;

        // Step 2: classify destination MAC.
        if ctx.dst_mac.is_multicast() {
            ctx.ether_class = EtherClass::Multicast;
        } else if ctx.dst_mac.is_broadcast() {
            ctx.ether_class = EtherClass::Broadcast;
        } else if ctx.dst_mac != iface.mac_addr && ctx.vlan_tag.is_none() {
            // Macvlan demux: look for a macvlan child whose own MAC
            // matches, still under the same physical port.
            let mut matched = None;
            self.interfaces.walk(section, |candidate| {
                if matched.is_none()
                    && matches!(candidate.kind, InterfaceKind::Macvlan { parent_ifindex } if parent_ifindex == iface.ifindex)
                    && candidate.mac_addr == ctx.dst_mac
                {
                    matched = Some(candidate.ifindex);
                }
            });
            if let Some(ifindex) = matched {
                ctx.resolved_ifindex = Some(ifindex);
            }
        }

        // Step 3: VLAN sub-interface resolution, including Q-in-Q.
        if let Some((tag, _tpid)) = ctx.vlan_tag {
            let mut sub_ifindex = None;
            self.interfaces.walk(section, |candidate| {
                if sub_ifindex.is_none()
                    && matches!(candidate.kind, InterfaceKind::Vlan { parent_ifindex, vlan_tag, .. }
                        if parent_ifindex == iface.ifindex && vlan_tag == tag)
                {
                    sub_ifindex = Some(candidate.ifindex);
                }
            });
            if let Some(ifindex) = sub_ifindex {
                ctx.ingress_ifindex = ifindex;
                ctx.vlan_tag = None;
                return LOOKUP;
            }
        }

        let target_ifindex = ctx.resolved_ifindex.unwrap_or(ctx.ingress_ifindex);
        let Some(target) = self.interfaces.lookup_by_index(section, target_ifindex) else {
            ctx.drop("resolved-interface-missing");
            return FINISH;
        };

        // Step 4: admin-down check.
        if !target.is_up() {
            ctx.drop("interface-admin-down");
            return FINISH;
        }

        // Step 5: hand off to Ethernet-forward.
        ctx.resolved_ifindex = Some(target.ifindex);
        SUCCESSOR_ACCEPT
    }
}

impl ProcessingNode for EthernetLookupNode<'static> {
    fn name(&self) -> &'static str {
        "ethernet-lookup"
    }

    fn next_table(&self) -> &[(u32, &'static str)] {
        &[(SUCCESSOR_ACCEPT, "ethernet-forward")]
    }

    fn handle(&self, _ctx: &mut PacketContext) -> u32 {
        unreachable!(
            "EthernetLookupNode requires a reader section; call EthernetLookupNode::run directly \
             from the forwarding loop instead of through PipelineGraph::run"
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vplane_epoch::Domain;
    use vplane_interface::interface::{Interface, InterfaceFlags};
    use vplane_utils::mac_addr::MacAddr;

    fn up_interface(name: &str, ifindex: u32, port: u32, mac: MacAddr) -> Interface {
        let mut iface = Interface::new(name.to_string(), InterfaceKind::Ethernet, 1500, mac, 1);
        iface.port = Some(port);
        iface.ifindex = ifindex;
        iface.flags = InterfaceFlags::ADMIN_UP | InterfaceFlags::OPER_UP;
        iface
    }

    #[test]
    fn admin_down_interface_is_dropped() {
        let domain = Domain::new();
        let table = InterfaceTable::new(domain.clone(), 1);
        let mut reader = domain.register();
        let section = reader.enter();

        let mac = MacAddr::from([2, 0, 0, 0, 0, 1]);
        let mut iface = up_interface("dp1", 100, 1, mac);
        iface.flags.remove(InterfaceFlags::OPER_UP);
        table.insert_pending(&section, iface);
        table.set_index(&section, "dp1", 100, Some(1));

        let features = AttachPointRuntime::new(ETH_IN_ATTACH_POINT, crate::feature::DispatchMode::Dynamic, Vec::new()).unwrap();
        let node = EthernetLookupNode::new(&table, features);

        let mut ctx = PacketContext::new(1, mac, MacAddr::from([0xaa, 0, 0, 0, 0, 1]));
        let successor = node.run(&section, &mut ctx);
        assert_eq!(successor, FINISH);
        assert!(ctx.is_dropped());
    }

    #[test]
    fn up_interface_reaches_accept() {
        let domain = Domain::new();
        let table = InterfaceTable::new(domain.clone(), 1);
        let mut reader = domain.register();
        let section = reader.enter();

        let mac = MacAddr::from([2, 0, 0, 0, 0, 1]);
        let iface = up_interface("dp1", 100, 1, mac);
        table.insert_pending(&section, iface);
        table.set_index(&section, "dp1", 100, Some(1));

        let features = AttachPointRuntime::new(ETH_IN_ATTACH_POINT, crate::feature::DispatchMode::Dynamic, Vec::new()).unwrap();
        let node = EthernetLookupNode::new(&table, features);

        let mut ctx = PacketContext::new(1, mac, MacAddr::from([0xaa, 0, 0, 0, 0, 1]));
        let successor = node.run(&section, &mut ctx);
        assert_eq!(successor, SUCCESSOR_ACCEPT);
        assert!(!ctx.is_dropped());
    }
}
