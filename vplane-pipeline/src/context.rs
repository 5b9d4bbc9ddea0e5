//
// Copyright (c) The VPlane Project Contributors
//
// SPDX-License-Identifier: MIT
//

//! Per-packet traversal state (§4.7, "Packet traversal").

use std::net::IpAddr;

use vplane_utils::mac_addr::MacAddr;

/// Classification a node attaches to a packet as it progresses through
/// the graph (§4.7 step 2, "tag the packet type").
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum EtherClass {
    #[default]
    Unicast,
    Multicast,
    Broadcast,
}

/// The minimal per-packet state the illustrative Ethernet-lookup node
/// and its neighbours need. A production build would carry a borrowed
/// mbuf; this carries an owned header view, which is enough to drive
/// the traversal contract without a DPDK-shaped buffer type.
#[derive(Clone, Debug)]
pub struct PacketContext {
    pub ingress_port: u32,
    pub ingress_ifindex: u32,
    pub dst_mac: MacAddr,
    pub src_mac: MacAddr,
    pub vlan_tag: Option<(u16, u16)>,
    pub ether_class: EtherClass,
    pub dst_ip: Option<IpAddr>,
    pub flow_hash: u64,
    /// Set by a node when it resolves the final egress interface.
    pub resolved_ifindex: Option<u32>,
    dropped: bool,
    drop_cause: Option<&'static str>,
}

impl PacketContext {
    pub fn new(ingress_port: u32, dst_mac: MacAddr, src_mac: MacAddr) -> Self {
        PacketContext {
            ingress_port,
            ingress_ifindex: 0,
            dst_mac,
            src_mac,
            vlan_tag: None,
            ether_class: EtherClass::Unicast,
            dst_ip: None,
            flow_hash: 0,
            resolved_ifindex: None,
            dropped: false,
            drop_cause: None,
        }
    }

    pub fn drop(&mut self, cause: &'static str) {
        self.dropped = true;
        self.drop_cause = Some(cause);
    }

    pub fn is_dropped(&self) -> bool {
        self.dropped
    }

    pub fn drop_cause(&self) -> Option<&'static str> {
        self.drop_cause
    }
}
