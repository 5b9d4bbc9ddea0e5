//
// Copyright (c) The VPlane Project Contributors
//
// SPDX-License-Identifier: MIT
//

//! Wire types for the controller channel (§6): a netlink-like stream of
//! link/address/route/neighbour/VRF events pushed by the separate
//! configuration process. Field semantics follow standard kernel netlink
//! payloads (link attributes, route attributes with table/scope/proto),
//! as the spec requires, but the encoding itself (the actual message-bus
//! socket framing) is out of scope here: this module only defines the
//! decoded shape every core component consumes.

use std::net::IpAddr;

use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};

use crate::mac_addr::MacAddr;
use crate::mpls::Label;
use crate::protocol::Protocol;

/// Route scope: an ordinal priority among coexisting rules at the same
/// prefix/depth (§3, "FIB table"; §4.4 "Scoped rules"). Follows the
/// kernel's `rt_scope_t` numbering, where a *smaller* number is a
/// *broader* scope and a *larger* number is more specific; the most
/// specific (numerically largest) coexisting scope is the active one.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub struct Scope(pub u8);

impl Scope {
    pub const UNIVERSE: Scope = Scope(0);
    pub const SITE: Scope = Scope(200);
    pub const LINK: Scope = Scope(253);
    pub const HOST: Scope = Scope(254);
    pub const NOWHERE: Scope = Scope(255);
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            Scope::UNIVERSE => write!(f, "universe"),
            Scope::SITE => write!(f, "site"),
            Scope::LINK => write!(f, "link"),
            Scope::HOST => write!(f, "host"),
            Scope::NOWHERE => write!(f, "nowhere"),
            Scope(v) => write!(f, "{v}"),
        }
    }
}

/// A link-layer attribute update (§4.2 interface allocate/set operations).
#[derive(Clone, Debug)]
#[derive(Deserialize, Serialize)]
pub struct LinkMsg {
    pub ifname: String,
    pub ifindex: Option<u32>,
    pub mtu: u32,
    pub mac_addr: Option<MacAddr>,
    pub vrf: u32,
    pub admin_up: bool,
    pub oper_up: bool,
}

/// An address add/delete notification (§3, "Address").
#[derive(Clone, Debug)]
#[derive(Deserialize, Serialize)]
pub struct AddrMsg {
    pub ifname: String,
    pub addr: IpNetwork,
    pub broadcast: Option<IpAddr>,
}

/// A neighbour (ARP/ND) add/update notification (§4.6).
#[derive(Clone, Debug)]
#[derive(Deserialize, Serialize)]
pub struct NeighMsg {
    pub ifname: String,
    pub addr: IpAddr,
    pub lladdr: Option<MacAddr>,
}

/// One candidate path supplied by the controller for a route (§3,
/// "Next-hop sibling"). This is the pre-intern shape; the FIB coordinator
/// turns it into an interned [`vplane_nexthop`] sibling.
#[derive(Clone, Debug, Eq, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub struct SiblingSpec {
    pub ifindex: u32,
    pub gateway: Option<IpAddr>,
    pub blackhole: bool,
    pub reject: bool,
    pub local: bool,
    pub slowpath: bool,
    pub broadcast: bool,
    pub labels: Vec<Label>,
}

impl SiblingSpec {
    pub fn connected(ifindex: u32) -> Self {
        SiblingSpec {
            ifindex,
            gateway: None,
            blackhole: false,
            reject: false,
            local: false,
            slowpath: false,
            broadcast: false,
            labels: Vec::new(),
        }
    }

    pub fn via_gateway(ifindex: u32, gateway: IpAddr) -> Self {
        SiblingSpec {
            ifindex,
            gateway: Some(gateway),
            blackhole: false,
            reject: false,
            local: false,
            slowpath: false,
            broadcast: false,
            labels: Vec::new(),
        }
    }

    pub fn blackhole() -> Self {
        SiblingSpec {
            ifindex: 0,
            gateway: None,
            blackhole: true,
            reject: false,
            local: false,
            slowpath: false,
            broadcast: false,
            labels: Vec::new(),
        }
    }
}

/// A route add/replace request from the controller (§4.5, `insert`).
#[derive(Clone, Debug)]
#[derive(Deserialize, Serialize)]
pub struct RouteAddMsg {
    pub vrf: u32,
    pub table_id: u32,
    pub prefix: IpNetwork,
    pub scope: Scope,
    pub protocol: Protocol,
    pub siblings: Vec<SiblingSpec>,
    pub replace: bool,
}

/// A route delete request (§4.5, `delete`).
#[derive(Clone, Debug)]
#[derive(Deserialize, Serialize)]
pub struct RouteDelMsg {
    pub vrf: u32,
    pub table_id: u32,
    pub prefix: IpNetwork,
    pub scope: Scope,
}

/// Top-level controller channel message (§6, "Controller channel").
#[derive(Clone, Debug)]
#[derive(Deserialize, Serialize)]
pub enum ControllerMsg {
    LinkCreate(LinkMsg),
    LinkUpdate(LinkMsg),
    LinkDelete { ifname: String },
    AddrAdd(AddrMsg),
    AddrDel(AddrMsg),
    NeighAdd(NeighMsg),
    NeighDel(NeighMsg),
    RouteAdd(RouteAddMsg),
    RouteDel(RouteDelMsg),
    VrfCreate { vrf: u32, name: String },
    VrfDelete { vrf: u32 },
}
