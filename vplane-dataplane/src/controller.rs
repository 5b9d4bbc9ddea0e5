//
// Copyright (c) The VPlane Project Contributors
//
// SPDX-License-Identifier: MIT
//

//! Applies one decoded [`ControllerMsg`] to the application state (§6,
//! "Controller channel"): the control thread's main consumer loop.
//!
//! Each variant drives the matching component's control-side API and
//! fires the interface event bus notifications that component's own
//! module (`vplane-interface::event`) documents but never raises
//! itself — that wiring belongs to whoever owns the controller channel,
//! which is this module.

use std::net::Ipv4Addr;

use ipnetwork::IpNetwork;
use tracing::{debug, info, warn};
use vplane_console::Dispatcher;
use vplane_epoch::{Reader, Section};
use vplane_interface::event::Event;
use vplane_interface::interface::{AddressFlags, InterfaceFlags, InterfaceKind};
use vplane_nexthop::group::Siblings;
use vplane_nexthop::sibling::Sibling;
use vplane_nexthop::SiblingFlags;
use vplane_utils::controller::{
    AddrMsg, ControllerMsg, LinkMsg, NeighMsg, RouteAddMsg, RouteDelMsg, SiblingSpec,
};
use vplane_utils::mac_addr::MacAddr;

use crate::context::AppState;

/// Applies `msg`, entering one reader section on `reader` for the
/// duration (the control thread's own registration, distinct from the
/// console thread's and from `Fib`'s internal one).
///
/// `dispatcher` replays deferred commands back through the same console
/// verb table the console thread uses (§4.9), so a command deferred
/// against an interface that didn't exist yet runs exactly as it would
/// have if submitted after the interface appeared.
pub fn apply(state: &AppState, reader: &mut Reader, dispatcher: &Dispatcher<AppState>, msg: ControllerMsg) {
    let section = reader.enter();
    match msg {
        ControllerMsg::LinkCreate(link) => handle_link(state, &section, dispatcher, link),
        ControllerMsg::LinkUpdate(link) => handle_link(state, &section, dispatcher, link),
        ControllerMsg::LinkDelete { ifname } => handle_link_delete(state, &section, &ifname),
        ControllerMsg::AddrAdd(addr) => handle_addr_add(state, &section, addr),
        ControllerMsg::AddrDel(addr) => handle_addr_del(state, &section, addr),
        ControllerMsg::NeighAdd(neigh) => handle_neigh_add(state, &section, neigh),
        ControllerMsg::NeighDel(neigh) => handle_neigh_del(state, &section, neigh),
        ControllerMsg::RouteAdd(route) => handle_route_add(state, route),
        ControllerMsg::RouteDel(route) => handle_route_del(state, route),
        ControllerMsg::VrfCreate { vrf, name } => {
            info!(vrf, %name, "vrf create");
            state.events().publish(Event::VrfCreate { vrf, name });
        }
        ControllerMsg::VrfDelete { vrf } => {
            info!(vrf, "vrf delete");
            state.events().publish(Event::VrfDelete { vrf });
        }
    }
}

/// Creates the interface record on first sight of a name and republishes
/// every link attribute the message carries; assigns the ifindex and
/// replays deferred commands once it arrives (§4.2, §4.8, §4.9).
///
/// The controller channel's wire shape (§6) carries no `IFLA_LINKINFO`
/// equivalent, so a newly-seen name is always allocated as
/// [`InterfaceKind::Ethernet`]; a real netlink feed would need to carry
/// the kind across for VLAN/bridge/tunnel devices.
fn handle_link(state: &AppState, section: &Section<'_>, dispatcher: &Dispatcher<AppState>, link: LinkMsg) {
    let mac_addr = link.mac_addr.unwrap_or(MacAddr::ZERO);

    if state.interfaces().lookup_by_name(section, &link.ifname).is_none() {
        match state
            .interfaces()
            .allocate(section, &link.ifname, InterfaceKind::Ethernet, link.mtu, mac_addr)
        {
            Ok(iface) => {
                state.interfaces().insert_pending(section, iface);
                state.events().publish(Event::IfCreate {
                    ifindex: 0,
                    name: link.ifname.clone(),
                });
            }
            Err(err) => {
                warn!(ifname = %link.ifname, %err, "link create rejected");
                return;
            }
        }
    }

    state.interfaces().set_vrf(section, &link.ifname, link.vrf);
    state.interfaces().set_mtu(section, &link.ifname, link.mtu);
    if let Some(mac_addr) = link.mac_addr {
        state.interfaces().set_mac_addr(section, &link.ifname, mac_addr);
        state.events().publish(Event::IfMacAddrChange { ifindex: link.ifindex.unwrap_or(0) });
    }

    let mut flags = InterfaceFlags::empty();
    flags.set(InterfaceFlags::ADMIN_UP, link.admin_up);
    flags.set(InterfaceFlags::OPER_UP, link.oper_up);
    state.interfaces().set_flags(section, &link.ifname, flags);
    state.events().publish(Event::IfLinkChange {
        ifindex: link.ifindex.unwrap_or(0),
        flags,
    });

    if let Some(ifindex) = link.ifindex {
        let had_index = state
            .interfaces()
            .lookup_by_name(section, &link.ifname)
            .is_some_and(|iface| iface.ifindex != 0);
        if !had_index && state.interfaces().set_index(section, &link.ifname, ifindex, None) {
            state.events().publish(Event::IfIndexSet { ifindex, name: link.ifname.clone() });
            for command in state.deferred().replay(&link.ifname) {
                let line = command.argv.join(" ");
                debug!(ifname = %link.ifname, argv = ?command.argv, "replaying deferred command");
                let (rc, _) = dispatcher.execute(&line);
                if rc != vplane_console::STATUS_OK {
                    warn!(ifname = %link.ifname, argv = ?command.argv, rc, "deferred command replay failed");
                }
            }
        }
    }
}

fn handle_link_delete(state: &AppState, section: &Section<'_>, ifname: &str) {
    let Some(iface) = state.interfaces().lookup_by_name(section, ifname) else {
        return;
    };
    if iface.ifindex != 0 {
        state.events().publish(Event::IfIndexPreUnset { ifindex: iface.ifindex });
        state.interfaces().unset_index(section, ifname);
        state.events().publish(Event::IfIndexUnset { ifindex: iface.ifindex });
        state.deferred().discard(ifname);
    }
    state.interfaces().remove(section, ifname);
    state.events().publish(Event::IfDelete { ifindex: iface.ifindex });
}

fn handle_addr_add(state: &AppState, section: &Section<'_>, msg: AddrMsg) {
    let Some(iface) = state.interfaces().lookup_by_name(section, &msg.ifname) else {
        warn!(ifname = %msg.ifname, "address add for unknown interface");
        return;
    };
    if state
        .interfaces()
        .add_address(section, &msg.ifname, msg.addr, AddressFlags::empty())
    {
        state.events().publish(Event::IfAddrAdd { ifindex: iface.ifindex, addr: msg.addr });
    }
}

fn handle_addr_del(state: &AppState, section: &Section<'_>, msg: AddrMsg) {
    let Some(iface) = state.interfaces().lookup_by_name(section, &msg.ifname) else {
        return;
    };
    if state.interfaces().remove_address(section, &msg.ifname, &msg.addr) {
        state.events().publish(Event::IfAddrDel { ifindex: iface.ifindex, addr: msg.addr });
    }
}

fn handle_neigh_add(state: &AppState, section: &Section<'_>, msg: NeighMsg) {
    let Some(iface) = state.interfaces().lookup_by_name(section, &msg.ifname) else {
        debug!(ifname = %msg.ifname, "neighbour add for unknown interface, dropped");
        return;
    };
    state.fib().insert_arp(iface.vrf, iface.ifindex, msg.addr, msg.lladdr);
}

fn handle_neigh_del(state: &AppState, section: &Section<'_>, msg: NeighMsg) {
    let Some(iface) = state.interfaces().lookup_by_name(section, &msg.ifname) else {
        return;
    };
    state.fib().remove_arp(iface.vrf, iface.ifindex, msg.addr);
}

fn handle_route_add(state: &AppState, msg: RouteAddMsg) {
    let RouteAddMsg { vrf, table_id, prefix, scope, protocol, siblings, replace } = msg;
    let Some((dst, depth)) = split_v4(prefix) else {
        warn!(%prefix, "route add for a non-IPv4 prefix, dropped (IPv4-only FIB)");
        return;
    };
    let siblings: Siblings = siblings.into_iter().map(to_sibling).collect();
    if let Err(err) = state.fib().insert(vrf, dst, depth, table_id, scope, protocol, siblings, replace) {
        warn!(vrf, %prefix, %err, "route add failed");
    }
}

fn handle_route_del(state: &AppState, msg: RouteDelMsg) {
    let RouteDelMsg { vrf, table_id, prefix, scope } = msg;
    let Some((dst, depth)) = split_v4(prefix) else {
        warn!(%prefix, "route delete for a non-IPv4 prefix, dropped (IPv4-only FIB)");
        return;
    };
    if let Err(err) = state.fib().delete(vrf, dst, depth, table_id, scope) {
        debug!(vrf, %prefix, %err, "route delete failed");
    }
}

fn split_v4(network: IpNetwork) -> Option<(Ipv4Addr, u8)> {
    match network {
        IpNetwork::V4(net) => Some((net.ip(), net.prefix())),
        IpNetwork::V6(_) => None,
    }
}

/// Converts the controller channel's pre-intern sibling shape into the
/// interned form `vplane-nexthop` deals in (§3, "Next-hop sibling").
fn to_sibling(spec: SiblingSpec) -> Sibling {
    let mut flags = SiblingFlags::empty();
    flags.set(SiblingFlags::BLACKHOLE, spec.blackhole);
    flags.set(SiblingFlags::REJECT, spec.reject);
    flags.set(SiblingFlags::LOCAL, spec.local);
    flags.set(SiblingFlags::SLOWPATH, spec.slowpath);
    flags.set(SiblingFlags::BROADCAST, spec.broadcast);
    flags.set(SiblingFlags::GATEWAY, spec.gateway.is_some());

    let mut sibling = Sibling::new(spec.ifindex, spec.gateway, flags);
    sibling.labels = spec.labels;
    sibling
}

#[cfg(test)]
mod tests {
    use std::net::IpAddr;

    use vplane_utils::protocol::{Protocol, RT_MAIN, VRF_DEFAULT};

    use super::*;
    use crate::config::Config;

    fn fresh_state() -> AppState {
        AppState::new(&Config::default(), 1)
    }

    fn fresh_dispatcher(state: &AppState) -> Dispatcher<AppState> {
        let (tx, _rx) = crossbeam_channel::unbounded();
        Dispatcher::new(&crate::verbs::VERBS, state.clone(), vplane_console::ControlBridge::new(tx))
    }

    #[test]
    fn link_create_then_index_set_makes_interface_reachable() {
        let state = fresh_state();
        let mut reader = state.domain().register();
        let dispatcher = fresh_dispatcher(&state);

        apply(
            &state,
            &mut reader,
            &dispatcher,
            ControllerMsg::LinkCreate(LinkMsg {
                ifname: "eth0".to_owned(),
                ifindex: Some(7),
                mtu: 1500,
                mac_addr: None,
                vrf: VRF_DEFAULT,
                admin_up: true,
                oper_up: true,
            }),
        );

        let found = state.with_section(|section| state.interfaces().lookup_by_index(section, 7));
        assert!(found.is_some());
        assert!(found.unwrap().is_up());
    }

    #[test]
    fn route_add_on_connected_interface_is_visible_in_dump() {
        let state = fresh_state();
        let mut reader = state.domain().register();
        let dispatcher = fresh_dispatcher(&state);

        apply(
            &state,
            &mut reader,
            &dispatcher,
            ControllerMsg::LinkCreate(LinkMsg {
                ifname: "eth0".to_owned(),
                ifindex: Some(7),
                mtu: 1500,
                mac_addr: None,
                vrf: VRF_DEFAULT,
                admin_up: true,
                oper_up: true,
            }),
        );
        apply(
            &state,
            &mut reader,
            &dispatcher,
            ControllerMsg::RouteAdd(RouteAddMsg {
                vrf: VRF_DEFAULT,
                table_id: RT_MAIN,
                prefix: "192.0.2.0/24".parse().unwrap(),
                scope: vplane_utils::controller::Scope::UNIVERSE,
                protocol: Protocol::CONNECTED,
                siblings: vec![SiblingSpec::connected(7)],
                replace: false,
            }),
        );

        let routes = state.fib().dump_routes(VRF_DEFAULT, RT_MAIN);
        assert!(routes.iter().any(|(net, _, _, active)| net.prefix() == 24 && *active));
    }

    #[test]
    fn neigh_add_for_unknown_interface_is_dropped_not_panicked() {
        let state = fresh_state();
        let mut reader = state.domain().register();
        let dispatcher = fresh_dispatcher(&state);
        apply(
            &state,
            &mut reader,
            &dispatcher,
            ControllerMsg::NeighAdd(NeighMsg {
                ifname: "nonexistent".to_owned(),
                addr: IpAddr::V4(Ipv4Addr::new(192, 0, 2, 1)),
                lladdr: None,
            }),
        );
    }
}
