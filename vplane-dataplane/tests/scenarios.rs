//
// Copyright (c) The VPlane Project Contributors
//
// SPDX-License-Identifier: MIT
//

//! End-to-end scenarios S1-S6 of spec.md §8, driven against a real
//! [`AppState`] the way a controller feed and a console client would.

use std::net::{IpAddr, Ipv4Addr};

use vplane_dataplane::config::Config;
use vplane_dataplane::context::AppState;
use vplane_dataplane::controller::apply;
use vplane_dataplane::verbs::VERBS;
use vplane_nexthop::SiblingFlags;
use vplane_utils::controller::{
    ControllerMsg, LinkMsg, RouteAddMsg, RouteDelMsg, Scope, SiblingSpec,
};
use vplane_utils::mac_addr::MacAddr;
use vplane_utils::protocol::{Protocol, RT_MAIN, VRF_DEFAULT};

fn fresh_state() -> AppState {
    AppState::new(&Config::default(), 2)
}

fn create_link(state: &AppState, name: &str, ifindex: u32) {
    let mut reader = state.domain().register();
    apply(
        state,
        &mut reader,
        ControllerMsg::LinkCreate(LinkMsg {
            ifname: name.to_owned(),
            ifindex: Some(ifindex),
            mtu: 1500,
            mac_addr: Some(MacAddr::from([0x02, 0x00, 0x00, 0x00, 0x00, ifindex as u8])),
            vrf: VRF_DEFAULT,
            admin_up: true,
            oper_up: true,
        }),
    );
}

fn run_verb(state: &AppState, line: &str) -> String {
    let mut tokens = line.split_whitespace();
    let verb = tokens.next().expect("non-empty command");
    let argv: Vec<&str> = tokens.collect();
    let spec = VERBS.get(verb).expect("known verb");
    let mut out = Vec::new();
    (spec.handler)(state, &mut out, &argv);
    String::from_utf8(out).unwrap()
}

/// S1. Single /24 on a connected interface: a neighbour insert creates
/// a NEIGH_CREATED /32 without disturbing the /24 itself.
#[test]
fn s1_single_connected_prefix_and_arp_derived_host_route() {
    let state = fresh_state();
    create_link(&state, "dp1", 100);

    state
        .fib()
        .insert(
            VRF_DEFAULT,
            Ipv4Addr::new(10, 0, 0, 0),
            24,
            RT_MAIN,
            Scope::LINK,
            Protocol::KERNEL,
            [vplane_nexthop::Sibling::connected(100)].into_iter().collect(),
            false,
        )
        .expect("connected /24 insert succeeds");

    let routes = state.fib().dump_routes(VRF_DEFAULT, RT_MAIN);
    assert!(routes.iter().any(|(net, _, _, active)| net.prefix() == 24 && *active));

    let before = routes.len();
    state
        .fib()
        .insert_arp(VRF_DEFAULT, 100, IpAddr::V4(Ipv4Addr::new(10, 0, 0, 7)), None);

    let after = state.fib().dump_routes(VRF_DEFAULT, RT_MAIN);
    assert_eq!(after.len(), before + 1, "exactly one /32 materialized");
    let host = after
        .iter()
        .find(|(net, _, _, _)| net.prefix() == 32)
        .expect("host route present");
    let section_group = state.with_section(|section| {
        state.fib().pool.get(section, host.2).map(|g| g.siblings[0].flags)
    });
    assert!(section_group.unwrap().contains(SiblingFlags::NEIGH_CREATED));

    // The /24 itself is untouched.
    assert!(after.iter().any(|(net, _, _, active)| net.prefix() == 24 && *active));
}

/// S2. ECMP across two gateways: both siblings get selected across
/// enough distinct flow hashes, DEAD pins to the other, both-DEAD drops.
#[test]
fn s2_ecmp_path_selection_and_dead_sibling_failover() {
    let state = fresh_state();
    create_link(&state, "dp1", 100);
    create_link(&state, "dp2", 101);

    let gw_a: IpAddr = "10.0.0.2".parse().unwrap();
    let gw_b: IpAddr = "10.0.2.2".parse().unwrap();
    state
        .fib()
        .insert(
            VRF_DEFAULT,
            Ipv4Addr::new(10, 1, 0, 0),
            16,
            RT_MAIN,
            Scope::UNIVERSE,
            Protocol::STATIC,
            [
                vplane_nexthop::Sibling::via_gateway(100, gw_a),
                vplane_nexthop::Sibling::via_gateway(101, gw_b),
            ]
            .into_iter()
            .collect(),
            false,
        )
        .unwrap();

    let dst = Ipv4Addr::new(10, 1, 5, 5);
    let mut seen_a = false;
    let mut seen_b = false;
    state.with_section(|section| {
        for flow_hash in 0..32u64 {
            let Some(sibling) = state.fib().lookup_forward(section, VRF_DEFAULT, RT_MAIN, dst, flow_hash) else {
                continue;
            };
            match sibling.target.ifindex() {
                100 => seen_a = true,
                101 => seen_b = true,
                _ => unreachable!(),
            }
        }
    });
    assert!(seen_a && seen_b, "both siblings observed across distinct flow hashes");

    // Mark sibling 0 (ifindex 100) DEAD: every lookup now returns sibling 1.
    let nh_index = state
        .with_section(|section| state.fib().lookup_forward(section, VRF_DEFAULT, RT_MAIN, dst, 0).is_some());
    assert!(nh_index);

    let group_index = state
        .fib()
        .dump_routes(VRF_DEFAULT, RT_MAIN)
        .into_iter()
        .find(|(net, _, _, active)| net.prefix() == 16 && *active)
        .map(|(_, _, idx, _)| idx)
        .unwrap();

    state.with_section(|section| {
        let mut siblings = state.fib().pool.get(section, group_index).unwrap().siblings.clone();
        siblings[0].flags |= SiblingFlags::DEAD;
        state.fib().pool.replace_in_place(section, group_index, siblings);
    });

    state.with_section(|section| {
        for flow_hash in 0..16u64 {
            let sibling = state
                .fib()
                .lookup_forward(section, VRF_DEFAULT, RT_MAIN, dst, flow_hash)
                .expect("one sibling still alive");
            assert_eq!(sibling.target.ifindex(), 101);
        }
    });

    state.with_section(|section| {
        let mut siblings = state.fib().pool.get(section, group_index).unwrap().siblings.clone();
        siblings[1].flags |= SiblingFlags::DEAD;
        state.fib().pool.replace_in_place(section, group_index, siblings);
    });
    state.with_section(|section| {
        assert!(state
            .fib()
            .lookup_forward(section, VRF_DEFAULT, RT_MAIN, dst, 0)
            .is_none());
    });
}

/// S3. A higher-scope add shadows a lower-scope rule; deleting the
/// higher-scope rule promotes the original back to active.
#[test]
fn s3_scope_demotion_by_higher_scope_add() {
    let state = fresh_state();
    create_link(&state, "dp1", 100);
    create_link(&state, "dp2", 101);

    let gw_a: IpAddr = "10.0.0.2".parse().unwrap();
    let gw_b: IpAddr = "10.0.0.3".parse().unwrap();

    apply(
        &state,
        &mut state.domain().register(),
        ControllerMsg::RouteAdd(RouteAddMsg {
            vrf: VRF_DEFAULT,
            table_id: RT_MAIN,
            prefix: "10.2.0.0/16".parse().unwrap(),
            scope: Scope::UNIVERSE,
            protocol: Protocol::STATIC,
            siblings: vec![SiblingSpec::via_gateway(100, gw_a)],
            replace: false,
        }),
    );
    apply(
        &state,
        &mut state.domain().register(),
        ControllerMsg::RouteAdd(RouteAddMsg {
            vrf: VRF_DEFAULT,
            table_id: RT_MAIN,
            prefix: "10.2.0.0/16".parse().unwrap(),
            scope: Scope::LINK,
            protocol: Protocol::STATIC,
            siblings: vec![SiblingSpec::via_gateway(101, gw_b)],
            replace: false,
        }),
    );

    let dst = Ipv4Addr::new(10, 2, 0, 5);
    state.with_section(|section| {
        let sibling = state
            .fib()
            .lookup_forward(section, VRF_DEFAULT, RT_MAIN, dst, 0)
            .unwrap();
        assert_eq!(sibling.gateway, Some(gw_b));
    });

    apply(
        &state,
        &mut state.domain().register(),
        ControllerMsg::RouteDel(RouteDelMsg {
            vrf: VRF_DEFAULT,
            table_id: RT_MAIN,
            prefix: "10.2.0.0/16".parse().unwrap(),
            scope: Scope::LINK,
        }),
    );

    state.with_section(|section| {
        let sibling = state
            .fib()
            .lookup_forward(section, VRF_DEFAULT, RT_MAIN, dst, 0)
            .unwrap();
        assert_eq!(sibling.gateway, Some(gw_a));
    });
}

/// S4. Replacing a connected /24 with an all-BLACKHOLE group removes
/// its NEIGH_CREATED /32s via subtree cleanup.
#[test]
fn s4_replace_with_cover_change_removes_neigh_created_subtree() {
    let state = fresh_state();
    create_link(&state, "dp1", 100);

    state
        .fib()
        .insert(
            VRF_DEFAULT,
            Ipv4Addr::new(10, 3, 0, 0),
            24,
            RT_MAIN,
            Scope::LINK,
            Protocol::KERNEL,
            [vplane_nexthop::Sibling::connected(100)].into_iter().collect(),
            false,
        )
        .unwrap();

    state
        .fib()
        .insert_arp(VRF_DEFAULT, 100, IpAddr::V4(Ipv4Addr::new(10, 3, 0, 5)), None);
    state
        .fib()
        .insert_arp(VRF_DEFAULT, 100, IpAddr::V4(Ipv4Addr::new(10, 3, 0, 6)), None);

    let before = state.fib().dump_routes(VRF_DEFAULT, RT_MAIN);
    assert_eq!(before.iter().filter(|(net, _, _, _)| net.prefix() == 32).count(), 2);

    state
        .fib()
        .insert(
            VRF_DEFAULT,
            Ipv4Addr::new(10, 3, 0, 0),
            24,
            RT_MAIN,
            Scope::LINK,
            Protocol::STATIC,
            [vplane_nexthop::Sibling::blackhole()].into_iter().collect(),
            true,
        )
        .unwrap();

    let after = state.fib().dump_routes(VRF_DEFAULT, RT_MAIN);
    assert_eq!(after.iter().filter(|(net, _, _, _)| net.prefix() == 32).count(), 0);

    state.with_section(|section| {
        let sibling = state
            .fib()
            .lookup_forward(section, VRF_DEFAULT, RT_MAIN, Ipv4Addr::new(10, 3, 0, 5), 0)
            .unwrap();
        assert!(sibling.flags.contains(SiblingFlags::BLACKHOLE));
    });
}

/// S5. A command naming a not-yet-existing interface is cached and
/// replayed exactly once when the interface's index appears.
#[test]
fn s5_deferred_command_replay_exactly_once() {
    let state = fresh_state();

    state.deferred().defer(
        "dp2",
        vplane_interface::deferred::DeferredKind::Add,
        vplane_interface::deferred::DeferredCommand {
            argv: vec!["speed".into(), "set".into(), "dp2".into(), "1000".into(), "full".into()],
        },
    );
    assert_eq!(state.deferred().pending_count("dp2"), 1);

    create_link(&state, "dp2", 55);

    assert_eq!(state.deferred().pending_count("dp2"), 0);
    assert_eq!(state.deferred().stats().replayed, 1);

    // A second index announcement for the same name does not replay
    // again because nothing is pending any more.
    create_link(&state, "dp2", 55);
    assert_eq!(state.deferred().stats().replayed, 1);
}

/// S6. The `reset` verb, run the way the control thread would run it,
/// tears every table down so a subsequent show command reports empty
/// state.
#[test]
fn s6_reset_clears_all_state() {
    let state = fresh_state();
    create_link(&state, "dp1", 100);
    assert!(run_verb(&state, "ifconfig").contains("dp1"));

    let spec = VERBS.get("reset").unwrap();
    let mut out = Vec::new();
    let rc = (spec.handler)(&state, &mut out, &[]);
    assert_eq!(rc, 0);

    assert!(!run_verb(&state, "ifconfig").contains("dp1"));
}
