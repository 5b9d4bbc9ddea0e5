//
// Copyright (c) The VPlane Project Contributors
//
// SPDX-License-Identifier: MIT
//

//! The concrete verb table (§6, "Command surface"): one handler per
//! console command, backed by the real interface/FIB/next-hop state for
//! the verbs this crate implements, and a uniform NOT_NEEDED stub (§4.11)
//! for the verbs that name a peripheral subsystem out of scope (`npf-op`,
//! `qos`, `ipsec`, `vxlan`, ...).

use std::io::Write;

use phf::phf_map;
use vplane_console::{CommandSpec, CommandTable, STATUS_ERROR, STATUS_OK};
use vplane_utils::protocol::{RT_MAIN, VRF_DEFAULT};

use crate::context::AppState;

pub static VERBS: CommandTable<AppState> = phf_map! {
    "help" => CommandSpec { version: 1, help: "list commands", on_control_thread: false, handler: cmd_help },
    "ifconfig" => CommandSpec { version: 1, help: "show interfaces", on_control_thread: false, handler: cmd_ifconfig },
    "arp" => CommandSpec { version: 1, help: "show ARP/ND neighbours", on_control_thread: false, handler: cmd_arp },
    "route" => CommandSpec { version: 1, help: "show the IPv4 FIB", on_control_thread: false, handler: cmd_route },
    "route6" => CommandSpec { version: 1, help: "show the IPv6 FIB (not built)", on_control_thread: false, handler: cmd_not_needed },
    "ecmp" => CommandSpec { version: 1, help: "show next-hop group path selection", on_control_thread: false, handler: cmd_ecmp },
    "fal" => CommandSpec { version: 1, help: "show hardware-shadow offload state", on_control_thread: false, handler: cmd_fal },
    "netstat" => CommandSpec { version: 1, help: "show FIB insert/delete/offload counters", on_control_thread: false, handler: cmd_netstat },
    "incomplete" => CommandSpec { version: 1, help: "show deferred interface-config stats", on_control_thread: false, handler: cmd_incomplete },
    "debug" => CommandSpec { version: 1, help: "get/set debug flags", on_control_thread: false, handler: cmd_debug },
    "log" => CommandSpec { version: 1, help: "show the live debug bitmask", on_control_thread: false, handler: cmd_log },
    "vrf" => CommandSpec { version: 1, help: "show known VRFs (ack-only, no VRF registry)", on_control_thread: false, handler: cmd_vrf },
    "reset" => CommandSpec { version: 1, help: "reset configuration state", on_control_thread: true, handler: cmd_reset },
    "pipeline" => CommandSpec { version: 1, help: "pipeline graph introspection (not built)", on_control_thread: false, handler: cmd_not_needed },
    "mpls" => CommandSpec { version: 1, help: "MPLS label operations (not built)", on_control_thread: false, handler: cmd_not_needed },
    "bridge" => CommandSpec { version: 1, help: "L2 bridging (not built)", on_control_thread: false, handler: cmd_not_needed },
    "multicast" => CommandSpec { version: 1, help: "multicast forwarding (not built)", on_control_thread: false, handler: cmd_not_needed },
    "affinity" => CommandSpec { version: 1, help: "CPU affinity (not built)", on_control_thread: false, handler: cmd_not_needed },
    "cpu" => CommandSpec { version: 1, help: "per-CPU stats (not built)", on_control_thread: false, handler: cmd_not_needed },
    "memory" => CommandSpec { version: 1, help: "memory accounting (not built)", on_control_thread: false, handler: cmd_not_needed },
    "ring" => CommandSpec { version: 1, help: "NIC ring diagnostics (not built)", on_control_thread: false, handler: cmd_not_needed },
    "slowpath" => CommandSpec { version: 1, help: "slow-path punt stats (not built)", on_control_thread: false, handler: cmd_not_needed },
    "hotplug" => CommandSpec { version: 1, help: "port hotplug (not built)", on_control_thread: false, handler: cmd_not_needed },
    "capture" => CommandSpec { version: 1, help: "packet capture (out of scope)", on_control_thread: false, handler: cmd_not_needed },
    "nd6" => CommandSpec { version: 1, help: "IPv6 neighbour discovery (not built)", on_control_thread: false, handler: cmd_not_needed },
    "npf-op" => CommandSpec { version: 1, help: "firewall/NAT filtering (out of scope)", on_control_thread: false, handler: cmd_not_needed },
    "nat-op" => CommandSpec { version: 1, help: "NAT operations (out of scope)", on_control_thread: false, handler: cmd_not_needed },
    "qos" => CommandSpec { version: 1, help: "QoS scheduling (out of scope)", on_control_thread: false, handler: cmd_not_needed },
    "storm-ctl" => CommandSpec { version: 1, help: "storm control (not built)", on_control_thread: false, handler: cmd_not_needed },
    "lag" => CommandSpec { version: 1, help: "link aggregation (not built)", on_control_thread: false, handler: cmd_not_needed },
    "led" => CommandSpec { version: 1, help: "port LED control (not built)", on_control_thread: false, handler: cmd_not_needed },
    "portmonitor" => CommandSpec { version: 1, help: "port mirroring (not built)", on_control_thread: false, handler: cmd_not_needed },
    "switch" => CommandSpec { version: 1, help: "switch-chip control (not built)", on_control_thread: false, handler: cmd_not_needed },
    "vhost" => CommandSpec { version: 1, help: "vhost-user device (out of scope)", on_control_thread: false, handler: cmd_not_needed },
    "vhost-client" => CommandSpec { version: 1, help: "vhost-user client (out of scope)", on_control_thread: false, handler: cmd_not_needed },
    "vlan_mod" => CommandSpec { version: 1, help: "VLAN sub-interface module (not built)", on_control_thread: false, handler: cmd_not_needed },
    "l2tpeth" => CommandSpec { version: 1, help: "L2TPv3 pseudowire (not built)", on_control_thread: false, handler: cmd_not_needed },
    "vxlan" => CommandSpec { version: 1, help: "VXLAN tunnelling (not built)", on_control_thread: false, handler: cmd_not_needed },
    "ipsec" => CommandSpec { version: 1, help: "IPsec SA management (out of scope)", on_control_thread: false, handler: cmd_not_needed },
    "session-op" => CommandSpec { version: 1, help: "session-based filtering (not built)", on_control_thread: false, handler: cmd_not_needed },
    "snmp" => CommandSpec { version: 1, help: "SNMP MIB formatting (out of scope)", on_control_thread: false, handler: cmd_not_needed },
    "poe" => CommandSpec { version: 1, help: "Power-over-Ethernet control (not built)", on_control_thread: false, handler: cmd_not_needed },
    "ptp" => CommandSpec { version: 1, help: "Precision Time Protocol (not built)", on_control_thread: false, handler: cmd_not_needed },
    "local" => CommandSpec { version: 1, help: "local delivery stats (not built)", on_control_thread: false, handler: cmd_not_needed },
};

fn cmd_help(_ctx: &AppState, out: &mut dyn Write, _argv: &[&str]) -> i32 {
    let mut names: Vec<&str> = VERBS.keys().copied().collect();
    names.sort_unstable();
    for name in names {
        let spec = &VERBS[name];
        let _ = writeln!(out, "{name:<16}{}", spec.help);
    }
    STATUS_OK
}

fn cmd_ifconfig(ctx: &AppState, out: &mut dyn Write, _argv: &[&str]) -> i32 {
    ctx.with_section(|section| {
        ctx.interfaces().walk(section, |iface| {
            let _ = writeln!(
                out,
                "{} ifindex={} port={:?} mtu={} vrf={} mac={} up={} addrs={}",
                iface.name,
                iface.ifindex,
                iface.port,
                iface.mtu,
                iface.vrf,
                iface.mac_addr,
                iface.is_up(),
                iface.addresses.len(),
            );
        });
    });
    STATUS_OK
}

fn cmd_arp(ctx: &AppState, out: &mut dyn Write, _argv: &[&str]) -> i32 {
    ctx.fib().neighbours.walk(|entry| {
        let _ = writeln!(out, "ifindex={} addr={} lladdr={:?}", entry.ifindex, entry.address, entry.lladdr);
    });
    STATUS_OK
}

fn cmd_route(ctx: &AppState, out: &mut dyn Write, argv: &[&str]) -> i32 {
    let vrf = argv.first().and_then(|s| s.parse().ok()).unwrap_or(VRF_DEFAULT);
    let routes = ctx.fib().dump_routes(vrf, RT_MAIN);
    if routes.is_empty() {
        let _ = writeln!(out, "no routes");
    }
    for (prefix, scope, nh_index, active) in routes {
        let _ = writeln!(out, "{prefix} scope={scope} nh={nh_index} active={active}");
    }
    STATUS_OK
}

fn cmd_ecmp(ctx: &AppState, out: &mut dyn Write, argv: &[&str]) -> i32 {
    let Some(index) = argv.first().and_then(|s| s.parse::<u32>().ok()) else {
        let _ = writeln!(out, "usage: ecmp <nh-index>");
        return STATUS_ERROR;
    };
    ctx.with_section(|section| {
        let Some(group) = ctx.fib().pool.get(section, index) else {
            let _ = writeln!(out, "no such next-hop group");
            return;
        };
        let _ = writeln!(out, "group {index} proto={} refcount={} pd_state={}", group.proto, group.refcount, group.pd_state);
        for sibling in group.siblings.iter() {
            let _ = writeln!(
                out,
                "  target={:?} gateway={:?} flags={:?} dead={}",
                sibling.target,
                sibling.gateway,
                sibling.flags,
                sibling.is_dead(),
            );
        }
    });
    STATUS_OK
}

fn cmd_fal(ctx: &AppState, out: &mut dyn Write, argv: &[&str]) -> i32 {
    let Some(index) = argv.first().and_then(|s| s.parse::<u32>().ok()) else {
        let _ = writeln!(out, "usage: fal <nh-index>");
        return STATUS_ERROR;
    };
    ctx.with_section(|section| match ctx.fib().pool.pd_state(section, index) {
        Some(state) => {
            let _ = writeln!(out, "nh {index} pd_state={state}");
        }
        None => {
            let _ = writeln!(out, "no such next-hop group");
        }
    });
    STATUS_OK
}

fn cmd_netstat(ctx: &AppState, out: &mut dyn Write, _argv: &[&str]) -> i32 {
    let fib = ctx.fib();
    let stats = fib.stats();
    let route_sw = stats.route_software_snapshot();
    let route_hw = stats.route_hardware_snapshot();
    let _ = writeln!(
        out,
        "route software: full={} not_needed={} no_resource={} error={}",
        route_sw.full, route_sw.not_needed, route_sw.no_resource, route_sw.error,
    );
    let _ = writeln!(
        out,
        "route hardware: full={} not_needed={} no_resource={} error={}",
        route_hw.full, route_hw.not_needed, route_hw.no_resource, route_hw.error,
    );
    STATUS_OK
}

fn cmd_incomplete(ctx: &AppState, out: &mut dyn Write, _argv: &[&str]) -> i32 {
    let stats = ctx.deferred().stats();
    let _ = writeln!(
        out,
        "replayed={} missed_add={} missed_update={} missed_delete={}",
        stats.replayed, stats.missed_add, stats.missed_update, stats.missed_delete,
    );
    STATUS_OK
}

fn cmd_debug(ctx: &AppState, out: &mut dyn Write, argv: &[&str]) -> i32 {
    let Some(arg) = argv.first() else {
        let _ = writeln!(out, "{}", ctx.debug().show());
        return STATUS_OK;
    };
    match ctx.debug().apply(arg) {
        Ok(()) => STATUS_OK,
        Err(flag) => {
            let _ = writeln!(out, "unknown debug flag: {flag}");
            STATUS_ERROR
        }
    }
}

fn cmd_log(ctx: &AppState, out: &mut dyn Write, _argv: &[&str]) -> i32 {
    let _ = writeln!(out, "{}", ctx.debug().show());
    STATUS_OK
}

fn cmd_vrf(ctx: &AppState, out: &mut dyn Write, _argv: &[&str]) -> i32 {
    let vrfs: std::collections::BTreeSet<u32> =
        ctx.with_section(|section| {
            let mut set = std::collections::BTreeSet::new();
            ctx.interfaces().walk(section, |iface| {
                set.insert(iface.vrf);
            });
            set
        });
    for vrf in vrfs {
        let _ = writeln!(out, "vrf {vrf}");
    }
    STATUS_OK
}

/// Runs on the control thread (§4.10, "Thread routing"): tears down and
/// recreates the interface/FIB/deferred state so tests (and operators)
/// get a clean slate without restarting the process (§9, "Global
/// mutable state... tests require a reset hook"). A control-thread
/// handler produces no text payload, only a status.
fn cmd_reset(ctx: &AppState, _out: &mut dyn Write, _argv: &[&str]) -> i32 {
    ctx.reset();
    STATUS_OK
}

fn cmd_not_needed(_ctx: &AppState, out: &mut dyn Write, _argv: &[&str]) -> i32 {
    let _ = writeln!(out, "NOT_NEEDED: no backend for this subsystem in this build");
    STATUS_OK
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn help_lists_every_verb() {
        let ctx = AppState::new(&Config::default(), 1);
        let mut out = Vec::new();
        assert_eq!(cmd_help(&ctx, &mut out, &[]), STATUS_OK);
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("ifconfig"));
        assert!(text.contains("route"));
    }

    #[test]
    fn unsupported_subsystem_returns_not_needed_but_ok_status() {
        let ctx = AppState::new(&Config::default(), 1);
        let mut out = Vec::new();
        assert_eq!(cmd_not_needed(&ctx, &mut out, &[]), STATUS_OK);
        assert!(String::from_utf8(out).unwrap().contains("NOT_NEEDED"));
    }

    #[test]
    fn debug_set_then_show_reports_flag() {
        let ctx = AppState::new(&Config::default(), 1);
        let mut out = Vec::new();
        assert_eq!(cmd_debug(&ctx, &mut out, &["arp"]), STATUS_OK);
        out.clear();
        cmd_debug(&ctx, &mut out, &[]);
        assert!(String::from_utf8(out).unwrap().contains("arp"));
    }
}
