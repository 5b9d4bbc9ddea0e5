//
// Copyright (c) The VPlane Project Contributors
//
// SPDX-License-Identifier: MIT
//

//! The FIB coordinator (component C5): the mediator between the LPM
//! trie, the next-hop pool, the neighbour table, interface events and
//! the hardware shadow. This is where route insert/delete link and
//! unlink ARP-derived host routes into next-hop groups (§4.5).

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::{Arc, Mutex};

use ipnetwork::Ipv4Network;
use vplane_epoch::{Domain, Reader};
use vplane_fal::Fal;
use vplane_lpm::{AddOutcome, DeleteOutcome, LpmTrie};
use vplane_nexthop::group::Siblings;
use vplane_nexthop::sibling::Target;
use vplane_nexthop::{NextHopPool, Sibling, SiblingFlags};
use vplane_utils::controller::Scope;
use vplane_utils::protocol::{Protocol, RT_LOCAL, RT_MAIN, RT_UNSPEC};

use crate::neighbour::{NeighbourEntry, NeighbourTable};
use crate::stats::FibStats;

#[derive(Debug, Eq, PartialEq)]
pub enum FibError {
    InvalidTable,
    NoMemory,
    NoSpace { table_id: u32 },
    NotFound,
}

impl std::fmt::Display for FibError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FibError::InvalidTable => write!(f, "RT_UNSPEC is not a valid table id"),
            FibError::NoMemory => write!(f, "next-hop group allocation failed (ENOMEM)"),
            FibError::NoSpace { table_id } => {
                write!(f, "LPM table {table_id} is out of space")
            }
            FibError::NotFound => write!(f, "no matching rule"),
        }
    }
}

impl std::error::Error for FibError {}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
struct TableKey {
    vrf: u32,
    table_id: u32,
}

/// The FIB coordinator. One instance per process; owns every per-VRF
/// LPM table, the next-hop pool, and the neighbour table (§4.5, §4.6).
pub struct Fib {
    domain: Domain,
    tables: Mutex<HashMap<TableKey, Arc<LpmTrie>>>,
    pub pool: NextHopPool,
    pub neighbours: NeighbourTable,
    fal: Arc<dyn Fal>,
    stats: FibStats,
    /// Serializes the whole insert/delete/link-arp choreography, not
    /// just individual table mutations (§5, "the route mutex").
    route_mutex: Mutex<()>,
    control_reader: Mutex<Reader>,
}

impl std::fmt::Debug for Fib {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fib").finish_non_exhaustive()
    }
}

fn is_connected(sibling: &Sibling) -> bool {
    sibling.is_connected()
}

/// Whether `addr` falls inside `net`, without relying on the exact
/// `ipnetwork` containment API beyond the prefix/address accessors
/// already used by `vplane-lpm`.
fn addr_in_network(addr: Ipv4Addr, net: Ipv4Network) -> bool {
    let prefix = net.prefix();
    let mask = if prefix == 0 { 0 } else { u32::MAX << (32 - prefix) };
    (u32::from(addr) & mask) == (u32::from(net.ip()) & mask)
}

impl Fib {
    pub fn new(domain: Domain, pool: NextHopPool, fal: Arc<dyn Fal>) -> Self {
        let control_reader = domain.register();
        Fib {
            domain,
            tables: Mutex::new(HashMap::new()),
            pool,
            neighbours: NeighbourTable::new(),
            fal,
            stats: FibStats::new(),
            route_mutex: Mutex::new(()),
            control_reader: Mutex::new(control_reader),
        }
    }

    pub fn domain(&self) -> &Domain {
        &self.domain
    }

    pub fn stats(&self) -> &FibStats {
        &self.stats
    }

    fn with_section<R>(&self, f: impl FnOnce(&vplane_epoch::Section<'_>) -> R) -> R {
        let mut reader = self.control_reader.lock().unwrap();
        let section = reader.enter();
        f(&section)
    }

    /// Rewrites `RT_LOCAL` to `RT_MAIN` and rejects `RT_UNSPEC` (§4.5,
    /// step 1 of both `insert` and `delete`).
    fn normalize_table_id(table_id: u32) -> Result<u32, FibError> {
        if table_id == RT_UNSPEC {
            return Err(FibError::InvalidTable);
        }
        Ok(if table_id == RT_LOCAL { RT_MAIN } else { table_id })
    }

    /// Dumps every rule of `vrf`/`table_id`'s table, for the console
    /// `route` verb; `RT_LOCAL` normalizes to `RT_MAIN` the same way
    /// `insert`/`delete` do. An unknown table id (`RT_UNSPEC`) or a
    /// table nothing has ever routed into yields an empty list rather
    /// than an error, since "show route" against a quiet VRF is not a
    /// failure.
    pub fn dump_routes(&self, vrf: u32, table_id: u32) -> Vec<(Ipv4Network, Scope, u32, bool)> {
        let Ok(table_id) = Self::normalize_table_id(table_id) else {
            return Vec::new();
        };
        let table = self.table(vrf, table_id);
        let mut out = Vec::new();
        self.with_section(|section| {
            table.walk(section, |net, scope, nh_index, active| {
                out.push((net, scope, nh_index, active));
            });
        });
        out
    }

    fn table(&self, vrf: u32, table_id: u32) -> Arc<LpmTrie> {
        let mut tables = self.tables.lock().unwrap();
        tables
            .entry(TableKey { vrf, table_id })
            .or_insert_with(|| {
                Arc::new(LpmTrie::new(self.domain.clone(), self.pool.blackhole_index()))
            })
            .clone()
    }

    /// `insert` (§4.5).
    #[allow(clippy::too_many_arguments)]
    pub fn insert(
        &self,
        vrf: u32,
        dst: Ipv4Addr,
        depth: u8,
        table_id: u32,
        scope: Scope,
        proto: Protocol,
        mut siblings: Siblings,
        replace: bool,
    ) -> Result<(), FibError> {
        let table_id = Self::normalize_table_id(table_id)?;
        let table = self.table(vrf, table_id);
        let network = Ipv4Network::new(dst, depth).expect("depth <= 32 validated by caller");

        if depth == 32 {
            for sibling in siblings.iter_mut() {
                if sibling.gateway.is_none()
                    && !sibling
                        .flags
                        .contains(vplane_nexthop::SiblingFlags::GATEWAY)
                {
                    sibling.gateway = Some(IpAddr::V4(dst));
                }
            }
        }

        let result = self.with_section(|section| {
            self.pool.intern(section, siblings, proto)
        });
        let outcome = result.map_err(|_| FibError::NoMemory)?;

        let _route_guard = self.route_mutex.lock().unwrap();
        self.with_section(|section| {
            if replace && let Some(old_index) = table.lookup_exact(section, network) {
                self.unlink_arp(section, &table, network, old_index);
                table.delete(section, network, scope);
                self.pool.release(section, old_index);
            }

            let add_outcome = table.add(section, network, scope, outcome.index);
            match add_outcome {
                AddOutcome::NoSpace => {
                    self.pool.release(section, outcome.index);
                    return Err(FibError::NoSpace { table_id });
                }
                AddOutcome::LowerScopeExists => {
                    let siblings = self
                        .pool
                        .get(section, outcome.index)
                        .map(|g| g.siblings.clone())
                        .unwrap_or_default();
                    self.fal.ip4_upd_route(
                        vrf,
                        dst,
                        depth,
                        table_id,
                        &siblings,
                        self.pool.get(section, outcome.index).and_then(|g| g.hw_handle),
                    );
                }
                AddOutcome::Success => {
                    let siblings = self
                        .pool
                        .get(section, outcome.index)
                        .map(|g| g.siblings.clone())
                        .unwrap_or_default();
                    self.fal.ip4_new_route(
                        vrf,
                        dst,
                        depth,
                        table_id,
                        &siblings,
                        self.pool.get(section, outcome.index).and_then(|g| g.hw_handle),
                    );
                }
                AddOutcome::AlreadyExists | AddOutcome::HigherScopeExists => {}
            }

            self.link_arp(section, &table, network, outcome.index);
            self.stats.inserts.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            Ok(())
        })
    }

    /// `delete` (§4.5).
    pub fn delete(
        &self,
        vrf: u32,
        dst: Ipv4Addr,
        depth: u8,
        table_id: u32,
        scope: Scope,
    ) -> Result<(), FibError> {
        let table_id = Self::normalize_table_id(table_id)?;
        let table = self.table(vrf, table_id);
        let network = Ipv4Network::new(dst, depth).expect("depth <= 32 validated by caller");

        let _route_guard = self.route_mutex.lock().unwrap();
        self.with_section(|section| {
            let Some(old_index) = table.lookup_exact(section, network) else {
                return Err(FibError::NotFound);
            };
            self.unlink_arp(section, &table, network, old_index);

            let outcome = table.delete(section, network, scope);
            match outcome {
                DeleteOutcome::NotFound => return Err(FibError::NotFound),
                DeleteOutcome::Shadowed { displaced_nh_index }
                | DeleteOutcome::Promoted { displaced_nh_index, .. }
                | DeleteOutcome::Removed { displaced_nh_index } => {
                    self.pool.release(section, displaced_nh_index);
                    self.fal.ip4_del_route(vrf, dst, depth, table_id);
                }
            }

            if let Some((cover_network, cover_index)) = table.find_cover(section, network) {
                self.relink_arp(section, &table, cover_network, cover_index);
            }

            self.stats.deletes.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            Ok(())
        })
    }

    /// `lookup_forward` (§4.5): the fast-path entry point.
    pub fn lookup_forward<'s>(
        &self,
        section: &'s vplane_epoch::Section<'_>,
        vrf: u32,
        table_id: u32,
        dst: Ipv4Addr,
        flow_hash: u64,
    ) -> Option<&'s Sibling> {
        let tables = self.tables.lock().unwrap();
        let table = tables.get(&TableKey { vrf, table_id })?.clone();
        drop(tables);
        let index = table.lookup(section, dst)?;
        self.pool.select(section, index, flow_hash)
    }

    // ===== link-arp / unlink-arp (§4.5) =====

    fn link_arp(
        &self,
        section: &vplane_epoch::Section<'_>,
        table: &LpmTrie,
        network: Ipv4Network,
        index: u32,
    ) {
        let Some(group) = self.pool.get(section, index) else {
            return;
        };
        let group_any_connected = group.is_any_connected();

        if group_any_connected {
            self.cleanup_neigh_created_subtree(section, table, network);
        } else if let Some((cover_network, cover_index)) = table.find_cover(section, network)
            && self
                .pool
                .get(section, cover_index)
                .is_some_and(|g| g.is_any_connected())
        {
            self.cleanup_neigh_created_subtree(section, table, cover_network);
        }

        let siblings = group.siblings.clone();
        for sibling in siblings.iter() {
            if !is_connected(sibling) {
                continue;
            }
            let ifindex = sibling.target.ifindex();
            let matches: Vec<NeighbourEntry> = {
                let mut found = Vec::new();
                self.neighbours.walk_interface(ifindex, |entry| {
                    if addr_in_network(to_v4(entry.address), network) {
                        found.push(*entry);
                    }
                });
                found
            };
            for neighbour in matches {
                self.insert_arp_locked(section, table, neighbour);
            }
        }
    }

    fn unlink_arp(
        &self,
        section: &vplane_epoch::Section<'_>,
        table: &LpmTrie,
        network: Ipv4Network,
        index: u32,
    ) {
        let departing_any_connected = self
            .pool
            .get(section, index)
            .is_some_and(|g| g.is_any_connected());
        let cover_any_connected = table
            .find_cover(section, network)
            .and_then(|(_, cover_index)| self.pool.get(section, cover_index))
            .is_some_and(|g| g.is_any_connected());

        if departing_any_connected || cover_any_connected {
            self.cleanup_neigh_created_subtree(section, table, network);
        }
    }

    fn relink_arp(
        &self,
        section: &vplane_epoch::Section<'_>,
        table: &LpmTrie,
        cover_network: Ipv4Network,
        cover_index: u32,
    ) {
        let Some(group) = self.pool.get(section, cover_index) else {
            return;
        };
        let siblings = group.siblings.clone();
        for sibling in siblings.iter() {
            if !is_connected(sibling) {
                continue;
            }
            let ifindex = sibling.target.ifindex();
            let matches: Vec<NeighbourEntry> = {
                let mut found = Vec::new();
                self.neighbours.walk_interface(ifindex, |entry| {
                    if addr_in_network(to_v4(entry.address), cover_network) {
                        found.push(*entry);
                    }
                });
                found
            };
            for neighbour in matches {
                self.insert_arp_locked(section, table, neighbour);
            }
        }
    }

    fn cleanup_neigh_created_subtree(
        &self,
        section: &vplane_epoch::Section<'_>,
        table: &LpmTrie,
        network: Ipv4Network,
    ) {
        let mut to_delete = Vec::new();
        table.subtree_walk(section, network, |net, scope, nh_index, _active| {
            if net.prefix() == 32
                && self
                    .pool
                    .get(section, nh_index)
                    .is_some_and(|g| g.siblings.iter().any(|s| s.flags.contains(vplane_nexthop::SiblingFlags::NEIGH_CREATED)))
            {
                to_delete.push((net, scope, nh_index));
            }
        });
        for (net, scope, nh_index) in to_delete {
            table.delete(section, net, scope);
            self.pool.release(section, nh_index);
        }
    }

    // ===== neighbour insert/remove (§4.6) =====

    /// `insert_arp`: called when the controller reports a new/updated
    /// neighbour. Takes the route mutex itself; `link_arp`/`relink_arp`
    /// call the lock-free inner variant since they already hold it.
    /// `vrf` is the owning interface's VRF, so a neighbour on a VRF
    /// interface links host routes into that VRF's main table rather
    /// than always the default VRF's.
    pub fn insert_arp(&self, vrf: u32, ifindex: u32, address: IpAddr, lladdr: Option<vplane_utils::mac_addr::MacAddr>) {
        let entry = NeighbourEntry::new(address, ifindex, lladdr);
        self.neighbours.insert(entry);

        let _route_guard = self.route_mutex.lock().unwrap();
        self.with_section(|section| {
            let table = self.table(vrf, RT_MAIN);
            self.insert_arp_locked(section, &table, entry);
        });
    }

    fn insert_arp_locked(
        &self,
        section: &vplane_epoch::Section<'_>,
        table: &LpmTrie,
        neighbour: NeighbourEntry,
    ) {
        let address = to_v4(neighbour.address);
        let host = Ipv4Network::new(address, 32).expect("/32 is always valid");

        if let Some(index) = table.lookup_exact(section, host) {
            let Some(group) = self.pool.get(section, index) else {
                return;
            };
            let mut siblings = group.siblings.clone();
            let has_neigh_created = siblings
                .iter()
                .any(|s| s.flags.contains(vplane_nexthop::SiblingFlags::NEIGH_CREATED));
            for sibling in siblings.iter_mut() {
                if sibling.target.ifindex() != neighbour.ifindex {
                    continue;
                }
                let target = Target::Neighbour { ifindex: neighbour.ifindex, address: neighbour.address };
                sibling.set_target(target, has_neigh_created);
            }
            self.pool.replace_in_place(section, index, siblings);
        } else if let Some((_cover_network, cover_index)) = table.find_cover(section, host)
            && let Some(cover) = self.pool.get(section, cover_index)
            && cover.is_any_connected()
        {
            let has_matching_connected = cover
                .siblings
                .iter()
                .any(|s| is_connected(s) && s.target.ifindex() == neighbour.ifindex);
            if !has_matching_connected {
                return;
            }

            let proto = cover.proto;
            let mut new_siblings = cover.siblings.clone();
            for sibling in new_siblings.iter_mut() {
                if is_connected(sibling) && sibling.target.ifindex() == neighbour.ifindex {
                    sibling.gateway = Some(neighbour.address);
                    sibling.set_target(
                        Target::Neighbour { ifindex: neighbour.ifindex, address: neighbour.address },
                        true,
                    );
                }
            }
            if let Ok(created) = self.pool.intern(section, new_siblings, proto) {
                table.add(section, host, Scope::LINK, created.index);
            }
        }

        self.sync_gateway_neigh_present(section, address, true);
    }

    /// Sweeps every live next-hop group for gateway-routed siblings
    /// (`Sibling::via_gateway`, always `Target::Interface` — `set_target`
    /// only ever flips `NEIGH_PRESENT` for `Target::Neighbour`, so these
    /// are never touched by it) whose gateway equals `address`, and
    /// sets or clears `NEIGH_PRESENT` to match `present` (§4.6, link
    /// step 4 and the final step of insert_arp/remove_arp).
    fn sync_gateway_neigh_present(&self, section: &vplane_epoch::Section<'_>, address: Ipv4Addr, present: bool) {
        let target_addr = IpAddr::V4(address);
        for index in self.pool.live_indices() {
            let Some(group) = self.pool.get(section, index) else {
                continue;
            };
            if !group.siblings.iter().any(|s| s.gateway == Some(target_addr)) {
                continue;
            }

            let mut siblings = group.siblings.clone();
            let mut changed = false;
            for sibling in siblings.iter_mut() {
                if sibling.gateway == Some(target_addr)
                    && sibling.flags.contains(SiblingFlags::NEIGH_PRESENT) != present
                {
                    sibling.flags.set(SiblingFlags::NEIGH_PRESENT, present);
                    changed = true;
                }
            }
            if changed {
                self.pool.replace_in_place(section, index, siblings);
            }
        }
    }

    /// `remove_arp`: called when the controller reports a neighbour
    /// deletion. `vrf` must match the VRF `insert_arp` linked the
    /// neighbour's host route into.
    pub fn remove_arp(&self, vrf: u32, ifindex: u32, address: IpAddr) {
        self.neighbours.remove(ifindex, address);

        let _route_guard = self.route_mutex.lock().unwrap();
        self.with_section(|section| {
            let table = self.table(vrf, RT_MAIN);
            let host_addr = to_v4(address);
            let host = Ipv4Network::new(host_addr, 32).expect("/32 is always valid");

            if let Some(index) = table.lookup_exact(section, host) {
                let Some(group) = self.pool.get(section, index) else {
                    return;
                };
                let created_count = group
                    .siblings
                    .iter()
                    .filter(|s| s.flags.contains(vplane_nexthop::SiblingFlags::NEIGH_CREATED))
                    .count();
                let sibling_is_created = group
                    .siblings
                    .iter()
                    .any(|s| s.target.ifindex() == ifindex
                        && s.flags.contains(vplane_nexthop::SiblingFlags::NEIGH_CREATED));

                // A created host route with no other created sibling
                // disappears entirely; otherwise it falls back to
                // resolving the interface again (§4.6).
                if sibling_is_created && created_count <= 1 {
                    table.delete(section, host, Scope::LINK);
                    self.pool.release(section, index);
                } else {
                    let mut siblings = group.siblings.clone();
                    for sibling in siblings.iter_mut() {
                        if sibling.target.ifindex() == ifindex {
                            sibling.set_target(Target::Interface { ifindex }, false);
                        }
                    }
                    self.pool.replace_in_place(section, index, siblings);
                }
            }

            self.sync_gateway_neigh_present(section, host_addr, false);
        });
    }
}

fn to_v4(addr: IpAddr) -> Ipv4Addr {
    match addr {
        IpAddr::V4(addr) => addr,
        IpAddr::V6(_) => Ipv4Addr::UNSPECIFIED,
    }
}
