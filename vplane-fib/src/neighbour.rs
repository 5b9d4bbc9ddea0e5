//
// Copyright (c) The VPlane Project Contributors
//
// SPDX-License-Identifier: MIT
//

//! Neighbour table (component C6): per-interface, per-family hash of
//! ARP/ND entries.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Mutex;

use vplane_utils::mac_addr::MacAddr;

/// Neighbour reachability state (§3, "Neighbour entry").
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NeighState {
    Incomplete,
    Reachable,
    Stale,
    Failed,
}

/// One ARP/ND entry (§3).
#[derive(Clone, Copy, Debug)]
pub struct NeighbourEntry {
    pub address: IpAddr,
    pub lladdr: Option<MacAddr>,
    pub ifindex: u32,
    pub state: NeighState,
}

impl NeighbourEntry {
    pub fn new(address: IpAddr, ifindex: u32, lladdr: Option<MacAddr>) -> Self {
        NeighbourEntry {
            address,
            ifindex,
            state: if lladdr.is_some() {
                NeighState::Reachable
            } else {
                NeighState::Incomplete
            },
            lladdr,
        }
    }
}

/// Per-interface, per-address neighbour hash (§4.6).
///
/// Lifetime of an entry is independent of the next-hop groups that point
/// at it; siblings reference neighbours by `(ifindex, address)`, never
/// by pointer, so removing an entry here never dangles a next-hop
/// (§9, "Cyclic references via indices").
#[derive(Debug, Default)]
pub struct NeighbourTable {
    entries: Mutex<HashMap<(u32, IpAddr), NeighbourEntry>>,
}

impl NeighbourTable {
    pub fn new() -> Self {
        NeighbourTable::default()
    }

    pub fn lookup(&self, ifindex: u32, address: IpAddr) -> Option<NeighbourEntry> {
        self.entries.lock().unwrap().get(&(ifindex, address)).cloned()
    }

    pub fn insert(&self, entry: NeighbourEntry) {
        self.entries
            .lock()
            .unwrap()
            .insert((entry.ifindex, entry.address), entry);
    }

    pub fn remove(&self, ifindex: u32, address: IpAddr) -> Option<NeighbourEntry> {
        self.entries.lock().unwrap().remove(&(ifindex, address))
    }

    /// Invokes `cb` for every neighbour on `ifindex`.
    pub fn walk_interface<F: FnMut(&NeighbourEntry)>(&self, ifindex: u32, mut cb: F) {
        for entry in self.entries.lock().unwrap().values() {
            if entry.ifindex == ifindex {
                cb(entry);
            }
        }
    }

    pub fn walk<F: FnMut(&NeighbourEntry)>(&self, mut cb: F) {
        for entry in self.entries.lock().unwrap().values() {
            cb(entry);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_lookup_remove_round_trip() {
        let table = NeighbourTable::new();
        let addr: IpAddr = "10.0.0.7".parse().unwrap();
        table.insert(NeighbourEntry::new(addr, 100, Some(MacAddr::ZERO)));

        let found = table.lookup(100, addr).unwrap();
        assert_eq!(found.state, NeighState::Reachable);

        table.remove(100, addr);
        assert!(table.lookup(100, addr).is_none());
    }

    #[test]
    fn walk_interface_filters_by_ifindex() {
        let table = NeighbourTable::new();
        table.insert(NeighbourEntry::new(
            "10.0.0.1".parse().unwrap(),
            100,
            Some(MacAddr::ZERO),
        ));
        table.insert(NeighbourEntry::new(
            "10.0.0.2".parse().unwrap(),
            101,
            Some(MacAddr::ZERO),
        ));

        let mut count = 0;
        table.walk_interface(100, |_| count += 1);
        assert_eq!(count, 1);
    }
}
