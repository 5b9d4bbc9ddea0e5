//
// Copyright (c) The VPlane Project Contributors
//
// SPDX-License-Identifier: MIT
//

//! Interface table (component C2).
//!
//! Read-side lookups (`lookup_by_name`/`lookup_by_index`/`lookup_by_port`)
//! are lock-free: the table itself is an immutable snapshot published
//! through [`vplane_epoch::ReclaimedPtr`], exactly like the next-hop pool
//! (`vplane-nexthop`) and the LPM trie (`vplane-lpm`) publish their
//! snapshots. An interface's *mutable* fast-path state — per-core
//! counters and per-attach-point feature masks — lives behind `Arc`
//! handles embedded in the [`Interface`] record itself, so it survives a
//! snapshot replace untouched: a control operation that only touches one
//! interface still clones every *other* interface's `Arc` cheaply into
//! the new snapshot.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU16, AtomicU64, Ordering};
use std::sync::Arc;

use bitflags::bitflags;
use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};
use vplane_epoch::{Domain, ReclaimedPtr, Section};
use vplane_utils::mac_addr::MacAddr;
use vplane_utils::protocol::VRF_DEFAULT;

/// Number of pipeline attach points an interface carries a feature mask
/// for (§4.7: "one 16-bit mask per attach point"). Matches the
/// attach-point table registered by `vplane-pipeline`.
pub const MAX_ATTACH_POINTS: usize = 8;

bitflags! {
    /// Interface link flags (§3, "Interface record").
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    #[derive(Deserialize, Serialize)]
    pub struct InterfaceFlags: u16 {
        const ADMIN_UP   = 0x0001;
        const OPER_UP    = 0x0002;
        const BROADCAST  = 0x0004;
        const MULTICAST  = 0x0008;
        const LOOPBACK   = 0x0010;
        const PROMISC    = 0x0020;
    }
}

bitflags! {
    /// Per-address flags (§3, "Address").
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    #[derive(Deserialize, Serialize)]
    pub struct AddressFlags: u8 {
        const UNNUMBERED  = 0x01;
        const SECONDARY   = 0x02;
    }
}

/// Interface type, carrying type-specific state (§4.2, "Type operations").
/// Unimplemented hooks for a given kind are simply no-ops in
/// [`crate::ops`]; this enum only stores the per-type data the core
/// itself needs (parent/child relations, VLAN tag/TPID).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum InterfaceKind {
    Ethernet,
    Loopback,
    Bridge,
    VrfMaster,
    Vlan { parent_ifindex: u32, vlan_tag: u16, tpid: u16 },
    Vxlan { vni: u32 },
    Macvlan { parent_ifindex: u32 },
    Gre { local: std::net::IpAddr, remote: std::net::IpAddr },
    Vti { local: std::net::IpAddr, remote: std::net::IpAddr },
    L2tpEth,
    GenericTunnel,
}

/// Per-core software counters (§4.2, "Per-core counters").
#[derive(Debug, Default)]
pub struct CoreCounters {
    pub rx_packets: AtomicU64,
    pub rx_bytes: AtomicU64,
    pub tx_packets: AtomicU64,
    pub tx_bytes: AtomicU64,
    pub drop_tx_ring_full: AtomicU64,
    pub drop_hw_queue_full: AtomicU64,
    pub drop_protocol: AtomicU64,
    pub drop_bridged: AtomicU64,
    pub drop_multicast: AtomicU64,
    pub drop_vlan: AtomicU64,
    pub drop_no_address: AtomicU64,
    pub drop_no_vlan: AtomicU64,
    pub drop_unknown_proto: AtomicU64,
}

/// Snapshot of an interface's counters, summed across every core
/// (readers "sum across cores", §4.2).
#[derive(Clone, Copy, Debug, Default)]
pub struct CounterTotals {
    pub rx_packets: u64,
    pub rx_bytes: u64,
    pub tx_packets: u64,
    pub tx_bytes: u64,
    pub drops: u64,
}

/// Per-interface array of [`CoreCounters`], one slot per forwarding
/// thread. Writer-unique: each forwarding thread only ever touches its
/// own slot (§5, "Shared-resource policy").
#[derive(Debug, Default)]
pub struct CounterSet {
    per_core: Vec<CoreCounters>,
}

impl CounterSet {
    pub fn new(n_cores: usize) -> Self {
        CounterSet {
            per_core: (0..n_cores).map(|_| CoreCounters::default()).collect(),
        }
    }

    pub fn core(&self, core_id: usize) -> &CoreCounters {
        &self.per_core[core_id]
    }

    pub fn totals(&self) -> CounterTotals {
        let mut totals = CounterTotals::default();
        for c in &self.per_core {
            totals.rx_packets += c.rx_packets.load(Ordering::Relaxed);
            totals.rx_bytes += c.rx_bytes.load(Ordering::Relaxed);
            totals.tx_packets += c.tx_packets.load(Ordering::Relaxed);
            totals.tx_bytes += c.tx_bytes.load(Ordering::Relaxed);
            totals.drops += c.drop_tx_ring_full.load(Ordering::Relaxed)
                + c.drop_hw_queue_full.load(Ordering::Relaxed)
                + c.drop_protocol.load(Ordering::Relaxed)
                + c.drop_bridged.load(Ordering::Relaxed)
                + c.drop_multicast.load(Ordering::Relaxed)
                + c.drop_vlan.load(Ordering::Relaxed)
                + c.drop_no_address.load(Ordering::Relaxed)
                + c.drop_no_vlan.load(Ordering::Relaxed)
                + c.drop_unknown_proto.load(Ordering::Relaxed);
        }
        totals
    }
}

/// Per-attach-point feature bitmask (§4.7, "Feature bitmask update").
/// Updated with an atomic or/and on the control side; read racily on the
/// fast path, which tolerates a stale mask for one packet.
#[derive(Debug, Default)]
pub struct FeatureMasks {
    masks: [AtomicU16; MAX_ATTACH_POINTS],
}

impl FeatureMasks {
    pub fn get(&self, attach_point: usize) -> u16 {
        self.masks[attach_point].load(Ordering::Relaxed)
    }

    pub fn enable(&self, attach_point: usize, feature_bit: u16) {
        self.masks[attach_point].fetch_or(feature_bit, Ordering::Relaxed);
    }

    pub fn disable(&self, attach_point: usize, feature_bit: u16) {
        self.masks[attach_point].fetch_and(!feature_bit, Ordering::Relaxed);
    }

    pub fn is_enabled(&self, attach_point: usize, feature_bit: u16) -> bool {
        self.get(attach_point) & feature_bit != 0
    }
}

/// An interface record (§3, "Interface record").
///
/// All other references to an interface elsewhere in the dataplane are
/// weak, expressed as `ifindex` lookups — never as a stored `Arc` or
/// pointer that would outlive the table's ownership (§3, "Invariants").
#[derive(Clone, Debug)]
pub struct Interface {
    pub name: String,
    pub ifindex: u32,
    pub port: Option<u32>,
    pub kind: InterfaceKind,
    pub mtu: u32,
    pub mac_addr: MacAddr,
    pub vrf: u32,
    pub flags: InterfaceFlags,
    pub addresses: BTreeMap<IpNetwork, AddressFlags>,
    pub hw_handle: Option<u64>,
    pub feature_masks: Arc<FeatureMasks>,
    pub counters: Arc<CounterSet>,
}

impl Interface {
    /// Creates a new interface in *pre-insert* state: it has no index yet
    /// and therefore isn't reachable from `lookup_by_index`/`lookup_by_port`
    /// (§4.2, "allocate").
    pub fn new(
        name: String,
        kind: InterfaceKind,
        mtu: u32,
        mac_addr: MacAddr,
        n_cores: usize,
    ) -> Self {
        Interface {
            name,
            ifindex: 0,
            port: None,
            kind,
            mtu,
            mac_addr,
            vrf: VRF_DEFAULT,
            flags: InterfaceFlags::empty(),
            addresses: BTreeMap::new(),
            hw_handle: None,
            feature_masks: Arc::new(FeatureMasks::default()),
            counters: Arc::new(CounterSet::new(n_cores.max(1))),
        }
    }

    pub fn is_up(&self) -> bool {
        self.flags
            .contains(InterfaceFlags::ADMIN_UP | InterfaceFlags::OPER_UP)
    }
}

/// Immutable snapshot of the interface table, published atomically by the
/// control thread.
#[derive(Clone, Debug, Default)]
struct InterfaceSnapshot {
    by_name: BTreeMap<String, Arc<Interface>>,
    by_index: HashMap<u32, Arc<Interface>>,
    by_port: HashMap<u32, Arc<Interface>>,
}

/// The interface table (§4.2).
///
/// `lookup_by_name`/`lookup_by_index`/`lookup_by_port` are read-side and
/// lock-free; `allocate`/`set_index`/`rename`/... are control-side and
/// take the internal builder path, publishing a fresh snapshot when done.
pub struct InterfaceTable {
    domain: Domain,
    snapshot: ReclaimedPtr<InterfaceSnapshot>,
    n_cores: usize,
}

impl std::fmt::Debug for InterfaceTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterfaceTable").finish_non_exhaustive()
    }
}

impl InterfaceTable {
    pub fn new(domain: Domain, n_cores: usize) -> Self {
        InterfaceTable {
            domain,
            snapshot: ReclaimedPtr::new(InterfaceSnapshot::default()),
            n_cores: n_cores.max(1),
        }
    }

    pub fn n_cores(&self) -> usize {
        self.n_cores
    }

    // ===== read-side (lock-free) =====

    pub fn lookup_by_name(
        &self,
        section: &Section<'_>,
        name: &str,
    ) -> Option<Arc<Interface>> {
        self.snapshot
            .load(section)
            .and_then(|snap| snap.by_name.get(name).cloned())
    }

    pub fn lookup_by_index(
        &self,
        section: &Section<'_>,
        ifindex: u32,
    ) -> Option<Arc<Interface>> {
        self.snapshot
            .load(section)
            .and_then(|snap| snap.by_index.get(&ifindex).cloned())
    }

    pub fn lookup_by_port(
        &self,
        section: &Section<'_>,
        port: u32,
    ) -> Option<Arc<Interface>> {
        self.snapshot
            .load(section)
            .and_then(|snap| snap.by_port.get(&port).cloned())
    }

    pub fn walk<F: FnMut(&Interface)>(&self, section: &Section<'_>, mut f: F) {
        if let Some(snap) = self.snapshot.load(section) {
            for iface in snap.by_name.values() {
                f(iface);
            }
        }
    }

    // ===== control-side =====

    /// Allocates a new interface in pre-insert state (§4.2, "allocate").
    /// Fails with a name collision error if the name is already taken.
    pub fn allocate(
        &self,
        section: &Section<'_>,
        name: &str,
        kind: InterfaceKind,
        mtu: u32,
        mac_addr: MacAddr,
    ) -> Result<Interface, AllocateError> {
        if let Some(snap) = self.snapshot.load(section)
            && snap.by_name.contains_key(name)
        {
            return Err(AllocateError::NameCollision);
        }
        Ok(Interface::new(
            name.to_owned(),
            kind,
            mtu,
            mac_addr,
            self.n_cores,
        ))
    }

    /// Inserts a brand-new interface that has no index yet, reachable
    /// only through `lookup_by_name`. Used for "pending" interfaces the
    /// controller announced whose device hasn't shown up (§4.2, "Failure
    /// semantics").
    pub fn insert_pending(&self, section: &Section<'_>, iface: Interface) {
        self.mutate(section, |snap| {
            snap.by_name.insert(iface.name.clone(), Arc::new(iface));
        });
    }

    /// Assigns an index to a previously-pending interface, making it
    /// reachable from `lookup_by_index`/`lookup_by_port` (§4.2,
    /// "set_index").
    pub fn set_index(
        &self,
        section: &Section<'_>,
        name: &str,
        ifindex: u32,
        port: Option<u32>,
    ) -> bool {
        let mut found = false;
        self.mutate(section, |snap| {
            if let Some(iface) = snap.by_name.get(name) {
                let mut new_iface = (**iface).clone();
                new_iface.ifindex = ifindex;
                new_iface.port = port;
                let new_iface = Arc::new(new_iface);
                snap.by_name.insert(name.to_owned(), new_iface.clone());
                snap.by_index.insert(ifindex, new_iface.clone());
                if let Some(port) = port {
                    snap.by_port.insert(port, new_iface);
                }
                found = true;
            }
        });
        found
    }

    pub fn unset_index(&self, section: &Section<'_>, name: &str) {
        self.mutate(section, |snap| {
            if let Some(iface) = snap.by_name.get(name) {
                snap.by_index.remove(&iface.ifindex);
                if let Some(port) = iface.port {
                    snap.by_port.remove(&port);
                }
                let mut new_iface = (**iface).clone();
                new_iface.ifindex = 0;
                new_iface.port = None;
                snap.by_name.insert(name.to_owned(), Arc::new(new_iface));
            }
        });
    }

    pub fn rename(&self, section: &Section<'_>, old: &str, new: &str) -> bool {
        let mut found = false;
        self.mutate(section, |snap| {
            if let Some(iface) = snap.by_name.remove(old) {
                let mut new_iface = (**iface).clone();
                new_iface.name = new.to_owned();
                let new_iface = Arc::new(new_iface);
                snap.by_name.insert(new.to_owned(), new_iface.clone());
                if new_iface.ifindex != 0 {
                    snap.by_index.insert(new_iface.ifindex, new_iface.clone());
                }
                if let Some(port) = new_iface.port {
                    snap.by_port.insert(port, new_iface);
                }
                found = true;
            }
        });
        found
    }

    pub fn set_vrf(&self, section: &Section<'_>, name: &str, vrf: u32) -> bool {
        self.update_by_name(section, name, |iface| iface.vrf = vrf)
    }

    pub fn set_mtu(&self, section: &Section<'_>, name: &str, mtu: u32) -> bool {
        self.update_by_name(section, name, |iface| iface.mtu = mtu)
    }

    pub fn set_mac_addr(
        &self,
        section: &Section<'_>,
        name: &str,
        mac_addr: MacAddr,
    ) -> bool {
        self.update_by_name(section, name, |iface| iface.mac_addr = mac_addr)
    }

    pub fn set_flags(
        &self,
        section: &Section<'_>,
        name: &str,
        flags: InterfaceFlags,
    ) -> bool {
        self.update_by_name(section, name, |iface| iface.flags = flags)
    }

    pub fn add_address(
        &self,
        section: &Section<'_>,
        name: &str,
        addr: IpNetwork,
        flags: AddressFlags,
    ) -> bool {
        self.update_by_name(section, name, |iface| {
            iface.addresses.insert(addr, flags);
        })
    }

    pub fn remove_address(
        &self,
        section: &Section<'_>,
        name: &str,
        addr: &IpNetwork,
    ) -> bool {
        self.update_by_name(section, name, |iface| {
            iface.addresses.remove(addr);
        })
    }

    pub fn remove(&self, section: &Section<'_>, name: &str) {
        self.mutate(section, |snap| {
            if let Some(iface) = snap.by_name.remove(name) {
                snap.by_index.remove(&iface.ifindex);
                if let Some(port) = iface.port {
                    snap.by_port.remove(&port);
                }
            }
        });
    }

    fn update_by_name<F: FnOnce(&mut Interface)>(
        &self,
        section: &Section<'_>,
        name: &str,
        f: F,
    ) -> bool {
        let mut found = false;
        self.mutate(section, |snap| {
            if let Some(iface) = snap.by_name.get(name) {
                let mut new_iface = (**iface).clone();
                f(&mut new_iface);
                let new_iface = Arc::new(new_iface);
                snap.by_name.insert(name.to_owned(), new_iface.clone());
                if new_iface.ifindex != 0 {
                    snap.by_index.insert(new_iface.ifindex, new_iface.clone());
                }
                if let Some(port) = new_iface.port {
                    snap.by_port.insert(port, new_iface);
                }
                found = true;
            }
        });
        found
    }

    fn mutate<F: FnOnce(&mut InterfaceSnapshot)>(
        &self,
        section: &Section<'_>,
        f: F,
    ) {
        let mut next = self
            .snapshot
            .load(section)
            .cloned()
            .unwrap_or_default();
        f(&mut next);
        self.snapshot.publish(section, next);
    }

    pub fn domain(&self) -> &Domain {
        &self.domain
    }
}

#[derive(Debug, Eq, PartialEq)]
pub enum AllocateError {
    NameCollision,
}

impl std::fmt::Display for AllocateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AllocateError::NameCollision => {
                write!(f, "interface name already exists")
            }
        }
    }
}

impl std::error::Error for AllocateError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> (InterfaceTable, Domain) {
        let domain = Domain::new();
        (InterfaceTable::new(domain.clone(), 4), domain)
    }

    #[test]
    fn allocate_set_index_and_lookup() {
        let (table, domain) = table();
        let mut reader = domain.register();
        let section = reader.enter();

        let iface = table
            .allocate(
                &section,
                "dp1",
                InterfaceKind::Ethernet,
                1500,
                MacAddr::from([0x02, 0, 0, 0, 0, 1]),
            )
            .unwrap();
        table.insert_pending(&section, iface);

        assert!(table.lookup_by_name(&section, "dp1").is_some());
        assert!(table.lookup_by_index(&section, 100).is_none());

        assert!(table.set_index(&section, "dp1", 100, Some(7)));
        let iface = table.lookup_by_index(&section, 100).unwrap();
        assert_eq!(iface.name, "dp1");
        assert_eq!(table.lookup_by_port(&section, 7).unwrap().ifindex, 100);
    }

    #[test]
    fn name_collision_rejected() {
        let (table, domain) = table();
        let mut reader = domain.register();
        let section = reader.enter();

        let iface = table
            .allocate(
                &section,
                "dp1",
                InterfaceKind::Ethernet,
                1500,
                MacAddr::ZERO,
            )
            .unwrap();
        table.insert_pending(&section, iface);

        let err = table
            .allocate(
                &section,
                "dp1",
                InterfaceKind::Ethernet,
                1500,
                MacAddr::ZERO,
            )
            .unwrap_err();
        assert_eq!(err, AllocateError::NameCollision);
    }

    #[test]
    fn counters_survive_unrelated_mutation() {
        let (table, domain) = table();
        let mut reader = domain.register();
        let section = reader.enter();

        let iface = table
            .allocate(
                &section,
                "dp1",
                InterfaceKind::Ethernet,
                1500,
                MacAddr::ZERO,
            )
            .unwrap();
        table.insert_pending(&section, iface);
        table.set_index(&section, "dp1", 1, None);

        let iface = table.lookup_by_index(&section, 1).unwrap();
        iface.counters.core(0).rx_packets.fetch_add(5, Ordering::Relaxed);

        // Unrelated mutation: create a second interface.
        let iface2 = table
            .allocate(
                &section,
                "dp2",
                InterfaceKind::Ethernet,
                1500,
                MacAddr::ZERO,
            )
            .unwrap();
        table.insert_pending(&section, iface2);

        let iface = table.lookup_by_index(&section, 1).unwrap();
        assert_eq!(
            iface.counters.core(0).rx_packets.load(Ordering::Relaxed),
            5
        );
    }
}
