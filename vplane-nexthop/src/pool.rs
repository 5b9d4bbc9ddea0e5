//
// Copyright (c) The VPlane Project Contributors
//
// SPDX-License-Identifier: MIT
//

//! The next-hop pool itself (§4.3).
//!
//! Slot storage is a fixed-size array of [`vplane_epoch::ReclaimedPtr`],
//! one per possible index; `intern`/`release`/`replace_in_place` are
//! control-side and serialize through an internal mutex guarding the
//! interning hash map and the free-index rover, while `get`/`select` are
//! read-side and only ever touch the atomic slot pointers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use vplane_epoch::{Domain, HugeRegionGuard, ReclaimedPtr, Section};
use vplane_utils::protocol::Protocol;

use crate::group::{Group, GroupHashKey, Siblings};
use crate::hw::{HwShadow, NullShadow, PdState};
use crate::sibling::{Sibling, SiblingFlags};

/// Default size of the index space (§4.3, "Slot allocation"): 2^20,
/// matching the original's maximum next-hop index.
pub const DEFAULT_CAPACITY: u32 = 1 << 20;

/// Default ECMP fan-out cap (§4.3, `select`).
pub const DEFAULT_ECMP_MAX_PATH: usize = 64;

#[derive(Debug, Eq, PartialEq)]
pub enum PoolError {
    /// The rover has reached the end of the index space and no released
    /// index is free to reuse (§4.3, "on overflow the pool reports
    /// ENOSPC").
    NoSpace,
}

impl std::fmt::Display for PoolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PoolError::NoSpace => write!(f, "next-hop pool exhausted (ENOSPC)"),
        }
    }
}

impl std::error::Error for PoolError {}

/// Outcome of [`NextHopPool::intern`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct InternOutcome {
    pub index: u32,
    pub created: bool,
}

struct ControlState {
    rover: u32,
    free_indices: Vec<u32>,
    index_by_key: HashMap<GroupHashKey, u32>,
}

/// Dedup'd, refcounted next-hop groups (§4.3).
pub struct NextHopPool {
    domain: Domain,
    slots: Vec<ReclaimedPtr<Group>>,
    ecmp_max_path: usize,
    control: Mutex<ControlState>,
    hw: Arc<dyn HwShadow>,
    blackhole_index: u32,
    select_counter: AtomicU64,
    _huge_region: HugeRegionGuard,
}

impl std::fmt::Debug for NextHopPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NextHopPool")
            .field("capacity", &self.slots.len())
            .finish_non_exhaustive()
    }
}

impl NextHopPool {
    pub fn new(domain: Domain, capacity: u32, ecmp_max_path: usize) -> Self {
        Self::with_hw_shadow(domain, capacity, ecmp_max_path, Arc::new(NullShadow))
    }

    pub fn with_hw_shadow(
        domain: Domain,
        capacity: u32,
        ecmp_max_path: usize,
        hw: Arc<dyn HwShadow>,
    ) -> Self {
        let huge_region = domain.track_huge_region();
        let slots = (0..capacity).map(|_| ReclaimedPtr::default()).collect();
        let mut pool = NextHopPool {
            domain,
            slots,
            ecmp_max_path,
            control: Mutex::new(ControlState {
                // Index 0 is reserved (§3, "Invariants").
                rover: 1,
                free_indices: Vec::new(),
                index_by_key: HashMap::new(),
            }),
            hw,
            blackhole_index: 0,
            select_counter: AtomicU64::new(0),
            _huge_region: huge_region,
        };
        let mut reader = pool.domain.register();
        let section = reader.enter();
        let outcome = pool
            .intern(&section, [Sibling::blackhole()].into_iter().collect(), Protocol::STATIC)
            .expect("blackhole group always fits in a fresh pool");
        pool.blackhole_index = outcome.index;
        pool
    }

    pub fn domain(&self) -> &Domain {
        &self.domain
    }

    /// The well-known blackhole group created at startup (§3, "A
    /// well-known blackhole group exists at startup").
    pub fn blackhole_index(&self) -> u32 {
        self.blackhole_index
    }

    pub fn capacity(&self) -> u32 {
        self.slots.len() as u32
    }

    // ===== read-side =====

    pub fn get<'s>(&self, section: &'s Section<'_>, index: u32) -> Option<&'s Group> {
        self.slots.get(index as usize)?.load(section)
    }

    /// ECMP sibling selection (§4.3, `select`).
    pub fn select<'s>(
        &self,
        section: &'s Section<'_>,
        index: u32,
        flow_hash: u64,
    ) -> Option<&'s Sibling> {
        self.select_counter.fetch_add(1, Ordering::Relaxed);
        let group = self.get(section, index)?;
        if group.siblings.len() == 1 {
            let sibling = &group.siblings[0];
            return Self::filter_selected(sibling);
        }

        let width = group.siblings.len().min(self.ecmp_max_path.max(1));
        let start = (flow_hash as usize) % width;
        for offset in 0..width {
            let candidate = &group.siblings[(start + offset) % width];
            if !candidate.is_dead() {
                return Self::filter_selected(candidate);
            }
        }
        None
    }

    fn filter_selected(sibling: &Sibling) -> Option<&Sibling> {
        if sibling.flags.contains(SiblingFlags::NOROUTE) {
            None
        } else {
            Some(sibling)
        }
    }

    // ===== control-side =====

    /// Interns a sibling set, bumping the refcount of an existing
    /// matching group or allocating a new one (§4.3, `intern`).
    pub fn intern(
        &self,
        section: &Section<'_>,
        siblings: Siblings,
        proto: Protocol,
    ) -> Result<InternOutcome, PoolError> {
        let group = Group::new(0, proto, siblings);
        let key = group.hash_key();

        let mut control = self.control.lock().unwrap();
        if let Some(&index) = control.index_by_key.get(&key) {
            let existing = self.get(section, index).expect("interned index always populated");
            let mut bumped = existing.clone();
            bumped.refcount += 1;
            self.slots[index as usize].publish(section, bumped);
            return Ok(InternOutcome { index, created: false });
        }

        let index = control
            .free_indices
            .pop()
            .or_else(|| {
                if control.rover < self.slots.len() as u32 {
                    let index = control.rover;
                    control.rover += 1;
                    Some(index)
                } else {
                    None
                }
            })
            .ok_or(PoolError::NoSpace)?;

        let create = self.hw.create_group(&group.siblings);
        let mut group = Group::new(index, proto, group.siblings);
        group.hw_handle = create.group_handle;
        group.sibling_hw_handles = create.sibling_handles;
        group.pd_state = create.pd_state;

        control.index_by_key.insert(key, index);
        self.slots[index as usize].publish(section, group);
        Ok(InternOutcome { index, created: true })
    }

    /// Drops one reference; frees the group's slot once the refcount
    /// reaches zero (§4.3, `release`).
    pub fn release(&self, section: &Section<'_>, index: u32) {
        if index == 0 {
            return;
        }
        let mut control = self.control.lock().unwrap();
        let Some(group) = self.get(section, index) else {
            return;
        };
        if group.refcount > 1 {
            let mut decremented = group.clone();
            decremented.refcount -= 1;
            self.slots[index as usize].publish(section, decremented);
            return;
        }

        self.hw.delete_group(group.hw_handle, &group.sibling_hw_handles);
        control.index_by_key.retain(|_, idx| *idx != index);
        control.free_indices.push(index);
        self.slots[index as usize].clear(section);
    }

    /// Replaces a group's sibling list in place, preserving index,
    /// refcount and hardware state (§4.3, "Neighbour-link mutation").
    /// Used exclusively for toggling `NEIGH_PRESENT`/`NEIGH_CREATED`/
    /// `DEAD` on one or more siblings; the hash-key identity is
    /// preserved because those flags are excluded from `CMP_MASK`.
    pub fn replace_in_place(&self, section: &Section<'_>, index: u32, siblings: Siblings) -> bool {
        let _control = self.control.lock().unwrap();
        let Some(group) = self.get(section, index) else {
            return false;
        };
        let replacement = group.with_siblings(siblings);
        self.slots[index as usize].publish(section, replacement);
        true
    }

    pub fn pd_state(&self, section: &Section<'_>, index: u32) -> Option<PdState> {
        self.get(section, index).map(|group| group.pd_state)
    }

    /// Every currently-interned group index, for sweeps that must touch
    /// every live group rather than one known index (§4.5 link step 4,
    /// §4.6 insert/remove's "NEIGH_PRESENT sweep").
    pub fn live_indices(&self) -> Vec<u32> {
        let control = self.control.lock().unwrap();
        control.index_by_key.values().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use std::net::IpAddr;

    use super::*;

    fn pool() -> (NextHopPool, Domain) {
        let domain = Domain::new();
        let pool = NextHopPool::new(domain.clone(), 64, DEFAULT_ECMP_MAX_PATH);
        (pool, domain)
    }

    #[test]
    fn intern_dedups_equivalent_sibling_lists() {
        let (pool, domain) = pool();
        let mut reader = domain.register();
        let section = reader.enter();

        let a = pool
            .intern(&section, [Sibling::connected(100)].into_iter().collect(), Protocol::KERNEL)
            .unwrap();
        assert!(a.created);

        let b = pool
            .intern(&section, [Sibling::connected(100)].into_iter().collect(), Protocol::KERNEL)
            .unwrap();
        assert!(!b.created);
        assert_eq!(a.index, b.index);

        let group = pool.get(&section, a.index).unwrap();
        assert_eq!(group.refcount, 2);
    }

    #[test]
    fn release_frees_slot_for_reuse() {
        let (pool, domain) = pool();
        let mut reader = domain.register();
        let section = reader.enter();

        let a = pool
            .intern(&section, [Sibling::connected(100)].into_iter().collect(), Protocol::KERNEL)
            .unwrap();
        pool.release(&section, a.index);
        assert!(pool.get(&section, a.index).is_none());

        let b = pool
            .intern(&section, [Sibling::connected(200)].into_iter().collect(), Protocol::KERNEL)
            .unwrap();
        assert!(b.created);
        assert_eq!(a.index, b.index);
    }

    #[test]
    fn select_skips_dead_siblings_and_returns_none_if_all_dead() {
        let (pool, domain) = pool();
        let mut reader = domain.register();
        let section = reader.enter();

        let ip_a: IpAddr = "10.1.0.1".parse().unwrap();
        let ip_b: IpAddr = "10.1.0.2".parse().unwrap();
        let siblings: Siblings = [
            Sibling::via_gateway(100, ip_a),
            Sibling::via_gateway(101, ip_b),
        ]
        .into_iter()
        .collect();
        let outcome = pool.intern(&section, siblings, Protocol::STATIC).unwrap();

        let mut dead_first = pool.get(&section, outcome.index).unwrap().siblings.clone();
        dead_first[0].flags |= SiblingFlags::DEAD;
        pool.replace_in_place(&section, outcome.index, dead_first);

        for hash in 0..8u64 {
            let selected = pool.select(&section, outcome.index, hash).unwrap();
            assert_eq!(selected.target.ifindex(), 101);
        }

        let mut both_dead = pool.get(&section, outcome.index).unwrap().siblings.clone();
        both_dead[1].flags |= SiblingFlags::DEAD;
        pool.replace_in_place(&section, outcome.index, both_dead);
        assert!(pool.select(&section, outcome.index, 0).is_none());
    }

    #[test]
    fn blackhole_group_exists_at_startup() {
        let (pool, domain) = pool();
        let mut reader = domain.register();
        let section = reader.enter();

        let group = pool.get(&section, pool.blackhole_index()).unwrap();
        assert!(group.siblings[0].flags.contains(SiblingFlags::BLACKHOLE));
    }

    #[test]
    fn no_space_once_capacity_exhausted() {
        let domain = Domain::new();
        let pool = NextHopPool::new(domain.clone(), 2, DEFAULT_ECMP_MAX_PATH);
        let mut reader = domain.register();
        let section = reader.enter();
        // Index 0 reserved for the startup blackhole; capacity 2 leaves
        // only index 1 available.
        let err = pool
            .intern(&section, [Sibling::connected(1)].into_iter().collect(), Protocol::KERNEL)
            .unwrap_err();
        assert_eq!(err, PoolError::NoSpace);
    }
}
