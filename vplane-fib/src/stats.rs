//
// Copyright (c) The VPlane Project Contributors
//
// SPDX-License-Identifier: MIT
//

//! FIB coordinator statistics (§4.5, "Statistics"): per-object counters
//! for the four offload outcome classes, tracked separately for
//! software rules and for their hardware mirror.

use std::sync::atomic::{AtomicU64, Ordering};

use vplane_utils::hw::PdState;

#[derive(Debug, Default)]
struct OutcomeCounters {
    full: AtomicU64,
    not_needed: AtomicU64,
    no_resource: AtomicU64,
    error: AtomicU64,
}

impl OutcomeCounters {
    fn record(&self, state: PdState) {
        let counter = match state {
            PdState::Full => &self.full,
            PdState::NotNeeded => &self.not_needed,
            PdState::NoResource => &self.no_resource,
            PdState::Error => &self.error,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> OutcomeSnapshot {
        OutcomeSnapshot {
            full: self.full.load(Ordering::Relaxed),
            not_needed: self.not_needed.load(Ordering::Relaxed),
            no_resource: self.no_resource.load(Ordering::Relaxed),
            error: self.error.load(Ordering::Relaxed),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct OutcomeSnapshot {
    pub full: u64,
    pub not_needed: u64,
    pub no_resource: u64,
    pub error: u64,
}

/// Routes and next-hop groups each get independent software/hardware
/// outcome tallies, since a route's LPM rule can diverge from its
/// next-hop group's hardware state independently (§4.5).
#[derive(Debug, Default)]
pub struct FibStats {
    route_software: OutcomeCounters,
    route_hardware: OutcomeCounters,
    nexthop_software: OutcomeCounters,
    nexthop_hardware: OutcomeCounters,
    pub inserts: AtomicU64,
    pub deletes: AtomicU64,
    pub lookup_misses: AtomicU64,
    pub enomem: AtomicU64,
    pub no_space: AtomicU64,
}

impl FibStats {
    pub fn new() -> Self {
        FibStats::default()
    }

    pub fn record_route(&self, software: PdState, hardware: PdState) {
        self.route_software.record(software);
        self.route_hardware.record(hardware);
    }

    pub fn record_nexthop(&self, software: PdState, hardware: PdState) {
        self.nexthop_software.record(software);
        self.nexthop_hardware.record(hardware);
    }

    pub fn route_software_snapshot(&self) -> OutcomeSnapshot {
        self.route_software.snapshot()
    }

    pub fn route_hardware_snapshot(&self) -> OutcomeSnapshot {
        self.route_hardware.snapshot()
    }

    pub fn nexthop_software_snapshot(&self) -> OutcomeSnapshot {
        self.nexthop_software.snapshot()
    }

    pub fn nexthop_hardware_snapshot(&self) -> OutcomeSnapshot {
        self.nexthop_hardware.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_segregate_by_outcome_class() {
        let stats = FibStats::new();
        stats.record_route(PdState::Full, PdState::Full);
        stats.record_route(PdState::NoResource, PdState::Error);

        let software = stats.route_software_snapshot();
        assert_eq!(software.full, 1);
        assert_eq!(software.no_resource, 1);

        let hardware = stats.route_hardware_snapshot();
        assert_eq!(hardware.full, 1);
        assert_eq!(hardware.error, 1);
    }
}
