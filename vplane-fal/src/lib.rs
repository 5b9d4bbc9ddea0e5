//
// Copyright (c) The VPlane Project Contributors
//
// SPDX-License-Identifier: MIT
//

//! Hardware-shadow façade (component C11).
//!
//! A narrow interface the FIB coordinator and next-hop pool call into to
//! mirror software state into an abstract offload backend. This crate
//! ships only the contract and a no-backend implementation
//! ([`NullFal`]) that returns `NOT_NEEDED` for every call, matching
//! §4.11: "Implementations that have no backend return NOT_NEEDED for
//! every call so the software-only path works unchanged."

use std::net::Ipv4Addr;

use vplane_nexthop::group::Siblings;
use vplane_utils::hw::PdState;

/// Raw status code a backend reports, mapped to [`PdState`] per §4.11:
/// "0 -> FULL; unsupported -> NOT_NEEDED; no resource -> NO_RESOURCE;
/// anything else -> ERROR".
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FalStatus {
    Ok,
    Unsupported,
    NoResource,
    Other(i32),
}

impl FalStatus {
    pub fn to_pd_state(self) -> PdState {
        match self {
            FalStatus::Ok => PdState::Full,
            FalStatus::Unsupported => PdState::NotNeeded,
            FalStatus::NoResource => PdState::NoResource,
            FalStatus::Other(_) => PdState::Error,
        }
    }
}

/// A port attribute the console/control side can query or push through
/// `l2_upd_port`/`l2_get_attrs` (§4.11).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PortAttr {
    AdminState(bool),
    Mtu(u32),
    LinkSpeedMbps(u64),
}

/// Result of a next-hop-group hardware create call (§4.3, §4.11).
#[derive(Clone, Debug)]
pub struct GroupCreateResult {
    pub group_handle: Option<u64>,
    pub sibling_handles: Vec<Option<u64>>,
    pub status: FalStatus,
}

/// The hardware-shadow façade contract (§4.11).
pub trait Fal: Send + Sync {
    fn ip4_new_route(
        &self,
        vrf: u32,
        dst: Ipv4Addr,
        depth: u8,
        table_id: u32,
        siblings: &Siblings,
        group_handle: Option<u64>,
    ) -> FalStatus;

    fn ip4_upd_route(
        &self,
        vrf: u32,
        dst: Ipv4Addr,
        depth: u8,
        table_id: u32,
        siblings: &Siblings,
        group_handle: Option<u64>,
    ) -> FalStatus;

    fn ip4_del_route(&self, vrf: u32, dst: Ipv4Addr, depth: u8, table_id: u32) -> FalStatus;

    fn ip4_new_next_hops(&self, siblings: &Siblings) -> GroupCreateResult;

    fn ip4_del_next_hops(&self, group_handle: Option<u64>, sibling_handles: &[Option<u64>]);

    fn l2_upd_port(&self, ifindex: u32, attr: PortAttr);

    fn l2_get_attrs(&self, ifindex: u32, attrs: &[PortAttr]) -> Vec<Option<PortAttr>>;
}

/// No-backend façade: every call succeeds as `NOT_NEEDED`, so a build
/// with no offload target behaves exactly like pure software forwarding.
pub struct NullFal;

impl Fal for NullFal {
    fn ip4_new_route(
        &self,
        _vrf: u32,
        _dst: Ipv4Addr,
        _depth: u8,
        _table_id: u32,
        _siblings: &Siblings,
        _group_handle: Option<u64>,
    ) -> FalStatus {
        FalStatus::Unsupported
    }

    fn ip4_upd_route(
        &self,
        _vrf: u32,
        _dst: Ipv4Addr,
        _depth: u8,
        _table_id: u32,
        _siblings: &Siblings,
        _group_handle: Option<u64>,
    ) -> FalStatus {
        FalStatus::Unsupported
    }

    fn ip4_del_route(&self, _vrf: u32, _dst: Ipv4Addr, _depth: u8, _table_id: u32) -> FalStatus {
        FalStatus::Unsupported
    }

    fn ip4_new_next_hops(&self, siblings: &Siblings) -> GroupCreateResult {
        GroupCreateResult {
            group_handle: None,
            sibling_handles: vec![None; siblings.len()],
            status: FalStatus::Unsupported,
        }
    }

    fn ip4_del_next_hops(&self, _group_handle: Option<u64>, _sibling_handles: &[Option<u64>]) {}

    fn l2_upd_port(&self, _ifindex: u32, _attr: PortAttr) {}

    fn l2_get_attrs(&self, _ifindex: u32, attrs: &[PortAttr]) -> Vec<Option<PortAttr>> {
        vec![None; attrs.len()]
    }
}

/// Adapts a [`Fal`] implementation to the [`vplane_nexthop::hw::HwShadow`]
/// trait the next-hop pool drives directly, so the pool does not need to
/// know about route-level FAL calls at all.
pub struct NextHopFalAdapter<F> {
    fal: F,
}

impl<F: Fal> NextHopFalAdapter<F> {
    pub fn new(fal: F) -> Self {
        NextHopFalAdapter { fal }
    }
}

impl<F: Fal> vplane_nexthop::hw::HwShadow for NextHopFalAdapter<F> {
    fn create_group(&self, siblings: &Siblings) -> vplane_nexthop::hw::HwCreateResult {
        let result = self.fal.ip4_new_next_hops(siblings);
        vplane_nexthop::hw::HwCreateResult {
            group_handle: result.group_handle,
            sibling_handles: result.sibling_handles,
            pd_state: result.status.to_pd_state(),
        }
    }

    fn delete_group(&self, group_handle: Option<u64>, sibling_handles: &[Option<u64>]) {
        self.fal.ip4_del_next_hops(group_handle, sibling_handles);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(FalStatus::Ok.to_pd_state(), PdState::Full);
        assert_eq!(FalStatus::Unsupported.to_pd_state(), PdState::NotNeeded);
        assert_eq!(FalStatus::NoResource.to_pd_state(), PdState::NoResource);
        assert_eq!(FalStatus::Other(-1).to_pd_state(), PdState::Error);
    }

    #[test]
    fn null_fal_is_always_not_needed() {
        let fal = NullFal;
        let siblings: Siblings = [vplane_nexthop::Sibling::connected(1)].into_iter().collect();
        let result = fal.ip4_new_next_hops(&siblings);
        assert_eq!(result.status, FalStatus::Unsupported);
        assert_eq!(result.sibling_handles.len(), 1);
    }
}
