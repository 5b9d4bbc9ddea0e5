//
// Copyright (c) The VPlane Project Contributors
//
// SPDX-License-Identifier: MIT
//

//! Hardware shadow integration for next-hop groups (§4.3, "Hardware
//! shadow"). The actual FAL façade lives in `vplane-fal`; this module
//! only defines the trait the pool calls into and the state it stores
//! per group, matching the C11 contract's `ip4_new_next_hops`/
//! `ip4_del_next_hops` shape.

pub use vplane_utils::hw::PdState;

/// Result of a hardware group create call.
#[derive(Clone, Debug)]
pub struct HwCreateResult {
    pub group_handle: Option<u64>,
    pub sibling_handles: Vec<Option<u64>>,
    pub pd_state: PdState,
}

/// The hardware-shadow hook the next-hop pool drives on intern/release.
/// `vplane-fal` provides the concrete implementation; a no-backend build
/// uses the `NullShadow` stub below, always returning `NOT_NEEDED`
/// (§4.11, "no-backend implementation").
pub trait HwShadow: Send + Sync {
    fn create_group(&self, siblings: &crate::group::Siblings) -> HwCreateResult;
    fn delete_group(&self, group_handle: Option<u64>, sibling_handles: &[Option<u64>]);
}

/// Shadow implementation for builds with no hardware offload backend.
pub struct NullShadow;

impl HwShadow for NullShadow {
    fn create_group(&self, siblings: &crate::group::Siblings) -> HwCreateResult {
        HwCreateResult {
            group_handle: None,
            sibling_handles: vec![None; siblings.len()],
            pd_state: PdState::NotNeeded,
        }
    }

    fn delete_group(&self, _group_handle: Option<u64>, _sibling_handles: &[Option<u64>]) {}
}
