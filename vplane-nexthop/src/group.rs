//
// Copyright (c) The VPlane Project Contributors
//
// SPDX-License-Identifier: MIT
//

//! Next-hop group (§3, "Next-hop group").

use smallvec::SmallVec;
use vplane_utils::protocol::Protocol;

use crate::hw::PdState;
use crate::sibling::{Sibling, SiblingHashKey};

/// Most groups carry one or a handful of siblings; this keeps the common
/// case inline the way the original's fixed small-array group layout
/// does, without capping ECMP width.
pub type Siblings = SmallVec<[Sibling; 4]>;

/// A refcounted, interned set of siblings (§3).
#[derive(Clone, Debug)]
pub struct Group {
    pub index: u32,
    pub proto: Protocol,
    pub siblings: Siblings,
    pub refcount: u32,
    pub hw_handle: Option<u64>,
    pub sibling_hw_handles: Vec<Option<u64>>,
    pub pd_state: PdState,
}

impl Group {
    pub fn new(index: u32, proto: Protocol, siblings: Siblings) -> Self {
        let sibling_hw_handles = vec![None; siblings.len()];
        Group {
            index,
            proto,
            siblings,
            refcount: 1,
            hw_handle: None,
            sibling_hw_handles,
            pd_state: PdState::NotNeeded,
        }
    }

    /// Any-connected per §4.5: at least one sibling is connected.
    pub fn is_any_connected(&self) -> bool {
        self.siblings.iter().any(Sibling::is_connected)
    }

    /// The interning hash key for this group (§4.3).
    pub fn hash_key(&self) -> GroupHashKey {
        GroupHashKey {
            proto: self.proto,
            siblings: self.siblings.iter().map(Sibling::hash_key).collect(),
        }
    }

    /// Builds the replacement group used by replace-in-place mutations
    /// (§4.3, "Neighbour-link mutation"): same index and refcount, new
    /// sibling list, hardware state preserved since the hardware view is
    /// unchanged.
    pub fn with_siblings(&self, siblings: Siblings) -> Self {
        Group {
            index: self.index,
            proto: self.proto,
            siblings,
            refcount: self.refcount,
            hw_handle: self.hw_handle,
            sibling_hw_handles: self.sibling_hw_handles.clone(),
            pd_state: self.pd_state,
        }
    }
}

#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct GroupHashKey {
    pub proto: Protocol,
    pub siblings: Vec<SiblingHashKey>,
}
