//
// Copyright (c) The VPlane Project Contributors
//
// SPDX-License-Identifier: MIT
//

//! A single LPM rule and the outcomes of mutating the trie (§4.4).

use vplane_utils::controller::Scope;
use vplane_utils::hw::PdState;

/// One active or shadowed entry at a given prefix (§4.4, "Scoped
/// rules"). Multiple `Rule`s can coexist at the same prefix/depth, keyed
/// by [`Scope`] in the trie's per-prefix map; only the highest scope is
/// active.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Rule {
    pub nh_index: u32,
    pub platform_state: PlatformState,
}

impl Rule {
    pub fn new(nh_index: u32) -> Self {
        Rule {
            nh_index,
            platform_state: PlatformState::default(),
        }
    }
}

/// Per-rule hardware offload state (§4.4, "Per-rule platform state").
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PlatformState {
    pub offload_state: PdState,
    pub created: bool,
}

impl Default for PlatformState {
    fn default() -> Self {
        PlatformState {
            offload_state: PdState::NotNeeded,
            created: false,
        }
    }
}

/// Result of [`crate::LpmTrie::add`] (§4.4).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AddOutcome {
    /// The new rule is now the active one at this prefix/depth.
    Success,
    /// A rule at a higher scope is already active; the new rule was
    /// inserted shadowed.
    HigherScopeExists,
    /// The new rule displaced a previously-active lower-scope rule,
    /// which is now shadowed.
    LowerScopeExists,
    /// A rule already exists at this exact prefix/depth/scope.
    AlreadyExists,
    /// The trie has no room for another tbl8 page (§4.4 contract; this
    /// implementation's underlying container does not itself impose a
    /// page limit, so this variant is reachable only via
    /// [`crate::LpmTrie::with_rule_limit`]).
    NoSpace,
}

/// Result of [`crate::LpmTrie::delete`] (§4.4).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DeleteOutcome {
    /// The deleted rule was not the active one; nothing else changed.
    Shadowed { displaced_nh_index: u32 },
    /// The deleted rule was active and a previously-shadowed rule at a
    /// lower scope was promoted.
    Promoted { displaced_nh_index: u32, promoted_nh_index: u32 },
    /// The deleted rule was active and no other scope remains at this
    /// prefix/depth; the prefix is now empty.
    Removed { displaced_nh_index: u32 },
    NotFound,
}

#[allow(unused)]
fn _scope_ord_sanity(a: Scope, b: Scope) {
    let _ = a < b;
}
