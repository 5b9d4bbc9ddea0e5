//
// Copyright (c) The VPlane Project Contributors
//
// SPDX-License-Identifier: MIT
//

//! IPv4 LPM trie (component C4).
//!
//! Built on [`prefix_trie::PrefixMap`], the same crate the routing
//! daemon uses for its RIB (`holo-routing::rib::Rib::ip`). The bare
//! container only gives longest-prefix-match storage; this module wraps
//! it in an RCU-style snapshot (publishing through
//! [`vplane_epoch::ReclaimedPtr`]) and adds the scoped-rule coexistence
//! and promotion/demotion semantics the FIB coordinator needs.

pub mod rule;
pub mod trie;

pub use rule::{AddOutcome, DeleteOutcome, PlatformState, Rule};
pub use trie::LpmTrie;
