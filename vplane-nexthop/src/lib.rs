//
// Copyright (c) The VPlane Project Contributors
//
// SPDX-License-Identifier: MIT
//

//! Next-hop pool (component C3).
//!
//! Dedup'd, refcounted next-hop groups addressed by a stable 1-based
//! index. The pool is the interning layer between the FIB coordinator
//! (`vplane-fib`) and the hardware shadow (`vplane-fal`): two routes that
//! resolve to the same path share one group and one hardware handle.

pub mod group;
pub mod hw;
pub mod pool;
pub mod sibling;

pub use group::Group;
pub use hw::PdState;
pub use pool::{InternOutcome, NextHopPool, PoolError};
pub use sibling::{Sibling, SiblingFlags, Target};
