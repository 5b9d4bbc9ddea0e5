//
// Copyright (c) The VPlane Project Contributors
//
// SPDX-License-Identifier: MIT
//

//! FIB coordinator (component C5) and neighbour table (component C6).
//!
//! Ties the LPM trie (`vplane-lpm`), the next-hop pool (`vplane-nexthop`)
//! and the hardware shadow (`vplane-fal`) together into route
//! insert/delete and the ARP link/unlink choreography of §4.5-§4.6.

pub mod coordinator;
pub mod neighbour;
pub mod stats;

pub use coordinator::{Fib, FibError};
pub use neighbour::{NeighState, NeighbourEntry, NeighbourTable};
pub use stats::{FibStats, OutcomeSnapshot};
