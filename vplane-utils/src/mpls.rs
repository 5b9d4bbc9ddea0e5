//
// Copyright (c) The VPlane Project Contributors
//
// SPDX-License-Identifier: MIT
//

use serde::{Deserialize, Serialize};

/// A single MPLS label value (20-bit), used in next-hop sibling out-label
/// stacks (§3, "Next-hop sibling").
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub struct Label(u32);

impl Label {
    pub const IMPLICIT_NULL: Label = Label(3);

    pub fn new(value: u32) -> Self {
        Label(value & 0x000f_ffff)
    }

    pub fn value(&self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
