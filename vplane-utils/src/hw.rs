//
// Copyright (c) The VPlane Project Contributors
//
// SPDX-License-Identifier: MIT
//

//! Hardware-offload state shared by every component that mirrors
//! software state into the hardware shadow (§4.3, §4.4, §4.11).

use serde::{Deserialize, Serialize};

/// Offload state of a next-hop group or LPM rule.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum PdState {
    Full,
    NotNeeded,
    NoResource,
    Error,
}

impl std::fmt::Display for PdState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PdState::Full => write!(f, "full"),
            PdState::NotNeeded => write!(f, "not-needed"),
            PdState::NoResource => write!(f, "no-resource"),
            PdState::Error => write!(f, "error"),
        }
    }
}
