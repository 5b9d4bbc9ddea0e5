//
// Copyright (c) The VPlane Project Contributors
//
// SPDX-License-Identifier: MIT
//

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Routing protocol that originated a route or next-hop group (§3, "Next-hop
/// group"). `KERNEL` and `BOOT` mirror the kernel's own RTPROT_* namespace
/// since the controller channel speaks netlink-like semantics (§6).
#[allow(clippy::upper_case_acronyms)]
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    KERNEL,
    BOOT,
    STATIC,
    CONNECTED,
    BGP,
    OSPF,
    ISIS,
    RIP,
}

// ===== impl Protocol =====

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Protocol::KERNEL => write!(f, "kernel"),
            Protocol::BOOT => write!(f, "boot"),
            Protocol::STATIC => write!(f, "static"),
            Protocol::CONNECTED => write!(f, "connected"),
            Protocol::BGP => write!(f, "bgp"),
            Protocol::OSPF => write!(f, "ospf"),
            Protocol::ISIS => write!(f, "isis"),
            Protocol::RIP => write!(f, "rip"),
        }
    }
}

impl FromStr for Protocol {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_ref() {
            "kernel" => Ok(Protocol::KERNEL),
            "boot" => Ok(Protocol::BOOT),
            "static" => Ok(Protocol::STATIC),
            "connected" | "direct" => Ok(Protocol::CONNECTED),
            "bgp" => Ok(Protocol::BGP),
            "ospf" => Ok(Protocol::OSPF),
            "isis" => Ok(Protocol::ISIS),
            "rip" => Ok(Protocol::RIP),
            _ => Err(()),
        }
    }
}

/// Route table identifiers (§3, "FIB table"). `RT_MAIN` is primary; other
/// table ids in non-default VRFs alias tables in the default VRF.
pub const RT_UNSPEC: u32 = 0;
pub const RT_MAIN: u32 = 254;
pub const RT_LOCAL: u32 = 255;

/// Distinguished VRF ids (§3, "VRF").
pub const VRF_DEFAULT: u32 = 0;
pub const VRF_INVALID: u32 = u32::MAX;
