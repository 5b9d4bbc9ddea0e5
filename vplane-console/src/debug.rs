//
// Copyright (c) The VPlane Project Contributors
//
// SPDX-License-Identifier: MIT
//

//! Debug bitmask (§6, "Environment... debug bitmask names"), lifted
//! verbatim (name, order and the one reserved slot) from the original
//! `debug_bits` table in `src/commands.c`.

use std::sync::atomic::{AtomicU64, Ordering};

pub const DEBUG_FLAGS: &[&str] = &[
    "init", "link", "arp", "bridge", "nl_interface", "nl_route", "nl_address",
    "nl_neighbor", "nl_netconf", "subscribe", "resync", "nd6", "route",
    "macvlan", "vxlan", "qos", "npf", "nat", "l2tp", "lag", "dealer", "nsh",
    "vti", "crypto", "crypto_data", "vhost", "vrf", "multicast",
    "mpls_control", "mpls_pkterr", "reserved", "dpi", "qos_dp", "qos_hw",
    "storm_ctl", "cpp_rl", "ptp",
];

/// Finds a flag by name, allowing abbreviation (first name with `str`
/// as a prefix wins), mirroring `find_debug_bit`.
fn find_bit(name: &str) -> Option<usize> {
    DEBUG_FLAGS.iter().position(|flag| flag.starts_with(name))
}

/// The live debug bitmask (`dp_debug` in the original), one bit per
/// entry in [`DEBUG_FLAGS`].
#[derive(Default)]
pub struct DebugMask(AtomicU64);

impl DebugMask {
    pub const fn new() -> Self {
        DebugMask(AtomicU64::new(0))
    }

    pub fn bits(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    pub fn is_enabled(&self, index: usize) -> bool {
        self.bits() & (1 << index) != 0
    }

    /// Applies one `cmd_debug` argument: `"all"` sets every bit,
    /// `"-flag"` clears a bit, `"flag"` sets it. Returns the flag name
    /// rejected, if any.
    pub fn apply(&self, arg: &str) -> Result<(), String> {
        if arg == "all" {
            self.0.store(u64::MAX, Ordering::Relaxed);
            return Ok(());
        }
        if let Some(flag) = arg.strip_prefix('-') {
            let Some(index) = find_bit(flag) else {
                return Err(flag.to_owned());
            };
            self.0.fetch_and(!(1 << index), Ordering::Relaxed);
            Ok(())
        } else {
            let Some(index) = find_bit(arg) else {
                return Err(arg.to_owned());
            };
            self.0.fetch_or(1 << index, Ordering::Relaxed);
            Ok(())
        }
    }

    /// Renders the currently-set flag names, matching `show_debug`.
    pub fn show(&self) -> String {
        let bits = self.bits();
        let mut out = format!("Debug {bits:#x}");
        for (index, flag) in DEBUG_FLAGS.iter().enumerate() {
            if bits & (1 << index) != 0 {
                out.push(' ');
                out.push_str(flag);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn abbreviation_matches_first_prefix() {
        let mask = DebugMask::new();
        mask.apply("rou").unwrap();
        assert!(mask.is_enabled(DEBUG_FLAGS.iter().position(|f| *f == "route").unwrap()));
    }

    #[test]
    fn all_sets_every_bit() {
        let mask = DebugMask::new();
        mask.apply("all").unwrap();
        assert_eq!(mask.bits(), u64::MAX);
    }

    #[test]
    fn clear_flag_unsets_bit() {
        let mask = DebugMask::new();
        mask.apply("arp").unwrap();
        mask.apply("-arp").unwrap();
        assert!(!mask.is_enabled(2));
    }

    #[test]
    fn unknown_flag_rejected() {
        let mask = DebugMask::new();
        assert!(mask.apply("not-a-flag").is_err());
    }
}
