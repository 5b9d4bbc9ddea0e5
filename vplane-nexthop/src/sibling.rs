//
// Copyright (c) The VPlane Project Contributors
//
// SPDX-License-Identifier: MIT
//

//! One path inside a next-hop group (§3, "Next-hop sibling").
//!
//! The original representation overloads a flag bit and a union to pick
//! between "plain interface" and "resolved neighbour" targets (§9,
//! REDESIGN FLAGS: "Tagged union for sibling target"). Here that's an
//! explicit [`Target`] enum instead, with the flag set reduced to
//! orthogonal attributes that no longer need to encode the discriminant.

use std::net::IpAddr;

use bitflags::bitflags;
use vplane_utils::mpls::Label;

bitflags! {
    /// Sibling attribute flags (§3). `NEIGH_PRESENT` and `NEIGH_CREATED`
    /// are derivable from [`Target`] in this representation and kept
    /// here only for wire/console compatibility with the flag names the
    /// spec uses; they are always kept in sync with `target` by
    /// [`Sibling::set_target`].
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct SiblingFlags: u16 {
        const BLACKHOLE     = 0x0001;
        const REJECT        = 0x0002;
        const LOCAL         = 0x0004;
        const GATEWAY       = 0x0008;
        const SLOWPATH      = 0x0010;
        const DEAD          = 0x0020;
        const NEIGH_PRESENT = 0x0040;
        const NEIGH_CREATED = 0x0080;
        const NOROUTE       = 0x0100;
        const BROADCAST     = 0x0200;
    }
}

impl SiblingFlags {
    /// Flags excluded from the interning hash key (§4.3, "Hash key"):
    /// runtime transient flags that a neighbour-link mutation toggles
    /// without changing the group's identity.
    pub const CMP_MASK: SiblingFlags = SiblingFlags::NEIGH_PRESENT
        .union(SiblingFlags::NEIGH_CREATED)
        .union(SiblingFlags::DEAD);

    pub fn for_hash(self) -> SiblingFlags {
        self.difference(Self::CMP_MASK)
    }
}

/// What a sibling forwards towards.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Target {
    /// Directly out an interface, with no resolved neighbour (either
    /// never resolved, or deliberately unresolved e.g. a point-to-point
    /// link).
    Interface { ifindex: u32 },
    /// A resolved neighbour on the given interface. Held as an address,
    /// not a pointer: the neighbour table (`vplane-fib::neighbour`) is
    /// the owner, and siblings look it up by `(ifindex, address)` inside
    /// a reader section rather than caching a reference across grace
    /// periods (§9, "Cyclic references via indices").
    Neighbour { ifindex: u32, address: IpAddr },
}

impl Target {
    pub fn ifindex(&self) -> u32 {
        match self {
            Target::Interface { ifindex } => *ifindex,
            Target::Neighbour { ifindex, .. } => *ifindex,
        }
    }

    pub fn is_neighbour(&self) -> bool {
        matches!(self, Target::Neighbour { .. })
    }
}

/// One path inside a next-hop group (§3).
#[derive(Clone, Debug, PartialEq)]
pub struct Sibling {
    pub gateway: Option<IpAddr>,
    pub flags: SiblingFlags,
    pub target: Target,
    pub labels: Vec<Label>,
}

impl Sibling {
    pub fn new(ifindex: u32, gateway: Option<IpAddr>, flags: SiblingFlags) -> Self {
        Sibling {
            gateway,
            flags,
            target: Target::Interface { ifindex },
            labels: Vec::new(),
        }
    }

    pub fn connected(ifindex: u32) -> Self {
        Sibling::new(ifindex, None, SiblingFlags::empty())
    }

    pub fn via_gateway(ifindex: u32, gateway: IpAddr) -> Self {
        Sibling::new(ifindex, Some(gateway), SiblingFlags::GATEWAY)
    }

    pub fn blackhole() -> Self {
        Sibling::new(0, None, SiblingFlags::BLACKHOLE)
    }

    /// Whether this sibling is "connected" per §4.5: flags intersect none
    /// of BLACKHOLE, REJECT, SLOWPATH, GATEWAY, LOCAL, NOROUTE.
    pub fn is_connected(&self) -> bool {
        const EXCLUDED: SiblingFlags = SiblingFlags::BLACKHOLE
            .union(SiblingFlags::REJECT)
            .union(SiblingFlags::SLOWPATH)
            .union(SiblingFlags::GATEWAY)
            .union(SiblingFlags::LOCAL)
            .union(SiblingFlags::NOROUTE);
        !self.flags.intersects(EXCLUDED)
    }

    pub fn is_dead(&self) -> bool {
        self.flags.contains(SiblingFlags::DEAD)
    }

    /// Updates the target, keeping `NEIGH_PRESENT`/`NEIGH_CREATED` in
    /// sync with the discriminant so that both representations of "has a
    /// resolved neighbour" always agree.
    pub fn set_target(&mut self, target: Target, neigh_created: bool) {
        self.flags.set(SiblingFlags::NEIGH_PRESENT, target.is_neighbour());
        self.flags
            .set(SiblingFlags::NEIGH_CREATED, target.is_neighbour() && neigh_created);
        self.target = target;
    }

    /// The tuple used as part of the interning hash key (§4.3).
    pub fn hash_key(&self) -> SiblingHashKey {
        SiblingHashKey {
            ifindex: self.target.ifindex(),
            gateway: self.gateway,
            flags: self.flags.for_hash(),
            labels: self.labels.clone(),
        }
    }
}

#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct SiblingHashKey {
    pub ifindex: u32,
    pub gateway: Option<IpAddr>,
    pub flags: SiblingFlags,
    pub labels: Vec<Label>,
}

impl std::hash::Hash for SiblingFlags {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.bits().hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cmp_mask_excludes_transient_flags() {
        let mut flags = SiblingFlags::GATEWAY | SiblingFlags::NEIGH_PRESENT | SiblingFlags::DEAD;
        assert_eq!(flags.for_hash(), SiblingFlags::GATEWAY);
        flags.remove(SiblingFlags::DEAD);
        assert_eq!(flags.for_hash(), SiblingFlags::GATEWAY);
    }

    #[test]
    fn connected_excludes_gateway_and_blackhole() {
        assert!(Sibling::connected(1).is_connected());
        assert!(!Sibling::via_gateway(1, "10.0.0.1".parse().unwrap()).is_connected());
        assert!(!Sibling::blackhole().is_connected());
    }

    #[test]
    fn set_target_syncs_flags() {
        let mut sib = Sibling::connected(1);
        sib.set_target(
            Target::Neighbour { ifindex: 1, address: "10.0.0.7".parse().unwrap() },
            true,
        );
        assert!(sib.flags.contains(SiblingFlags::NEIGH_PRESENT));
        assert!(sib.flags.contains(SiblingFlags::NEIGH_CREATED));

        sib.set_target(Target::Interface { ifindex: 1 }, false);
        assert!(!sib.flags.contains(SiblingFlags::NEIGH_PRESENT));
        assert!(!sib.flags.contains(SiblingFlags::NEIGH_CREATED));
    }
}
