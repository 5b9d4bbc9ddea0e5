//
// Copyright (c) The VPlane Project Contributors
//
// SPDX-License-Identifier: MIT
//

//! The LPM trie itself (§4.4).

use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::sync::Mutex;

use ipnetwork::Ipv4Network;
use prefix_trie::PrefixMap;
use vplane_epoch::{Domain, ReclaimedPtr, Section};
use vplane_utils::controller::Scope;
use vplane_utils::hw::PdState;

use crate::rule::{AddOutcome, DeleteOutcome, PlatformState, Rule};

/// A rule's position in a prefix's scope stack. `Reserved` sorts below
/// every [`Scope`] (declaration order drives the derived `Ord`, and
/// `Reserved` is declared first), so the three always-present routes of
/// §3 never outrank a controller-supplied one, however broad. Only
/// `Rule(scope)` entries are ever reachable through the public,
/// `Scope`-typed add/delete/walk API; `Reserved` is installed once by
/// [`LpmTrie::new`] and never touched again.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
enum Priority {
    Reserved,
    Rule(Scope),
}

type RuleSet = BTreeMap<Priority, Rule>;
type Snapshot = PrefixMap<Ipv4Network, RuleSet>;

/// An LPM trie over IPv4 prefixes (§4.4). One instance exists per
/// (VRF, table id) pair in the FIB coordinator.
pub struct LpmTrie {
    domain: Domain,
    snapshot: ReclaimedPtr<Snapshot>,
    control: Mutex<()>,
    rule_limit: Option<usize>,
}

impl std::fmt::Debug for LpmTrie {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LpmTrie").finish_non_exhaustive()
    }
}

impl LpmTrie {
    /// Creates a trie pre-populated with the three reserved routes of
    /// §3 ("Reserved routes"), all pointing at `reserved_nh_index` (the
    /// pool's blackhole group in production use) and installed below
    /// every real [`Scope`] so a controller-supplied route at the same
    /// prefix — however broad, down to [`Scope::UNIVERSE`] — always
    /// becomes the active one; the reserved entry only ever resurfaces
    /// as a last-resort fallback and is never shown by `walk`/`dump`.
    pub fn new(domain: Domain, reserved_nh_index: u32) -> Self {
        let mut snapshot = Snapshot::default();
        for (network, _depth) in vplane_utils::ip::reserved_ipv4_routes() {
            let mut rules = RuleSet::new();
            rules.insert(
                Priority::Reserved,
                Rule {
                    nh_index: reserved_nh_index,
                    platform_state: PlatformState {
                        offload_state: PdState::NotNeeded,
                        created: false,
                    },
                },
            );
            snapshot.insert(network, rules);
        }
        LpmTrie {
            domain,
            snapshot: ReclaimedPtr::new(snapshot),
            control: Mutex::new(()),
            rule_limit: None,
        }
    }

    /// Caps the total rule count, surfacing [`AddOutcome::NoSpace`] once
    /// reached (§4.4 contract). Used by tests exercising the resource
    /// exhaustion path; production tries are otherwise unbounded beyond
    /// the index-space limits enforced by `vplane-nexthop`.
    pub fn with_rule_limit(mut self, limit: usize) -> Self {
        self.rule_limit = Some(limit);
        self
    }

    pub fn domain(&self) -> &Domain {
        &self.domain
    }

    /// Number of rules across every prefix, including the reserved
    /// routes. A count of 3 is "empty" (§4.4, "Rule-count floor").
    pub fn rule_count(&self, section: &Section<'_>) -> usize {
        self.snapshot
            .load(section)
            .map(|snap| snap.iter().map(|(_, rules)| rules.len()).sum())
            .unwrap_or(0)
    }

    pub fn is_empty(&self, section: &Section<'_>) -> bool {
        self.rule_count(section) == 3
    }

    // ===== read-side =====

    /// Longest-prefix match against a host address (§4.4, `lookup`).
    pub fn lookup(&self, section: &Section<'_>, addr: Ipv4Addr) -> Option<u32> {
        let snap = self.snapshot.load(section)?;
        let host = Ipv4Network::new(addr, 32).expect("/32 is always valid");
        let (_, rules) = snap.get_lpm(&host)?;
        active_rule(rules).map(|(_, rule)| rule.nh_index)
    }

    /// Exact-prefix lookup (§4.4, `lookup_exact`): returns the active
    /// rule's next-hop index at precisely `network`, ignoring covers.
    pub fn lookup_exact(&self, section: &Section<'_>, network: Ipv4Network) -> Option<u32> {
        let snap = self.snapshot.load(section)?;
        let rules = snap.get(&network)?;
        active_rule(rules).map(|(_, rule)| rule.nh_index)
    }

    /// Most specific strictly-shorter prefix covering `network` (§4.4,
    /// `find_cover`).
    pub fn find_cover(
        &self,
        section: &Section<'_>,
        network: Ipv4Network,
    ) -> Option<(Ipv4Network, u32)> {
        let snap = self.snapshot.load(section)?;
        let addr_bits = u32::from(network.ip());
        for depth in (0..network.prefix()).rev() {
            let mask = if depth == 0 { 0 } else { u32::MAX << (32 - depth) };
            let truncated = Ipv4Addr::from(addr_bits & mask);
            let candidate = Ipv4Network::new(truncated, depth).unwrap();
            if let Some(rules) = snap.get(&candidate)
                && let Some((_, rule)) = active_rule(rules)
            {
                return Some((candidate, rule.nh_index));
            }
        }
        None
    }

    /// Iterates every rule under `network` (inclusive), in depth order,
    /// active scope first within each prefix (§4.4, `subtree_walk`).
    pub fn subtree_walk<F>(&self, section: &Section<'_>, network: Ipv4Network, mut cb: F)
    where
        F: FnMut(Ipv4Network, Scope, u32, bool),
    {
        let Some(snap) = self.snapshot.load(section) else {
            return;
        };
        let mut entries = collect_subtree(snap, Some(network));
        entries.sort_by_key(|(net, _, _)| net.prefix());
        for (net, scope, rule, active) in entries {
            cb(net, scope, rule.nh_index, active);
        }
    }

    /// Full traversal (§4.4, `walk`).
    pub fn walk<F>(&self, section: &Section<'_>, mut cb: F)
    where
        F: FnMut(Ipv4Network, Scope, u32, bool),
    {
        let Some(snap) = self.snapshot.load(section) else {
            return;
        };
        let mut entries = collect_subtree(snap, None);
        entries.sort_by(sort_key);
        for (net, scope, rule, active) in entries {
            cb(net, scope, rule.nh_index, active);
        }
    }

    /// Resumable traversal starting strictly after `(network, scope)`
    /// (§4.4, `walk_from`).
    pub fn walk_from<F>(
        &self,
        section: &Section<'_>,
        network: Ipv4Network,
        scope: Scope,
        mut cb: F,
    ) where
        F: FnMut(Ipv4Network, Scope, u32, bool),
    {
        let Some(snap) = self.snapshot.load(section) else {
            return;
        };
        let mut entries = collect_subtree(snap, None);
        entries.sort_by(sort_key);
        let cursor = (network.prefix(), u32::from(network.ip()), scope);
        for (net, s, rule, active) in entries {
            if (net.prefix(), u32::from(net.ip()), s) <= cursor {
                continue;
            }
            cb(net, s, rule.nh_index, active);
        }
    }

    // ===== control-side =====

    /// Adds a rule at `network`/`scope` (§4.4, `add`).
    pub fn add(
        &self,
        section: &Section<'_>,
        network: Ipv4Network,
        scope: Scope,
        nh_index: u32,
    ) -> AddOutcome {
        let _guard = self.control.lock().unwrap();
        let mut next = self.snapshot.load(section).cloned().unwrap_or_default();

        let priority = Priority::Rule(scope);
        if next.get(&network).is_some_and(|rules| rules.contains_key(&priority)) {
            return AddOutcome::AlreadyExists;
        }
        if let Some(limit) = self.rule_limit {
            let total: usize = next.iter().map(|(_, r)| r.len()).sum();
            if total >= limit {
                return AddOutcome::NoSpace;
            }
        }

        let rules = next.entry(network).or_default();
        let previous_active = rules.keys().next_back().copied();
        rules.insert(priority, Rule::new(nh_index));

        let outcome = match previous_active {
            Some(previous) if previous > priority => AddOutcome::HigherScopeExists,
            Some(_) => AddOutcome::LowerScopeExists,
            None => AddOutcome::Success,
        };

        if outcome == AddOutcome::LowerScopeExists
            && let Some(previous) = previous_active
            && let Some(shadowed) = rules.get_mut(&previous)
        {
            shadowed.platform_state.offload_state = PdState::NotNeeded;
        }

        self.snapshot.publish(section, next);
        outcome
    }

    /// Deletes the rule at `network`/`scope` (§4.4, `delete`).
    pub fn delete(
        &self,
        section: &Section<'_>,
        network: Ipv4Network,
        scope: Scope,
    ) -> DeleteOutcome {
        let _guard = self.control.lock().unwrap();
        let mut next = self.snapshot.load(section).cloned().unwrap_or_default();

        let priority = Priority::Rule(scope);
        let Some(rules) = next.get_mut(&network) else {
            return DeleteOutcome::NotFound;
        };
        let was_active = rules.keys().next_back().copied() == Some(priority);
        let Some(removed) = rules.remove(&priority) else {
            return DeleteOutcome::NotFound;
        };

        let outcome = if !was_active {
            DeleteOutcome::Shadowed { displaced_nh_index: removed.nh_index }
        } else if let Some((_, promoted_rule)) = rules.iter_mut().next_back() {
            promoted_rule.platform_state.offload_state = PdState::NotNeeded;
            DeleteOutcome::Promoted {
                displaced_nh_index: removed.nh_index,
                promoted_nh_index: promoted_rule.nh_index,
            }
        } else {
            DeleteOutcome::Removed { displaced_nh_index: removed.nh_index }
        };

        if rules.is_empty() {
            next.remove(&network);
        }
        self.snapshot.publish(section, next);
        outcome
    }
}

fn active_rule(rules: &RuleSet) -> Option<(Priority, &Rule)> {
    rules.iter().next_back().map(|(priority, rule)| (*priority, rule))
}

/// Flattens a snapshot into public, `Scope`-typed rows. [`Priority::Reserved`]
/// entries are never emitted: the three reserved routes of §3 exist only
/// as a lookup fallback, not as something `walk`/`dump_routes` shows
/// (§3, "never appear in route dumps").
fn collect_subtree(
    snap: &Snapshot,
    within: Option<Ipv4Network>,
) -> Vec<(Ipv4Network, Scope, Rule, bool)> {
    let mut out = Vec::new();
    for (network, rules) in snap.iter() {
        if let Some(within) = within
            && !is_subnet_of(*network, within)
        {
            continue;
        }
        let active_priority = rules.keys().next_back().copied();
        for (priority, rule) in rules {
            let Priority::Rule(scope) = priority else {
                continue;
            };
            out.push((*network, *scope, *rule, Some(*priority) == active_priority));
        }
    }
    out
}

fn is_subnet_of(candidate: Ipv4Network, parent: Ipv4Network) -> bool {
    if candidate.prefix() < parent.prefix() {
        return false;
    }
    let mask = if parent.prefix() == 0 {
        0
    } else {
        u32::MAX << (32 - parent.prefix())
    };
    (u32::from(candidate.ip()) & mask) == (u32::from(parent.ip()) & mask)
}

fn sort_key(
    a: &(Ipv4Network, Scope, Rule, bool),
    b: &(Ipv4Network, Scope, Rule, bool),
) -> std::cmp::Ordering {
    (a.0.prefix(), u32::from(a.0.ip()), a.1).cmp(&(b.0.prefix(), u32::from(b.0.ip()), b.1))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn net(s: &str) -> Ipv4Network {
        s.parse().unwrap()
    }

    fn trie() -> (LpmTrie, Domain) {
        let domain = Domain::new();
        (LpmTrie::new(domain.clone(), 0), domain)
    }

    #[test]
    fn reserved_routes_present_and_empty_floor() {
        let (trie, domain) = trie();
        let mut reader = domain.register();
        let section = reader.enter();
        assert_eq!(trie.rule_count(&section), 3);
        assert!(trie.is_empty(&section));
    }

    #[test]
    fn add_lookup_and_scope_promotion_round_trip() {
        let (trie, domain) = trie();
        let mut reader = domain.register();
        let section = reader.enter();

        let prefix = net("10.0.0.0/24");
        assert_eq!(
            trie.add(&section, prefix, Scope::SITE, 5),
            AddOutcome::Success
        );
        assert_eq!(
            trie.add(&section, prefix, Scope::LINK, 7),
            AddOutcome::LowerScopeExists
        );
        assert_eq!(trie.lookup(&section, "10.0.0.7".parse().unwrap()), Some(7));

        let outcome = trie.delete(&section, prefix, Scope::LINK);
        assert_eq!(
            outcome,
            DeleteOutcome::Promoted { displaced_nh_index: 7, promoted_nh_index: 5 }
        );
        assert_eq!(trie.lookup(&section, "10.0.0.7".parse().unwrap()), Some(5));
    }

    #[test]
    fn higher_scope_shadowed_on_add() {
        let (trie, domain) = trie();
        let mut reader = domain.register();
        let section = reader.enter();

        let prefix = net("10.0.0.0/24");
        trie.add(&section, prefix, Scope::LINK, 7);
        let outcome = trie.add(&section, prefix, Scope::SITE, 5);
        assert_eq!(outcome, AddOutcome::HigherScopeExists);
        assert_eq!(trie.lookup(&section, "10.0.0.1".parse().unwrap()), Some(7));
    }

    #[test]
    fn find_cover_returns_strictly_shorter_prefix() {
        let (trie, domain) = trie();
        let mut reader = domain.register();
        let section = reader.enter();

        trie.add(&section, net("10.3.0.0/24"), Scope::LINK, 9);
        let (cover, nh) = trie
            .find_cover(&section, net("10.3.0.5/32"))
            .expect("cover exists");
        assert_eq!(cover, net("10.3.0.0/24"));
        assert_eq!(nh, 9);
    }

    #[test]
    fn subtree_cleanup_scenario() {
        let (trie, domain) = trie();
        let mut reader = domain.register();
        let section = reader.enter();

        trie.add(&section, net("10.3.0.0/24"), Scope::LINK, 1);
        trie.add(&section, net("10.3.0.5/32"), Scope::LINK, 2);
        trie.add(&section, net("10.3.0.6/32"), Scope::LINK, 3);

        let mut found = Vec::new();
        trie.subtree_walk(&section, net("10.3.0.0/24"), |network, _scope, nh, _active| {
            found.push((network, nh));
        });
        assert_eq!(found.len(), 3);

        trie.delete(&section, net("10.3.0.5/32"), Scope::LINK);
        trie.delete(&section, net("10.3.0.6/32"), Scope::LINK);

        let mut remaining = Vec::new();
        trie.subtree_walk(&section, net("10.3.0.0/24"), |network, _scope, nh, _active| {
            remaining.push((network, nh));
        });
        assert_eq!(remaining, vec![(net("10.3.0.0/24"), 1)]);
    }

    #[test]
    fn default_route_outranks_reserved_default() {
        let (trie, domain) = trie();
        let mut reader = domain.register();
        let section = reader.enter();

        let default = net("0.0.0.0/0");
        assert_eq!(trie.lookup(&section, "198.51.100.1".parse().unwrap()), Some(0));

        assert_eq!(
            trie.add(&section, default, Scope::UNIVERSE, 42),
            AddOutcome::LowerScopeExists
        );
        assert_eq!(trie.lookup(&section, "198.51.100.1".parse().unwrap()), Some(42));

        let mut seen = Vec::new();
        trie.walk(&section, |net, scope, nh, active| {
            seen.push((net, scope, nh, active));
        });
        assert_eq!(
            seen.iter().filter(|(n, _, _, _)| *n == default).count(),
            1,
            "only the controller-supplied default shows up, not the reserved fallback"
        );

        assert_eq!(
            trie.delete(&section, default, Scope::UNIVERSE),
            DeleteOutcome::Promoted { displaced_nh_index: 42, promoted_nh_index: 0 }
        );
        assert_eq!(trie.lookup(&section, "198.51.100.1".parse().unwrap()), Some(0));
    }

    #[test]
    fn no_space_once_rule_limit_reached() {
        let domain = Domain::new();
        let trie = LpmTrie::new(domain.clone(), 0).with_rule_limit(4);
        let mut reader = domain.register();
        let section = reader.enter();

        // 3 reserved routes already occupy the limit minus one.
        let outcome = trie.add(&section, net("10.0.0.0/24"), Scope::LINK, 1);
        assert_eq!(outcome, AddOutcome::Success);
        let outcome = trie.add(&section, net("10.0.1.0/24"), Scope::LINK, 2);
        assert_eq!(outcome, AddOutcome::NoSpace);
    }
}
