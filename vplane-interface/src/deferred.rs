//
// Copyright (c) The VPlane Project Contributors
//
// SPDX-License-Identifier: MIT
//

//! Deferred configuration cache.
//!
//! The controller can send commands that reference an interface name
//! before the kernel has assigned it an ifindex (a VLAN created ahead of
//! its parent appearing, for instance). Those commands are cached here,
//! keyed by interface name, and replayed once `IF_INDEX_SET` fires; if
//! the interface disappears again (`IF_INDEX_UNSET`) before replay, the
//! pending commands are discarded, not replayed against a stale index.
//!
//! Grounded on the original implementation's handling of netlink
//! messages that race interface creation: a dropped or out-of-order
//! replay is tracked through [`IncompleteStats`] rather than silently
//! ignored, so the console `interface incomplete` command can report it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// A single deferred command, stored as opaque argv the way the console
/// command table (`vplane-console`) already represents one.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DeferredCommand {
    pub argv: Vec<String>,
}

/// Counters for commands that could not be applied or replayed
/// (testable property 7: "missed netlink updates are counted, not
/// silently dropped").
#[derive(Debug, Default)]
pub struct IncompleteStats {
    pub missed_add: AtomicU64,
    pub missed_update: AtomicU64,
    pub missed_delete: AtomicU64,
    pub replayed: AtomicU64,
}

impl IncompleteStats {
    pub fn snapshot(&self) -> IncompleteStatsSnapshot {
        IncompleteStatsSnapshot {
            missed_add: self.missed_add.load(Ordering::Relaxed),
            missed_update: self.missed_update.load(Ordering::Relaxed),
            missed_delete: self.missed_delete.load(Ordering::Relaxed),
            replayed: self.replayed.load(Ordering::Relaxed),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct IncompleteStatsSnapshot {
    pub missed_add: u64,
    pub missed_update: u64,
    pub missed_delete: u64,
    pub replayed: u64,
}

/// Why a command is being cached rather than applied immediately, used
/// only to pick which [`IncompleteStats`] counter to bump if the command
/// is later discarded instead of replayed.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DeferredKind {
    Add,
    Update,
    Delete,
}

/// Name-keyed cache of commands deferred until their interface gets an
/// index (§4.8's `IF_INDEX_SET`/`IF_INDEX_UNSET` pair).
#[derive(Debug, Default)]
pub struct DeferredConfigCache {
    pending: Mutex<HashMap<String, Vec<(DeferredKind, DeferredCommand)>>>,
    stats: IncompleteStats,
}

impl DeferredConfigCache {
    pub fn new() -> Self {
        DeferredConfigCache::default()
    }

    /// Caches a command against an interface name.
    pub fn defer(&self, ifname: &str, kind: DeferredKind, command: DeferredCommand) {
        self.pending
            .lock()
            .unwrap()
            .entry(ifname.to_owned())
            .or_default()
            .push((kind, command));
    }

    /// Drains and returns every command deferred for `ifname`. Only
    /// `DeferredKind::Add` entries bump the replay counter: `Update`/
    /// `Delete` entries deferred against a not-yet-existing interface
    /// are still replayed here, but they ride in on the interface's
    /// creation rather than being counted as one themselves. Called on
    /// `IF_INDEX_SET`.
    pub fn replay(&self, ifname: &str) -> Vec<DeferredCommand> {
        let mut pending = self.pending.lock().unwrap();
        let commands = pending.remove(ifname).unwrap_or_default();
        let add_count = commands
            .iter()
            .filter(|(kind, _)| *kind == DeferredKind::Add)
            .count();
        self.stats.replayed.fetch_add(add_count as u64, Ordering::Relaxed);
        commands.into_iter().map(|(_, command)| command).collect()
    }

    /// Discards every command deferred for `ifname` without applying
    /// them, bumping the matching missed-* counter for each. Called on
    /// `IF_INDEX_UNSET`, when the interface disappeared before its
    /// deferred commands could be replayed.
    pub fn discard(&self, ifname: &str) {
        let mut pending = self.pending.lock().unwrap();
        let Some(commands) = pending.remove(ifname) else {
            return;
        };
        for (kind, _) in commands {
            let counter = match kind {
                DeferredKind::Add => &self.stats.missed_add,
                DeferredKind::Update => &self.stats.missed_update,
                DeferredKind::Delete => &self.stats.missed_delete,
            };
            counter.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn pending_count(&self, ifname: &str) -> usize {
        self.pending
            .lock()
            .unwrap()
            .get(ifname)
            .map_or(0, Vec::len)
    }

    pub fn stats(&self) -> IncompleteStatsSnapshot {
        self.stats.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cmd(arg: &str) -> DeferredCommand {
        DeferredCommand { argv: vec![arg.to_owned()] }
    }

    #[test]
    fn replay_drains_and_counts() {
        let cache = DeferredConfigCache::new();
        cache.defer("dp1.10", DeferredKind::Add, cmd("vlan add"));
        cache.defer("dp1.10", DeferredKind::Update, cmd("mtu 1400"));
        assert_eq!(cache.pending_count("dp1.10"), 2);

        let replayed = cache.replay("dp1.10");
        assert_eq!(replayed.len(), 2);
        assert_eq!(cache.pending_count("dp1.10"), 0);
        // Only the Add entry counts; the Update rides in on its coattails.
        assert_eq!(cache.stats().replayed, 1);
    }

    #[test]
    fn replay_with_no_add_entries_does_not_bump_counter() {
        let cache = DeferredConfigCache::new();
        cache.defer("dp1.10", DeferredKind::Update, cmd("mtu 1400"));
        cache.defer("dp1.10", DeferredKind::Delete, cmd("vlan del"));

        let replayed = cache.replay("dp1.10");
        assert_eq!(replayed.len(), 2);
        assert_eq!(cache.stats().replayed, 0);
    }

    #[test]
    fn discard_counts_missed_by_kind() {
        let cache = DeferredConfigCache::new();
        cache.defer("dp1.10", DeferredKind::Add, cmd("vlan add"));
        cache.defer("dp1.10", DeferredKind::Delete, cmd("vlan del"));

        cache.discard("dp1.10");
        let stats = cache.stats();
        assert_eq!(stats.missed_add, 1);
        assert_eq!(stats.missed_delete, 1);
        assert_eq!(stats.replayed, 0);
        assert_eq!(cache.pending_count("dp1.10"), 0);
    }

    #[test]
    fn discard_on_unknown_interface_is_noop() {
        let cache = DeferredConfigCache::new();
        cache.discard("nonexistent");
        assert_eq!(cache.stats(), IncompleteStatsSnapshot::default());
    }
}
