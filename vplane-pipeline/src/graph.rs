//
// Copyright (c) The VPlane Project Contributors
//
// SPDX-License-Identifier: MIT
//

//! The pipeline graph itself (§4.7, "Registration" and "Packet
//! traversal").
//!
//! Each processing node declares a `next[]` table mapping small integer
//! successor ids to the *name* of the node that should run next; at
//! startup [`PipelineGraph::build`] resolves every name into a direct
//! index, so a hot-path traversal never does a string lookup.

use std::collections::HashMap;

use crate::context::PacketContext;

/// Reserved successor id meaning "stop; the packet has been consumed or
/// handed off" (§4.7).
pub const FINISH: u32 = u32::MAX;

/// Reserved successor id meaning "re-enter the current node" (§4.7,
/// used by the Ethernet-lookup node after a VLAN decap).
pub const LOOKUP: u32 = u32::MAX - 1;

/// A packet-handling node (§4.7, "Processing node").
pub trait ProcessingNode: Send + Sync {
    fn name(&self) -> &'static str;

    /// `(successor_id, target_node_name)` pairs this node can return
    /// from [`ProcessingNode::handle`]. Resolved once by
    /// [`PipelineGraph::build`].
    fn next_table(&self) -> &[(u32, &'static str)];

    /// Runs the node against `ctx`, returning one of its declared
    /// successor ids (or [`FINISH`]/[`LOOKUP`]).
    fn handle(&self, ctx: &mut PacketContext) -> u32;
}

#[derive(Debug, Eq, PartialEq)]
pub enum BuildError {
    DuplicateName(&'static str),
    UnknownSuccessor { from: &'static str, to: &'static str },
}

impl std::fmt::Display for BuildError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BuildError::DuplicateName(name) => write!(f, "node {name} registered twice"),
            BuildError::UnknownSuccessor { from, to } => {
                write!(f, "node {from} names unknown successor {to}")
            }
        }
    }
}

impl std::error::Error for BuildError {}

struct Entry {
    node: Box<dyn ProcessingNode>,
    resolved_next: HashMap<u32, usize>,
}

/// The graph of processing nodes (§4.7). Registration happens once at
/// startup on the control thread; `run` is the lock-free, allocation-free
/// hot path every forwarding thread drives per packet.
pub struct PipelineGraph {
    entries: Vec<Entry>,
    index_by_name: HashMap<&'static str, usize>,
    built: bool,
}

impl Default for PipelineGraph {
    fn default() -> Self {
        PipelineGraph {
            entries: Vec::new(),
            index_by_name: HashMap::new(),
            built: false,
        }
    }
}

impl PipelineGraph {
    pub fn new() -> Self {
        PipelineGraph::default()
    }

    /// Registers a node. Must be called before [`PipelineGraph::build`].
    pub fn register(&mut self, node: Box<dyn ProcessingNode>) -> Result<(), BuildError> {
        let name = node.name();
        if self.index_by_name.contains_key(name) {
            return Err(BuildError::DuplicateName(name));
        }
        let index = self.entries.len();
        self.index_by_name.insert(name, index);
        self.entries.push(Entry { node, resolved_next: HashMap::new() });
        Ok(())
    }

    /// Resolves every node's `next[]` table from names to indices.
    /// Fatal by construction: an unresolved successor name reflects a
    /// build-time miscount, not a runtime condition (§7, "Fatal").
    pub fn build(&mut self) -> Result<(), BuildError> {
        for i in 0..self.entries.len() {
            let next_table = self.entries[i].node.next_table().to_vec();
            let mut resolved = HashMap::with_capacity(next_table.len());
            for (id, target_name) in next_table {
                let target_index =
                    *self.index_by_name.get(target_name).ok_or(BuildError::UnknownSuccessor {
                        from: self.entries[i].node.name(),
                        to: target_name,
                    })?;
                resolved.insert(id, target_index);
            }
            self.entries[i].resolved_next = resolved;
        }
        self.built = true;
        Ok(())
    }

    pub fn node_index(&self, name: &str) -> Option<usize> {
        self.index_by_name.get(name).copied()
    }

    /// Walks the graph from `entry`, re-invoking nodes until a handler
    /// returns [`FINISH`] (§4.7, "Packet traversal").
    pub fn run(&self, entry: &str, ctx: &mut PacketContext) {
        debug_assert!(self.built, "PipelineGraph::run called before build()");
        let Some(mut current) = self.node_index(entry) else {
            ctx.drop("unknown-entry-node");
            return;
        };
        loop {
            let entry = &self.entries[current];
            let successor = entry.node.handle(ctx);
            match successor {
                FINISH => return,
                LOOKUP => continue,
                id => match entry.resolved_next.get(&id) {
                    Some(&next) => current = next,
                    None => {
                        ctx.drop("unresolved-successor");
                        return;
                    }
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vplane_utils::mac_addr::MacAddr;

    struct Ping;
    impl ProcessingNode for Ping {
        fn name(&self) -> &'static str {
            "ping"
        }
        fn next_table(&self) -> &[(u32, &'static str)] {
            &[(0, "pong")]
        }
        fn handle(&self, _ctx: &mut PacketContext) -> u32 {
            0
        }
    }

    struct Pong;
    impl ProcessingNode for Pong {
        fn name(&self) -> &'static str {
            "pong"
        }
        fn next_table(&self) -> &[(u32, &'static str)] {
            &[]
        }
        fn handle(&self, _ctx: &mut PacketContext) -> u32 {
            FINISH
        }
    }

    #[test]
    fn two_node_traversal_reaches_finish() {
        let mut graph = PipelineGraph::new();
        graph.register(Box::new(Ping)).unwrap();
        graph.register(Box::new(Pong)).unwrap();
        graph.build().unwrap();

        let mut ctx = PacketContext::new(1, MacAddr::ZERO, MacAddr::ZERO);
        graph.run("ping", &mut ctx);
        assert!(!ctx.is_dropped());
    }

    #[test]
    fn unresolved_successor_name_is_rejected_at_build() {
        struct Dangling;
        impl ProcessingNode for Dangling {
            fn name(&self) -> &'static str {
                "dangling"
            }
            fn next_table(&self) -> &[(u32, &'static str)] {
                &[(0, "nowhere")]
            }
            fn handle(&self, _ctx: &mut PacketContext) -> u32 {
                0
            }
        }

        let mut graph = PipelineGraph::new();
        graph.register(Box::new(Dangling)).unwrap();
        assert!(graph.build().is_err());
    }
}
