//
// Copyright (c) The VPlane Project Contributors
//
// SPDX-License-Identifier: MIT
//

//! Feature registration and ordering (§4.7, "Registration": Feature;
//! §9, "Runtime reflection over a feature graph").

use std::collections::HashMap;

use vplane_interface::FeatureMasks;

use crate::context::PacketContext;

/// What a feature invocation tells the attach point to do next.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FeatureOutcome {
    Continue,
    Finish,
}

/// One feature hung off an attach point (§4.7, "Feature").
pub struct Feature {
    pub name: &'static str,
    pub attach_point: &'static str,
    /// Stable numeric id used by the fused graph and by the per-object
    /// feature bitmask (§4.7, "Feature bitmask update").
    pub id: u16,
    pub visit_after: Vec<&'static str>,
    pub visit_before: Vec<&'static str>,
    pub handler: Box<dyn Fn(&mut PacketContext) -> FeatureOutcome + Send + Sync>,
}

#[derive(Debug, Eq, PartialEq)]
pub enum OrderError {
    UnknownConstraint { feature: &'static str, constraint: &'static str },
    Cycle,
}

impl std::fmt::Display for OrderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderError::UnknownConstraint { feature, constraint } => {
                write!(f, "feature {feature} orders against unknown feature {constraint}")
            }
            OrderError::Cycle => write!(f, "feature ordering constraints form a cycle"),
        }
    }
}

impl std::error::Error for OrderError {}

/// Topologically sorts `features` by their `visit_after`/`visit_before`
/// constraints, returning the dense visit order as indices into the
/// input slice (§9, "ordering constraints... resolved by topological
/// sort at startup producing a dense array per attach point").
pub fn topo_sort(features: &[Feature]) -> Result<Vec<usize>, OrderError> {
    let index_by_name: HashMap<&str, usize> =
        features.iter().enumerate().map(|(i, f)| (f.name, i)).collect();

    let mut in_degree = vec![0usize; features.len()];
    let mut edges: Vec<Vec<usize>> = vec![Vec::new(); features.len()];

    for (i, feature) in features.iter().enumerate() {
        for after in &feature.visit_after {
            let &j = index_by_name
                .get(after)
                .ok_or(OrderError::UnknownConstraint { feature: feature.name, constraint: after })?;
            edges[j].push(i);
            in_degree[i] += 1;
        }
        for before in &feature.visit_before {
            let &j = index_by_name
                .get(before)
                .ok_or(OrderError::UnknownConstraint { feature: feature.name, constraint: before })?;
            edges[i].push(j);
            in_degree[j] += 1;
        }
    }

    let mut ready: Vec<usize> =
        (0..features.len()).filter(|&i| in_degree[i] == 0).collect();
    ready.sort_unstable();
    let mut order = Vec::with_capacity(features.len());
    let mut cursor = 0;
    while cursor < ready.len() {
        let node = ready[cursor];
        cursor += 1;
        order.push(node);
        let mut newly_ready = Vec::new();
        for &next in &edges[node] {
            in_degree[next] -= 1;
            if in_degree[next] == 0 {
                newly_ready.push(next);
            }
        }
        newly_ready.sort_unstable();
        ready.extend(newly_ready);
    }

    if order.len() != features.len() {
        return Err(OrderError::Cycle);
    }
    Ok(order)
}

/// Fused-vs-dynamic feature invocation at one attach point (§4.7, "Two
/// modes").
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DispatchMode {
    /// Compiled order, always invoked; used when no object on this
    /// attach point ever disables a feature at runtime.
    FusedStatic,
    /// Compiled order, gated by the object's live feature mask.
    FusedDynamic,
    /// Order and gating both read at runtime (used during development
    /// or when the fused build is unavailable).
    Dynamic,
}

/// Runtime state for one attach point: the features in their resolved
/// visit order, ready to dispatch in either mode.
pub struct AttachPointRuntime {
    pub attach_point_index: usize,
    pub mode: DispatchMode,
    order: Vec<Feature>,
}

impl AttachPointRuntime {
    pub fn new(attach_point_index: usize, mode: DispatchMode, mut features: Vec<Feature>) -> Result<Self, OrderError> {
        let order = topo_sort(&features)?;
        let sorted = order.into_iter().map(|i| std::mem::replace(
            &mut features[i],
            Feature {
                name: "",
                attach_point: "",
                id: 0,
                visit_after: Vec::new(),
                visit_before: Vec::new(),
                handler: Box::new(|_| FeatureOutcome::Continue),
            },
        )).collect();
        Ok(AttachPointRuntime { attach_point_index, mode, order: sorted })
    }

    /// Invokes every feature in visit order, honoring the object's live
    /// feature mask unless running [`DispatchMode::FusedStatic`] (§4.7,
    /// "Feature bitmask update").
    pub fn invoke(&self, masks: &FeatureMasks, ctx: &mut PacketContext) -> FeatureOutcome {
        for feature in &self.order {
            if self.mode != DispatchMode::FusedStatic
                && !masks.is_enabled(self.attach_point_index, feature.id)
            {
                continue;
            }
            if (feature.handler)(ctx) == FeatureOutcome::Finish {
                return FeatureOutcome::Finish;
            }
        }
        FeatureOutcome::Continue
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feature(name: &'static str, after: &[&'static str]) -> Feature {
        Feature {
            name,
            attach_point: "eth-in",
            id: 0,
            visit_after: after.to_vec(),
            visit_before: Vec::new(),
            handler: Box::new(|_| FeatureOutcome::Continue),
        }
    }

    #[test]
    fn topo_sort_respects_visit_after() {
        let features = vec![feature("capture", &["vlan-strip"]), feature("vlan-strip", &[])];
        let order = topo_sort(&features).unwrap();
        let names: Vec<_> = order.iter().map(|&i| features[i].name).collect();
        assert_eq!(names, vec!["vlan-strip", "capture"]);
    }

    #[test]
    fn cyclic_constraints_are_rejected() {
        let features = vec![feature("a", &["b"]), feature("b", &["a"])];
        assert_eq!(topo_sort(&features), Err(OrderError::Cycle));
    }

    #[test]
    fn dynamic_dispatch_skips_disabled_feature() {
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::sync::Arc;

        let ran = Arc::new(AtomicBool::new(false));
        let ran_clone = ran.clone();
        let features = vec![Feature {
            name: "capture",
            attach_point: "eth-in",
            id: 3,
            visit_after: Vec::new(),
            visit_before: Vec::new(),
            handler: Box::new(move |_| {
                ran_clone.store(true, Ordering::Relaxed);
                FeatureOutcome::Continue
            }),
        }];
        let runtime = AttachPointRuntime::new(0, DispatchMode::FusedDynamic, features).unwrap();
        let masks = FeatureMasks::default();
        let mut ctx = PacketContext::new(1, vplane_utils::mac_addr::MacAddr::ZERO, vplane_utils::mac_addr::MacAddr::ZERO);

        runtime.invoke(&masks, &mut ctx);
        assert!(!ran.load(Ordering::Relaxed));

        masks.enable(0, 3);
        runtime.invoke(&masks, &mut ctx);
        assert!(ran.load(Ordering::Relaxed));
    }
}
