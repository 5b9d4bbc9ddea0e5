//
// Copyright (c) The VPlane Project Contributors
//
// SPDX-License-Identifier: MIT
//

//! The packet-processing pipeline (component C7): the node graph, its
//! feature registration/ordering machinery, per-packet traversal state,
//! and the illustrative Ethernet-lookup node (§4.7).

pub mod context;
pub mod ethernet;
pub mod feature;
pub mod graph;

pub use context::{EtherClass, PacketContext};
pub use ethernet::{EthernetLookupNode, ETH_IN_ATTACH_POINT, SUCCESSOR_ACCEPT};
pub use feature::{topo_sort, AttachPointRuntime, DispatchMode, Feature, FeatureOutcome, OrderError};
pub use graph::{BuildError, PipelineGraph, ProcessingNode, FINISH, LOOKUP};
