//
// Copyright (c) The VPlane Project Contributors
//
// SPDX-License-Identifier: MIT
//

pub mod deferred;
pub mod event;
pub mod interface;
pub mod ops;

pub use deferred::DeferredConfigCache;
pub use event::{Event, EventBus};
pub use interface::{
    AddressFlags, CoreCounters, FeatureMasks, Interface, InterfaceFlags,
    InterfaceKind, InterfaceTable, MAX_ATTACH_POINTS,
};
