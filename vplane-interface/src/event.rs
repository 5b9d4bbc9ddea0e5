//
// Copyright (c) The VPlane Project Contributors
//
// SPDX-License-Identifier: MIT
//

//! Interface event bus (§4.8).
//!
//! Every structural change to the interface/VRF/address tables fires an
//! event that other components (pipeline feature nodes, the FIB, the FAL
//! shadow) subscribe to. The subscriber list is a small fixed-size array
//! mutated with compare-and-swap rather than a lock: registration only
//! happens at startup on the control thread, so contention is not a
//! concern, but the table is still read from notification paths that may
//! run concurrently with a late registration.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use ipnetwork::IpNetwork;

use crate::interface::InterfaceFlags;

/// Maximum number of event subscribers. Registering past this limit is a
/// programming error (every subscriber is a compiled-in component, not a
/// dynamic plugin), so the bus panics rather than silently dropping a
/// registration.
pub const MAX_SUBSCRIBERS: usize = 16;

/// Interface/VRF lifecycle events (§4.8).
#[derive(Clone, Debug)]
pub enum Event {
    IfCreate { ifindex: u32, name: String },
    IfCreateFinished { ifindex: u32 },
    IfDelete { ifindex: u32 },
    IfIndexSet { ifindex: u32, name: String },
    IfIndexPreUnset { ifindex: u32 },
    IfIndexUnset { ifindex: u32 },
    IfRename { ifindex: u32, old_name: String, new_name: String },
    IfVrfSet { ifindex: u32, vrf: u32 },
    IfAddrAdd { ifindex: u32, addr: IpNetwork },
    IfAddrDel { ifindex: u32, addr: IpNetwork },
    IfMacAddrChange { ifindex: u32 },
    IfLinkChange { ifindex: u32, flags: InterfaceFlags },
    IfVlanAdd { ifindex: u32, parent_ifindex: u32, vlan_tag: u16 },
    IfVlanDel { ifindex: u32, parent_ifindex: u32, vlan_tag: u16 },
    IfHwSwitchingChange { ifindex: u32, enabled: bool },
    VrfCreate { vrf: u32, name: String },
    VrfDelete { vrf: u32 },
    ResetConfig,
    Init,
    Uninit,
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::IfCreate { ifindex, name } => {
                write!(f, "if-create ifindex={ifindex} name={name}")
            }
            Event::IfCreateFinished { ifindex } => {
                write!(f, "if-create-finished ifindex={ifindex}")
            }
            Event::IfDelete { ifindex } => write!(f, "if-delete ifindex={ifindex}"),
            Event::IfIndexSet { ifindex, name } => {
                write!(f, "if-index-set ifindex={ifindex} name={name}")
            }
            Event::IfIndexPreUnset { ifindex } => {
                write!(f, "if-index-pre-unset ifindex={ifindex}")
            }
            Event::IfIndexUnset { ifindex } => {
                write!(f, "if-index-unset ifindex={ifindex}")
            }
            Event::IfRename { ifindex, old_name, new_name } => {
                write!(f, "if-rename ifindex={ifindex} {old_name}->{new_name}")
            }
            Event::IfVrfSet { ifindex, vrf } => {
                write!(f, "if-vrf-set ifindex={ifindex} vrf={vrf}")
            }
            Event::IfAddrAdd { ifindex, addr } => {
                write!(f, "if-addr-add ifindex={ifindex} addr={addr}")
            }
            Event::IfAddrDel { ifindex, addr } => {
                write!(f, "if-addr-del ifindex={ifindex} addr={addr}")
            }
            Event::IfMacAddrChange { ifindex } => {
                write!(f, "if-mac-addr-change ifindex={ifindex}")
            }
            Event::IfLinkChange { ifindex, .. } => {
                write!(f, "if-link-change ifindex={ifindex}")
            }
            Event::IfVlanAdd { ifindex, parent_ifindex, vlan_tag } => {
                write!(
                    f,
                    "if-vlan-add ifindex={ifindex} parent={parent_ifindex} tag={vlan_tag}"
                )
            }
            Event::IfVlanDel { ifindex, parent_ifindex, vlan_tag } => {
                write!(
                    f,
                    "if-vlan-del ifindex={ifindex} parent={parent_ifindex} tag={vlan_tag}"
                )
            }
            Event::IfHwSwitchingChange { ifindex, enabled } => {
                write!(f, "if-hw-switching-change ifindex={ifindex} enabled={enabled}")
            }
            Event::VrfCreate { vrf, name } => write!(f, "vrf-create vrf={vrf} name={name}"),
            Event::VrfDelete { vrf } => write!(f, "vrf-delete vrf={vrf}"),
            Event::ResetConfig => write!(f, "reset-config"),
            Event::Init => write!(f, "init"),
            Event::Uninit => write!(f, "uninit"),
        }
    }
}

/// A subscriber callback. Boxed so the bus can hold a heterogeneous set
/// of components without a generic parameter leaking into every caller.
pub type Subscriber = Arc<dyn Fn(&Event) + Send + Sync>;

/// Fixed-size event subscriber registry (§4.8).
pub struct EventBus {
    slots: Box<[std::sync::Mutex<Option<Subscriber>>; MAX_SUBSCRIBERS]>,
    registered: AtomicUsize,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("registered", &self.registered.load(Ordering::Relaxed))
            .finish()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        EventBus {
            slots: Box::new(std::array::from_fn(|_| std::sync::Mutex::new(None))),
            registered: AtomicUsize::new(0),
        }
    }

    /// Registers a new subscriber. Panics if every slot is taken: the
    /// subscriber set is a fixed, compiled-in roster, so overflow means a
    /// build-time mistake, not a runtime condition to recover from.
    pub fn register<F>(&self, callback: F) -> SubscriberHandle
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let callback: Subscriber = Arc::new(callback);
        for (index, slot) in self.slots.iter().enumerate() {
            let mut guard = slot.lock().unwrap();
            if guard.is_none() {
                *guard = Some(callback);
                self.registered.fetch_add(1, Ordering::Relaxed);
                return SubscriberHandle { index };
            }
        }
        panic!("event bus subscriber slots exhausted (max {MAX_SUBSCRIBERS})");
    }

    pub fn deregister(&self, handle: SubscriberHandle) {
        let mut guard = self.slots[handle.index].lock().unwrap();
        if guard.take().is_some() {
            self.registered.fetch_sub(1, Ordering::Relaxed);
        }
    }

    /// Publishes an event to every registered subscriber, in slot order.
    pub fn publish(&self, event: Event) {
        for slot in self.slots.iter() {
            let guard = slot.lock().unwrap();
            if let Some(callback) = guard.as_ref() {
                callback(&event);
            }
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.registered.load(Ordering::Relaxed)
    }
}

/// Opaque handle returned by [`EventBus::register`], used to deregister
/// later.
#[derive(Clone, Copy, Debug)]
pub struct SubscriberHandle {
    index: usize,
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    #[test]
    fn publish_reaches_all_subscribers() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicU32::new(0));

        let c1 = count.clone();
        bus.register(move |_event| {
            c1.fetch_add(1, Ordering::Relaxed);
        });
        let c2 = count.clone();
        bus.register(move |_event| {
            c2.fetch_add(1, Ordering::Relaxed);
        });

        bus.publish(Event::Init);
        assert_eq!(count.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn deregister_stops_delivery() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicU32::new(0));
        let c1 = count.clone();
        let handle = bus.register(move |_event| {
            c1.fetch_add(1, Ordering::Relaxed);
        });

        bus.deregister(handle);
        bus.publish(Event::Init);
        assert_eq!(count.load(Ordering::Relaxed), 0);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    #[should_panic(expected = "exhausted")]
    fn overflow_panics() {
        let bus = EventBus::new();
        for _ in 0..=MAX_SUBSCRIBERS {
            bus.register(|_event| {});
        }
    }
}
