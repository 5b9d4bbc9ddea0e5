//
// Copyright (c) The VPlane Project Contributors
//
// SPDX-License-Identifier: MIT
//

//! Quiescent-state reclamation substrate (component C1).
//!
//! Forwarding threads never take locks on the read side. Each one marks
//! entry/exit of a *reader section* around every packet traversal; the
//! control thread mutates shared structures by publishing a new pointer
//! and deferring the free of the old one until every forwarding thread
//! has passed through a reader section boundary after the publish.
//!
//! The mechanics are provided by [`crossbeam_epoch`]: pinning a thread is
//! the reader-section delimiter, [`Atomic`] is the read-side pointer
//! load/publish primitive, and `Guard::defer_destroy` is the deferred
//! free. This module adds the vocabulary the rest of the dataplane uses
//! (domains, reader registration, huge-region tracking) on top of it.

use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

pub use crossbeam_epoch::{Atomic, Owned, Shared};
use crossbeam_epoch::{Collector, Guard, LocalHandle};
use tracing::trace;

/// An independent reclamation domain.
///
/// Production code shares one process-wide [`Domain`], but tests create
/// fresh ones so that the `reset` console command (§4.10) can tear down
/// and recreate every table deterministically without cross-talk between
/// test cases.
#[derive(Clone)]
pub struct Domain {
    collector: Collector,
    readers: Arc<AtomicUsize>,
    huge_regions: Arc<AtomicU64>,
}

impl fmt::Debug for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Domain")
            .field("readers", &self.readers.load(Ordering::Relaxed))
            .field("huge_regions", &self.huge_regions.load(Ordering::Relaxed))
            .finish()
    }
}

impl Default for Domain {
    fn default() -> Self {
        Self::new()
    }
}

impl Domain {
    /// Creates a fresh reclamation domain.
    pub fn new() -> Self {
        Domain {
            collector: Collector::new(),
            readers: Arc::new(AtomicUsize::new(0)),
            huge_regions: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Registers a new forwarding thread, returning its [`Reader`] handle.
    ///
    /// Called once per forwarding thread at startup.
    pub fn register(&self) -> Reader {
        self.readers.fetch_add(1, Ordering::Relaxed);
        Reader {
            local: self.collector.register(),
            readers: self.readers.clone(),
            online: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Number of forwarding threads currently registered with this domain.
    pub fn reader_count(&self) -> usize {
        self.readers.load(Ordering::Relaxed)
    }

    /// Number of huge-memory regions currently pending reclamation.
    pub fn huge_region_count(&self) -> u64 {
        self.huge_regions.load(Ordering::Relaxed)
    }
}

/// A forwarding thread's handle into a [`Domain`].
///
/// Dropping the handle unregisters the thread (mirrors what happens when
/// a forwarding thread exits).
pub struct Reader {
    local: LocalHandle,
    readers: Arc<AtomicUsize>,
    online: Arc<AtomicBool>,
}

impl Drop for Reader {
    fn drop(&mut self) {
        self.readers.fetch_sub(1, Ordering::Relaxed);
    }
}

impl Reader {
    /// Marks entry into a reader section and returns a guard whose
    /// lifetime bounds every pointer loaded through it. This is the only
    /// way to obtain a [`Section`]: a forwarding thread calls this once
    /// per packet traversal.
    ///
    /// Takes `&self` rather than `&mut self`: the online flag lives in a
    /// shared `AtomicBool` rather than in `Reader` itself, so a caller
    /// can still query [`Reader::is_online`] while a `Section` it handed
    /// out is alive.
    pub fn enter(&self) -> Section<'_> {
        self.online.store(true, Ordering::Relaxed);
        Section {
            guard: self.local.pin(),
            online: self.online.clone(),
            _reader: PhantomData,
        }
    }

    /// Whether this thread is presently online (inside a reader section).
    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::Relaxed)
    }

    /// Marks the thread offline ahead of a blocking operation (e.g. a
    /// synchronous command round-trip to the control thread) so that
    /// reclamation isn't stalled waiting for this thread to advance.
    ///
    /// Called by [`vplane_console::ControlBridge::forward`]'s callers
    /// around the blocking round-trip (§4.1/§4.10, "marks itself offline
    /// around each block"); the reader must have already dropped any
    /// `Section` it was holding, since `Section::drop` would otherwise
    /// flip the flag back online once the round-trip's own section ends.
    pub fn mark_offline(&self) {
        self.online.store(false, Ordering::Relaxed);
    }
}

/// An active reader section (a "pin" in crossbeam-epoch terms).
///
/// Every pointer load performed through a shared structure must borrow
/// from a `Section` so that the borrow checker ties its lifetime to the
/// reader's registered epoch.
pub struct Section<'r> {
    guard: Guard,
    online: Arc<AtomicBool>,
    _reader: PhantomData<&'r Reader>,
}

impl<'r> Section<'r> {
    /// Returns the underlying crossbeam-epoch guard for use with
    /// [`Atomic`]/[`Shared`] APIs.
    pub fn guard(&self) -> &Guard {
        &self.guard
    }
}

impl Drop for Section<'_> {
    fn drop(&mut self) {
        self.online.store(false, Ordering::Relaxed);
    }
}

/// A read-side pointer with deferred-free semantics (component C1's
/// "publish"/"deferred free" primitives).
///
/// Wraps [`crossbeam_epoch::Atomic`]; the control thread calls
/// [`Shared::publish`] to atomically replace the pointer and schedule
/// the old value's destructor to run once every forwarding thread has
/// advanced past the current epoch.
pub struct ReclaimedPtr<T> {
    inner: Atomic<T>,
}

impl<T> fmt::Debug for ReclaimedPtr<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReclaimedPtr").finish_non_exhaustive()
    }
}

impl<T> Default for ReclaimedPtr<T> {
    fn default() -> Self {
        ReclaimedPtr {
            inner: Atomic::null(),
        }
    }
}

impl<T> ReclaimedPtr<T> {
    /// Creates a new reclaimed pointer holding `value`.
    pub fn new(value: T) -> Self {
        ReclaimedPtr {
            inner: Atomic::new(value),
        }
    }

    /// Read-side pointer load: returns a snapshot reference valid for the
    /// lifetime of `section`.
    pub fn load<'s>(&self, section: &'s Section<'_>) -> Option<&'s T> {
        let shared = self.inner.load(Ordering::Acquire, section.guard());
        unsafe { shared.as_ref() }
    }

    /// Publishes a new value, deferring the free of the previous one
    /// until the next grace period. Must be called by the control
    /// thread only.
    pub fn publish(&self, section: &Section<'_>, value: T) {
        let new = Owned::new(value);
        let old = self
            .inner
            .swap(new, Ordering::AcqRel, section.guard());
        if !old.is_null() {
            unsafe {
                section.guard().defer_destroy(old);
            }
        }
    }

    /// Compare-and-set style slot acquisition: stores `value` only if the
    /// slot is currently null. Returns `true` if the store took effect.
    pub fn try_acquire(&self, section: &Section<'_>, value: T) -> bool {
        let new = Owned::new(value);
        self.inner
            .compare_exchange(
                Shared::null(),
                new,
                Ordering::AcqRel,
                Ordering::Relaxed,
                section.guard(),
            )
            .is_ok()
    }

    /// Clears the slot, deferring the free of whatever was stored there.
    pub fn clear(&self, section: &Section<'_>) {
        let old = self
            .inner
            .swap(Shared::null(), Ordering::AcqRel, section.guard());
        if !old.is_null() {
            unsafe {
                section.guard().defer_destroy(old);
            }
        }
    }
}

/// Registers a huge memory region (e.g. a next-hop slot array or an LPM
/// tbl8 page block) so its reclamation can be tracked separately from
/// ordinary small allocations, as required by §4.1.
///
/// Dropping the handle decrements the domain's huge-region counter; this
/// is purely observability (surfaced through the console `memory`
/// command) and doesn't change reclamation behavior, which is still
/// driven by the region's own `Drop` impl running at the end of its
/// grace period.
pub struct HugeRegionGuard {
    huge_regions: Arc<AtomicU64>,
}

impl Domain {
    /// Marks a huge region as allocated; returns a guard that marks it
    /// reclaimed on drop.
    pub fn track_huge_region(&self) -> HugeRegionGuard {
        self.huge_regions.fetch_add(1, Ordering::Relaxed);
        HugeRegionGuard {
            huge_regions: self.huge_regions.clone(),
        }
    }
}

impl Drop for HugeRegionGuard {
    fn drop(&mut self) {
        self.huge_regions.fetch_sub(1, Ordering::Relaxed);
        trace!("huge memory region reclaimed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_and_load_is_visible() {
        let domain = Domain::new();
        let mut reader = domain.register();
        let ptr: ReclaimedPtr<u32> = ReclaimedPtr::new(1);

        {
            let section = reader.enter();
            assert_eq!(ptr.load(&section), Some(&1));
        }

        {
            let section = reader.enter();
            ptr.publish(&section, 2);
            assert_eq!(ptr.load(&section), Some(&2));
        }
    }

    #[test]
    fn reader_registration_counts() {
        let domain = Domain::new();
        assert_eq!(domain.reader_count(), 0);
        let reader = domain.register();
        assert_eq!(domain.reader_count(), 1);
        drop(reader);
        assert_eq!(domain.reader_count(), 0);
    }

    #[test]
    fn online_flag_tracks_sections() {
        let domain = Domain::new();
        let mut reader = domain.register();
        assert!(!reader.is_online());
        {
            let _section = reader.enter();
            assert!(reader.is_online());
        }
        assert!(!reader.is_online());
    }

    #[test]
    fn huge_region_tracking() {
        let domain = Domain::new();
        assert_eq!(domain.huge_region_count(), 0);
        let guard = domain.track_huge_region();
        assert_eq!(domain.huge_region_count(), 1);
        drop(guard);
        assert_eq!(domain.huge_region_count(), 0);
    }
}
