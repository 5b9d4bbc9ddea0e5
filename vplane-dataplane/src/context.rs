//
// Copyright (c) The VPlane Project Contributors
//
// SPDX-License-Identifier: MIT
//

//! The application state bundle: every per-process table and bus a
//! console verb or controller-channel handler touches, threaded through
//! as the `Ctx` type parameter of [`vplane_console::Dispatcher`].
//!
//! Held behind an [`ArcSwap`] rather than as plain `Arc` fields so the
//! console `reset` command (§4.10, on the control thread) can swap in an
//! entirely fresh generation of every table in one atomic publish,
//! without restarting the process or invalidating handles other threads
//! are mid-read with (a reader holding the old [`Inner`] simply finishes
//! against it).

use std::sync::{Arc, Mutex};

use arc_swap::ArcSwap;
use vplane_console::{DebugMask, OfflineAware};
use vplane_epoch::{Domain, Reader, Section};
use vplane_fal::{Fal, NullFal};
use vplane_fib::Fib;
use vplane_interface::{DeferredConfigCache, EventBus, InterfaceTable};
use vplane_nexthop::NextHopPool;

use crate::config::Config;

struct Inner {
    domain: Domain,
    interfaces: Arc<InterfaceTable>,
    events: Arc<EventBus>,
    deferred: Arc<DeferredConfigCache>,
    fib: Arc<Fib>,
    debug: Arc<DebugMask>,
    /// The console thread's own reader registration, used by read-only
    /// verb handlers (`ifconfig`, `route`, `arp`, ...). Separate from
    /// the control thread's reader and from `Fib`'s internal one: every
    /// long-lived thread registers its own (§5).
    console_reader: Mutex<Reader>,
}

impl Inner {
    fn new(config: &Config, n_cores: usize) -> Self {
        let domain = Domain::new();
        let pool = NextHopPool::new(
            domain.clone(),
            config.fib.nexthop_pool_capacity,
            config.fib.ecmp_max_path,
        );
        let fal: Arc<dyn Fal> = Arc::new(NullFal);
        let console_reader = domain.register();

        Inner {
            interfaces: Arc::new(InterfaceTable::new(domain.clone(), n_cores)),
            events: Arc::new(EventBus::new()),
            deferred: Arc::new(DeferredConfigCache::new()),
            fib: Arc::new(Fib::new(domain.clone(), pool, fal)),
            debug: Arc::new(DebugMask::new()),
            console_reader: Mutex::new(console_reader),
            domain,
        }
    }
}

/// Shared process state. Cheap to clone: cloning hands out another
/// handle to the same [`ArcSwap`], so every clone observes the same
/// generation and the same `reset`.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    n_cores: usize,
    inner: Arc<ArcSwap<Inner>>,
}

impl AppState {
    pub fn new(config: &Config, n_cores: usize) -> Self {
        let config = Arc::new(config.clone());
        let n_cores = n_cores.max(1);
        let inner = Arc::new(ArcSwap::from_pointee(Inner::new(&config, n_cores)));
        AppState { config, n_cores, inner }
    }

    /// Replaces every table with a freshly constructed generation (§9,
    /// "Global mutable state... tests require a reset hook").
    pub fn reset(&self) {
        self.inner.store(Arc::new(Inner::new(&self.config, self.n_cores)));
    }

    pub fn domain(&self) -> Domain {
        self.inner.load().domain.clone()
    }

    pub fn interfaces(&self) -> Arc<InterfaceTable> {
        self.inner.load().interfaces.clone()
    }

    pub fn events(&self) -> Arc<EventBus> {
        self.inner.load().events.clone()
    }

    pub fn deferred(&self) -> Arc<DeferredConfigCache> {
        self.inner.load().deferred.clone()
    }

    pub fn fib(&self) -> Arc<Fib> {
        self.inner.load().fib.clone()
    }

    pub fn debug(&self) -> Arc<DebugMask> {
        self.inner.load().debug.clone()
    }

    /// Enters a reader section on the console thread's own reader,
    /// mirroring `Fib`'s private `with_section` helper.
    pub fn with_section<R>(&self, f: impl FnOnce(&Section<'_>) -> R) -> R {
        let inner = self.inner.load();
        let reader = inner.console_reader.lock().unwrap();
        let section = reader.enter();
        f(&section)
    }
}

impl OfflineAware for AppState {
    fn mark_reader_offline(&self) {
        self.inner.load().console_reader.lock().unwrap().mark_offline();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_state_has_no_interfaces() {
        let config = Config::default();
        let state = AppState::new(&config, 1);
        let count = state.with_section(|section| {
            let mut n = 0;
            state.interfaces().walk(section, |_| n += 1);
            n
        });
        assert_eq!(count, 0);
    }

    #[test]
    fn reset_replaces_every_table() {
        let state = AppState::new(&Config::default(), 1);
        state.fib().insert_arp(
            vplane_utils::protocol::VRF_DEFAULT,
            1,
            "192.0.2.1".parse().unwrap(),
            None,
        );
        assert!(state.fib().neighbours.lookup(1, "192.0.2.1".parse().unwrap()).is_some());

        state.reset();
        assert!(state.fib().neighbours.lookup(1, "192.0.2.1".parse().unwrap()).is_none());
    }
}
