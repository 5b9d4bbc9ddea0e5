//
// Copyright (c) The VPlane Project Contributors
//
// SPDX-License-Identifier: MIT
//

//! The command dispatcher (component C10): the versioned command
//! table, console/control thread routing, the debug bitmask, and the
//! Unix-domain socket endpoint of §4.10 and §6.
//!
//! This crate stays generic over the application context a handler
//! needs (`Dispatcher<Ctx>`/`CommandSpec<Ctx>`) so it never has to
//! depend on `vplane-interface`/`vplane-fib`/`vplane-nexthop`; the
//! concrete verb table lives with whichever binary wires those crates
//! together.

pub mod command;
pub mod debug;
pub mod dispatcher;
pub mod error;
pub mod server;

pub use command::{CommandSpec, CommandTable, STATUS_ERROR, STATUS_OK};
pub use debug::{DebugMask, DEBUG_FLAGS};
pub use dispatcher::{ControlBridge, ControlBridgeServer, ControlRequest, Dispatcher, OfflineAware};
pub use error::Error;
pub use server::Server;
