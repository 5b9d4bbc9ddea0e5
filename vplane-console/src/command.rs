//
// Copyright (c) The VPlane Project Contributors
//
// SPDX-License-Identifier: MIT
//

//! The versioned command table (§4.10, "Each command: split on
//! whitespace into argv, first token selects a handler from a
//! versioned table {name, version, handler, help}").

use std::io::Write;

/// One entry in a command table. `Ctx` is whatever application state
/// the handlers need (a bundle of `Arc`-shared tables, typically);
/// `vplane-console` itself stays generic over it so this crate never
/// has to depend on the interface/FIB/next-hop crates it dispatches
/// into.
pub struct CommandSpec<Ctx> {
    pub version: u32,
    pub help: &'static str,
    /// Set for handlers that must run on the control thread (§4.10,
    /// "Thread routing"); the dispatcher forwards these across the
    /// control bridge instead of calling them directly.
    pub on_control_thread: bool,
    pub handler: fn(&Ctx, &mut dyn Write, &[&str]) -> i32,
}

pub type CommandTable<Ctx> = phf::Map<&'static str, CommandSpec<Ctx>>;

pub const STATUS_OK: i32 = 0;
pub const STATUS_ERROR: i32 = -1;
