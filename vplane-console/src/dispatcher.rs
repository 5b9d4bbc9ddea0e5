//
// Copyright (c) The VPlane Project Contributors
//
// SPDX-License-Identifier: MIT
//

//! Command lookup and thread routing (§4.10, "Thread routing").
//!
//! Most handlers run directly on the console thread against lock-free
//! accessors. A small subset (`reset`) must run on the control thread;
//! for those the dispatcher hands the command line across
//! [`ControlBridge`] and waits for an integer status, mirroring
//! `send_console_cmd`/`console_cmd` in the original implementation.
//! Unlike the console-thread path, a control-thread round trip returns
//! only a status code, never a text payload (the original's handlers
//! of this kind never produce output).

use crossbeam_channel::{Receiver, Sender};

use crate::command::{CommandTable, STATUS_ERROR};
use crate::error::Error;

/// One command forwarded from the console thread to the control
/// thread. `reply` is `None` for a fire-and-forget (`ASYNC`) send.
pub struct ControlRequest {
    pub line: String,
    pub reply: Option<Sender<i32>>,
}

/// The console-thread side of the in-process control round-trip.
#[derive(Clone)]
pub struct ControlBridge {
    tx: Sender<ControlRequest>,
}

impl ControlBridge {
    pub fn new(tx: Sender<ControlRequest>) -> Self {
        ControlBridge { tx }
    }

    /// Sends `line` to the control thread. When `async_` is set,
    /// returns immediately with [`STATUS_OK`](crate::command::STATUS_OK)
    /// without waiting for the control thread to actually run it
    /// (`CONSOLE_CMD_ASYNC` in the original).
    ///
    /// Callers are expected to have already dropped any
    /// [`vplane_epoch::Section`] they were holding: the console thread
    /// must be offline for the duration of this blocking round-trip
    /// (§5, "The console thread blocks on its socket and on the
    /// command-to-control round-trip; it marks itself offline around
    /// each block").
    pub fn forward(&self, line: &str, async_: bool) -> Result<i32, Error> {
        if async_ {
            self.tx
                .send(ControlRequest { line: line.to_owned(), reply: None })
                .map_err(|_| Error::ControlBridgeClosed)?;
            return Ok(0);
        }

        let (reply_tx, reply_rx) = crossbeam_channel::bounded(1);
        self.tx
            .send(ControlRequest { line: line.to_owned(), reply: Some(reply_tx) })
            .map_err(|_| Error::ControlBridgeClosed)?;
        reply_rx.recv().map_err(|_| Error::ControlBridgeClosed)
    }
}

/// The control thread's side: a queue of forwarded commands plus a
/// function to actually run them against control-thread-only state.
pub struct ControlBridgeServer {
    rx: Receiver<ControlRequest>,
}

impl ControlBridgeServer {
    pub fn new(rx: Receiver<ControlRequest>) -> Self {
        ControlBridgeServer { rx }
    }

    /// Drains and executes every pending request with `run`, replying
    /// on each request's channel (skipping replies for `ASYNC` sends).
    /// Called from the control thread's own loop, never blocking if
    /// nothing is pending.
    pub fn drain(&self, mut run: impl FnMut(&str) -> i32) {
        while let Ok(request) = self.rx.try_recv() {
            let rc = run(&request.line);
            if let Some(reply) = request.reply {
                let _ = reply.send(rc);
            }
        }
    }
}

/// A context that owns a registered [`vplane_epoch::Reader`] it can mark
/// offline around a blocking operation (§4.1/§4.10, "the console thread
/// ... marks itself offline around each block").
pub trait OfflineAware {
    /// Marks this context's own reader offline. Called by
    /// [`Dispatcher::execute`] immediately before a synchronous
    /// control-thread round-trip, since the console thread has no
    /// [`vplane_epoch::Section`] open across that block anyway but must
    /// still report itself offline to introspection commands for its
    /// duration.
    fn mark_reader_offline(&self);
}

/// Looks up and runs console-thread-local commands; forwards
/// control-thread-only commands across a [`ControlBridge`] (§4.10).
pub struct Dispatcher<Ctx> {
    table: &'static CommandTable<Ctx>,
    ctx: Ctx,
    bridge: ControlBridge,
}

impl<Ctx> Dispatcher<Ctx> {
    pub fn new(table: &'static CommandTable<Ctx>, ctx: Ctx, bridge: ControlBridge) -> Self {
        Dispatcher { table, ctx, bridge }
    }

    /// Splits `line`, resolves the verb, and executes it, returning
    /// the integer status and the text/JSON payload (empty for
    /// control-thread round-trips, which carry no output).
    pub fn execute(&self, line: &str) -> (i32, String)
    where
        Ctx: OfflineAware,
    {
        let mut tokens = line.split_whitespace();
        let Some(verb) = tokens.next() else {
            return (STATUS_ERROR, "empty command".to_owned());
        };
        let argv: Vec<&str> = tokens.collect();

        let Some(spec) = self.table.get(verb) else {
            return (STATUS_ERROR, format!("Unknown command: {verb}"));
        };

        if spec.on_control_thread {
            self.ctx.mark_reader_offline();
            match self.bridge.forward(line, false) {
                Ok(rc) => (rc, String::new()),
                Err(err) => {
                    err.log();
                    (STATUS_ERROR, err.to_string())
                }
            }
        } else {
            let mut out = Vec::new();
            let rc = (spec.handler)(&self.ctx, &mut out, &argv);
            (rc, String::from_utf8_lossy(&out).into_owned())
        }
    }
}
