//
// Copyright (c) The VPlane Project Contributors
//
// SPDX-License-Identifier: MIT
//

//! `vplaned`: wires the core crates together into a running process
//! (§2, "Packets enter at a port-receive node... Simultaneously, the
//! control thread consumes controller messages").
//!
//! Thread layout, matching §5 ("Scheduling"):
//! - the **control thread** (this binary's main thread) drains the
//!   controller channel and the console's control-thread round-trips;
//! - N **forwarding threads**, one pinned per configured core, register
//!   a reader and hold it online for the packet-traversal poll loop —
//!   the poll-mode NIC driver itself is the out-of-scope collaborator
//!   named in §1, so this loop only demonstrates the reader-section
//!   discipline a real `rx_burst`/pipeline-dispatch call would run
//!   inside;
//! - the **console thread** serves the Unix-domain socket of §6.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use crossbeam_channel::{unbounded, RecvTimeoutError};
use tracing::info;
use vplane_console::{ControlBridge, ControlBridgeServer, Dispatcher, Server, STATUS_ERROR};
use vplane_dataplane::config::{self, Config};
use vplane_dataplane::context::AppState;
use vplane_dataplane::{controller, verbs};
use vplane_utils::controller::ControllerMsg;

#[derive(Parser, Debug)]
#[command(name = "vplaned", about = "userspace IP/Ethernet forwarding dataplane")]
struct Args {
    /// Path to the TOML configuration file (§6, "Environment").
    #[arg(long)]
    config: Option<String>,
}

/// Builds the `tracing` subscriber from `config.logging`, matching
/// `holo-daemon`'s stdout-fmt-layer-plus-optional-file-layer wiring
/// (SPEC_FULL.md, "AMBIENT STACK... Logging").
fn init_logging(logging: &config::Logging) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::builder()
        .with_default_directive("vplaned=debug".parse().unwrap())
        .from_env_lossy();
    let registry = tracing_subscriber::registry().with(env_filter);

    let stdout_layer = logging.stdout.enabled.then(|| {
        let layer = fmt::layer().with_target(true);
        if logging.stdout.json {
            layer.json().boxed()
        } else {
            layer.boxed()
        }
    });

    if logging.file.enabled {
        let appender = tracing_appender::rolling::daily(&logging.file.dir, &logging.file.name);
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);
        registry
            .with(stdout_layer)
            .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
            .init();
        Some(guard)
    } else {
        registry.with(stdout_layer).init();
        None
    }
}

/// Runs one forwarding thread's poll loop (§4.1, §5): registers a
/// reader, then repeatedly enters and exits a reader section. A real
/// poll-mode driver would call `rx_burst` and `PipelineGraph::run`
/// inside the section; that NIC integration is the out-of-scope
/// collaborator named in §1, so this loop is the reader-section
/// discipline alone, parked with a short sleep between sections so it
/// doesn't spin a CPU core at 100% in this skeleton.
fn forwarding_loop(state: AppState, core_id: Option<usize>, shutdown: Arc<std::sync::atomic::AtomicBool>) {
    if let Some(core_id) = core_id
        && let Some(core) = core_affinity::get_core_ids()
            .unwrap_or_default()
            .into_iter()
            .find(|c| c.id == core_id)
    {
        core_affinity::set_for_current(core);
    }

    let domain = state.domain();
    let mut reader = domain.register();
    while !shutdown.load(std::sync::atomic::Ordering::Relaxed) {
        {
            let _section = reader.enter();
            // Packet traversal would run here, inside the reader section.
        }
        std::thread::sleep(Duration::from_millis(10));
    }
}

/// The control thread's main loop (§5, "The control thread blocks only
/// in: (a) the route mutex, (b) synchronous command round-trips to
/// itself... (c) deferred-free grace-period wait"). Drains the
/// controller channel and the console's forwarded control-thread
/// commands in a single-threaded round-robin, per §4.1's "one
/// privileged control thread performs all mutations".
fn control_loop(
    state: AppState,
    controller_rx: crossbeam_channel::Receiver<ControllerMsg>,
    dispatcher: Dispatcher<AppState>,
    bridge_server: ControlBridgeServer,
    shutdown: Arc<std::sync::atomic::AtomicBool>,
) {
    let domain = state.domain();
    let mut reader = domain.register();

    while !shutdown.load(std::sync::atomic::Ordering::Relaxed) {
        match controller_rx.recv_timeout(Duration::from_millis(100)) {
            Ok(msg) => controller::apply(&state, &mut reader, &dispatcher, msg),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }

        bridge_server.drain(|line| run_on_control_thread(&state, line));
    }
}

/// Runs a control-thread-only verb directly against the real handler,
/// bypassing [`Dispatcher::execute`]'s forwarding path (this *is* the
/// control thread the dispatcher would otherwise forward to).
fn run_on_control_thread(ctx: &AppState, line: &str) -> i32 {
    let mut tokens = line.split_whitespace();
    let Some(verb) = tokens.next() else {
        return STATUS_ERROR;
    };
    let argv: Vec<&str> = tokens.collect();
    match verbs::VERBS.get(verb) {
        Some(spec) => {
            let mut out = Vec::new();
            (spec.handler)(ctx, &mut out, &argv)
        }
        None => STATUS_ERROR,
    }
}

fn main() {
    let args = Args::parse();
    let config = Config::load(args.config.as_deref());
    let _logging_guard = init_logging(&config.logging);

    info!(?config.forwarding.core_ids, "starting vplaned");

    let n_cores = config.forwarding.core_ids.len().max(1);
    let state = AppState::new(&config, n_cores);

    // Controller channel (§6): the decoded message shape is in scope,
    // the message-bus wire framing is not (`vplane_utils::controller`'s
    // module doc). `_controller_tx` is held for the life of the process
    // rather than dropped: a real deployment hands its sending half to
    // a netlink-monitor task spawned the same way the console server is
    // spawned below, and `control_loop` below distinguishes "nothing
    // sent yet" from "every sender has gone away".
    let (controller_tx, controller_rx) = unbounded::<ControllerMsg>();
    let _controller_tx = controller_tx;

    let (bridge_tx, bridge_rx) = unbounded();
    let control_bridge = ControlBridge::new(bridge_tx);
    let bridge_server = ControlBridgeServer::new(bridge_rx);

    let shutdown = Arc::new(std::sync::atomic::AtomicBool::new(false));

    let mut forwarding_threads = Vec::new();
    if config.forwarding.core_ids.is_empty() {
        let state = state.clone();
        let shutdown = shutdown.clone();
        forwarding_threads.push(std::thread::spawn(move || forwarding_loop(state, None, shutdown)));
    } else {
        for &core_id in &config.forwarding.core_ids {
            let state = state.clone();
            let shutdown = shutdown.clone();
            forwarding_threads
                .push(std::thread::spawn(move || forwarding_loop(state, Some(core_id), shutdown)));
        }
    }

    let console_state = state.clone();
    let console_config = config.console.clone();
    let console_bridge = control_bridge.clone();
    let console_thread = std::thread::spawn(move || {
        let server = match Server::bind(&console_config.socket_path, console_config.gid) {
            Ok(server) => server,
            Err(err) => {
                err.log();
                return;
            }
        };
        let dispatcher = Dispatcher::new(&verbs::VERBS, console_state, console_bridge);
        info!(path = %console_config.socket_path, "console listening");
        server.serve(&dispatcher);
    });

    // The control thread gets its own `Dispatcher` (same table, same
    // bridge, its own `AppState` handle) so `controller::apply` can
    // replay a deferred command through the real verb table (§4.9)
    // without sharing a dispatcher instance across threads.
    let control_shutdown = shutdown.clone();
    let control_state = state.clone();
    let control_dispatcher = Dispatcher::new(&verbs::VERBS, state.clone(), control_bridge);
    let control_thread = std::thread::spawn(move || {
        control_loop(control_state, controller_rx, control_dispatcher, bridge_server, control_shutdown)
    });

    // Block the process on Ctrl-C / SIGTERM via a small single-threaded
    // tokio runtime, matching `holo-daemon::main`'s signal handling; the
    // dataplane's own threads are plain `std::thread`s since none of
    // them ever `.await` anything.
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("failed to build signal-handling runtime");
    rt.block_on(async {
        let _ = tokio::signal::ctrl_c().await;
    });

    info!("shutting down");
    shutdown.store(true, std::sync::atomic::Ordering::Relaxed);
    for handle in forwarding_threads {
        let _ = handle.join();
    }
    let _ = control_thread.join();
    // The console thread is blocked in `accept()`; in a production
    // deployment the socket would be shut down to unblock it. Left
    // detached here since the process is exiting regardless.
    drop(console_thread);
}
