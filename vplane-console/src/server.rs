//
// Copyright (c) The VPlane Project Contributors
//
// SPDX-License-Identifier: MIT
//

//! The console endpoint (§6, "Console endpoint"): a Unix-domain socket
//! at a configurable path, `chmod 0770` plus `chown` to a configured
//! group so non-root operators can reach it.

use std::ffi::CString;
use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::Path;

use tracing::{debug, warn};

use crate::dispatcher::{Dispatcher, OfflineAware};
use crate::error::Error;

/// Binds the console's Unix-domain socket, applying the permission and
/// ownership policy of §6 ("Non-root access is enabled by chmod 0770 +
/// chown to a configured group").
pub struct Server {
    listener: UnixListener,
}

impl Server {
    pub fn bind(path: impl AsRef<Path>, gid: Option<u32>) -> Result<Self, Error> {
        let path = path.as_ref();
        let _ = std::fs::remove_file(path);
        let listener = UnixListener::bind(path).map_err(Error::SocketBind)?;
        chmod(path, 0o770).map_err(Error::SocketChmod)?;
        if let Some(gid) = gid {
            chown(path, gid).map_err(Error::SocketChown)?;
        }
        Ok(Server { listener })
    }

    /// Serves connections until the listener errors out. Each
    /// connection is handled to completion before the next is
    /// accepted, matching the single console thread of §5.
    pub fn serve<Ctx: OfflineAware>(&self, dispatcher: &Dispatcher<Ctx>) {
        for conn in self.listener.incoming() {
            match conn {
                Ok(stream) => handle_connection(stream, dispatcher),
                Err(err) => {
                    warn!(%err, "console accept failed");
                }
            }
        }
    }
}

fn handle_connection<Ctx: OfflineAware>(stream: UnixStream, dispatcher: &Dispatcher<Ctx>) {
    let mut reader = BufReader::new(stream.try_clone().expect("duplicate console fd"));
    let mut writer = stream;

    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line) {
            Ok(0) => return,
            Ok(_) => {}
            Err(err) => {
                warn!(%err, "console read failed");
                return;
            }
        }
        let line = line.trim_end();
        if line.is_empty() {
            continue;
        }

        debug!(%line, "console command");
        let (rc, payload) = dispatcher.execute(line);

        // Two response frames (§6): a status token, then the payload.
        let status = if rc == 0 { "OK" } else { "ERROR" };
        if writeln!(writer, "{status}").is_err() || writeln!(writer, "{payload}").is_err() {
            return;
        }
    }
}

fn chmod(path: &Path, mode: u32) -> std::io::Result<()> {
    let c_path = CString::new(path.as_os_str().as_encoded_bytes())
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidInput, err))?;
    let rc = unsafe { libc::chmod(c_path.as_ptr(), mode as libc::mode_t) };
    if rc != 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

fn chown(path: &Path, gid: u32) -> std::io::Result<()> {
    let c_path = CString::new(path.as_os_str().as_encoded_bytes())
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidInput, err))?;
    let rc = unsafe {
        libc::chown(c_path.as_ptr(), u32::MAX as libc::uid_t, gid as libc::gid_t)
    };
    if rc != 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}
