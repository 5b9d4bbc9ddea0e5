//
// Copyright (c) The VPlane Project Contributors
//
// SPDX-License-Identifier: MIT
//

use tracing::error;

#[derive(Debug)]
pub enum Error {
    SocketBind(std::io::Error),
    SocketChmod(std::io::Error),
    SocketChown(std::io::Error),
    ControlBridgeClosed,
}

impl Error {
    pub fn log(&self) {
        match self {
            Error::SocketBind(err) => {
                error!(%err, "failed to bind console socket");
            }
            Error::SocketChmod(err) => {
                error!(%err, "failed to chmod console socket");
            }
            Error::SocketChown(err) => {
                error!(%err, "failed to chown console socket");
            }
            Error::ControlBridgeClosed => {
                error!("control bridge closed while a command round-trip was in flight");
            }
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::SocketBind(err) => write!(f, "failed to bind console socket: {err}"),
            Error::SocketChmod(err) => write!(f, "failed to chmod console socket: {err}"),
            Error::SocketChown(err) => write!(f, "failed to chown console socket: {err}"),
            Error::ControlBridgeClosed => {
                write!(f, "control bridge closed while awaiting a response")
            }
        }
    }
}

impl std::error::Error for Error {}
