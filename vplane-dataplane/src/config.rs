//
// Copyright (c) The VPlane Project Contributors
//
// SPDX-License-Identifier: MIT
//

//! The dataplane's TOML configuration (§6, "Environment"), loaded the
//! way `holo-daemon::config` loads `holod.toml`.

use serde::Deserialize;

#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub console: Console,
    pub forwarding: Forwarding,
    pub fib: Fib,
    pub logging: Logging,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Console {
    /// Unix-domain socket path (§6, default `/var/run/vplane.socket`).
    pub socket_path: String,
    /// Group to chown the socket to, so non-root operators can reach
    /// it; `None` leaves ownership as the process's own.
    pub gid: Option<u32>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Forwarding {
    /// CPU core ids to pin one forwarding thread to each (§5,
    /// "N parallel forwarding threads, one pinned per CPU core").
    /// Empty means one unpinned thread.
    pub core_ids: Vec<usize>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Fib {
    /// Next-hop pool capacity; see `vplane_nexthop::pool::DEFAULT_CAPACITY`.
    pub nexthop_pool_capacity: u32,
    pub ecmp_max_path: usize,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Logging {
    pub stdout: LoggingStdout,
    pub file: LoggingFile,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingStdout {
    pub enabled: bool,
    pub json: bool,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingFile {
    pub enabled: bool,
    pub dir: String,
    pub name: String,
}

// ===== impl Config =====

impl Config {
    const DFLT_FILEPATH: &'static str = "/etc/vplaned.toml";

    pub fn load(config_file: Option<&str>) -> Config {
        let config_file = config_file.unwrap_or(Config::DFLT_FILEPATH);

        match std::fs::read_to_string(config_file) {
            Ok(config_str) => {
                toml::from_str(&config_str).expect("failed to parse configuration file")
            }
            Err(err) => {
                eprintln!("failed to load configuration file: {err}");
                eprintln!("falling back to default configuration...");
                Config::default()
            }
        }
    }
}

impl Default for Config {
    fn default() -> Config {
        Config {
            console: Default::default(),
            forwarding: Default::default(),
            fib: Default::default(),
            logging: Default::default(),
        }
    }
}

impl Default for Console {
    fn default() -> Console {
        Console { socket_path: "/var/run/vplane.socket".to_owned(), gid: None }
    }
}

impl Default for Forwarding {
    fn default() -> Forwarding {
        Forwarding { core_ids: Vec::new() }
    }
}

impl Default for Fib {
    fn default() -> Fib {
        Fib {
            nexthop_pool_capacity: vplane_nexthop::pool::DEFAULT_CAPACITY,
            ecmp_max_path: vplane_nexthop::pool::DEFAULT_ECMP_MAX_PATH,
        }
    }
}

impl Default for Logging {
    fn default() -> Logging {
        Logging { stdout: Default::default(), file: Default::default() }
    }
}

impl Default for LoggingStdout {
    fn default() -> LoggingStdout {
        LoggingStdout { enabled: true, json: false }
    }
}

impl Default for LoggingFile {
    fn default() -> LoggingFile {
        LoggingFile { enabled: false, dir: "/var/log".to_owned(), name: "vplaned.log".to_owned() }
    }
}
