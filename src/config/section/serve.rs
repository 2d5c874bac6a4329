//! `[serve]` section configuration.
//!
//! Development server settings.
//!
//! ```toml
//! [serve]
//! interface = "127.0.0.1"     # 0.0.0.0 makes the server reachable from LAN
//! port = 3000                 # HTTP port (next free port is used if busy)
//! ws_port = 35729             # live reload WebSocket port
//!
//! [serve.routes]
//! "/node_modules" = "node_modules"
//! ```

use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServeConfig {
    pub interface: IpAddr,

    pub port: u16,

    pub ws_port: u16,

    /// URL prefix -> directory (relative to the project root) served
    /// alongside the output directory.
    pub routes: BTreeMap<String, PathBuf>,
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            interface: IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)),
            port: 3000,
            ws_port: 35729,
            routes: BTreeMap::from([("/node_modules".to_string(), PathBuf::from("node_modules"))]),
        }
    }
}
