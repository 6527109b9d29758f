//! Process-wide mesh configuration and compile-time constants.
//!
//! Grounded in the teacher's `state/mesh.rs`, which keeps `MeshConfig`
//! beside the constants (`MESH_ID`, `MESH_PASSWORD`, `MESH_MAX_LAYER`)
//! that size it. Here the constants describe the custom TCP-mesh wire
//! protocol instead of ESP-MESH's built-in networking.

use crate::shortmac::ShortMac;

/// Port carrying the MAC/IP binding heartbeat (spec §4.2, §6).
pub const BINDING_PORT: u16 = 9000;

/// Port carrying routing reports and data packets (spec §4.4, §6).
pub const ROUTING_PORT: u16 = 9001;

/// Binding-table entries older than this many server iterations are
/// evicted (spec §4.2).
pub const AGE_THRESHOLD: u32 = 30;

/// How often the binding server loop ticks (also the `SO_RCVTIMEO` on
/// its listening socket).
pub const BINDING_SERVER_TICK_MS: u64 = 1_000;

/// How often an attached STA sends its heartbeat to the parent.
pub const HEARTBEAT_INTERVAL_MS: u64 = 100;

/// `sta_scan` timeout (spec §4.1).
pub const SCAN_TIMEOUT_MS: u64 = 5_000;
pub const SCAN_POLL_INTERVAL_MS: u64 = 10;

/// `sta_connect` timeout before DHCP, and the DHCP wait after.
pub const CONNECT_TIMEOUT_MS: u64 = 500;
pub const DHCP_TIMEOUT_MS: u64 = 3_000;

/// Routing task's event-flag wait granularity (spec §4.4).
pub const ROUTING_TICK_MS: u64 = 200;

/// Connected state's event-flag wait granularity (spec §4.3).
pub const CONNECTED_TICK_MS: u64 = 500;

/// Delay after a disconnect before re-scanning, to let the ghost SSID
/// vanish from the radio's scan cache (spec §4.3).
pub const POST_DISCONNECT_SETTLE_MS: u64 = 1_000;

pub const MAX_SSID_LEN: usize = 15;
pub const MAX_PASSWORD_LEN: usize = 64;
pub const MAX_PAYLOAD_LEN: usize = 494;

/// Runtime, process-wide mesh configuration (spec §3).
///
/// Written only by the FSM task; Routing and the Mesh API read it.
#[derive(Debug, Clone)]
pub struct MeshConfig {
    pub mesh_prefix: String,
    pub password: String,
    pub root_short_mac: Option<ShortMac>,
    pub tree_level: Option<u8>,
}

impl MeshConfig {
    /// Validate and construct, per spec §7 `ConfigInvalid`.
    pub fn new(mesh_prefix: &str, password: &str) -> Option<Self> {
        if mesh_prefix.len() > MAX_SSID_LEN || password.len() > MAX_PASSWORD_LEN {
            return None;
        }
        Some(MeshConfig {
            mesh_prefix: mesh_prefix.to_string(),
            password: password.to_string(),
            root_short_mac: None,
            tree_level: None,
        })
    }

    pub fn is_root(&self) -> bool {
        self.tree_level == Some(0)
    }
}
