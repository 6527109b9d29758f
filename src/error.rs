//! Typed errors for the radio façade and the mesh API.
//!
//! Mirrors the split the rest of the firmware uses: subsystems return a
//! narrow `thiserror` enum, `main.rs` and the demo binaries collapse
//! everything into `anyhow::Result` at the top.

use crate::radio::WirelessKind;

/// Errors surfaced by the Radio Abstraction (§4.1).
#[derive(Debug, thiserror::Error)]
pub enum RadioError {
    #[error("scan timed out waiting for results")]
    ScanTimeout,

    #[error("sta_connect timed out before the link came up")]
    ConnectTimeout,

    #[error("DHCP lease did not arrive in time")]
    DhcpTimeout,

    #[error("{0:?} radio is not implemented")]
    NotImplemented(WirelessKind),

    #[error("no binding table entry for child {0}")]
    UnknownChild(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(target_os = "espidf")]
    #[error("esp-idf error: {0}")]
    Esp(#[from] esp_idf_svc::sys::EspError),
}

/// Errors surfaced by the Mesh API (§4.5, §7).
#[derive(Debug, thiserror::Error)]
pub enum MeshError {
    #[error("config invalid: ssid/password exceed the allowed length")]
    ConfigInvalid,

    #[error("mesh_send/mesh_broadcast called before the node reached Connected")]
    NotConnected,

    #[error("payload exceeds the 494-byte data field")]
    PayloadTooLarge,

    #[error("transient radio/socket failure, frame dropped")]
    LinkDown,

    #[error("destination short MAC unknown to the root")]
    Unreachable,

    #[error(transparent)]
    Radio(#[from] RadioError),
}
