//! Radio Abstraction (spec §4.1) — the sole module permitted to call the
//! platform Wi-Fi driver.
//!
//! `WirelessKind` is a closed tag, dispatched with a plain enum match
//! rather than an abstract base class, per spec §9 Design Notes. Only
//! `Wifi` is implemented; the others exist so the façade has somewhere
//! to grow without the call sites caring.

use crate::binding::BindingTable;
use crate::config::MeshConfig;
use crate::error::RadioError;
use crate::events::EventFlags;
use crate::shortmac::ShortMac;
use std::net::Ipv4Addr;
use std::sync::Arc;

#[cfg(target_os = "espidf")]
pub mod wifi;

#[cfg(any(test, not(target_os = "espidf")))]
pub mod fake;

/// Which physical transport a `Radio` implementation speaks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WirelessKind {
    Wifi,
    Bluetooth,
    Nearlink,
}

impl WirelessKind {
    /// Construct the Wi-Fi façade, or fail with `NotImplemented` for
    /// any other transport (spec §4.1). Not generic over `Radio`
    /// because only one concrete implementation exists per transport;
    /// callers needing the trait (the FSM, Routing) are themselves
    /// generic over `R: Radio`.
    #[cfg(target_os = "espidf")]
    pub fn open(self, wireless_events: Arc<EventFlags>) -> Result<wifi::WifiRadio, RadioError> {
        match self {
            WirelessKind::Wifi => wifi::WifiRadio::new(wireless_events),
            other => Err(RadioError::NotImplemented(other)),
        }
    }
}

/// One scan result, matched against the mesh SSID pattern (spec §3).
#[derive(Debug, Clone)]
pub struct ScanCandidate {
    pub ssid: String,
    pub bssid: [u8; 6],
    pub rssi: i8,
    pub channel: u8,
}

/// Staged STA connection parameters. `sta_scan` back-fills `bssid` and
/// `security` on an SSID match (Open Question 1); the caller must
/// pre-populate `ssid`.
#[derive(Debug, Clone, Default)]
pub struct WifiStaConfig {
    pub ssid: String,
    pub password: String,
    pub bssid: Option<[u8; 6]>,
    pub channel: Option<u8>,
}

/// Uniform façade over Wi-Fi primitives (spec §4.1). Every operation
/// maps to one subsystem of the underlying radio driver; nothing above
/// this trait is allowed to reach for the driver directly.
///
/// `Listener` is an associated type rather than a concrete
/// `std::net::TcpListener` so the test double in [`fake`] can stand in
/// for it without opening real sockets.
pub trait Radio {
    type Listener;

    fn init(&mut self) -> Result<(), RadioError>;
    fn deinit(&mut self) -> Result<(), RadioError>;

    fn sta_enable(&mut self) -> Result<(), RadioError>;
    fn sta_disable(&mut self) -> Result<(), RadioError>;
    /// Blocks up to `SCAN_TIMEOUT_MS`, polling every `SCAN_POLL_INTERVAL_MS`.
    fn sta_scan(
        &mut self,
        expected_ssid: &mut WifiStaConfig,
        max: usize,
    ) -> Result<Vec<ScanCandidate>, RadioError>;
    fn sta_connect(&mut self, cfg: &WifiStaConfig) -> Result<(), RadioError>;
    fn sta_disconnect(&mut self) -> Result<(), RadioError>;

    /// Enables SoftAP at `192.168.<level>.1/24`, starts the DHCP
    /// server, then spawns the MAC/IP binding server.
    fn ap_enable(&mut self, config: &MeshConfig, level: u8) -> Result<(), RadioError>;
    fn ap_disable(&mut self) -> Result<(), RadioError>;

    fn get_ap_mac(&self) -> Result<[u8; 6], RadioError>;
    fn get_node_short_mac(&self) -> Result<ShortMac, RadioError> {
        self.get_ap_mac().map(ShortMac::from_hw_mac)
    }

    fn send_to_ip(&self, ip: Ipv4Addr, port: u16, data: &[u8]) -> Result<(), RadioError>;
    fn create_server(&self, port: u16) -> Result<Self::Listener, RadioError>;
    /// Accepts one connection, receives one message, resolves the
    /// peer's short MAC via `bindings`, then closes the socket. A
    /// timeout or receive error returns `Ok(None)` so the caller's
    /// loop simply continues (spec §4.1). Used by the Routing task on
    /// port 9001, once the binding table already knows the sender.
    fn server_receive(
        &self,
        listener: &Self::Listener,
        bindings: &BindingTable,
    ) -> Result<Option<(ShortMac, Vec<u8>)>, RadioError>;

    /// Accepts one heartbeat connection on the binding server's port
    /// 9000 and returns the sender's claimed short MAC alongside the
    /// peer IPv4 the socket itself observed — this is what populates
    /// the binding table in the first place, so unlike
    /// `server_receive` it cannot consult it (spec §4.2). `Ok(None)`
    /// on timeout or a malformed (outside 1–7 byte) payload.
    fn accept_heartbeat(
        &self,
        listener: &Self::Listener,
    ) -> Result<Option<(ShortMac, Ipv4Addr)>, RadioError>;

    fn send_to_parent(&self, data: &[u8], parent_level: u8) -> Result<(), RadioError>;
    fn send_to_child(
        &self,
        dest: ShortMac,
        data: &[u8],
        bindings: &BindingTable,
    ) -> Result<(), RadioError>;

    fn get_all_child_macs(&self, bindings: &BindingTable) -> Vec<ShortMac> {
        bindings.all_child_macs()
    }
}

/// `192.168.<level>.1` — the well-known gateway address of the AP a
/// node at `level` runs (spec §6 "AP IPv4 plan").
pub fn parent_gateway(parent_level: u8) -> Ipv4Addr {
    Ipv4Addr::new(192, 168, parent_level as u8, 1)
}
