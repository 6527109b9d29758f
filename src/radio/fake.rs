//! In-process radio double for host-side integration tests
//! (`tests/mesh_formation.rs`).
//!
//! There is no ESP32 at build time, so the end-to-end scenarios in
//! spec §8 run against this fake instead of real Wi-Fi/TCP: an
//! `Ether` shared between every node in a test simulates beacon
//! visibility (which SSIDs are "on the air") and message delivery
//! (which IP:port pairs have mail waiting), in-memory.

use super::{ScanCandidate, WifiStaConfig};
use crate::binding::BindingTable;
use crate::config::MeshConfig;
use crate::error::RadioError;
use crate::radio::Radio;
use crate::shortmac::{Ssid, ShortMac};
use std::collections::{HashMap, VecDeque};
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct EtherState {
    /// SSID -> (root short mac, level, owner node hw mac)
    beacons: HashMap<String, (ShortMac, u8, [u8; 6])>,
    /// (ip, port) -> queue of (sender ip, bytes)
    mailboxes: HashMap<(Ipv4Addr, u16), VecDeque<(Ipv4Addr, Vec<u8>)>>,
}

/// Shared "air" every `FakeRadio` in a test is constructed against.
#[derive(Clone, Default)]
pub struct Ether(Arc<Mutex<EtherState>>);

impl Ether {
    pub fn new() -> Self {
        Ether::default()
    }
}

pub struct FakeRadio {
    ether: Ether,
    hw_mac: [u8; 6],
    sta_ip: Option<Ipv4Addr>,
    ap_level: Option<u8>,
}

impl FakeRadio {
    pub fn new(ether: Ether, hw_mac: [u8; 6]) -> Self {
        FakeRadio {
            ether,
            hw_mac,
            sta_ip: None,
            ap_level: None,
        }
    }

    pub fn set_sta_ip(&mut self, ip: Ipv4Addr) {
        self.sta_ip = Some(ip);
    }
}

/// A fake "listener": just the (ip, port) this node is bound to.
pub struct FakeListener {
    addr: (Ipv4Addr, u16),
}

impl Radio for FakeRadio {
    type Listener = FakeListener;

    fn init(&mut self) -> Result<(), RadioError> {
        Ok(())
    }

    fn deinit(&mut self) -> Result<(), RadioError> {
        Ok(())
    }

    fn sta_enable(&mut self) -> Result<(), RadioError> {
        Ok(())
    }

    fn sta_disable(&mut self) -> Result<(), RadioError> {
        self.sta_ip = None;
        Ok(())
    }

    fn sta_scan(
        &mut self,
        expected: &mut WifiStaConfig,
        max: usize,
    ) -> Result<Vec<ScanCandidate>, RadioError> {
        let ether = self.ether.0.lock().unwrap();
        let mut out = Vec::new();
        for (ssid, (root_mac, level, owner_mac)) in ether.beacons.iter().take(max) {
            if *ssid == expected.ssid {
                expected.bssid = Some(*owner_mac);
            }
            out.push(ScanCandidate {
                ssid: ssid.clone(),
                bssid: *owner_mac,
                rssi: -40 - (*level as i8),
                channel: 1,
            });
        }
        Ok(out)
    }

    fn sta_connect(&mut self, cfg: &WifiStaConfig) -> Result<(), RadioError> {
        let ether = self.ether.0.lock().unwrap();
        if !ether.beacons.contains_key(&cfg.ssid) {
            return Err(RadioError::ConnectTimeout);
        }
        drop(ether);
        // Deterministic per-node fake IP on the parent's subnet isn't
        // knowable here (depends on tree level); callers set it
        // explicitly via `set_sta_ip` after a successful connect.
        Ok(())
    }

    fn sta_disconnect(&mut self) -> Result<(), RadioError> {
        self.sta_ip = None;
        Ok(())
    }

    fn ap_enable(&mut self, config: &MeshConfig, level: u8) -> Result<(), RadioError> {
        let root_mac = config
            .root_short_mac
            .unwrap_or_else(|| ShortMac::from_hw_mac(self.hw_mac));
        let ssid = Ssid::format(&config.mesh_prefix, root_mac, level)
            .ok_or_else(|| RadioError::Io(std::io::Error::other("ssid too long")))?;
        self.ap_level = Some(level);
        self.ether
            .0
            .lock()
            .unwrap()
            .beacons
            .insert(ssid, (root_mac, level, self.hw_mac));
        Ok(())
    }

    fn ap_disable(&mut self) -> Result<(), RadioError> {
        let mut ether = self.ether.0.lock().unwrap();
        ether.beacons.retain(|_, (_, _, mac)| *mac != self.hw_mac);
        self.ap_level = None;
        Ok(())
    }

    fn get_ap_mac(&self) -> Result<[u8; 6], RadioError> {
        Ok(self.hw_mac)
    }

    fn send_to_ip(&self, ip: Ipv4Addr, port: u16, data: &[u8]) -> Result<(), RadioError> {
        let from = self.sta_ip.or(self.ap_level.map(|l| super::parent_gateway(l)))
            .unwrap_or(Ipv4Addr::UNSPECIFIED);
        self.ether
            .0
            .lock()
            .unwrap()
            .mailboxes
            .entry((ip, port))
            .or_default()
            .push_back((from, data.to_vec()));
        Ok(())
    }

    fn create_server(&self, port: u16) -> Result<FakeListener, RadioError> {
        let addr = self
            .ap_level
            .map(|l| super::parent_gateway(l))
            .or(self.sta_ip)
            .unwrap_or(Ipv4Addr::UNSPECIFIED);
        Ok(FakeListener { addr: (addr, port) })
    }

    fn server_receive(
        &self,
        listener: &FakeListener,
        bindings: &BindingTable,
    ) -> Result<Option<(ShortMac, Vec<u8>)>, RadioError> {
        let mut ether = self.ether.0.lock().unwrap();
        let Some(queue) = ether.mailboxes.get_mut(&listener.addr) else {
            return Ok(None);
        };
        let Some((from, data)) = queue.pop_front() else {
            return Ok(None);
        };
        match bindings.find_mac_by_ip(from) {
            Some(mac) => Ok(Some((mac, data))),
            None => Ok(None),
        }
    }

    fn accept_heartbeat(
        &self,
        listener: &FakeListener,
    ) -> Result<Option<(ShortMac, Ipv4Addr)>, RadioError> {
        let mut ether = self.ether.0.lock().unwrap();
        let Some(queue) = ether.mailboxes.get_mut(&listener.addr) else {
            return Ok(None);
        };
        let Some((from, data)) = queue.pop_front() else {
            return Ok(None);
        };
        if !(1..=7).contains(&data.len()) {
            return Ok(None);
        }
        let mac_str = std::str::from_utf8(&data[..data.len().min(6)]).ok();
        Ok(mac_str.and_then(ShortMac::parse).map(|mac| (mac, from)))
    }

    fn send_to_parent(&self, data: &[u8], parent_level: u8) -> Result<(), RadioError> {
        self.send_to_ip(super::parent_gateway(parent_level), crate::config::ROUTING_PORT, data)
    }

    fn send_to_child(
        &self,
        dest: ShortMac,
        data: &[u8],
        bindings: &BindingTable,
    ) -> Result<(), RadioError> {
        let ip = bindings
            .find_ip_by_mac(dest)
            .ok_or_else(|| RadioError::UnknownChild(dest.to_string()))?;
        self.send_to_ip(ip, crate::config::ROUTING_PORT, data)
    }
}
