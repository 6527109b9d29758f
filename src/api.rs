//! Mesh API (spec §4.5) — the public surface application code calls.
//!
//! Grounded in the teacher's `node.rs`/`tasks.rs` split between a
//! runtime struct and the worker tasks it owns; here `MeshRuntime`
//! (in `node.rs`) holds the state this module operates on, in line
//! with spec §9's "Global state" note (no file-scope globals, an
//! explicit runtime struct instead).

use crate::binding::BindingTable;
use crate::config::{MeshConfig, MAX_PASSWORD_LEN, MAX_PAYLOAD_LEN, MAX_SSID_LEN};
use crate::error::MeshError;
use crate::fsm::FsmState;
use crate::node::MeshRuntime;
use crate::radio::Radio;
use crate::routing::RoutingEngine;
use crate::shortmac::ShortMac;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// Tracks whether the FSM has reached `Connected` at least once and
/// not since dropped back to `Scanning` (spec §4.5 `connected()`).
#[derive(Default)]
pub struct ConnectedFlag(AtomicBool);

impl ConnectedFlag {
    pub fn set(&self, value: bool) {
        self.0.store(value, Ordering::SeqCst);
    }

    pub fn get(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub fn fsm_state_to_connected(state: FsmState, flag: &ConnectedFlag) {
    flag.set(matches!(state, FsmState::Connected));
}

/// `mesh_init` validation (spec §4.5, §7 `ConfigInvalid`).
pub fn validate_init(ssid: &str, password: &str) -> Result<MeshConfig, MeshError> {
    if ssid.len() > MAX_SSID_LEN || password.len() > MAX_PASSWORD_LEN {
        return Err(MeshError::ConfigInvalid);
    }
    MeshConfig::new(ssid, password).ok_or(MeshError::ConfigInvalid)
}

/// `mesh_send(dest, data)` (spec §4.5).
pub fn send<R: Radio>(
    routing: &Mutex<RoutingEngine>,
    radio: &R,
    bindings: &Mutex<BindingTable>,
    config: &Mutex<MeshConfig>,
    connected: &ConnectedFlag,
    dest: ShortMac,
    data: &[u8],
) -> Result<(), MeshError> {
    if !connected.get() {
        return Err(MeshError::NotConnected);
    }
    if data.len() > MAX_PAYLOAD_LEN {
        return Err(MeshError::PayloadTooLarge);
    }
    let bindings = bindings.lock().unwrap();
    let config = config.lock().unwrap();
    routing.lock().unwrap().send(dest, data, radio, &bindings, &config)
}

/// `mesh_broadcast(data)` (spec §4.5).
pub fn broadcast<R: Radio>(
    routing: &Mutex<RoutingEngine>,
    radio: &R,
    bindings: &Mutex<BindingTable>,
    config: &Mutex<MeshConfig>,
    connected: &ConnectedFlag,
    data: &[u8],
) -> Result<(), MeshError> {
    if !connected.get() {
        return Err(MeshError::NotConnected);
    }
    if data.len() > MAX_PAYLOAD_LEN {
        return Err(MeshError::PayloadTooLarge);
    }
    let bindings = bindings.lock().unwrap();
    let config = config.lock().unwrap();
    routing
        .lock()
        .unwrap()
        .broadcast(data, radio, &bindings, &config)
}

/// `mesh_recv()` (spec §4.5): non-blocking, silently drops acks.
pub fn recv(runtime: &MeshRuntime<impl Radio>) -> Option<(ShortMac, Vec<u8>)> {
    loop {
        let packet = runtime.inbound.try_pop()?;
        if packet.status == crate::packet::PacketStatus::Ack {
            continue;
        }
        return Some((packet.src, packet.data));
    }
}

/// `mesh_connected()` (spec §4.5).
pub fn connected(flag: &ConnectedFlag) -> bool {
    flag.get()
}
