//! `MeshRuntime` — the process-wide handle the worker tasks and the
//! Mesh API close over.
//!
//! Spec §9 "Global state" asks that the event-flag groups, the
//! configuration, the binding table, the routing graph, and the
//! inbound queue become "explicit handles owned by a single
//! `MeshRuntime` struct and threaded into worker closures", replacing
//! the source's file-scope globals. This mirrors the teacher's
//! `node.rs`/`GLOBAL_STATE` split, just without the `once_cell::Lazy`
//! singleton — every handle here is owned, not global.

use crate::api::ConnectedFlag;
use crate::binding::BindingTable;
use crate::config::MeshConfig;
use crate::events::EventFlags;
use crate::queue::InboundQueue;
use crate::radio::Radio;
use crate::routing::RoutingEngine;
use std::sync::{Arc, Mutex};

pub struct MeshRuntime<R: Radio> {
    pub radio: Mutex<R>,
    pub config: Mutex<MeshConfig>,
    pub bindings: Mutex<BindingTable>,
    pub routing: Mutex<RoutingEngine>,
    pub inbound: InboundQueue,
    /// Shared with the radio so its Wi-Fi event callback can set
    /// `WIRELESS_CONNECT`/`WIRELESS_DISCONNECT` directly (spec's
    /// Connection Event Plumbing supplement).
    pub wireless_events: Arc<EventFlags>,
    pub routing_events: EventFlags,
    pub connected: ConnectedFlag,
    pub running: std::sync::atomic::AtomicBool,
}

impl<R: Radio> MeshRuntime<R> {
    pub fn new(
        radio: R,
        config: MeshConfig,
        self_mac: crate::shortmac::ShortMac,
        wireless_events: Arc<EventFlags>,
    ) -> Self {
        MeshRuntime {
            radio: Mutex::new(radio),
            config: Mutex::new(config),
            bindings: Mutex::new(BindingTable::new()),
            routing: Mutex::new(RoutingEngine::new(self_mac)),
            inbound: InboundQueue::new(),
            wireless_events,
            routing_events: EventFlags::new(),
            connected: ConnectedFlag::default(),
            running: std::sync::atomic::AtomicBool::new(true),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(std::sync::atomic::Ordering::SeqCst)
    }

    pub fn stop(&self) {
        self.running.store(false, std::sync::atomic::Ordering::SeqCst);
        self.wireless_events.set(crate::events::WIRELESS_DISCONNECT);
        self.routing_events.set(crate::events::ROUTING_STOP);
    }
}
