//! Long-lived worker tasks (spec §4.5, §5).
//!
//! Four tasks per node: FSM, Routing, MAC/IP binding server (while AP
//! is up), heartbeat client (while STA is up) — grounded in the
//! teacher's `tasks.rs`, which spawns a fixed set of `thread::spawn`
//! loops out of `main.rs` and logs lifecycle events the same way.

use crate::config::{
    BINDING_PORT, HEARTBEAT_INTERVAL_MS, ROUTING_PORT, ROUTING_TICK_MS,
};
use crate::events::{EventFlags, ROUTING_START, ROUTING_STOP, WIRELESS_CONNECT, WIRELESS_DISCONNECT};
use crate::fsm::{ConnectionEvent, FsmState, NetworkFsm};
use crate::node::MeshRuntime;
use crate::packet::{DataPacket, PacketType};
use crate::radio::Radio;
use crate::report::RoutingReport;
use std::sync::Arc;
use std::time::Duration;

/// Drives the Network FSM until it reaches `Terminate` or the runtime
/// is stopped (spec §4.3).
pub fn fsm_task<R: Radio>(runtime: Arc<MeshRuntime<R>>) {
    info!("tasks::fsm: starting");
    let mut fsm = NetworkFsm::new();
    let event = || poll_wireless_event(&runtime.wireless_events);

    while runtime.is_running() {
        let prev_state = fsm.state;
        let next_state = {
            let mut radio = runtime.radio.lock().unwrap();
            let mut config = runtime.config.lock().unwrap();
            fsm.step(&mut *radio, &mut config, event)
        };
        crate::api::fsm_state_to_connected(next_state, &runtime.connected);

        if prev_state != FsmState::Connected && next_state == FsmState::Connected {
            info!("tasks::fsm: reached Connected, signalling routing task to start");
            runtime.routing_events.set(ROUTING_START);
        }

        if next_state == FsmState::Terminate {
            error!("tasks::fsm: terminated");
            runtime.stop();
            break;
        }
    }
}

fn poll_wireless_event(flags: &EventFlags) -> ConnectionEvent {
    let observed = flags.wait_any(WIRELESS_CONNECT | WIRELESS_DISCONNECT, Duration::from_millis(1));
    if observed & WIRELESS_DISCONNECT != 0 {
        ConnectionEvent::Disconnect
    } else if observed & WIRELESS_CONNECT != 0 {
        ConnectionEvent::Connect
    } else {
        ConnectionEvent::Timeout
    }
}

/// Routing & Transport event loop (spec §4.4).
pub fn routing_task<R: Radio>(runtime: Arc<MeshRuntime<R>>) {
    info!("tasks::routing: starting");
    let listener = {
        let radio = runtime.radio.lock().unwrap();
        match radio.create_server(ROUTING_PORT) {
            Ok(l) => l,
            Err(e) => {
                error!("tasks::routing: cannot bind port {ROUTING_PORT}: {e}");
                return;
            }
        }
    };

    while runtime.is_running() {
        {
            let mut routing = runtime.routing.lock().unwrap();
            let bindings = runtime.bindings.lock().unwrap();
            let radio = runtime.radio.lock().unwrap();
            let config = runtime.config.lock().unwrap();
            routing.gc_stale_children(&bindings, &*radio, &config);
        }

        let flags = runtime
            .routing_events
            .wait_any(ROUTING_START | ROUTING_STOP, Duration::from_millis(ROUTING_TICK_MS));

        if flags & ROUTING_STOP != 0 {
            info!("tasks::routing: stop signalled, resetting subtree");
            runtime.routing.lock().unwrap().reset();
            continue;
        }
        if flags & ROUTING_START != 0 {
            info!("tasks::routing: start signalled");
            let routing = runtime.routing.lock().unwrap();
            let radio = runtime.radio.lock().unwrap();
            let config = runtime.config.lock().unwrap();
            routing.emit_self_advertisement(&*radio, &config);
        }

        let received = {
            let radio = runtime.radio.lock().unwrap();
            let bindings = runtime.bindings.lock().unwrap();
            radio.server_receive(&listener, &bindings)
        };

        let Ok(Some((sender, frame))) = received else {
            continue;
        };

        dispatch_frame(&runtime, sender, &frame);
    }
}

fn dispatch_frame<R: Radio>(runtime: &Arc<MeshRuntime<R>>, sender: crate::shortmac::ShortMac, frame: &[u8]) {
    match frame.first() {
        Some(b'0') => {
            let Ok(text) = std::str::from_utf8(frame) else {
                warn!("tasks::routing: malformed report from {sender}");
                return;
            };
            let Some(report) = RoutingReport::parse(text) else {
                warn!("tasks::routing: unparseable report from {sender}");
                return;
            };
            let mut routing = runtime.routing.lock().unwrap();
            let radio = runtime.radio.lock().unwrap();
            let config = runtime.config.lock().unwrap();
            routing.handle_routing_report(sender, &report, &*radio, &config);
        }
        Some(b'1') => {
            let Some(packet) = DataPacket::parse(frame) else {
                warn!("tasks::routing: malformed data packet from {sender}");
                return;
            };
            debug_assert_eq!(packet.packet_type, PacketType::Data);
            let routing = runtime.routing.lock().unwrap();
            let radio = runtime.radio.lock().unwrap();
            let bindings = runtime.bindings.lock().unwrap();
            let config = runtime.config.lock().unwrap();
            routing.handle_data_packet(packet, &*radio, &bindings, &config, &runtime.inbound);
        }
        _ => warn!("tasks::routing: unknown frame type from {sender}"),
    }
}

/// MAC/IP binding server (spec §4.2), run while this node's SoftAP is up.
pub fn binding_server_task<R: Radio>(runtime: Arc<MeshRuntime<R>>) {
    info!("tasks::binding_server: starting on port {BINDING_PORT}");
    let listener = {
        let radio = runtime.radio.lock().unwrap();
        match radio.create_server(BINDING_PORT) {
            Ok(l) => l,
            Err(e) => {
                error!("tasks::binding_server: cannot bind port {BINDING_PORT}: {e}");
                return;
            }
        }
    };

    while runtime.is_running() {
        runtime.bindings.lock().unwrap().age_all();

        let accepted = {
            let radio = runtime.radio.lock().unwrap();
            radio.accept_heartbeat(&listener)
        };

        if let Ok(Some((short_mac, ip))) = accepted {
            runtime.bindings.lock().unwrap().touch(short_mac, ip);
        }
    }
    info!("tasks::binding_server: stopped");
}

/// MAC/IP heartbeat client (spec §4.2), run while this node's STA link
/// is up.
pub fn heartbeat_client_task<R: Radio>(runtime: Arc<MeshRuntime<R>>) {
    info!("tasks::heartbeat_client: starting");
    while runtime.is_running() {
        let (parent_level, short_mac) = {
            let config = runtime.config.lock().unwrap();
            let Some(level) = config.tree_level.filter(|&l| l > 0) else {
                drop(config);
                std::thread::sleep(Duration::from_millis(HEARTBEAT_INTERVAL_MS));
                continue;
            };
            let radio = runtime.radio.lock().unwrap();
            let Ok(mac) = radio.get_node_short_mac() else {
                continue;
            };
            (level - 1, mac)
        };

        let radio = runtime.radio.lock().unwrap();
        let gateway = crate::radio::parent_gateway(parent_level);
        if let Err(e) = radio.send_to_ip(gateway, BINDING_PORT, short_mac.as_str().as_bytes()) {
            warn!("tasks::heartbeat_client: send failed: {e}");
        }
        drop(radio);
        std::thread::sleep(Duration::from_millis(HEARTBEAT_INTERVAL_MS));
    }
    info!("tasks::heartbeat_client: stopped");
}
