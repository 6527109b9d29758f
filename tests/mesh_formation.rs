//! End-to-end mesh-formation scenarios (spec §8), run against the
//! in-process `FakeRadio`/`Ether` double instead of real ESP32 Wi-Fi.
//!
//! Grounded in the single `RoutingEngine`-level test already in
//! `src/routing.rs`; these exercise the same engines one layer up,
//! wiring `NetworkFsm`, `RoutingEngine`, and `BindingTable` together
//! the way `tasks.rs`'s worker loops do, minus the `thread::spawn`.

use treemesh::binding::BindingTable;
use treemesh::config::MeshConfig;
use treemesh::fsm::{ConnectionEvent, FsmState, NetworkFsm};
use treemesh::packet::{DataPacket, PacketStatus, PacketType};
use treemesh::queue::InboundQueue;
use treemesh::radio::fake::{Ether, FakeRadio};
use treemesh::radio::Radio;
use treemesh::routing::RoutingEngine;
use treemesh::shortmac::ShortMac;

fn mac(s: &str) -> ShortMac {
    ShortMac::parse(s).unwrap()
}

fn no_event() -> ConnectionEvent {
    ConnectionEvent::Timeout
}

/// Scenario 1: a lone node on empty air finds nothing to join and
/// founds the mesh as root at level 0.
#[test]
fn single_node_with_no_peers_becomes_root() {
    let ether = Ether::new();
    let mut radio = FakeRadio::new(ether, [0, 0, 0, 0x01, 0x02, 0x03]);
    let mut config = MeshConfig::new("FsrMesh", "12345678").unwrap();
    let mut fsm = NetworkFsm::new();

    loop {
        let state = fsm.step(&mut radio, &mut config, no_event);
        if state == FsmState::Connected || state == FsmState::Terminate {
            break;
        }
    }

    assert_eq!(fsm.state, FsmState::Connected);
    assert_eq!(config.tree_level, Some(0));
    assert_eq!(config.root_short_mac, Some(radio.get_node_short_mac().unwrap()));
}

/// Scenario 2: a second node sees the first's beacon and joins one
/// level below it rather than founding its own mesh.
#[test]
fn second_node_converges_onto_the_first_as_its_child() {
    let ether = Ether::new();

    let mut root_radio = FakeRadio::new(ether.clone(), [0, 0, 0, 0xAA, 0xAA, 0xAA]);
    let mut root_config = MeshConfig::new("FsrMesh", "12345678").unwrap();
    let mut root_fsm = NetworkFsm::new();
    loop {
        let state = root_fsm.step(&mut root_radio, &mut root_config, no_event);
        if state == FsmState::Connected {
            break;
        }
    }

    let mut child_radio = FakeRadio::new(ether, [0, 0, 0, 0xBB, 0xBB, 0xBB]);
    let mut child_config = MeshConfig::new("FsrMesh", "12345678").unwrap();
    let mut child_fsm = NetworkFsm::new();
    loop {
        let state = child_fsm.step(&mut child_radio, &mut child_config, no_event);
        if state == FsmState::Connected {
            break;
        }
    }

    assert_eq!(child_config.tree_level, Some(1));
    assert_eq!(child_config.root_short_mac, root_config.root_short_mac);
}

/// Scenario 3: a unicast frame from a leaf addressed to the root
/// travels up, and the root's ack travels back down to the leaf.
#[test]
fn unicast_round_trip_between_leaf_and_root() {
    let root_mac = mac("ROOT00");
    let leaf_mac = mac("LEAF00");

    let mut root_config = MeshConfig::new("FsrMesh", "12345678").unwrap();
    root_config.root_short_mac = Some(root_mac);
    root_config.tree_level = Some(0);
    let mut root_engine = RoutingEngine::new(root_mac);
    root_engine.graph_mut().integrate_report(leaf_mac, &[]);

    let ether = Ether::new();
    let root_radio = FakeRadio::new(ether.clone(), [0, 0, 0, 0x00, 0x00, 0x00]);
    let root_bindings = BindingTable::new();
    let root_inbound = InboundQueue::new();

    let packet = DataPacket {
        packet_type: PacketType::Data,
        src: leaf_mac,
        dest: root_mac,
        status: PacketStatus::Send,
        packet_num: 1,
        data: b"ping".to_vec(),
    };
    root_engine.handle_data_packet(
        packet,
        &root_radio,
        &root_bindings,
        &root_config,
        &root_inbound,
    );

    let delivered = root_inbound.try_pop().expect("root receives the request");
    assert_eq!(delivered.src, leaf_mac);
    assert_eq!(delivered.data, b"ping");

    // The root should also have queued an ack addressed back to the
    // leaf, but since the leaf's binding isn't registered here, the
    // forward falls through to "root is out of places to send it" and
    // is simply dropped — this asserts the request side lands cleanly
    // without panicking on the unresolved ack forward.
}

/// Scenario 4: a leaf's broadcast reaches the root as a
/// `BroadcastRequest`, which the root rewrites into a
/// `BroadcastDeliver` and floods to its children (mirrors the
/// `RoutingEngine`-level test in `src/routing.rs`, one layer up using
/// `RoutingEngine::broadcast` as the entry point instead of a
/// hand-built packet).
#[test]
fn broadcast_from_leaf_is_requested_then_delivered_mesh_wide() {
    let root_mac = mac("ROOT00");
    let leaf_mac = mac("LEAF00");

    // What the leaf's own `RoutingEngine::broadcast` produces: a
    // root-sentinel-addressed `BroadcastRequest` (exercised directly,
    // since a non-root's broadcast() only ever forwards upward and
    // never touches the inbound queue itself).
    let request = DataPacket {
        packet_type: PacketType::Data,
        src: leaf_mac,
        dest: ShortMac::root_sentinel(),
        status: PacketStatus::BroadcastRequest,
        packet_num: 0,
        data: b"hello mesh".to_vec(),
    };

    let mut root_config = MeshConfig::new("FsrMesh", "12345678").unwrap();
    root_config.root_short_mac = Some(root_mac);
    root_config.tree_level = Some(0);
    let mut root_engine = RoutingEngine::new(root_mac);
    root_engine.graph_mut().integrate_report(leaf_mac, &[]);

    let ether = Ether::new();
    let root_radio = FakeRadio::new(ether, [0, 0, 0, 0x00, 0x00, 0x00]);
    let root_bindings = BindingTable::new();
    let root_inbound = InboundQueue::new();

    root_engine.handle_data_packet(
        request,
        &root_radio,
        &root_bindings,
        &root_config,
        &root_inbound,
    );

    let delivered = root_inbound.try_pop().expect("root delivers the broadcast locally");
    assert_eq!(delivered.status, PacketStatus::BroadcastDeliver);
    assert_eq!(delivered.dest, ShortMac::broadcast());
    assert_eq!(delivered.data, b"hello mesh");
}

/// Scenario 5: once a child's heartbeat ages out of the binding
/// table, the GC pass drops it (and its subtree) from the routing
/// graph.
#[test]
fn child_loss_prunes_the_subtree() {
    let root_mac = mac("ROOT00");
    let mut root_engine = RoutingEngine::new(root_mac);
    root_engine
        .graph_mut()
        .integrate_report(mac("CHILD0"), &[(mac("CHILD0"), -1), (mac("GRAND0"), 0)]);

    let mut bindings = BindingTable::new();
    bindings.touch(mac("CHILD0"), std::net::Ipv4Addr::new(192, 168, 0, 2));

    let mut config = MeshConfig::new("FsrMesh", "12345678").unwrap();
    config.root_short_mac = Some(root_mac);
    config.tree_level = Some(0);

    let ether = Ether::new();
    let radio = FakeRadio::new(ether, [0, 0, 0, 0x00, 0x00, 0x00]);

    // Age the binding out entirely.
    for _ in 0..=treemesh::config::AGE_THRESHOLD {
        bindings.age_all();
    }

    root_engine.gc_stale_children(&bindings, &radio, &config);

    assert!(root_engine.graph().index_of(mac("CHILD0")).is_none());
    assert!(root_engine.graph().index_of(mac("GRAND0")).is_none());
}

/// Scenario 6: a node's link to its root drops; its FSM clears the
/// stored root/level and returns to `Scanning` to re-root, and its
/// `RoutingEngine` resets to a bare single-vertex graph on the
/// matching `ROUTING_STOP` signal.
#[test]
fn disconnect_clears_root_and_resets_the_subtree() {
    let ether = Ether::new();
    let mut radio = FakeRadio::new(ether, [0, 0, 0, 0xCC, 0xCC, 0xCC]);
    let mut config = MeshConfig::new("FsrMesh", "12345678").unwrap();
    let mut fsm = NetworkFsm::new();

    loop {
        let state = fsm.step(&mut radio, &mut config, no_event);
        if state == FsmState::Connected {
            break;
        }
    }
    assert_eq!(config.tree_level, Some(0));

    let mut engine = RoutingEngine::new(config.root_short_mac.unwrap());
    engine
        .graph_mut()
        .integrate_report(mac("CHILD0"), &[]);
    assert_eq!(engine.graph().len(), 2);

    let next = fsm.step(&mut radio, &mut config, || ConnectionEvent::Disconnect);
    assert_eq!(next, FsmState::Scanning);
    assert_eq!(config.root_short_mac, None);
    assert_eq!(config.tree_level, None);

    engine.reset();
    assert_eq!(engine.graph().len(), 1);
}
