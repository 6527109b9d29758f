//! Routing & Transport (spec §4.4).
//!
//! Grounded in `original_source/routing_transport/src/routing_transport.c`'s
//! `process_route_packet`/`process_data_packet`/`del_overdue_nodes`.
//! `RoutingEngine` owns the `SubtreeGraph` exclusively, per spec §5 —
//! the Mesh API never mutates it directly.

use crate::binding::BindingTable;
use crate::config::MeshConfig;
use crate::error::MeshError;
use crate::graph::{SubtreeGraph, SELF_VERTEX};
use crate::packet::{DataPacket, PacketStatus};
use crate::queue::InboundQueue;
use crate::radio::Radio;
use crate::report::RoutingReport;
use crate::shortmac::ShortMac;

pub struct RoutingEngine {
    graph: SubtreeGraph,
}

impl RoutingEngine {
    pub fn new(self_mac: ShortMac) -> Self {
        RoutingEngine {
            graph: SubtreeGraph::new(self_mac),
        }
    }

    /// `START` bit: reset to a fresh single-vertex graph (spec §4.4).
    pub fn reset(&mut self) {
        let self_mac = self.graph.self_mac();
        self.graph = SubtreeGraph::new(self_mac);
    }

    pub fn graph(&self) -> &SubtreeGraph {
        &self.graph
    }

    #[cfg(test)]
    pub fn graph_mut(&mut self) -> &mut SubtreeGraph {
        &mut self.graph
    }

    /// Integrate a child's report and re-emit the node's own aggregated
    /// report upward (spec §4.4 "processing a routing report").
    pub fn handle_routing_report<R: Radio>(
        &mut self,
        reporter: ShortMac,
        report: &RoutingReport,
        radio: &R,
        config: &MeshConfig,
    ) {
        self.graph
            .integrate_report(reporter, &report.entries_excluding_self());

        if let Some(parent_level) = config.tree_level.filter(|&l| l > 0) {
            let outgoing = RoutingReport::from_graph(&self.graph).serialize();
            if let Err(e) = radio.send_to_parent(outgoing.as_bytes(), parent_level - 1) {
                warn!("routing: failed to propagate report upward: {e}");
            }
        }
    }

    /// Leaf self-advertisement, keeping the node alive in ancestor
    /// graphs (spec §4.4 "periodic self-advertisement").
    pub fn emit_self_advertisement<R: Radio>(&self, radio: &R, config: &MeshConfig) {
        if !self.graph.is_empty_of_children() {
            return;
        }
        if let Some(parent_level) = config.tree_level.filter(|&l| l > 0) {
            let report = RoutingReport::self_only(self.graph.self_mac()).serialize();
            if let Err(e) = radio.send_to_parent(report.as_bytes(), parent_level - 1) {
                warn!("routing: self-advertisement failed: {e}");
            }
        }
    }

    /// Process one inbound data packet (spec §4.4 "processing a data
    /// packet"). `radio`/`bindings` are used for forwarding; `inbound`
    /// is where frames destined for the local application land.
    pub fn handle_data_packet<R: Radio>(
        &self,
        packet: DataPacket,
        radio: &R,
        bindings: &BindingTable,
        config: &MeshConfig,
        inbound: &InboundQueue,
    ) {
        let me = self.graph.self_mac();

        if packet.dest.is_broadcast() {
            inbound.push(packet.clone());
            self.flood_to_children(&packet, radio, bindings);
            return;
        }

        if packet.status == PacketStatus::BroadcastRequest && config.is_root() {
            let mut flood = packet.clone();
            flood.dest = ShortMac::broadcast();
            flood.status = PacketStatus::BroadcastDeliver;
            inbound.push(flood.clone());
            self.flood_to_children(&flood, radio, bindings);
            return;
        }

        if packet.dest == me {
            let is_request = packet.status == PacketStatus::Send;
            let ack = packet.ack_for(b"Received");
            inbound.push(packet);
            if is_request {
                self.forward_toward(ack, radio, bindings, config);
            }
            return;
        }

        self.forward_toward(packet, radio, bindings, config);
    }

    /// Route a frame that is neither for us nor a broadcast: down to
    /// the next-hop child if we know one, otherwise up to the parent.
    /// The root responds `Unreachable` instead of forwarding further up
    /// (spec §4.4 "else: forward").
    fn forward_toward<R: Radio>(
        &self,
        packet: DataPacket,
        radio: &R,
        bindings: &BindingTable,
        config: &MeshConfig,
    ) {
        if let Some(idx) = self.graph.index_of(packet.dest) {
            if let Some(next_hop) = self.graph.next_hop_child(idx) {
                let wire = packet.serialize();
                if let Err(e) = radio.send_to_child(next_hop, &wire, bindings) {
                    warn!("routing: forward to child {next_hop} failed: {e}");
                }
                return;
            }
        }

        if config.is_root() {
            let unreachable = packet.unreachable_for(b"Target node not in mesh network");
            if let Some(idx) = self.graph.index_of(unreachable.dest) {
                if let Some(next_hop) = self.graph.next_hop_child(idx) {
                    let wire = unreachable.serialize();
                    if let Err(e) = radio.send_to_child(next_hop, &wire, bindings) {
                        warn!("routing: unreachable reply to {next_hop} failed: {e}");
                    }
                    return;
                }
            }
            warn!(
                "routing: dropping unreachable reply, {} is not in the graph either",
                unreachable.dest
            );
            return;
        }

        if let Some(parent_level) = config.tree_level.filter(|&l| l > 0) {
            let wire = packet.serialize();
            if let Err(e) = radio.send_to_parent(&wire, parent_level - 1) {
                warn!("routing: forward upward failed: {e}");
            }
        }
    }

    fn flood_to_children<R: Radio>(&self, packet: &DataPacket, radio: &R, bindings: &BindingTable) {
        let wire = packet.serialize();
        for child in self.graph.children_of(SELF_VERTEX).collect::<Vec<_>>() {
            if let Some(mac) = self.graph.mac_of(child) {
                if let Err(e) = radio.send_to_child(mac, &wire, bindings) {
                    warn!("routing: broadcast flood to {mac} failed: {e}");
                }
            }
        }
    }

    /// Build an outbound application packet and send it along the
    /// correct first hop (spec §4.4 "sending from the local
    /// application").
    pub fn send<R: Radio>(
        &self,
        dest: ShortMac,
        data: &[u8],
        radio: &R,
        bindings: &BindingTable,
        config: &MeshConfig,
    ) -> Result<(), MeshError> {
        let me = self.graph.self_mac();
        let packet = DataPacket::new_send(me, dest, data).ok_or(MeshError::PayloadTooLarge)?;
        self.forward_toward(packet, radio, bindings, config);
        Ok(())
    }

    /// Assemble and flood a mesh-wide broadcast (spec §4.4 "broadcast
    /// from the local application").
    pub fn broadcast<R: Radio>(
        &self,
        data: &[u8],
        radio: &R,
        bindings: &BindingTable,
        config: &MeshConfig,
    ) -> Result<(), MeshError> {
        let me = self.graph.self_mac();
        if config.is_root() {
            let mut packet =
                DataPacket::new_send(me, ShortMac::broadcast(), data).ok_or(MeshError::PayloadTooLarge)?;
            packet.status = PacketStatus::BroadcastDeliver;
            self.flood_to_children(&packet, radio, bindings);
        } else {
            let mut packet = DataPacket::new_send(me, ShortMac::root_sentinel(), data)
                .ok_or(MeshError::PayloadTooLarge)?;
            packet.status = PacketStatus::BroadcastRequest;
            self.forward_toward(packet, radio, bindings, config);
        }
        Ok(())
    }

    /// GC pass (spec §4.4 `del_overdue_nodes`): drop any direct child
    /// whose MAC the binding table has aged out, along with its
    /// subtree; if no children remain and we are not root, emit the
    /// empty self-only report so ancestors drop us too once we are
    /// genuinely gone.
    pub fn gc_stale_children<R: Radio>(&mut self, bindings: &BindingTable, radio: &R, config: &MeshConfig) {
        let live = bindings.all_child_macs();
        let dropped = self.graph.drop_stale_children(&live);
        if dropped.is_empty() {
            return;
        }
        info!("routing: dropped stale children {dropped:?}");
        if self.graph.is_empty_of_children() && !config.is_root() {
            self.emit_self_advertisement(radio, config);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::radio::fake::{Ether, FakeRadio};

    fn mac(s: &str) -> ShortMac {
        ShortMac::parse(s).unwrap()
    }

    #[test]
    fn broadcast_from_leaf_reaches_root_as_request_then_floods_back() {
        // Three-node chain: root <- mid <- leaf (spec §8 scenario 4),
        // exercised purely at the RoutingEngine level: the leaf's
        // broadcast() call must request, and the root's
        // handle_data_packet must rewrite + flood.
        let ether = Ether::new();
        let root_mac = mac("ROOT00");
        let radio = FakeRadio::new(ether.clone(), [0, 0, 0, 0x00, 0x00, 0x00]);
        let bindings = BindingTable::new();
        let mut config = MeshConfig::new("FsrMesh", "12345678").unwrap();
        config.root_short_mac = Some(root_mac);
        config.tree_level = Some(0);

        let mut root_engine = RoutingEngine::new(root_mac);
        root_engine
            .graph_mut()
            .integrate_report(mac("MID000"), &[(mac("MID000"), -1), (mac("LEAF00"), 0)]);

        let inbound = InboundQueue::new();
        let request = DataPacket {
            packet_type: crate::packet::PacketType::Data,
            src: mac("LEAF00"),
            dest: ShortMac::root_sentinel(),
            status: PacketStatus::BroadcastRequest,
            packet_num: 0,
            data: b"hi".to_vec(),
        };
        root_engine.handle_data_packet(request, &radio, &bindings, &config, &inbound);

        let delivered = inbound.try_pop().expect("root delivers to itself");
        assert_eq!(delivered.status, PacketStatus::BroadcastDeliver);
        assert_eq!(delivered.dest, ShortMac::broadcast());
    }
}
