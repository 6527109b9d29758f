//! Subtree graph and routing table (spec §3, §4.4).
//!
//! Grounded in `original_source/routing_transport/src/routing_transport.c`:
//! `createGraph`/`addEdge`/`del_sub_tree`/`regen_tree`/`del_then_gen` and
//! the MAC→index hash table. Per spec §9 Design Notes this is an
//! arena-indexed `Vec<Vec<VertexIdx>>` adjacency list rather than the
//! original's pointer-linked nodes, so `del_then_gen`'s "delete then
//! rebuild compactly" pattern is a plain `Vec` compaction.

use crate::shortmac::ShortMac;
use std::collections::HashMap;

pub type VertexIdx = usize;

/// Vertex 0 is always the owning node itself.
pub const SELF_VERTEX: VertexIdx = 0;

/// A node's view of its own subtree: an undirected tree where vertex 0
/// is self, plus the `ShortMac <-> VertexIdx` lookup the wire format
/// needs (spec's `RoutingTable`).
#[derive(Debug, Clone)]
pub struct SubtreeGraph {
    adjacency: Vec<Vec<VertexIdx>>,
    parent: Vec<Option<VertexIdx>>,
    mac_to_index: HashMap<ShortMac, VertexIdx>,
    index_to_mac: Vec<ShortMac>,
}

impl SubtreeGraph {
    /// A fresh graph containing only vertex 0 (spec §4.4: "a fresh
    /// connection (START) initializes the table with only vertex 0").
    pub fn new(self_mac: ShortMac) -> Self {
        SubtreeGraph {
            adjacency: vec![Vec::new()],
            parent: vec![None],
            mac_to_index: HashMap::from([(self_mac, SELF_VERTEX)]),
            index_to_mac: vec![self_mac],
        }
    }

    pub fn len(&self) -> usize {
        self.adjacency.len()
    }

    pub fn is_empty_of_children(&self) -> bool {
        self.adjacency[SELF_VERTEX].is_empty()
    }

    pub fn index_of(&self, mac: ShortMac) -> Option<VertexIdx> {
        self.mac_to_index.get(&mac).copied()
    }

    pub fn mac_of(&self, idx: VertexIdx) -> Option<ShortMac> {
        self.index_to_mac.get(idx).copied()
    }

    pub fn self_mac(&self) -> ShortMac {
        self.index_to_mac[SELF_VERTEX]
    }

    pub fn parent_of(&self, idx: VertexIdx) -> Option<VertexIdx> {
        self.parent.get(idx).copied().flatten()
    }

    /// Direct children of a vertex (neighbours with `parent == idx`).
    pub fn children_of(&self, idx: VertexIdx) -> impl Iterator<Item = VertexIdx> + '_ {
        self.adjacency[idx]
            .iter()
            .copied()
            .filter(move |&v| self.parent[v] == Some(idx))
    }

    fn add_edge(&mut self, a: VertexIdx, b: VertexIdx) {
        self.adjacency[a].push(b);
        self.adjacency[b].push(a);
    }

    /// Walk `parent[v]` up to the root. Returns the path from `v` to 0
    /// inclusive (spec §8 "next-hop correctness").
    pub fn path_to_root(&self, mut v: VertexIdx) -> Vec<VertexIdx> {
        let mut path = vec![v];
        while let Some(p) = self.parent[v] {
            path.push(p);
            v = p;
        }
        path
    }

    /// The child of vertex 0 on the path toward `v` — the next hop to
    /// forward a frame addressed to `v` (spec §4.4).
    pub fn next_hop_child(&self, v: VertexIdx) -> Option<ShortMac> {
        if v == SELF_VERTEX {
            return None;
        }
        let path = self.path_to_root(v);
        // path = [v, ..., 0]; the element just before 0 is the next hop.
        path.iter().rev().nth(1).and_then(|&idx| self.mac_of(idx))
    }

    /// Integrate a child's routing report (spec §4.4 "processing a
    /// routing report"). `entries` are `(mac, parent_local)` pairs as
    /// parsed from the wire, with `parent_local == -1` meaning "attach
    /// under the reporter itself".
    pub fn integrate_report(&mut self, reporter: ShortMac, entries: &[(ShortMac, i32)]) {
        if self.index_of(reporter).is_some() {
            self.del_then_gen(reporter);
        }

        let reporter_idx = match self.index_of(reporter) {
            Some(idx) => idx,
            None => self.append_vertex(reporter, SELF_VERTEX),
        };

        let offset = self.len();
        for &(mac, parent_local) in entries {
            let parent_idx = if parent_local < 0 {
                reporter_idx
            } else {
                offset + parent_local as usize
            };
            self.append_vertex(mac, parent_idx);
        }
    }

    fn append_vertex(&mut self, mac: ShortMac, parent_idx: VertexIdx) -> VertexIdx {
        let idx = self.adjacency.len();
        self.adjacency.push(Vec::new());
        self.parent.push(Some(parent_idx));
        self.mac_to_index.insert(mac, idx);
        self.index_to_mac.push(mac);
        self.add_edge(parent_idx, idx);
        idx
    }

    /// Remove `mac` and its entire subtree, then rebuild a dense,
    /// re-indexed graph containing only the surviving vertices. Mirrors
    /// `del_then_gen`: `del_sub_tree` (DFS removal) followed by
    /// `regen_tree` (compact rebuild), collapsed into one pass here
    /// since the arena makes "remove in place" awkward but "rebuild
    /// keeping survivors" trivial.
    pub fn del_then_gen(&mut self, mac: ShortMac) {
        let Some(victim) = self.index_of(mac) else {
            return;
        };
        if victim == SELF_VERTEX {
            return;
        }

        let mut to_drop = vec![false; self.len()];
        let mut stack = vec![victim];
        while let Some(v) = stack.pop() {
            to_drop[v] = true;
            for child in self.children_of(v).collect::<Vec<_>>() {
                stack.push(child);
            }
        }

        self.rebuild_excluding(&to_drop);
    }

    fn rebuild_excluding(&mut self, drop: &[bool]) {
        let mut remap = vec![None; self.len()];
        let mut new_macs = Vec::new();
        let mut new_parent_source = Vec::new();

        for (old_idx, mac) in self.index_to_mac.iter().enumerate() {
            if drop[old_idx] {
                continue;
            }
            let new_idx = new_macs.len();
            remap[old_idx] = Some(new_idx);
            new_macs.push(*mac);
            new_parent_source.push(self.parent[old_idx]);
        }

        let mut new_adjacency = vec![Vec::new(); new_macs.len()];
        let mut new_parent = vec![None; new_macs.len()];
        for (old_idx, old_parent) in new_parent_source.iter().enumerate() {
            let new_idx = old_idx;
            if let Some(old_p) = old_parent {
                if let Some(new_p) = remap[*old_p] {
                    new_parent[new_idx] = Some(new_p);
                }
            }
        }
        for (new_idx, parent) in new_parent.iter().enumerate() {
            if let Some(p) = parent {
                new_adjacency[new_idx].push(*p);
                new_adjacency[*p].push(new_idx);
            }
        }

        self.mac_to_index = new_macs
            .iter()
            .enumerate()
            .map(|(i, m)| (*m, i))
            .collect();
        self.index_to_mac = new_macs;
        self.adjacency = new_adjacency;
        self.parent = new_parent;
    }

    /// GC pass comparing the graph's direct children against the
    /// binding table's live set (spec §4.4 `del_overdue_nodes`).
    /// Returns the short MACs of children that were dropped.
    pub fn drop_stale_children(&mut self, live: &[ShortMac]) -> Vec<ShortMac> {
        let stale: Vec<ShortMac> = self
            .children_of(SELF_VERTEX)
            .filter_map(|idx| self.mac_of(idx))
            .filter(|mac| !live.contains(mac))
            .collect();
        for mac in &stale {
            self.del_then_gen(*mac);
        }
        stale
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mac(s: &str) -> ShortMac {
        ShortMac::parse(s).unwrap()
    }

    #[test]
    fn fresh_graph_has_only_self() {
        let g = SubtreeGraph::new(mac("AAAAAA"));
        assert_eq!(g.len(), 1);
        assert_eq!(g.parent_of(SELF_VERTEX), None);
    }

    #[test]
    fn integrate_leaf_report_attaches_under_self() {
        let mut g = SubtreeGraph::new(mac("AAAAAA"));
        g.integrate_report(mac("BBBBBB"), &[]);
        let idx = g.index_of(mac("BBBBBB")).unwrap();
        assert_eq!(g.parent_of(idx), Some(SELF_VERTEX));
    }

    #[test]
    fn integrate_nested_report_rebases_parent_indices() {
        let mut g = SubtreeGraph::new(mac("ROOT00"));
        // B reports itself (-1) plus a grandchild C attached under B (local idx 0)
        g.integrate_report(mac("BBBBBB"), &[(mac("BBBBBB"), -1), (mac("CCCCCC"), 0)]);
        let b = g.index_of(mac("BBBBBB")).unwrap();
        let c = g.index_of(mac("CCCCCC")).unwrap();
        assert_eq!(g.parent_of(b), Some(SELF_VERTEX));
        assert_eq!(g.parent_of(c), Some(b));
    }

    #[test]
    fn next_hop_child_is_first_hop_off_root() {
        let mut g = SubtreeGraph::new(mac("ROOT00"));
        g.integrate_report(mac("BBBBBB"), &[(mac("BBBBBB"), -1), (mac("CCCCCC"), 0)]);
        let c = g.index_of(mac("CCCCCC")).unwrap();
        assert_eq!(g.next_hop_child(c), Some(mac("BBBBBB")));
    }

    #[test]
    fn del_then_gen_drops_subtree_and_stays_dense() {
        let mut g = SubtreeGraph::new(mac("ROOT00"));
        g.integrate_report(mac("BBBBBB"), &[(mac("BBBBBB"), -1), (mac("CCCCCC"), 0)]);
        g.del_then_gen(mac("BBBBBB"));
        assert_eq!(g.len(), 1);
        assert!(g.index_of(mac("BBBBBB")).is_none());
        assert!(g.index_of(mac("CCCCCC")).is_none());
    }

    #[test]
    fn report_roundtrip_is_isomorphic_after_reindexing() {
        let mut original = SubtreeGraph::new(mac("ROOT00"));
        original.integrate_report(mac("BBBBBB"), &[(mac("BBBBBB"), -1), (mac("CCCCCC"), 0)]);

        let report = crate::report::RoutingReport::from_graph(&original);
        let wire = report.serialize();
        let parsed = crate::report::RoutingReport::parse(&wire).unwrap();

        let mut fresh = SubtreeGraph::new(mac("ROOT00"));
        fresh.integrate_report(mac("ROOT00"), &parsed.entries_excluding_self());

        for mac_str in ["BBBBBB", "CCCCCC"] {
            let m = mac(mac_str);
            let oi = original.index_of(m).unwrap();
            let fi = fresh.index_of(m).unwrap();
            assert_eq!(
                original.parent_of(oi).and_then(|p| original.mac_of(p)),
                fresh.parent_of(fi).and_then(|p| fresh.mac_of(p)),
            );
        }
    }

    #[test]
    fn every_vertex_reaches_root_within_bound() {
        let mut g = SubtreeGraph::new(mac("ROOT00"));
        g.integrate_report(mac("BBBBBB"), &[(mac("BBBBBB"), -1), (mac("CCCCCC"), 0)]);
        for idx in 1..g.len() {
            let path = g.path_to_root(idx);
            assert!(path.len() <= g.len());
            assert_eq!(*path.last().unwrap(), SELF_VERTEX);
        }
    }
}
