//! Routing report wire format (spec §3, §4.4, §6).
//!
//! Grounded in `original_source/routing_transport/src/routing_transport.c`'s
//! `generateFormattedString` (serialize) and `add_tree_node` (parse +
//! rebase). Kept as a zero-copy-friendly line tokenizer rather than a
//! generic serde format, per spec §9 Design Notes.

use crate::graph::SubtreeGraph;
use crate::shortmac::ShortMac;

/// One reported vertex: its short MAC and its reporter-local parent
/// index, or `-1` for "parent is the reporter itself".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportEntry {
    pub short_mac: ShortMac,
    pub parent_local: i32,
}

#[derive(Debug, Clone)]
pub struct RoutingReport {
    pub entries: Vec<ReportEntry>,
}

impl RoutingReport {
    /// A leaf's periodic self-advertisement: `"0\n1\n<self> -1"`
    /// (spec §4.4 "periodic self-advertisement").
    pub fn self_only(self_mac: ShortMac) -> Self {
        RoutingReport {
            entries: vec![ReportEntry {
                short_mac: self_mac,
                parent_local: -1,
            }],
        }
    }

    /// Serialize a node's entire subtree, self included as local index
    /// 0 with `parent_local == -1` (spec §4.4 "emitting a report").
    pub fn from_graph(graph: &SubtreeGraph) -> Self {
        let mut entries = Vec::with_capacity(graph.len());
        for idx in 0..graph.len() {
            let short_mac = graph.mac_of(idx).expect("dense index");
            let parent_local = match graph.parent_of(idx) {
                None => -1,
                Some(p) => p as i32,
            };
            entries.push(ReportEntry {
                short_mac,
                parent_local,
            });
        }
        RoutingReport { entries }
    }

    /// `"0\n<N>\n<mac0> <parent0>\n...\n<macN-1> <parentN-1>"` (spec §3, §6).
    pub fn serialize(&self) -> String {
        let mut out = format!("0\n{}\n", self.entries.len());
        for (i, e) in self.entries.iter().enumerate() {
            if i > 0 {
                out.push('\n');
            }
            out.push_str(&format!("{} {}", e.short_mac, e.parent_local));
        }
        out
    }

    pub fn parse(frame: &str) -> Option<RoutingReport> {
        let mut lines = frame.lines();
        if lines.next()? != "0" {
            return None;
        }
        let n: usize = lines.next()?.parse().ok()?;
        let mut entries = Vec::with_capacity(n);
        for _ in 0..n {
            let line = lines.next()?;
            let mut parts = line.split_whitespace();
            let short_mac = ShortMac::parse(parts.next()?)?;
            let parent_local: i32 = parts.next()?.parse().ok()?;
            entries.push(ReportEntry {
                short_mac,
                parent_local,
            });
        }
        Some(RoutingReport { entries })
    }

    /// Entries as `(mac, parent_local)` pairs for `SubtreeGraph::integrate_report`,
    /// dropping the reporter's own self-entry (local index 0, `parent_local == -1`)
    /// since the receiver already knows the reporter as a vertex.
    pub fn entries_excluding_self(&self) -> Vec<(ShortMac, i32)> {
        self.entries
            .iter()
            .skip(1)
            .map(|e| (e.short_mac, e.parent_local - 1))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn self_only_report_serializes_as_expected() {
        let mac = ShortMac::parse("AABBCC").unwrap();
        let report = RoutingReport::self_only(mac);
        assert_eq!(report.serialize(), "0\n1\nAABBCC -1");
    }

    #[test]
    fn parse_rejects_wrong_type_byte() {
        assert!(RoutingReport::parse("1\n0\n").is_none());
    }

    #[test]
    fn serialize_then_parse_roundtrips() {
        let mac = ShortMac::parse("AABBCC").unwrap();
        let report = RoutingReport::self_only(mac);
        let wire = report.serialize();
        let parsed = RoutingReport::parse(&wire).unwrap();
        assert_eq!(parsed.entries, report.entries);
    }
}
