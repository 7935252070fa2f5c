//! IP-to-IP and IP-to-service aggregation: two-column Sankey graphs.

use super::{
    apply_cutoff, resolve_label, NodeType, ProtocolTally, SankeyData, SankeyLink, SankeyNode,
};
use crate::store::{FlowStore, SortField};
use chrono::{DateTime, Utc};
use flowscope_filter::Filter;
use std::collections::HashMap;

/// Direction-independent endpoint pairs: A→B and B→A merge into one link
/// keyed by the sorted IP strings.
pub fn ip_to_ip(
    store: &FlowStore,
    filter: Option<&Filter>,
    top_n: usize,
    cutoff: Option<DateTime<Utc>>,
) -> SankeyData {
    let mut flows = store.query(filter, SortField::Bytes, false, 0);
    apply_cutoff(&mut flows, cutoff);

    let mut link_map: HashMap<(String, String), SankeyLink> = HashMap::new();
    let mut tallies: HashMap<(String, String), ProtocolTally> = HashMap::new();

    for flow in &flows {
        let src = flow.src_addr.to_string();
        let dst = flow.dst_addr.to_string();
        let key = if src < dst {
            (src, dst)
        } else {
            (dst, src)
        };

        tallies
            .entry(key.clone())
            .or_default()
            .record(flow.protocol_name(), flow.bytes);

        match link_map.entry(key) {
            std::collections::hash_map::Entry::Occupied(mut entry) => {
                let link = entry.get_mut();
                link.value += flow.bytes;
                link.packets += flow.packets;
                link.flows += 1;
            }
            std::collections::hash_map::Entry::Vacant(entry) => {
                let (a, b) = entry.key().clone();
                entry.insert(SankeyLink {
                    source: a,
                    target: b,
                    value: flow.bytes,
                    packets: flow.packets,
                    protocol: String::new(),
                    flows: 1,
                    inferred: false,
                });
            }
        }
    }

    let links = rank_links(link_map, tallies, top_n);
    let nodes = endpoint_nodes(&links, NodeType::Source, NodeType::Target, true);
    SankeyData::new(nodes, links)
}

/// Source IP to service name. The service comes from the destination port
/// when registered, then the source port, then the raw destination port.
pub fn ip_to_service(
    store: &FlowStore,
    filter: Option<&Filter>,
    top_n: usize,
    cutoff: Option<DateTime<Utc>>,
) -> SankeyData {
    let mut flows = store.query(filter, SortField::Bytes, false, 0);
    apply_cutoff(&mut flows, cutoff);

    let mut link_map: HashMap<(String, String), SankeyLink> = HashMap::new();
    let mut tallies: HashMap<(String, String), ProtocolTally> = HashMap::new();

    for flow in &flows {
        let service = flowscope_resolver::service_name(flow.dst_port, flow.protocol)
            .or_else(|| flowscope_resolver::service_name(flow.src_port, flow.protocol))
            .map(str::to_string)
            .unwrap_or_else(|| flow.dst_port.to_string());

        let key = (flow.src_addr.to_string(), service);

        tallies
            .entry(key.clone())
            .or_default()
            .record(flow.protocol_name(), flow.bytes);

        match link_map.entry(key) {
            std::collections::hash_map::Entry::Occupied(mut entry) => {
                let link = entry.get_mut();
                link.value += flow.bytes;
                link.packets += flow.packets;
                link.flows += 1;
            }
            std::collections::hash_map::Entry::Vacant(entry) => {
                let (src, service) = entry.key().clone();
                entry.insert(SankeyLink {
                    source: src,
                    target: service,
                    value: flow.bytes,
                    packets: flow.packets,
                    protocol: String::new(),
                    flows: 1,
                    inferred: false,
                });
            }
        }
    }

    let links = rank_links(link_map, tallies, top_n);
    // Service nodes keep their name as the label; only IPs go through the
    // oracle.
    let nodes = endpoint_nodes(&links, NodeType::Source, NodeType::Service, false);
    SankeyData::new(nodes, links)
}

fn rank_links(
    link_map: HashMap<(String, String), SankeyLink>,
    tallies: HashMap<(String, String), ProtocolTally>,
    top_n: usize,
) -> Vec<SankeyLink> {
    let mut links: Vec<SankeyLink> = link_map
        .into_iter()
        .map(|(key, mut link)| {
            if let Some(tally) = tallies.get(&key) {
                link.protocol = tally.dominant();
            }
            link
        })
        .collect();

    links.sort_by(|a, b| b.value.cmp(&a.value));
    if links.len() > top_n {
        links.truncate(top_n);
    }
    links
}

/// Nodes are the union of endpoints referenced by the surviving links. A
/// node keeps the type of its first appearance.
fn endpoint_nodes(
    links: &[SankeyLink],
    source_type: NodeType,
    target_type: NodeType,
    resolve_targets: bool,
) -> Vec<SankeyNode> {
    let mut node_types: HashMap<String, NodeType> = HashMap::new();
    let mut order: Vec<String> = Vec::new();

    for link in links {
        if !node_types.contains_key(&link.source) {
            node_types.insert(link.source.clone(), source_type);
            order.push(link.source.clone());
        }
        if !node_types.contains_key(&link.target) {
            node_types.insert(link.target.clone(), target_type);
            order.push(link.target.clone());
        }
    }

    order
        .into_iter()
        .map(|id| {
            let node_type = node_types[&id];
            let label = if node_type == source_type || resolve_targets {
                resolve_label(&id)
            } else {
                id.clone()
            };
            SankeyNode {
                id,
                node_type,
                label,
                sort_key: 0,
            }
        })
        .collect()
}
