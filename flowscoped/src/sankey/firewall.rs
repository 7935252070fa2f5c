//! The 4-column firewall view: `[Left IP] → [Left IF] → [Right IF] →
//! [Right IP]`. The right-side interface defaults to the inferred WAN,
//! and two exporters can be combined into one picture, with the
//! supplementary exporter's paths flagged as inferred.

use super::{
    apply_cutoff, guess_wan_from_flows, resolve_label, NodeType, SankeyData, SankeyLink,
    SankeyNode,
};
use crate::store::{FlowStore, SortField};
use chrono::{DateTime, Utc};
use flowscope_filter::Filter;
use flowscope_types::Flow;
use std::collections::HashMap;
use std::net::IpAddr;

#[derive(Clone, Debug, Default)]
pub struct FirewallParams {
    /// Left-side interface id; 0 accepts any.
    pub left_if: u16,
    /// Right-side interface id; 0 infers the WAN.
    pub right_if: u16,
    /// Restrict (or in cross-exporter mode, select) flows by exporter IP.
    pub left_exporter: String,
    pub right_exporter: String,
}

#[derive(Clone, PartialEq, Eq, Hash)]
struct ConnectionKey {
    left_ip: String,
    right_ip: String,
    left_if: u16,
    right_if: u16,
    exporter: String,
}

#[derive(Clone, Copy, Default)]
struct ConnectionStats {
    bytes: u64,
    packets: u64,
    flows: u64,
    inferred: bool,
}

pub fn firewall(
    store: &FlowStore,
    filter: Option<&Filter>,
    top_n: usize,
    cutoff: Option<DateTime<Utc>>,
    params: &FirewallParams,
) -> SankeyData {
    let mut flows = store.query(filter, SortField::Bytes, false, 0);
    apply_cutoff(&mut flows, cutoff);

    let cross_exporter = !params.left_exporter.is_empty()
        && !params.right_exporter.is_empty()
        && params.left_exporter != params.right_exporter;

    let (left_flows, right_flows): (Vec<Flow>, Vec<Flow>) = if cross_exporter {
        let left = flows
            .iter()
            .filter(|f| f.exporter_ip.to_string() == params.left_exporter)
            .cloned()
            .collect();
        let right = flows
            .iter()
            .filter(|f| f.exporter_ip.to_string() == params.right_exporter)
            .cloned()
            .collect();
        (left, right)
    } else if !params.left_exporter.is_empty() {
        let left: Vec<Flow> = flows
            .iter()
            .filter(|f| f.exporter_ip.to_string() == params.left_exporter)
            .cloned()
            .collect();
        (left.clone(), left)
    } else {
        (flows.clone(), flows)
    };

    let right_if = if params.right_if == 0 {
        guess_wan_from_flows(&right_flows)
    } else {
        params.right_if
    };

    let mut connections: HashMap<ConnectionKey, ConnectionStats> = HashMap::new();

    if cross_exporter {
        // The left exporter only sees its own WAN leg; its paths are
        // stitched into the picture and rendered dashed.
        let left_wan = guess_wan_from_flows(&left_flows);
        accumulate(&mut connections, &left_flows, left_wan, params.left_if, true);
        accumulate(&mut connections, &right_flows, right_if, params.left_if, false);
    } else {
        accumulate(&mut connections, &left_flows, right_if, params.left_if, false);
    }

    // Rank end-to-end connections and keep the heaviest.
    let mut ranked: Vec<(ConnectionKey, ConnectionStats)> = connections.into_iter().collect();
    ranked.sort_by(|a, b| b.1.bytes.cmp(&a.1.bytes));
    if ranked.len() > top_n {
        ranked.truncate(top_n);
    }

    // Expand each connection into its three column-to-column links,
    // merging links that share endpoints.
    let mut link_map: HashMap<(String, String, bool), SankeyLink> = HashMap::new();
    let mut left_ip_to_if: HashMap<String, u16> = HashMap::new();
    let mut right_ip_to_if: HashMap<String, u16> = HashMap::new();

    for (key, stats) in &ranked {
        let left_node = interface_node_id(key.left_if, &key.exporter, cross_exporter);
        let right_node = interface_node_id(key.right_if, &key.exporter, cross_exporter);

        left_ip_to_if.insert(key.left_ip.clone(), key.left_if);
        right_ip_to_if.insert(key.right_ip.clone(), key.right_if);

        for (from, to) in [
            (key.left_ip.clone(), left_node.clone()),
            (left_node.clone(), right_node.clone()),
            (right_node, key.right_ip.clone()),
        ] {
            let entry = link_map
                .entry((from.clone(), to.clone(), stats.inferred))
                .or_insert_with(|| SankeyLink {
                    source: from,
                    target: to,
                    value: 0,
                    packets: 0,
                    protocol: String::new(),
                    flows: 0,
                    inferred: stats.inferred,
                });
            entry.value += stats.bytes;
            entry.packets += stats.packets;
            entry.flows += stats.flows;
        }
    }

    let links: Vec<SankeyLink> = link_map.into_values().collect();
    let nodes = build_nodes(&links, &left_ip_to_if, &right_ip_to_if);
    SankeyData::new(nodes, links)
}

/// Classifies flows against the chosen right-side interface and folds
/// them into end-to-end connections. Outbound flows (`output_if` is the
/// target) keep their direction; inbound flows mirror their endpoints so
/// the local host always lands in the left column.
fn accumulate(
    connections: &mut HashMap<ConnectionKey, ConnectionStats>,
    flows: &[Flow],
    target_if: u16,
    left_if: u16,
    inferred: bool,
) {
    for flow in flows {
        if flow.input_if == 0 && flow.output_if == 0 {
            continue;
        }

        let exporter = flow.exporter_ip.to_string();
        let key = if flow.output_if == target_if && flow.input_if != target_if && flow.input_if > 0
        {
            if left_if != 0 && flow.input_if != left_if {
                continue;
            }
            ConnectionKey {
                left_ip: flow.src_addr.to_string(),
                right_ip: flow.dst_addr.to_string(),
                left_if: flow.input_if,
                right_if: target_if,
                exporter,
            }
        } else if flow.input_if == target_if && flow.output_if != target_if && flow.output_if > 0 {
            if left_if != 0 && flow.output_if != left_if {
                continue;
            }
            ConnectionKey {
                left_ip: flow.dst_addr.to_string(),
                right_ip: flow.src_addr.to_string(),
                left_if: flow.output_if,
                right_if: target_if,
                exporter,
            }
        } else {
            continue;
        };

        let stats = connections.entry(key).or_insert(ConnectionStats {
            inferred,
            ..Default::default()
        });
        stats.bytes += flow.bytes;
        stats.packets += flow.packets;
        stats.flows += 1;
    }
}

/// Interface node ids: `IF:3`, or `<exporter>:IF3` when two exporters
/// share the picture and the columns must stay distinct.
fn interface_node_id(if_id: u16, exporter: &str, cross_exporter: bool) -> String {
    if cross_exporter && !exporter.is_empty() {
        let mut short = exporter.to_string();
        if let Ok(ip) = exporter.parse::<IpAddr>() {
            let resolved = resolve_label(exporter);
            if resolved != exporter {
                short = resolved;
            } else if let IpAddr::V4(v4) = ip {
                let octets = v4.octets();
                short = format!("{}.{}", octets[2], octets[3]);
            }
        }
        format!("{short}:IF{if_id}")
    } else {
        format!("IF:{if_id}")
    }
}

fn is_interface_node(id: &str) -> bool {
    id.starts_with("IF:") || id.contains(":IF")
}

fn extract_if_id(id: &str) -> i64 {
    let digits = if let Some(rest) = id.strip_prefix("IF:") {
        rest
    } else if let Some(idx) = id.find(":IF") {
        &id[idx + 3..]
    } else {
        return 0;
    };
    digits.parse().unwrap_or(0)
}

fn build_nodes(
    links: &[SankeyLink],
    left_ip_to_if: &HashMap<String, u16>,
    right_ip_to_if: &HashMap<String, u16>,
) -> Vec<SankeyNode> {
    // An interface node that is the target of another interface node sits
    // in the right column.
    let mut right_if_nodes: HashMap<&str, bool> = HashMap::new();
    for link in links {
        if is_interface_node(&link.target) && is_interface_node(&link.source) {
            right_if_nodes.insert(link.target.as_str(), true);
        }
    }

    let mut node_types: HashMap<String, NodeType> = HashMap::new();
    let mut order: Vec<String> = Vec::new();
    let mut classify = |id: &str, ip_side: NodeType| {
        if node_types.contains_key(id) {
            return;
        }
        let node_type = if is_interface_node(id) {
            if right_if_nodes.contains_key(id) {
                NodeType::RightIf
            } else {
                NodeType::LeftIf
            }
        } else {
            ip_side
        };
        node_types.insert(id.to_string(), node_type);
        order.push(id.to_string());
    };

    for link in links {
        classify(&link.source, NodeType::Left);
        classify(&link.target, NodeType::Right);
    }

    order
        .into_iter()
        .map(|id| {
            let node_type = node_types[&id];
            let (label, sort_key) = match node_type {
                NodeType::Left => (
                    resolve_label(&id),
                    left_ip_to_if.get(&id).copied().unwrap_or(0) as i64,
                ),
                NodeType::Right => (
                    resolve_label(&id),
                    right_ip_to_if.get(&id).copied().unwrap_or(0) as i64,
                ),
                _ => (id.clone(), extract_if_id(&id)),
            };
            SankeyNode {
                id,
                node_type,
                label,
                sort_key,
            }
        })
        .collect()
}
