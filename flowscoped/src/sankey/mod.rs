//! The aggregation engine: folds a filtered snapshot of the flow store
//! into Sankey node/link graphs for the web visualizer. Three modes:
//! IP-to-IP, IP-to-service, and the 4-column firewall view.

mod firewall;
mod interfaces;
mod pairs;

pub use firewall::{firewall, FirewallParams};
pub use interfaces::{interfaces_summary, ExporterInfo, InterfaceInfo, InterfacesResponse};
pub use pairs::{ip_to_ip, ip_to_service};

use chrono::{DateTime, Utc};
use flowscope_types::Flow;
use flowscope_utils::ip::is_private_ip;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::net::IpAddr;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeType {
    Source,
    Target,
    Service,
    Left,
    Right,
    LeftIf,
    RightIf,
    Internal,
    External,
    Firewall,
    Wan,
}

#[derive(Clone, Debug, Serialize)]
pub struct SankeyNode {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    /// Display label: hostname when the DNS oracle knows one, IP text
    /// otherwise.
    pub label: String,
    /// Grouping hint for layout, e.g. the interface id an IP hangs off.
    #[serde(rename = "sortKey", skip_serializing_if = "sort_key_is_zero")]
    pub sort_key: i64,
}

fn sort_key_is_zero(v: &i64) -> bool {
    *v == 0
}

#[derive(Clone, Debug, Serialize)]
pub struct SankeyLink {
    pub source: String,
    pub target: String,
    /// Bytes.
    pub value: u64,
    pub packets: u64,
    /// Dominant protocol by accumulated bytes.
    pub protocol: String,
    /// Number of aggregated flows.
    pub flows: u64,
    /// True when the path was computed from a different exporter's view
    /// than the one labelling its column.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub inferred: bool,
}

#[derive(Clone, Debug, Serialize)]
pub struct SankeyData {
    pub mode: String,
    pub nodes: Vec<SankeyNode>,
    pub links: Vec<SankeyLink>,
    pub generated: DateTime<Utc>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub filter: String,
}

impl SankeyData {
    pub(crate) fn new(nodes: Vec<SankeyNode>, links: Vec<SankeyLink>) -> Self {
        Self {
            mode: String::new(),
            nodes,
            links,
            generated: Utc::now(),
            filter: String::new(),
        }
    }
}

/// Node label: cached hostname when the oracle is warm, IP text otherwise.
pub(crate) fn resolve_label(id: &str) -> String {
    match id.parse::<IpAddr>() {
        Ok(ip) => flowscope_resolver::cached_hostname(ip).unwrap_or_else(|| id.to_string()),
        Err(_) => id.to_string(),
    }
}

/// Accumulates per-protocol byte counts for a link and picks the winner.
#[derive(Default)]
pub(crate) struct ProtocolTally {
    bytes_by_protocol: HashMap<String, u64>,
}

impl ProtocolTally {
    pub(crate) fn record(&mut self, protocol: String, bytes: u64) {
        *self.bytes_by_protocol.entry(protocol).or_default() += bytes;
    }

    pub(crate) fn dominant(&self) -> String {
        self.bytes_by_protocol
            .iter()
            .max_by_key(|(_, bytes)| **bytes)
            .map(|(proto, _)| proto.clone())
            .unwrap_or_default()
    }
}

/// Guesses the WAN interface: the one that has carried the most distinct
/// public addresses.
pub fn guess_wan_from_flows(flows: &[Flow]) -> u16 {
    let mut public_ips_by_if: HashMap<u16, HashSet<IpAddr>> = HashMap::new();

    for flow in flows {
        if !is_private_ip(flow.src_addr) && flow.input_if > 0 {
            public_ips_by_if
                .entry(flow.input_if)
                .or_default()
                .insert(flow.src_addr);
        }
        if !is_private_ip(flow.dst_addr) && flow.output_if > 0 {
            public_ips_by_if
                .entry(flow.output_if)
                .or_default()
                .insert(flow.dst_addr);
        }
    }

    let mut wan_if = 0u16;
    let mut max_count = 0usize;
    for (if_id, ips) in public_ips_by_if {
        if ips.len() > max_count {
            max_count = ips.len();
            wan_if = if_id;
        }
    }
    wan_if
}

/// Drops flows received before the cutoff, in place.
pub(crate) fn apply_cutoff(flows: &mut Vec<Flow>, cutoff: Option<DateTime<Utc>>) {
    if let Some(cutoff) = cutoff {
        flows.retain(|f| f.received_at >= cutoff);
    }
}
