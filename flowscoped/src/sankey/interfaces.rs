//! Interface enumeration for the visualizer's pickers: which interfaces
//! each exporter has reported, what they carry, and which one looks like
//! the WAN.

use super::{guess_wan_from_flows, resolve_label};
use crate::store::{FlowStore, SortField};
use chrono::{DateTime, Utc};
use flowscope_types::Flow;
use flowscope_utils::ip::{ip_subnet_with_v6_prefix, is_private_ip};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::net::IpAddr;

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InterfaceInfo {
    pub id: u16,
    pub exporter_ip: String,
    pub flow_count: u64,
    pub bytes: u64,
    pub is_wan: bool,
    /// Distinct public addresses seen on this interface.
    pub public_ips: usize,
    /// Distinct private addresses seen on this interface.
    pub private_ips: usize,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub top_subnet: String,
    #[serde(skip_serializing_if = "is_zero")]
    pub top_subnet_ips: usize,
}

fn is_zero(v: &usize) -> bool {
    *v == 0
}

#[derive(Clone, Debug, Serialize)]
pub struct ExporterInfo {
    pub ip: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name: String,
    pub interfaces: Vec<InterfaceInfo>,
    #[serde(rename = "wanId")]
    pub wan_id: u16,
}

#[derive(Clone, Debug, Serialize)]
pub struct InterfacesResponse {
    pub exporters: Vec<ExporterInfo>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub interfaces: Vec<InterfaceInfo>,
    #[serde(rename = "wanId")]
    pub wan_id: u16,
    pub generated: DateTime<Utc>,
}

#[derive(Default)]
struct IfStats {
    flow_count: u64,
    bytes: u64,
    public_ips: HashSet<String>,
    private_ips: HashSet<String>,
    subnet_counts: HashMap<String, usize>,
}

impl IfStats {
    fn record(&mut self, addr: IpAddr, bytes: u64, v6_prefix_len: u8) {
        self.flow_count += 1;
        self.bytes += bytes;
        let ip_text = addr.to_string();
        if is_private_ip(addr) {
            if self.private_ips.insert(ip_text) {
                *self
                    .subnet_counts
                    .entry(ip_subnet_with_v6_prefix(addr, v6_prefix_len))
                    .or_default() += 1;
            }
        } else {
            self.public_ips.insert(ip_text);
        }
    }
}

pub fn interfaces_summary(store: &FlowStore, v6_prefix_len: u8) -> InterfacesResponse {
    let flows = store.query(None, SortField::Bytes, false, 0);

    let mut if_map: HashMap<(String, u16), IfStats> = HashMap::new();
    let mut exporter_set: HashSet<String> = HashSet::new();

    for flow in &flows {
        let exporter = flow.exporter_ip.to_string();
        exporter_set.insert(exporter.clone());

        if flow.input_if > 0 {
            if_map
                .entry((exporter.clone(), flow.input_if))
                .or_default()
                // The source address arrived through this interface.
                .record(flow.src_addr, flow.bytes, v6_prefix_len);
        }
        if flow.output_if > 0 {
            if_map
                .entry((exporter.clone(), flow.output_if))
                .or_default()
                .record(flow.dst_addr, flow.bytes, v6_prefix_len);
        }
    }

    let mut exporter_list: Vec<String> = exporter_set.into_iter().collect();
    exporter_list.sort();

    let per_exporter_wan: HashMap<String, u16> = exporter_list
        .iter()
        .map(|exporter| {
            let exporter_flows: Vec<Flow> = flows
                .iter()
                .filter(|f| f.exporter_ip.to_string() == *exporter)
                .cloned()
                .collect();
            (exporter.clone(), guess_wan_from_flows(&exporter_flows))
        })
        .collect();

    let mut exporters = Vec::with_capacity(exporter_list.len());
    let mut flat_interfaces = Vec::new();

    for exporter in &exporter_list {
        let wan_id = per_exporter_wan.get(exporter).copied().unwrap_or(0);

        let mut interfaces: Vec<InterfaceInfo> = if_map
            .iter()
            .filter(|((owner, _), _)| owner == exporter)
            .map(|((_, if_id), stats)| {
                let (top_subnet, top_subnet_ips) = stats
                    .subnet_counts
                    .iter()
                    .max_by_key(|(_, count)| **count)
                    .map(|(subnet, count)| (subnet.clone(), *count))
                    .unwrap_or_default();

                InterfaceInfo {
                    id: *if_id,
                    exporter_ip: exporter.clone(),
                    flow_count: stats.flow_count,
                    bytes: stats.bytes,
                    is_wan: *if_id == wan_id,
                    public_ips: stats.public_ips.len(),
                    private_ips: stats.private_ips.len(),
                    top_subnet,
                    top_subnet_ips,
                }
            })
            .collect();
        interfaces.sort_by_key(|i| i.id);
        flat_interfaces.extend(interfaces.iter().cloned());

        exporters.push(ExporterInfo {
            ip: exporter.clone(),
            name: resolve_label(exporter),
            interfaces,
            wan_id,
        });
    }

    flat_interfaces.sort_by(|a, b| {
        a.exporter_ip
            .cmp(&b.exporter_ip)
            .then_with(|| a.id.cmp(&b.id))
    });

    InterfacesResponse {
        exporters,
        interfaces: flat_interfaces,
        wan_id: guess_wan_from_flows(&flows),
        generated: Utc::now(),
    }
}

#[cfg(test)]
mod test {
    use super::super::test::flow_with_ifs;
    use super::*;

    #[test]
    fn test_interfaces_grouped_by_exporter() {
        let store = FlowStore::new(1000);
        let mut a = flow_with_ifs("192.168.1.10", "1.1.1.1", 1, 3, 100);
        a.exporter_ip = "10.0.0.1".parse().unwrap();
        let mut b = flow_with_ifs("172.16.0.5", "8.8.8.8", 2, 4, 200);
        b.exporter_ip = "10.0.0.2".parse().unwrap();
        store.add(vec![a, b]);

        let response = interfaces_summary(&store, 64);
        assert_eq!(response.exporters.len(), 2);
        assert_eq!(response.exporters[0].ip, "10.0.0.1");
        assert_eq!(response.exporters[0].interfaces.len(), 2);
        assert_eq!(response.exporters[0].wan_id, 3);
        assert_eq!(response.exporters[1].wan_id, 4);
        assert_eq!(response.interfaces.len(), 4);
    }

    #[test]
    fn test_interface_ip_classification() {
        let store = FlowStore::new(1000);
        store.add(vec![
            flow_with_ifs("192.168.1.10", "1.1.1.1", 1, 3, 100),
            flow_with_ifs("192.168.1.11", "1.1.1.1", 1, 3, 100),
            flow_with_ifs("192.168.2.20", "8.8.8.8", 1, 3, 100),
        ]);

        let response = interfaces_summary(&store, 64);
        let lan = response
            .interfaces
            .iter()
            .find(|i| i.id == 1)
            .expect("interface 1 present");
        assert_eq!(lan.private_ips, 3);
        assert_eq!(lan.public_ips, 0);
        assert_eq!(lan.top_subnet, "192.168.1.0/24");
        assert_eq!(lan.top_subnet_ips, 2);

        let wan = response.interfaces.iter().find(|i| i.id == 3).unwrap();
        assert!(wan.is_wan);
        assert_eq!(wan.public_ips, 2);
        assert_eq!(response.wan_id, 3);
    }
}
