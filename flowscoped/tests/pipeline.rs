//! End-to-end checks through the real pipeline: raw datagram bytes into
//! the parser, parsed flows into the store, and queries back out.

use flowscope_filter::parse_filter;
use flowscoped::parser::FlowParser;
use flowscoped::sankey;
use flowscoped::store::{FlowStore, SortField};
use std::net::IpAddr;

const EXPORTER: &str = "192.0.2.1";

fn exporter() -> IpAddr {
    EXPORTER.parse().unwrap()
}

/// One NetFlow v5 datagram with a single record:
/// 10.0.0.1:12345 -> 8.8.8.8:53, UDP, 120 bytes, 2 packets.
fn v5_datagram() -> Vec<u8> {
    let mut data = Vec::with_capacity(72);
    data.extend_from_slice(&5u16.to_be_bytes());
    data.extend_from_slice(&1u16.to_be_bytes()); // count
    data.extend_from_slice(&10_000u32.to_be_bytes()); // sys uptime
    data.extend_from_slice(&1_700_000_000u32.to_be_bytes()); // unix secs
    data.extend_from_slice(&0u32.to_be_bytes()); // unix nsecs
    data.extend_from_slice(&1u32.to_be_bytes()); // sequence
    data.extend_from_slice(&[0, 0, 0, 0]); // engine/sampling

    let mut record = [0u8; 48];
    record[0..4].copy_from_slice(&[10, 0, 0, 1]);
    record[4..8].copy_from_slice(&[8, 8, 8, 8]);
    record[16..20].copy_from_slice(&2u32.to_be_bytes()); // packets
    record[20..24].copy_from_slice(&120u32.to_be_bytes()); // bytes
    record[24..28].copy_from_slice(&9_000u32.to_be_bytes());
    record[28..32].copy_from_slice(&9_500u32.to_be_bytes());
    record[32..34].copy_from_slice(&12_345u16.to_be_bytes());
    record[34..36].copy_from_slice(&53u16.to_be_bytes());
    record[38] = 17;
    data.extend_from_slice(&record);
    data
}

fn v9_header() -> Vec<u8> {
    let mut data = Vec::new();
    data.extend_from_slice(&9u16.to_be_bytes());
    data.extend_from_slice(&1u16.to_be_bytes());
    data.extend_from_slice(&60_000u32.to_be_bytes());
    data.extend_from_slice(&1_700_000_000u32.to_be_bytes());
    data.extend_from_slice(&1u32.to_be_bytes());
    data.extend_from_slice(&7u32.to_be_bytes()); // source id
    data
}

/// Template 256: {IPV4_SRC_ADDR:4, IPV4_DST_ADDR:4, PROTOCOL:1, IN_BYTES:4}.
fn v9_template_datagram() -> Vec<u8> {
    let mut data = v9_header();
    data.extend_from_slice(&0u16.to_be_bytes());
    data.extend_from_slice(&24u16.to_be_bytes());
    data.extend_from_slice(&256u16.to_be_bytes());
    data.extend_from_slice(&4u16.to_be_bytes());
    for (ty, len) in [(8u16, 4u16), (12, 4), (4, 1), (1, 4)] {
        data.extend_from_slice(&ty.to_be_bytes());
        data.extend_from_slice(&len.to_be_bytes());
    }
    data
}

fn v9_data_datagram(records: &[(u8, u32)]) -> Vec<u8> {
    let mut data = v9_header();
    data.extend_from_slice(&256u16.to_be_bytes());
    data.extend_from_slice(&((4 + records.len() * 13) as u16).to_be_bytes());
    for (last_octet, bytes) in records {
        data.extend_from_slice(&[10, 0, 0, *last_octet]);
        data.extend_from_slice(&[1, 1, 1, 1]);
        data.push(6);
        data.extend_from_slice(&bytes.to_be_bytes());
    }
    data
}

#[test]
fn test_single_v5_datagram_end_to_end() {
    let mut parser = FlowParser::new();
    let store = FlowStore::new(1000);

    let flows = parser.parse(&v5_datagram(), exporter()).unwrap();
    store.add(flows);

    let stats = store.stats();
    assert_eq!(stats.total_flows, 1);
    assert_eq!(stats.v5_flows, 1);
    assert_eq!(stats.total_bytes, 120);
    assert_eq!(stats.unique_exporters, 1);

    let flows = store.query(None, SortField::Time, false, 10);
    assert_eq!(flows.len(), 1);
    let f = &flows[0];
    assert_eq!(f.src_addr.to_string(), "10.0.0.1");
    assert_eq!(f.dst_addr.to_string(), "8.8.8.8");
    assert_eq!(f.src_port, 12_345);
    assert_eq!(f.dst_port, 53);
    assert_eq!(f.protocol_name(), "UDP");
    assert_eq!(f.bytes, 120);
    assert_eq!(f.packets, 2);
    assert_eq!(f.exporter_ip.to_string(), EXPORTER);
}

#[test]
fn test_v9_template_then_data_end_to_end() {
    let mut parser = FlowParser::new();
    let store = FlowStore::new(1000);

    let flows = parser.parse(&v9_template_datagram(), exporter()).unwrap();
    assert!(flows.is_empty());

    let flows = parser
        .parse(&v9_data_datagram(&[(1, 1000), (2, 2000)]), exporter())
        .unwrap();
    assert_eq!(flows.len(), 2);
    store.add(flows);

    // The template stays cached: more data without a fresh template.
    let flows = parser
        .parse(&v9_data_datagram(&[(3, 3000), (4, 4000)]), exporter())
        .unwrap();
    assert_eq!(flows.len(), 2);
    store.add(flows);

    let stats = store.stats();
    assert_eq!(stats.total_flows, 4);
    assert_eq!(stats.v9_flows, 4);
    assert_eq!(stats.total_bytes, 10_000);
}

#[test]
fn test_filter_over_ingested_flows() {
    let mut parser = FlowParser::new();
    let store = FlowStore::new(1000);

    parser
        .parse(&v9_template_datagram(), exporter())
        .map(|f| store.add(f))
        .unwrap();
    parser
        .parse(&v9_data_datagram(&[(1, 100), (2, 200)]), exporter())
        .map(|f| store.add(f))
        .unwrap();

    let f = parse_filter("src=10.0.0.1 && proto=tcp");
    assert_eq!(store.filtered_count(Some(&f)), 1);

    let none = parse_filter("proto=udp");
    assert_eq!(store.filtered_count(Some(&none)), 0);
}

#[test]
fn test_sankey_over_ingested_flows() {
    let mut parser = FlowParser::new();
    let store = FlowStore::new(1000);

    parser
        .parse(&v9_template_datagram(), exporter())
        .map(|f| store.add(f))
        .unwrap();
    parser
        .parse(&v9_data_datagram(&[(1, 5000), (2, 100)]), exporter())
        .map(|f| store.add(f))
        .unwrap();

    let data = sankey::ip_to_ip(&store, None, 50, None);
    assert_eq!(data.links.len(), 2);
    // Heaviest pair first.
    assert_eq!(data.links[0].value, 5000);
    assert_eq!(data.links[0].protocol, "TCP");
}
